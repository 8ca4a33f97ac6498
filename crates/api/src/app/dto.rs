use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use authkit_accounts::{BulkOperation, Permission, PermissionFilter, Role, RoleFilter, User, UserFilter};
use authkit_auth::{Principal, RoleGrant};
use authkit_core::{Page, PageRequest, RoleId, UserId};

use crate::app::errors::ServiceError;

// -------------------------
// Extractors
// -------------------------

/// `Json<T>` whose rejections render as 422 `{"detail": ...}`.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ServiceError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ServiceError::Validation("Expected request with `Content-Type: application/json`".into())
        }
        other => ServiceError::Validation(other.body_text()),
    }
}

/// `Query<T>` whose rejections render as 422 `{"detail": ...}`.
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|rejection: QueryRejection| ServiceError::Validation(rejection.body_text()))
    }
}

/// `Path<T>` whose rejections render as 422 `{"detail": ...}`.
pub struct ApiPath<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| ApiPath(value))
            .map_err(|rejection: PathRejection| ServiceError::Validation(rejection.body_text()))
    }
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleAssignmentRequest {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct BulkAssignRequest {
    pub user_ids: Vec<UserId>,
    pub role_ids: Vec<RoleId>,
    pub operation: BulkOperation,
}

#[derive(Debug, Deserialize)]
pub struct PermissionCheckRequest {
    pub user_id: UserId,
    pub permission_codename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_superuser: Option<bool>,
}

impl UserListQuery {
    pub fn into_parts(self) -> Result<(UserFilter, PageRequest), ServiceError> {
        let page = PageRequest::new(self.skip, self.limit)?;
        let filter = UserFilter {
            search: self.search,
            is_active: self.is_active,
            is_verified: self.is_verified,
            is_superuser: self.is_superuser,
        };
        Ok((filter, page))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleListQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
    pub is_system: Option<bool>,
}

impl RoleListQuery {
    pub fn into_parts(self) -> Result<(RoleFilter, PageRequest), ServiceError> {
        let page = PageRequest::new(self.skip, self.limit)?;
        let filter = RoleFilter {
            search: self.search,
            is_active: self.is_active,
            is_default: self.is_default,
            is_system: self.is_system,
        };
        Ok((filter, page))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionListQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub is_active: Option<bool>,
}

impl PermissionListQuery {
    pub fn into_parts(self) -> Result<(PermissionFilter, PageRequest), ServiceError> {
        let page = PageRequest::new(self.skip, self.limit)?;
        let filter = PermissionFilter {
            search: self.search,
            resource: self.resource,
            action: self.action,
            is_active: self.is_active,
        };
        Ok((filter, page))
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub full_name: String,
    pub display_name: String,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            username: u.username.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            phone: u.phone.clone(),
            bio: u.bio.clone(),
            avatar_url: u.avatar_url.clone(),
            is_active: u.is_active,
            is_verified: u.is_verified,
            is_superuser: u.is_superuser,
            created_at: u.created_at,
            updated_at: u.updated_at,
            last_login: u.last_login,
            full_name: u.full_name(),
            display_name: u.display_name(),
        }
    }
}

/// `/auth/me`: the user plus what it may do.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl MeResponse {
    pub fn new(user: &User, principal: &Principal) -> Self {
        Self {
            user: user.into(),
            roles: principal.role_names(),
            permissions: principal.effective_permissions(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub full_name: String,
    pub display_name: String,
}

impl From<&User> for ProfileResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            username: u.username.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            phone: u.phone.clone(),
            bio: u.bio.clone(),
            avatar_url: u.avatar_url.clone(),
            is_verified: u.is_verified,
            created_at: u.created_at,
            last_login: u.last_login,
            full_name: u.full_name(),
            display_name: u.display_name(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub pages: u64,
}

impl From<Page<User>> for UserListResponse {
    fn from(page: Page<User>) -> Self {
        let page = page.map(|u| UserResponse::from(&u));
        Self {
            users: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            pages: page.pages,
        }
    }
}

/// A role with its resolved permissions and the number of users holding it.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub is_system: bool,
    pub is_active: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub permissions: Vec<Permission>,
    pub user_count: u64,
}

impl RoleResponse {
    pub fn new(role: Role, permissions: Vec<Permission>, user_count: u64) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            is_default: role.is_default,
            is_system: role.is_system,
            is_active: role.is_active,
            priority: role.priority,
            created_at: role.created_at,
            updated_at: role.updated_at,
            permissions,
            user_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleListResponse {
    pub roles: Vec<RoleResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub pages: u64,
}

impl From<Page<RoleResponse>> for RoleListResponse {
    fn from(page: Page<RoleResponse>) -> Self {
        Self {
            roles: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            pages: page.pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionListResponse {
    pub permissions: Vec<Permission>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub pages: u64,
}

impl From<Page<Permission>> for PermissionListResponse {
    fn from(page: Page<Permission>) -> Self {
        Self {
            permissions: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            pages: page.pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionCheckResponse {
    pub has_permission: bool,
    pub user_id: UserId,
    pub permission_codename: String,
    pub granted_by_roles: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct BulkAssignResponse {
    pub success: Vec<UserId>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Serialize)]
pub struct BulkFailure {
    pub user_id: UserId,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RoleSummary {
    pub name: String,
    pub priority: i32,
}

impl From<&RoleGrant> for RoleSummary {
    fn from(grant: &RoleGrant) -> Self {
        Self {
            name: grant.name.clone(),
            priority: grant.priority,
        }
    }
}

/// `/rbac/me/permissions`.
#[derive(Debug, Serialize)]
pub struct EffectivePermissionsResponse {
    pub user_id: UserId,
    pub is_superuser: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub highest_priority_role: Option<RoleSummary>,
}

impl From<&Principal> for EffectivePermissionsResponse {
    fn from(p: &Principal) -> Self {
        Self {
            user_id: p.user_id,
            is_superuser: p.is_superuser,
            roles: p.role_names(),
            permissions: p.effective_permissions(),
            highest_priority_role: p.highest_priority_role().map(RoleSummary::from),
        }
    }
}

/// `/rbac/users/{id}/manageable`.
#[derive(Debug, Serialize)]
pub struct ManageableResponse {
    pub user_id: UserId,
    pub can_manage: bool,
    pub actor_priority: i32,
    pub target_priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
