//! `/roles`: role and permission administration. Superuser only.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use authkit_accounts::{NewPermission, NewRole, Permission, PermissionUpdate, RoleStats, RoleUpdate};
use authkit_core::{PermissionId, RoleId};

use crate::app::dto::{
    ApiJson, ApiPath, ApiQuery, BulkAssignRequest, BulkAssignResponse, MessageResponse,
    PermissionCheckRequest, PermissionCheckResponse, PermissionListQuery, PermissionListResponse,
    RoleAssignmentRequest, RoleListQuery, RoleListResponse, RoleResponse,
};
use crate::app::errors::ServiceResult;
use crate::app::services::AppServices;
use crate::middleware::superuser_middleware;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/permissions", get(list_permissions).post(create_permission))
        .route(
            "/permissions/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
        .route("/assign", post(assign_roles))
        .route("/bulk-assign", post(bulk_assign))
        .route("/check-permission", post(check_permission))
        .route("/stats/overview", get(role_stats))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
        .route_layer(axum::middleware::from_fn(superuser_middleware))
}

// Permissions

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<NewPermission>,
) -> ServiceResult<(StatusCode, Json<Permission>)> {
    let permission = services.create_permission(body).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(query): ApiQuery<PermissionListQuery>,
) -> ServiceResult<Json<PermissionListResponse>> {
    let (filter, page) = query.into_parts()?;
    Ok(Json(services.list_permissions(filter, page).await?.into()))
}

pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<PermissionId>,
) -> ServiceResult<Json<Permission>> {
    Ok(Json(services.get_permission(id).await?))
}

pub async fn update_permission(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<PermissionId>,
    ApiJson(body): ApiJson<PermissionUpdate>,
) -> ServiceResult<Json<Permission>> {
    Ok(Json(services.update_permission(id, body).await?))
}

pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<PermissionId>,
) -> ServiceResult<Json<MessageResponse>> {
    services.delete_permission(id).await?;
    Ok(Json(MessageResponse::new("Permission deleted successfully")))
}

// Roles

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<NewRole>,
) -> ServiceResult<(StatusCode, Json<RoleResponse>)> {
    let role = services.create_role(body).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(query): ApiQuery<RoleListQuery>,
) -> ServiceResult<Json<RoleListResponse>> {
    let (filter, page) = query.into_parts()?;
    Ok(Json(services.list_roles(filter, page).await?.into()))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<RoleId>,
) -> ServiceResult<Json<RoleResponse>> {
    Ok(Json(services.get_role(id).await?))
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<RoleId>,
    ApiJson(body): ApiJson<RoleUpdate>,
) -> ServiceResult<Json<RoleResponse>> {
    Ok(Json(services.update_role(id, body).await?))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<RoleId>,
) -> ServiceResult<Json<MessageResponse>> {
    services.delete_role(id).await?;
    Ok(Json(MessageResponse::new("Role deleted successfully")))
}

pub async fn role_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> ServiceResult<Json<RoleStats>> {
    Ok(Json(services.role_stats().await?))
}

// Assignments

pub async fn assign_roles(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<RoleAssignmentRequest>,
) -> ServiceResult<Json<MessageResponse>> {
    services.assign_roles(body).await?;
    Ok(Json(MessageResponse::new("Roles assigned successfully")))
}

pub async fn bulk_assign(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<BulkAssignRequest>,
) -> ServiceResult<Json<BulkAssignResponse>> {
    Ok(Json(services.bulk_assign(body).await?))
}

pub async fn check_permission(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<PermissionCheckRequest>,
) -> ServiceResult<Json<PermissionCheckResponse>> {
    Ok(Json(services.check_permission(body).await?))
}
