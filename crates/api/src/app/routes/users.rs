//! `/users`: own profile for any authenticated user, administration for superusers.

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Json, Router};

use authkit_accounts::{AdminUserUpdate, ProfileUpdate, UserStats};
use authkit_core::UserId;

use crate::app::dto::{
    ApiJson, ApiPath, ApiQuery, MessageResponse, ProfileResponse, UserListQuery, UserListResponse,
    UserResponse,
};
use crate::app::errors::ServiceResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CurrentUser;
use crate::middleware::superuser_middleware;

pub fn router() -> Router {
    let admin = Router::new()
        .route("/", get(list_users))
        .route("/stats/overview", get(user_stats))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route_layer(axum::middleware::from_fn(superuser_middleware));

    Router::new()
        .route(
            "/profile",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
        .merge(admin)
}

pub async fn get_profile(
    Extension(current): Extension<CurrentUser>,
) -> ServiceResult<Json<ProfileResponse>> {
    authz::require_active(&current)?;
    Ok(Json(ProfileResponse::from(&current.user)))
}

pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(body): ApiJson<ProfileUpdate>,
) -> ServiceResult<Json<ProfileResponse>> {
    authz::require_active(&current)?;
    let user = services.update_profile(&current.user, body).await?;
    Ok(Json(ProfileResponse::from(&user)))
}

pub async fn delete_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(current): Extension<CurrentUser>,
) -> ServiceResult<Json<MessageResponse>> {
    authz::require_active(&current)?;
    services.delete_account(&current.user).await?;
    Ok(Json(MessageResponse::new("Account deleted successfully")))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ServiceResult<Json<UserListResponse>> {
    let (filter, page) = query.into_parts()?;
    let users = services.list_users(filter, page).await?;
    Ok(Json(users.into()))
}

pub async fn user_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> ServiceResult<Json<UserStats>> {
    Ok(Json(services.user_stats().await?))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<UserId>,
) -> ServiceResult<Json<UserResponse>> {
    let user = services.get_user(id).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<AdminUserUpdate>,
) -> ServiceResult<Json<UserResponse>> {
    let user = services.admin_update_user(id, body).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(id): ApiPath<UserId>,
) -> ServiceResult<Json<MessageResponse>> {
    services.delete_user(&current.user, id).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
