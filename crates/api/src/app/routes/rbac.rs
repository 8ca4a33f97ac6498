//! Authorization introspection for the calling user.

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Json, Router};

use authkit_auth::permissions::USER_UPDATE;
use authkit_core::UserId;

use crate::app::dto::{ApiPath, EffectivePermissionsResponse, ManageableResponse};
use crate::app::errors::{ServiceError, ServiceResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/me/permissions", get(my_permissions))
        .route("/users/:id/manageable", get(manageable))
}

/// GET /rbac/me/permissions - roles and permissions currently in effect
pub async fn my_permissions(
    Extension(current): Extension<CurrentUser>,
) -> ServiceResult<Json<EffectivePermissionsResponse>> {
    authz::require_active(&current)?;
    Ok(Json(EffectivePermissionsResponse::from(&current.principal)))
}

/// GET /rbac/users/:id/manageable - whether the caller outranks the target user
pub async fn manageable(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(current): Extension<CurrentUser>,
    path: Result<ApiPath<UserId>, ServiceError>,
) -> ServiceResult<Json<ManageableResponse>> {
    authz::require_permissions(&current, &[USER_UPDATE])?;
    let ApiPath(id) = path?;
    Ok(Json(services.manageable(&current.principal, id).await?))
}
