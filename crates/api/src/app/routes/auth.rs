//! Account lifecycle endpoints under `/auth`.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use authkit_accounts::{PasswordChange, PasswordReset, Registration};

use crate::app::dto::{
    ApiJson, EmailRequest, LoginRequest, MeResponse, MessageResponse, RefreshRequest, TokenRequest,
    TokenResponse, UserResponse,
};
use crate::app::errors::ServiceResult;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CurrentUser;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/verify-email", post(verify_email))
        .route("/resend-verification", post(resend_verification))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

pub fn protected_router() -> Router {
    Router::new()
        .route("/change-password", post(change_password))
        .route("/me", get(me))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<Registration>,
) -> ServiceResult<(StatusCode, Json<UserResponse>)> {
    let user = services.register(body).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ServiceResult<Json<TokenResponse>> {
    Ok(Json(services.login(body).await?))
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> ServiceResult<Json<TokenResponse>> {
    Ok(Json(services.refresh(&body.refresh_token).await?))
}

pub async fn verify_email(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<TokenRequest>,
) -> ServiceResult<Json<MessageResponse>> {
    services.verify_email(&body.token).await?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

pub async fn resend_verification(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<EmailRequest>,
) -> ServiceResult<Json<MessageResponse>> {
    services.resend_verification(&body.email).await?;
    Ok(Json(MessageResponse::new("Verification email sent successfully")))
}

pub async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<EmailRequest>,
) -> ServiceResult<Json<MessageResponse>> {
    services.forgot_password(&body.email).await?;
    Ok(Json(MessageResponse::new("Password reset email sent successfully")))
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<PasswordReset>,
) -> ServiceResult<Json<MessageResponse>> {
    services.reset_password(body).await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(body): ApiJson<PasswordChange>,
) -> ServiceResult<Json<MessageResponse>> {
    authz::require_active(&current)?;
    services.change_password(&current.user, body).await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

pub async fn me(Extension(current): Extension<CurrentUser>) -> ServiceResult<Json<MeResponse>> {
    authz::require_active(&current)?;
    Ok(Json(MeResponse::new(&current.user, &current.principal)))
}
