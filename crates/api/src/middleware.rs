use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::app::errors::ServiceError;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::CurrentUser;

/// Require a valid bearer access token for an active user.
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = extract_bearer(req.headers())?;
    let current = services.authenticate(token).await?;

    req.extensions_mut().insert(current);

    Ok(next.run(req).await)
}

/// Reject non-superusers before the handler parses path or body.
/// Layered under [`auth_middleware`], which provides the [`CurrentUser`].
pub async fn superuser_middleware(req: Request, next: Next) -> Result<Response, ServiceError> {
    let current = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(ServiceError::Credentials)?;
    authz::require_superuser(current)?;

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ServiceError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(ServiceError::Credentials)?;

    let header = header.to_str().map_err(|_| ServiceError::Credentials)?;

    let header = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or(ServiceError::Credentials)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(ServiceError::Credentials);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")).ok(), Some("abc.def"));
        assert_eq!(extract_bearer(&headers("bearer  abc ")).ok(), Some("abc"));
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(extract_bearer(&headers("Basic dXNlcjpwYXNz")).is_err());
        assert!(extract_bearer(&headers("Bearer ")).is_err());
        assert!(extract_bearer(&HeaderMap::new()).is_err());
    }
}
