//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services/`: store, token codec and mailer plus every operation
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and extractors
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Settings;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Protected routes: require a valid access token.
    let protected = Router::new()
        .nest("/auth", routes::auth::protected_router())
        .nest("/users", routes::users::router())
        .nest("/roles", routes::roles::router())
        .nest("/rbac", routes::rbac::router())
        .route_layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .nest("/auth", routes::auth::public_router())
        .merge(protected);

    let prefix = services.settings.api_prefix.clone();
    let router = if prefix.is_empty() {
        routes::system::router().merge(api)
    } else {
        routes::system::router().nest(&prefix, api)
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&services.settings))
            .layer(Extension(services)),
    )
}

/// Any origin in debug mode, otherwise only the configured frontend.
fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.debug {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origin = match HeaderValue::from_str(&settings.frontend_url) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            warn!(frontend_url = %settings.frontend_url, "frontend url is not a valid origin; cross-origin requests disabled");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}
