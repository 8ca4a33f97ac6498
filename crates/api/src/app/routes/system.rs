//! Root and health checks. Mounted outside the API prefix and never authenticated.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::error;

use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/db", get(health_db))
        .route("/health/ready", get(ready))
        .route("/health/live", get(live))
}

pub async fn root(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(json!({
        "message": format!("Welcome to {}", services.settings.app_name),
        "version": services.settings.app_version,
        "health_check": "/health",
    }))
}

async fn database_ok(services: &AppServices) -> bool {
    match services.store.ping().await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "database health check failed");
            false
        }
    }
}

/// GET /health - overall status with per-dependency checks; 503 when unhealthy.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let db_ok = database_ok(&services).await;
    let (status, label) = if db_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        status,
        Json(json!({
            "status": label,
            "timestamp": Utc::now(),
            "version": services.settings.app_version,
            "environment": services.environment(),
            "checks": {
                "database": if db_ok { "healthy" } else { "unhealthy" },
            },
        })),
    )
}

pub async fn health_db(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let db_ok = database_ok(&services).await;
    let status = if db_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "status": if db_ok { "healthy" } else { "unhealthy" },
            "timestamp": Utc::now(),
            "service": "database",
        })),
    )
}

pub async fn ready(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let db_ok = database_ok(&services).await;
    let status = if db_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "status": if db_ok { "ready" } else { "not ready" },
            "timestamp": Utc::now(),
        })),
    )
}

pub async fn live() -> impl IntoResponse {
    Json(json!({ "status": "alive", "timestamp": Utc::now() }))
}
