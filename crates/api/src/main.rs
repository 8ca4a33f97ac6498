use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use authkit_api::app::{build_app, services::build_services};
use authkit_api::config::Settings;
use authkit_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("loading configuration")?;
    authkit_observability::init(LogFormat::for_debug(settings.debug));

    if settings.secret_key.is_none() {
        warn!("SECRET_KEY not set; using insecure dev default");
    }

    let bind_addr = settings.bind_addr;
    let services = Arc::new(build_services(settings).await?);
    services.bootstrap().await?;

    let app = build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(
        addr = %listener.local_addr()?,
        app = %services.settings.app_name,
        version = %services.settings.app_version,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
