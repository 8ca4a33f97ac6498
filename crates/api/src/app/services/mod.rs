//! Service wiring: store, token codec, mailer and settings shared by handlers.
//!
//! Operations live in `impl AppServices` blocks split by area:
//! - `auth.rs`: registration, login, token and password flows
//! - `users.rs`: profile and user administration
//! - `roles.rs`: roles, permissions and assignments

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use authkit_accounts::User;
use authkit_auth::{Hs256Jwt, Principal};
use authkit_infra::{
    EmailSender, InMemoryStore, LogEmailSender, Mailer, PostgresStore, SmtpEmailSender, Store,
    ensure_superuser, seed_rbac,
};

use crate::app::errors::ServiceResult;
use crate::config::Settings;

mod auth;
mod roles;
mod users;

pub struct AppServices {
    pub store: Arc<dyn Store>,
    pub jwt: Hs256Jwt,
    pub mailer: Mailer,
    pub settings: Settings,
}

impl AppServices {
    pub fn new(settings: Settings, store: Arc<dyn Store>, sender: Arc<dyn EmailSender>) -> Self {
        let jwt = Hs256Jwt::new(settings.secret_key(), settings.token_settings());
        let mailer = Mailer::new(sender, settings.mailer_settings());
        Self {
            store,
            jwt,
            mailer,
            settings,
        }
    }

    /// Install the default RBAC catalog and the bootstrap superuser, when configured.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        if self.settings.seed_rbac {
            seed_rbac(self.store.as_ref(), now)
                .await
                .context("seeding rbac catalog")?;
        }
        if let Some((email, password)) = self.settings.bootstrap_superuser() {
            ensure_superuser(self.store.as_ref(), email, password, now)
                .await
                .context("creating bootstrap superuser")?;
        }
        Ok(())
    }

    /// Resolve a user's active roles and permissions.
    pub async fn principal(&self, user: &User) -> ServiceResult<Principal> {
        let grants = self.store.role_grants(user.id).await?;
        Ok(Principal::new(user.id, user.is_superuser, grants))
    }

    pub fn environment(&self) -> &'static str {
        if self.settings.debug { "development" } else { "production" }
    }
}

/// Pick the store and mail transport from configuration.
///
/// Without `DATABASE_URL` the process runs on an in-memory store; without SMTP
/// credentials emails are only logged.
pub async fn build_services(settings: Settings) -> anyhow::Result<AppServices> {
    let store: Arc<dyn Store> = match settings.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, settings.database_max_connections)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("applying schema")?;
            info!("postgres store ready");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            Arc::new(InMemoryStore::new())
        }
    };

    let sender: Arc<dyn EmailSender> = match settings.smtp_settings() {
        Some(smtp) => Arc::new(SmtpEmailSender::new(&smtp).context("configuring smtp transport")?),
        None => {
            warn!("mail credentials not set; emails will only be logged");
            Arc::new(LogEmailSender)
        }
    };

    Ok(AppServices::new(settings, store, sender))
}
