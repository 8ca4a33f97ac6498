//! Runtime configuration from environment variables.
//!
//! Names are matched case-insensitively. Every key has a default except the
//! optional ones (database, SMTP credentials, bootstrap superuser). Values that
//! fail to parse are reported as [`ConfigError`] and abort startup.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

use authkit_auth::TokenSettings;
use authkit_infra::{MailerSettings, SmtpSettings};

pub const DEV_SECRET_KEY: &str = "dev-secret-key-change-me";

// Upper bounds on token lifetimes, each one year.
const MAX_ACCESS_MINUTES: i64 = 525_600;
const MAX_REFRESH_DAYS: i64 = 365;
const MAX_TOKEN_HOURS: i64 = 8_760;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub from_name: String,
    pub server: String,
    pub port: u16,
    pub starttls: bool,
    pub ssl_tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,
    pub api_prefix: String,
    pub frontend_url: String,
    pub bind_addr: SocketAddr,

    pub database_url: Option<String>,
    pub database_max_connections: u32,

    /// `None` means the insecure development key is in use.
    pub secret_key: Option<String>,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub password_reset_expire_hours: i64,
    pub verification_token_expire_hours: i64,

    pub mail: MailConfig,

    pub seed_rbac: bool,
    pub superuser_email: Option<String>,
    pub superuser_password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "AuthKit User Management".to_string(),
            app_version: "1.0.0".to_string(),
            debug: false,
            api_prefix: "/api/v1".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            database_url: None,
            database_max_connections: 10,
            secret_key: None,
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
            password_reset_expire_hours: 24,
            verification_token_expire_hours: 24,
            mail: MailConfig {
                username: None,
                password: None,
                from: None,
                from_name: "Neubit-AuthKit".to_string(),
                server: "smtp.gmail.com".to_string(),
                port: 587,
                starttls: true,
                ssl_tls: false,
            },
            seed_rbac: true,
            superuser_email: None,
            superuser_password: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Read settings through `lookup`, which receives upper-case key names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let mut s = Settings::default();

        s.app_name = env.string("APP_NAME").unwrap_or(s.app_name);
        s.app_version = env.string("APP_VERSION").unwrap_or(s.app_version);
        s.debug = env.flag("DEBUG")?.unwrap_or(s.debug);
        s.api_prefix = normalize_prefix(&env.string("API_PREFIX").unwrap_or(s.api_prefix));
        s.frontend_url = env
            .string("FRONTEND_URL")
            .unwrap_or(s.frontend_url)
            .trim_end_matches('/')
            .to_string();
        s.bind_addr = env.parse("BIND_ADDR")?.unwrap_or(s.bind_addr);

        s.database_url = env.string("DATABASE_URL");
        s.database_max_connections = env
            .parse("DATABASE_MAX_CONNECTIONS")?
            .unwrap_or(s.database_max_connections);

        s.secret_key = env.string("SECRET_KEY");
        s.access_token_expire_minutes = env
            .lifetime("ACCESS_TOKEN_EXPIRE_MINUTES", MAX_ACCESS_MINUTES)?
            .unwrap_or(s.access_token_expire_minutes);
        s.refresh_token_expire_days = env
            .lifetime("REFRESH_TOKEN_EXPIRE_DAYS", MAX_REFRESH_DAYS)?
            .unwrap_or(s.refresh_token_expire_days);
        s.password_reset_expire_hours = env
            .lifetime("PASSWORD_RESET_EXPIRE_HOURS", MAX_TOKEN_HOURS)?
            .unwrap_or(s.password_reset_expire_hours);
        s.verification_token_expire_hours = env
            .lifetime("VERIFICATION_TOKEN_EXPIRE_HOURS", MAX_TOKEN_HOURS)?
            .unwrap_or(s.verification_token_expire_hours);

        s.mail.username = env.string("MAIL_USERNAME");
        s.mail.password = env.string("MAIL_PASSWORD");
        s.mail.from = env.string("MAIL_FROM");
        s.mail.from_name = env.string("MAIL_FROM_NAME").unwrap_or(s.mail.from_name);
        s.mail.server = env.string("MAIL_SERVER").unwrap_or(s.mail.server);
        s.mail.port = env.parse("MAIL_PORT")?.unwrap_or(s.mail.port);
        s.mail.starttls = env.flag("MAIL_STARTTLS")?.unwrap_or(s.mail.starttls);
        s.mail.ssl_tls = env.flag("MAIL_SSL_TLS")?.unwrap_or(s.mail.ssl_tls);

        s.seed_rbac = env.flag("SEED_RBAC")?.unwrap_or(s.seed_rbac);
        s.superuser_email = env.string("SUPERUSER_EMAIL");
        s.superuser_password = env.string("SUPERUSER_PASSWORD");

        Ok(s)
    }

    pub fn secret_key(&self) -> &str {
        self.secret_key.as_deref().unwrap_or(DEV_SECRET_KEY)
    }

    pub fn token_settings(&self) -> TokenSettings {
        // Values that skipped `from_lookup` saturate here and are rejected when a
        // token is issued.
        let span = |d: Option<Duration>| d.unwrap_or(Duration::MAX);
        TokenSettings {
            access_ttl: span(Duration::try_minutes(self.access_token_expire_minutes)),
            refresh_ttl: span(Duration::try_days(self.refresh_token_expire_days)),
            verification_ttl: span(Duration::try_hours(self.verification_token_expire_hours)),
            password_reset_ttl: span(Duration::try_hours(self.password_reset_expire_hours)),
        }
    }

    pub fn mailer_settings(&self) -> MailerSettings {
        MailerSettings {
            app_name: self.app_name.clone(),
            frontend_url: self.frontend_url.clone(),
            support_email: self.sender_address().unwrap_or_default(),
        }
    }

    fn sender_address(&self) -> Option<String> {
        self.mail.from.clone().or_else(|| self.mail.username.clone())
    }

    /// SMTP settings, or `None` when no credentials are configured.
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        let username = self.mail.username.clone()?;
        let password = self.mail.password.clone()?;
        Some(SmtpSettings {
            host: self.mail.server.clone(),
            port: self.mail.port,
            from_address: self.sender_address().unwrap_or_else(|| username.clone()),
            from_name: self.mail.from_name.clone(),
            username: Some(username),
            password: Some(password),
            starttls: self.mail.starttls,
            implicit_tls: self.mail.ssl_tls,
        })
    }

    pub fn bootstrap_superuser(&self) -> Option<(&str, &str)> {
        match (&self.superuser_email, &self.superuser_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}

/// `"api/v1/"` -> `"/api/v1"`; an empty or `/` prefix becomes `""`.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    /// A token lifetime in `1..=max` units.
    fn lifetime(&self, key: &'static str, max: i64) -> Result<Option<i64>, ConfigError> {
        match self.parse::<i64>(key)? {
            Some(v) if !(1..=max).contains(&v) => Err(ConfigError::Invalid {
                key,
                value: v.to_string(),
                reason: format!("must be between 1 and {max}"),
            }),
            other => Ok(other),
        }
    }

    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        let Some(value) = self.string(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.secret_key(), DEV_SECRET_KEY);
        assert!(s.smtp_settings().is_none());
        assert_eq!(s.token_settings().access_ttl, Duration::minutes(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("DEBUG", "True"),
            ("API_PREFIX", "api/v2/"),
            ("FRONTEND_URL", "https://app.example.com/"),
            ("ACCESS_TOKEN_EXPIRE_MINUTES", "5"),
            ("MAIL_PORT", "465"),
            ("MAIL_SSL_TLS", "1"),
            ("MAIL_USERNAME", "mailer@example.com"),
            ("MAIL_PASSWORD", "pw"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();
        assert!(s.debug);
        assert_eq!(s.api_prefix, "/api/v2");
        assert_eq!(s.frontend_url, "https://app.example.com");
        assert_eq!(s.access_token_expire_minutes, 5);
        assert_eq!(s.bind_addr.port(), 9000);

        let smtp = s.smtp_settings().unwrap();
        assert_eq!(smtp.port, 465);
        assert!(smtp.implicit_tls);
        assert_eq!(smtp.from_address, "mailer@example.com");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            settings(&[("MAIL_PORT", "lots")]),
            Err(ConfigError::Invalid { key: "MAIL_PORT", .. })
        ));
        assert!(matches!(
            settings(&[("DEBUG", "maybe")]),
            Err(ConfigError::Invalid { key: "DEBUG", .. })
        ));
        assert!(matches!(
            settings(&[("REFRESH_TOKEN_EXPIRE_DAYS", "0")]),
            Err(ConfigError::Invalid { key: "REFRESH_TOKEN_EXPIRE_DAYS", .. })
        ));
    }

    #[test]
    fn token_lifetimes_are_capped() {
        assert!(matches!(
            settings(&[("REFRESH_TOKEN_EXPIRE_DAYS", "100000000")]),
            Err(ConfigError::Invalid { key: "REFRESH_TOKEN_EXPIRE_DAYS", .. })
        ));
        assert!(matches!(
            settings(&[("ACCESS_TOKEN_EXPIRE_MINUTES", "9223372036854775807")]),
            Err(ConfigError::Invalid { key: "ACCESS_TOKEN_EXPIRE_MINUTES", .. })
        ));
        let s = settings(&[
            ("REFRESH_TOKEN_EXPIRE_DAYS", "365"),
            ("PASSWORD_RESET_EXPIRE_HOURS", "8760"),
        ])
        .unwrap();
        assert_eq!(s.token_settings().refresh_ttl, Duration::days(365));
    }

    #[test]
    fn root_prefix_collapses_to_empty() {
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/api/v1"), "/api/v1");
    }

    #[test]
    fn superuser_needs_both_values() {
        assert!(settings(&[("SUPERUSER_EMAIL", "root@example.com")])
            .unwrap()
            .bootstrap_superuser()
            .is_none());
        let s = settings(&[
            ("SUPERUSER_EMAIL", "root@example.com"),
            ("SUPERUSER_PASSWORD", "changeme123"),
        ])
        .unwrap();
        assert_eq!(s.bootstrap_superuser(), Some(("root@example.com", "changeme123")));
    }
}
