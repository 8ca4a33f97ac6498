//! Outbound account email.
//!
//! [`Mailer`] renders the HTML templates and hands the result to an
//! [`EmailSender`]. Senders: [`SmtpEmailSender`] in production,
//! [`LogEmailSender`] when SMTP is not configured, [`RecordingEmailSender`] in tests.

use std::sync::Arc;

use minijinja::{Value, context};
use thiserror::Error;
use tracing::{info, warn};

mod log;
mod smtp;
mod templates;

pub use log::{LogEmailSender, RecordingEmailSender};
pub use smtp::{SmtpEmailSender, SmtpSettings};
pub use templates::EmailTemplates;

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email template error: {0}")]
    Template(String),

    #[error("invalid email address: {0}")]
    Address(String),

    #[error("failed to build email: {0}")]
    Build(String),

    #[error("failed to send email: {0}")]
    Transport(String),
}

impl From<minijinja::Error> for EmailError {
    fn from(err: minijinja::Error) -> Self {
        EmailError::Template(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError>;
}

#[async_trait::async_trait]
impl<S> EmailSender for Arc<S>
where
    S: EmailSender + ?Sized,
{
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        (**self).send(message).await
    }
}

/// Values every template can reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerSettings {
    pub app_name: String,
    pub frontend_url: String,
    /// Shown as the contact address in security notices.
    pub support_email: String,
}

pub struct Mailer {
    sender: Arc<dyn EmailSender>,
    templates: EmailTemplates,
    settings: MailerSettings,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Mailer {
    pub fn new(sender: Arc<dyn EmailSender>, mut settings: MailerSettings) -> Self {
        settings.frontend_url = settings.frontend_url.trim_end_matches('/').to_string();
        Self {
            sender,
            templates: EmailTemplates::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &MailerSettings {
        &self.settings
    }

    /// Absolute frontend link. Marked safe so the autoescaper leaves `/` intact.
    fn link(&self, path: &str) -> Value {
        Value::from_safe_string(format!("{}{}", self.settings.frontend_url, path))
    }

    fn frontend_url(&self) -> Value {
        Value::from_safe_string(self.settings.frontend_url.clone())
    }

    async fn deliver(
        &self,
        to: &str,
        name: &str,
        subject: String,
        template: &str,
        ctx: Value,
    ) -> Result<(), EmailError> {
        let html = self.templates.render(template, ctx)?;
        let message = EmailMessage {
            to: to.to_string(),
            to_name: name.to_string(),
            subject,
            html,
        };
        match self.sender.send(message).await {
            Ok(()) => {
                info!(template, recipient = to, "email sent");
                Ok(())
            }
            Err(err) => {
                warn!(template, recipient = to, error = %err, "email delivery failed");
                Err(err)
            }
        }
    }

    pub async fn send_verification(&self, to: &str, name: &str, token: &str) -> Result<(), EmailError> {
        let url = self.link(&format!("/verify-email?token={token}"));
        let ctx = context! {
            name => name,
            app_name => &self.settings.app_name,
            frontend_url => self.frontend_url(),
            verification_url => url,
        };
        self.deliver(to, name, "Verify Your Email Address".to_string(), "verification.html", ctx)
            .await
    }

    pub async fn send_password_reset(&self, to: &str, name: &str, token: &str) -> Result<(), EmailError> {
        let url = self.link(&format!("/reset-password?token={token}"));
        let ctx = context! {
            name => name,
            app_name => &self.settings.app_name,
            frontend_url => self.frontend_url(),
            reset_url => url,
        };
        self.deliver(to, name, "Reset Your Password".to_string(), "password_reset.html", ctx)
            .await
    }

    pub async fn send_welcome(&self, to: &str, name: &str) -> Result<(), EmailError> {
        let ctx = context! {
            name => name,
            app_name => &self.settings.app_name,
            frontend_url => self.frontend_url(),
            login_url => self.link("/login"),
        };
        let subject = format!("Welcome to {}!", self.settings.app_name);
        self.deliver(to, name, subject, "welcome.html", ctx).await
    }

    pub async fn send_password_changed(&self, to: &str, name: &str) -> Result<(), EmailError> {
        let ctx = context! {
            name => name,
            app_name => &self.settings.app_name,
            frontend_url => self.frontend_url(),
            support_email => &self.settings.support_email,
        };
        self.deliver(to, name, "Password Changed Successfully".to_string(), "password_changed.html", ctx)
            .await
    }

    pub async fn send_account_locked(&self, to: &str, name: &str) -> Result<(), EmailError> {
        let ctx = context! {
            name => name,
            app_name => &self.settings.app_name,
            frontend_url => self.frontend_url(),
            support_email => &self.settings.support_email,
        };
        self.deliver(to, name, "Account Security Alert".to_string(), "account_locked.html", ctx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSender;

    #[async_trait::async_trait]
    impl EmailSender for FailingSender {
        async fn send(&self, _message: EmailMessage) -> Result<(), EmailError> {
            Err(EmailError::Transport("connection refused".into()))
        }
    }

    fn settings() -> MailerSettings {
        MailerSettings {
            app_name: "AuthKit".into(),
            frontend_url: "http://localhost:3000/".into(),
            support_email: "support@example.com".into(),
        }
    }

    #[tokio::test]
    async fn verification_email_links_to_frontend() {
        let outbox = Arc::new(RecordingEmailSender::new());
        let mailer = Mailer::new(outbox.clone(), settings());
        mailer
            .send_verification("ann@example.com", "Ann", "tok.en-1")
            .await
            .unwrap();

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ann@example.com");
        assert_eq!(sent[0].subject, "Verify Your Email Address");
        assert!(sent[0].html.contains("http://localhost:3000/verify-email?token=tok.en-1"));
        assert!(sent[0].html.contains("Ann"));
    }

    #[tokio::test]
    async fn names_are_escaped() {
        let outbox = Arc::new(RecordingEmailSender::new());
        let mailer = Mailer::new(outbox.clone(), settings());
        mailer.send_welcome("x@example.com", "<script>").await.unwrap();

        let html = &outbox.sent()[0].html;
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("http://localhost:3000/login"));
    }

    #[tokio::test]
    async fn every_template_renders() {
        let outbox = Arc::new(RecordingEmailSender::new());
        let mailer = Mailer::new(outbox.clone(), settings());
        mailer.send_password_reset("a@example.com", "A", "t").await.unwrap();
        mailer.send_password_changed("a@example.com", "A").await.unwrap();
        mailer.send_account_locked("a@example.com", "A").await.unwrap();

        let subjects: Vec<String> = outbox.sent().into_iter().map(|m| m.subject).collect();
        assert_eq!(
            subjects,
            vec!["Reset Your Password", "Password Changed Successfully", "Account Security Alert"]
        );
    }

    #[tokio::test]
    async fn transport_failures_surface() {
        let mailer = Mailer::new(Arc::new(FailingSender), settings());
        let err = mailer.send_welcome("a@example.com", "A").await.unwrap_err();
        assert!(matches!(err, EmailError::Transport(_)));
    }
}
