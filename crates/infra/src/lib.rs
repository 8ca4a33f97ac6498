//! Infrastructure layer: storage backends, outbound email and startup seeding.

pub mod mailer;
pub mod seed;
pub mod store;

pub use mailer::{
    EmailError, EmailMessage, EmailSender, LogEmailSender, Mailer, MailerSettings,
    RecordingEmailSender, SmtpEmailSender, SmtpSettings,
};
pub use seed::{SeedError, SeedReport, ensure_superuser, seed_rbac};
pub use store::{InMemoryStore, PostgresStore, RoleStore, Store, StoreError, StoreResult, UserStore};
