//! Persistence boundary for accounts and RBAC data.
//!
//! Two implementations share one contract: [`InMemoryStore`] for dev/test and
//! [`PostgresStore`] for production. Services only see `dyn Store`.

use std::collections::HashMap;

use thiserror::Error;

use chrono::{DateTime, Utc};

use authkit_accounts::{
    AdminUserUpdate, Permission, PermissionFilter, Role, RoleFilter, RoleStats, User, UserFilter,
    UserStats,
};
use authkit_auth::RoleGrant;
use authkit_core::{PageRequest, PermissionId, RoleId, UserId};

#[cfg(test)]
mod contract;
mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

pub const EMAIL_TAKEN: &str = "User with this email already exists";
pub const USERNAME_TAKEN: &str = "User with this username already exists";
pub const CODENAME_TAKEN: &str = "Permission with this codename already exists";
pub const ROLE_NAME_TAKEN: &str = "Role with this name already exists";
pub const ALREADY_EXISTS: &str = "Resource already exists";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint would be violated. Carries one of the fixed
    /// messages above, never backend text.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Exact match on the normalised (lowercase) email.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Insert a new user together with its `role_ids`.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    /// Write the `Some` fields of `changes` and stamp `updated_at`. Other
    /// columns are left as they are. Returns the updated user, or `None` when
    /// no such user exists.
    async fn update_user(
        &self,
        id: UserId,
        changes: &AdminUserUpdate,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    /// Stamp `last_login` on an active user. Returns `false` when the user is
    /// missing or was deactivated in the meantime.
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Store a fresh verification token on an unverified user.
    async fn set_verification_token(
        &self,
        id: UserId,
        token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Flag the user verified and drop its verification token. Returns `false`
    /// when it was already verified (or is missing).
    async fn mark_verified(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Replace the pending password reset token.
    async fn set_password_reset(
        &self,
        id: UserId,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Set `hashed_password` if `token` is still the user's unexpired reset
    /// token, clearing it in the same write. Returns `false` otherwise.
    async fn consume_password_reset(
        &self,
        id: UserId,
        token: &str,
        hashed_password: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn set_password(
        &self,
        id: UserId,
        hashed_password: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Returns `false` when no such user existed.
    async fn delete_user(&self, id: UserId) -> StoreResult<bool>;

    /// Filtered window ordered by `created_at` descending, plus the filtered total.
    async fn list_users(&self, filter: &UserFilter, page: PageRequest)
    -> StoreResult<(Vec<User>, u64)>;

    async fn user_stats(&self) -> StoreResult<UserStats>;

    /// Replace a user's role set. Unknown role ids must already be filtered out.
    async fn set_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<()>;

    /// The user's roles resolved for authorization, highest priority first.
    async fn role_grants(&self, id: UserId) -> StoreResult<Vec<RoleGrant>>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<Permission>>;

    async fn find_permission_by_codename(&self, codename: &str) -> StoreResult<Option<Permission>>;

    async fn insert_permission(&self, permission: &Permission) -> StoreResult<()>;

    async fn update_permission(&self, permission: &Permission) -> StoreResult<()>;

    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool>;

    /// Filtered window ordered by `(resource, action)`, plus the filtered total.
    async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Permission>, u64)>;

    /// The subset of `ids` that exist, ordered by `(resource, action)`.
    async fn get_permissions(&self, ids: &[PermissionId]) -> StoreResult<Vec<Permission>>;

    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>>;

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    /// Insert a role together with its `permission_ids`.
    async fn insert_role(&self, role: &Role) -> StoreResult<()>;

    /// Overwrite a role, including its permission set.
    async fn update_role(&self, role: &Role) -> StoreResult<()>;

    async fn delete_role(&self, id: RoleId) -> StoreResult<bool>;

    /// Filtered window ordered by `(priority desc, name)`, plus the filtered total.
    async fn list_roles(&self, filter: &RoleFilter, page: PageRequest)
    -> StoreResult<(Vec<Role>, u64)>;

    /// The subset of `ids` that exist.
    async fn existing_role_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<RoleId>>;

    /// Number of users holding each role; roles without users are absent.
    async fn role_user_counts(&self, ids: &[RoleId]) -> StoreResult<HashMap<RoleId, u64>>;

    /// The role given to new accounts: active, flagged default, highest priority.
    async fn default_role(&self) -> StoreResult<Option<Role>>;

    async fn role_stats(&self) -> StoreResult<RoleStats>;
}

/// Full storage contract used by the API services.
#[async_trait::async_trait]
pub trait Store: UserStore + RoleStore {
    /// Cheap liveness check against the backing database.
    async fn ping(&self) -> StoreResult<()>;
}
