//! Account records (users, roles, permissions) and the validated commands that
//! create or change them.

pub mod role;
pub mod user;

pub use role::{
    BulkOperation, NewPermission, NewRole, Permission, PermissionFilter, PermissionUpdate, Role,
    RoleFilter, RoleStats, RoleUpdate,
};
pub use user::{
    AdminUserUpdate, NewUser, PasswordChange, PasswordReset, ProfileUpdate, Registration, User,
    UserFilter, UserStats,
};

/// Case-insensitive substring match used by list filters.
pub(crate) fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}
