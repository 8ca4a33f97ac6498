use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission codename (e.g. `"user.read"`).
///
/// Codenames are `resource.action`; the database record behind a codename
/// carries the display name, description and active flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(codename: impl Into<Cow<'static, str>>) -> Self {
        Self(codename.into())
    }

    pub const fn from_static(codename: &'static str) -> Self {
        Self(Cow::Borrowed(codename))
    }

    /// Build the codename for `action` on `resource`.
    pub fn from_parts(resource: &str, action: &str) -> Self {
        Self(Cow::Owned(format!("{resource}.{action}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self(Cow::Owned(value.to_string()))
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

pub const USER_CREATE: Permission = Permission::from_static("user.create");
pub const USER_READ: Permission = Permission::from_static("user.read");
pub const USER_UPDATE: Permission = Permission::from_static("user.update");
pub const USER_DELETE: Permission = Permission::from_static("user.delete");
pub const USER_LIST: Permission = Permission::from_static("user.list");

pub const ROLE_CREATE: Permission = Permission::from_static("role.create");
pub const ROLE_READ: Permission = Permission::from_static("role.read");
pub const ROLE_UPDATE: Permission = Permission::from_static("role.update");
pub const ROLE_DELETE: Permission = Permission::from_static("role.delete");
pub const ROLE_ASSIGN: Permission = Permission::from_static("role.assign");

pub const PERMISSION_CREATE: Permission = Permission::from_static("permission.create");
pub const PERMISSION_READ: Permission = Permission::from_static("permission.read");
pub const PERMISSION_UPDATE: Permission = Permission::from_static("permission.update");
pub const PERMISSION_DELETE: Permission = Permission::from_static("permission.delete");

pub const PROFILE_VIEW_OWN: Permission = Permission::from_static("profile.view_own");
pub const PROFILE_UPDATE_OWN: Permission = Permission::from_static("profile.update_own");
pub const PROFILE_VIEW_ANY: Permission = Permission::from_static("profile.view_any");

pub const SYSTEM_STATS: Permission = Permission::from_static("system.stats");
pub const SYSTEM_ADMIN: Permission = Permission::from_static("system.admin");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_joins_with_dot() {
        assert_eq!(Permission::from_parts("order_service", "read").as_str(), "order_service.read");
        assert_eq!(Permission::from_parts("user", "read"), USER_READ);
    }
}
