use serde::{Deserialize, Serialize};

use crate::Permission;

/// A role as seen by the authorization layer.
///
/// Only the permissions that are themselves active are recorded; see
/// [`RoleGrant::with_permission`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub name: String,
    pub priority: i32,
    pub is_active: bool,
    pub permissions: Vec<Permission>,
}

impl RoleGrant {
    pub fn new(name: impl Into<String>, priority: i32, is_active: bool) -> Self {
        Self {
            name: name.into(),
            priority,
            is_active,
            permissions: Vec::new(),
        }
    }

    /// Attach a permission; inactive permissions grant nothing and are dropped.
    pub fn with_permission(mut self, codename: impl Into<Permission>, is_active: bool) -> Self {
        if is_active {
            self.permissions.push(codename.into());
        }
        self
    }

    pub fn grants(&self, codename: &str) -> bool {
        self.is_active && self.permissions.iter().any(|p| p.as_str() == codename)
    }
}
