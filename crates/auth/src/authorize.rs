//! RBAC evaluation over a resolved [`Principal`].
//!
//! - No IO
//! - No panics
//! - Superusers pass every check

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use authkit_core::UserId;

use crate::{Permission, RoleGrant};

/// A user resolved with its roles for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub is_superuser: bool,
    pub roles: Vec<RoleGrant>,
}

impl Principal {
    pub fn new(user_id: UserId, is_superuser: bool, roles: Vec<RoleGrant>) -> Self {
        Self {
            user_id,
            is_superuser,
            roles,
        }
    }

    fn active_roles(&self) -> impl Iterator<Item = &RoleGrant> {
        self.roles.iter().filter(|r| r.is_active)
    }

    /// Codenames granted by active roles, sorted and deduplicated.
    pub fn effective_permissions(&self) -> Vec<String> {
        self.active_roles()
            .flat_map(|r| r.permissions.iter().map(|p| p.as_str().to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Names of active roles, in assignment order.
    pub fn role_names(&self) -> Vec<String> {
        self.active_roles().map(|r| r.name.clone()).collect()
    }

    /// Whether any active role grants `codename`. Does not consider the superuser flag.
    pub fn has_permission(&self, codename: &str) -> bool {
        self.active_roles().any(|r| r.grants(codename))
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.active_roles().any(|r| r.name == name)
    }

    /// Active role with the highest priority; ties go to the first name alphabetically.
    pub fn highest_priority_role(&self) -> Option<&RoleGrant> {
        self.active_roles().max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.name.cmp(&a.name))
        })
    }

    /// Priority used for hierarchy checks; a principal without roles ranks 0.
    pub fn rank(&self) -> i32 {
        self.highest_priority_role().map_or(0, |r| r.priority)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Missing required permissions: {}", .0.join(", "))]
    MissingPermissions(Vec<String>),

    #[error("Missing required permissions. Need at least one of: {}", .0.join(", "))]
    NoneOfPermissions(Vec<String>),

    #[error("Missing required roles: {}", .0.join(", "))]
    MissingRoles(Vec<String>),

    #[error("Missing required roles. Need at least one of: {}", .0.join(", "))]
    NoneOfRoles(Vec<String>),

    #[error("Insufficient role priority to manage this user")]
    InsufficientPriority,
}

/// Every permission in `required` must be held; all missing ones are reported.
pub fn require_all(principal: &Principal, required: &[Permission]) -> Result<(), AuthzError> {
    if principal.is_superuser {
        return Ok(());
    }
    let missing: Vec<String> = required
        .iter()
        .filter(|p| !principal.has_permission(p.as_str()))
        .map(|p| p.as_str().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthzError::MissingPermissions(missing))
    }
}

/// At least one permission in `required` must be held.
pub fn require_any(principal: &Principal, required: &[Permission]) -> Result<(), AuthzError> {
    if principal.is_superuser || required.iter().any(|p| principal.has_permission(p.as_str())) {
        return Ok(());
    }
    Err(AuthzError::NoneOfPermissions(
        required.iter().map(|p| p.as_str().to_string()).collect(),
    ))
}

pub fn require_roles(principal: &Principal, required: &[&str]) -> Result<(), AuthzError> {
    if principal.is_superuser {
        return Ok(());
    }
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !principal.has_role(name))
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthzError::MissingRoles(missing))
    }
}

pub fn require_any_role(principal: &Principal, required: &[&str]) -> Result<(), AuthzError> {
    if principal.is_superuser || required.iter().any(|name| principal.has_role(name)) {
        return Ok(());
    }
    Err(AuthzError::NoneOfRoles(
        required.iter().map(|name| name.to_string()).collect(),
    ))
}

/// Check `resource.action` for a principal.
pub fn resource_permission(
    principal: &Principal,
    resource: &str,
    action: &str,
) -> Result<(), AuthzError> {
    require_all(principal, &[Permission::from_parts(resource, action)])
}

/// Role-hierarchy rule: an actor may only manage users ranked strictly below it.
pub fn can_manage(actor: &Principal, target: &Principal) -> Result<(), AuthzError> {
    if actor.is_superuser || actor.rank() > target.rank() {
        Ok(())
    } else {
        Err(AuthzError::InsufficientPriority)
    }
}

/// Outcome of an explicit permission lookup, with the roles that grant it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionCheck {
    pub has_permission: bool,
    pub granted_by_roles: Vec<String>,
}

/// Answer "does this user hold `codename`, and through which roles?".
///
/// This inspects role grants only, so a superuser without roles reports `false`.
pub fn check_permission(principal: &Principal, codename: &str) -> PermissionCheck {
    let granted_by_roles: Vec<String> = principal
        .active_roles()
        .filter(|r| r.grants(codename))
        .map(|r| r.name.clone())
        .collect();
    PermissionCheck {
        has_permission: !granted_by_roles.is_empty(),
        granted_by_roles,
    }
}
