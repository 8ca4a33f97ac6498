use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use authkit_core::{DomainError, DomainResult, Entity, PermissionId, RoleId, validate};

use crate::contains_ci;

/// A grantable capability, identified by its codename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub codename: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A named bundle of permissions with a priority for hierarchy checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    /// System roles are immutable through the API.
    pub is_system: bool,
    pub is_active: bool,
    pub priority: i32,
    pub permission_ids: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn ensure_modifiable(&self) -> DomainResult<()> {
        if self.is_system {
            return Err(DomainError::invariant("Cannot modify system roles"));
        }
        Ok(())
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.is_system {
            return Err(DomainError::invariant("Cannot delete system roles"));
        }
        Ok(())
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn yes() -> bool {
    true
}

fn check_priority(priority: i32) -> DomainResult<()> {
    if !(0..=100).contains(&priority) {
        return Err(DomainError::validation("priority: must be between 0 and 100"));
    }
    Ok(())
}

/// Command: create a permission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub codename: String,
    #[serde(default)]
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    #[serde(default = "yes")]
    pub is_active: bool,
}

impl NewPermission {
    pub fn validated(self) -> DomainResult<Self> {
        validate::bounded("name", &self.name, 1, 100)?;
        validate::codename(&self.codename)?;
        validate::max_len("description", self.description.as_deref(), 500)?;
        validate::identifier("resource", &self.resource)?;
        validate::identifier("action", &self.action)?;
        Ok(self)
    }

    pub fn into_permission(self, now: DateTime<Utc>) -> Permission {
        Permission {
            id: PermissionId::new(),
            name: self.name,
            codename: self.codename,
            description: self.description,
            resource: self.resource,
            action: self.action,
            is_active: self.is_active,
            created_at: now,
            updated_at: None,
        }
    }
}

/// Command: edit a permission. Codename, resource and action are fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PermissionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl PermissionUpdate {
    pub fn validated(self) -> DomainResult<Self> {
        if let Some(name) = &self.name {
            validate::bounded("name", name, 1, 100)?;
        }
        validate::max_len("description", self.description.as_deref(), 500)?;
        Ok(self)
    }

    pub fn apply(self, permission: &mut Permission, now: DateTime<Utc>) {
        if let Some(v) = self.name {
            permission.name = v;
        }
        if let Some(v) = self.description {
            permission.description = Some(v);
        }
        if let Some(v) = self.is_active {
            permission.is_active = v;
        }
        permission.updated_at = Some(now);
    }
}

/// Command: create a role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

impl NewRole {
    pub fn validated(self) -> DomainResult<Self> {
        validate::role_name(&self.name)?;
        validate::max_len("description", self.description.as_deref(), 500)?;
        check_priority(self.priority)?;
        Ok(self)
    }

    /// Build the stored role; `permission_ids` must already be filtered to known ids.
    pub fn into_role(self, permission_ids: Vec<PermissionId>, now: DateTime<Utc>) -> Role {
        Role {
            id: RoleId::new(),
            name: self.name,
            description: self.description,
            is_default: self.is_default,
            is_system: false,
            is_active: self.is_active,
            priority: self.priority,
            permission_ids,
            created_at: now,
            updated_at: None,
        }
    }
}

/// Command: edit a role. `permission_ids`, when present, replaces the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl RoleUpdate {
    pub fn validated(self) -> DomainResult<Self> {
        if let Some(name) = &self.name {
            validate::role_name(name)?;
        }
        validate::max_len("description", self.description.as_deref(), 500)?;
        if let Some(priority) = self.priority {
            check_priority(priority)?;
        }
        Ok(self)
    }

    pub fn name_change<'a>(&'a self, role: &Role) -> Option<&'a str> {
        self.name.as_deref().filter(|n| *n != role.name)
    }

    pub fn apply(self, role: &mut Role, now: DateTime<Utc>) {
        if let Some(v) = self.name {
            role.name = v;
        }
        if let Some(v) = self.description {
            role.description = Some(v);
        }
        if let Some(v) = self.is_default {
            role.is_default = v;
        }
        if let Some(v) = self.is_active {
            role.is_active = v;
        }
        if let Some(v) = self.priority {
            role.priority = v;
        }
        if let Some(v) = self.permission_ids {
            role.permission_ids = v;
        }
        role.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
    pub is_system: Option<bool>,
}

impl RoleFilter {
    pub fn matches(&self, role: &Role) -> bool {
        if let Some(term) = self.search.as_deref().filter(|s| !s.is_empty()) {
            if !(contains_ci(Some(&role.name), term) || contains_ci(role.description.as_deref(), term)) {
                return false;
            }
        }
        self.is_active.is_none_or(|v| role.is_active == v)
            && self.is_default.is_none_or(|v| role.is_default == v)
            && self.is_system.is_none_or(|v| role.is_system == v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PermissionFilter {
    pub search: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub is_active: Option<bool>,
}

impl PermissionFilter {
    pub fn matches(&self, permission: &Permission) -> bool {
        if let Some(term) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let hit = contains_ci(Some(&permission.name), term)
                || contains_ci(Some(&permission.codename), term)
                || contains_ci(permission.description.as_deref(), term);
            if !hit {
                return false;
            }
        }
        self.resource.as_deref().is_none_or(|r| permission.resource == r)
            && self.action.as_deref().is_none_or(|a| permission.action == a)
            && self.is_active.is_none_or(|v| permission.is_active == v)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleStats {
    pub total_roles: u64,
    pub active_roles: u64,
    pub system_roles: u64,
    pub total_permissions: u64,
    pub active_permissions: u64,
}

/// How a bulk assignment combines with a user's current roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    Add,
    Remove,
    Replace,
}

impl BulkOperation {
    /// Resulting role set, preserving the order of `current` where roles survive.
    pub fn combine(self, current: &[RoleId], requested: &[RoleId]) -> Vec<RoleId> {
        match self {
            BulkOperation::Add => {
                let mut out = current.to_vec();
                for id in requested {
                    if !out.contains(id) {
                        out.push(*id);
                    }
                }
                out
            }
            BulkOperation::Remove => current
                .iter()
                .copied()
                .filter(|id| !requested.contains(id))
                .collect(),
            BulkOperation::Replace => {
                let mut out = Vec::with_capacity(requested.len());
                for id in requested {
                    if !out.contains(id) {
                        out.push(*id);
                    }
                }
                out
            }
        }
    }
}
