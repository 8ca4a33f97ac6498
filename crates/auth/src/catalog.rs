//! Default RBAC catalog installed on first start.

use crate::permissions::{
    PROFILE_UPDATE_OWN, PROFILE_VIEW_ANY, PROFILE_VIEW_OWN, Permission, ROLE_ASSIGN, ROLE_READ,
    USER_CREATE, USER_LIST, USER_READ, USER_UPDATE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSpec {
    pub name: &'static str,
    pub codename: &'static str,
    pub description: &'static str,
    pub resource: &'static str,
    pub action: &'static str,
}

/// Which permissions a default role receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolePermissions {
    /// Every permission in [`DEFAULT_PERMISSIONS`].
    All,
    Only(Vec<Permission>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub is_default: bool,
    pub priority: i32,
    pub permissions: RolePermissions,
}

impl RoleSpec {
    /// Codenames this role should hold.
    pub fn codenames(&self) -> Vec<&str> {
        match &self.permissions {
            RolePermissions::All => DEFAULT_PERMISSIONS.iter().map(|p| p.codename).collect(),
            RolePermissions::Only(perms) => perms.iter().map(Permission::as_str).collect(),
        }
    }
}

const fn perm(
    name: &'static str,
    codename: &'static str,
    description: &'static str,
    resource: &'static str,
    action: &'static str,
) -> PermissionSpec {
    PermissionSpec {
        name,
        codename,
        description,
        resource,
        action,
    }
}

pub const DEFAULT_PERMISSIONS: &[PermissionSpec] = &[
    perm("Create User", "user.create", "Permission to create new users", "user", "create"),
    perm("Read User", "user.read", "Permission to read user information", "user", "read"),
    perm("Update User", "user.update", "Permission to update user information", "user", "update"),
    perm("Delete User", "user.delete", "Permission to delete users", "user", "delete"),
    perm("List Users", "user.list", "Permission to list all users", "user", "list"),
    perm("Create Role", "role.create", "Permission to create new roles", "role", "create"),
    perm("Read Role", "role.read", "Permission to read role information", "role", "read"),
    perm("Update Role", "role.update", "Permission to update role information", "role", "update"),
    perm("Delete Role", "role.delete", "Permission to delete roles", "role", "delete"),
    perm("Assign Role", "role.assign", "Permission to assign roles to users", "role", "assign"),
    perm("Create Permission", "permission.create", "Permission to create new permissions", "permission", "create"),
    perm("Read Permission", "permission.read", "Permission to read permission information", "permission", "read"),
    perm("Update Permission", "permission.update", "Permission to update permission information", "permission", "update"),
    perm("Delete Permission", "permission.delete", "Permission to delete permissions", "permission", "delete"),
    perm("View Own Profile", "profile.view_own", "Permission to view own profile", "profile", "view_own"),
    perm("Update Own Profile", "profile.update_own", "Permission to update own profile", "profile", "update_own"),
    perm("View Any Profile", "profile.view_any", "Permission to view any user's profile", "profile", "view_any"),
    perm("View System Stats", "system.stats", "Permission to view system statistics", "system", "stats"),
    perm("System Admin", "system.admin", "Full system administration access", "system", "admin"),
    perm("Order Service Read", "order_service.read", "Permission to read from order service", "order_service", "read"),
    perm("Order Service Write", "order_service.write", "Permission to write to order service", "order_service", "write"),
    perm("Payment Service Read", "payment_service.read", "Permission to read from payment service", "payment_service", "read"),
    perm("Payment Service Write", "payment_service.write", "Permission to write to payment service", "payment_service", "write"),
];

/// Default roles, highest priority first.
pub fn default_roles() -> Vec<RoleSpec> {
    vec![
        RoleSpec {
            name: "admin",
            description: "Super administrator with full system access",
            is_default: false,
            priority: 100,
            permissions: RolePermissions::All,
        },
        RoleSpec {
            name: "user_manager",
            description: "Can manage users but not system settings",
            is_default: false,
            priority: 80,
            permissions: RolePermissions::Only(vec![
                USER_CREATE,
                USER_READ,
                USER_UPDATE,
                USER_LIST,
                PROFILE_VIEW_ANY,
                ROLE_READ,
                ROLE_ASSIGN,
            ]),
        },
        RoleSpec {
            name: "moderator",
            description: "Content moderator with limited user management",
            is_default: false,
            priority: 60,
            permissions: RolePermissions::Only(vec![
                USER_READ,
                USER_UPDATE,
                USER_LIST,
                PROFILE_VIEW_ANY,
                ROLE_READ,
            ]),
        },
        RoleSpec {
            name: "user",
            description: "Regular user with basic permissions",
            is_default: true,
            priority: 10,
            permissions: RolePermissions::Only(vec![PROFILE_VIEW_OWN, PROFILE_UPDATE_OWN]),
        },
        RoleSpec {
            name: "guest",
            description: "Guest user with minimal permissions",
            is_default: false,
            priority: 1,
            permissions: RolePermissions::Only(vec![PROFILE_VIEW_OWN]),
        },
    ]
}
