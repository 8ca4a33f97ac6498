//! `authkit-auth`: pure authentication/authorization boundary.
//!
//! Password hashing, token codec and RBAC evaluation. This crate is decoupled
//! from HTTP and storage: callers resolve a [`Principal`] and ask questions of it.

pub mod authorize;
pub mod catalog;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod roles;

pub use authorize::{
    AuthzError, PermissionCheck, Principal, can_manage, check_permission, require_all, require_any,
    require_any_role, require_roles, resource_permission,
};
pub use claims::{Claims, TokenError, TokenKind, validate_claims};
pub use jwt::{Hs256Jwt, IssuedToken, JwtValidator, TokenSettings};
pub use password::{PasswordError, hash_password, verify_password};
pub use permissions::Permission;
pub use roles::RoleGrant;
