pub mod auth;
pub mod rbac;
pub mod roles;
pub mod system;
pub mod users;
