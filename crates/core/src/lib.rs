//! `authkit-core`: identifiers, errors, paging and input validation shared by
//! every other crate. Nothing here touches IO.

pub mod entity;
pub mod error;
pub mod id;
pub mod page;
pub mod validate;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, RoleId, UserId};
pub use page::{Page, PageRequest};
