//! Request guards applied inside handlers after authentication.
//!
//! Superusers pass every permission guard.

use authkit_auth::{Permission, require_all};

use crate::app::errors::{ServiceError, ServiceResult};
use crate::context::CurrentUser;

pub fn require_active(current: &CurrentUser) -> ServiceResult<()> {
    if !current.user.is_active {
        return Err(ServiceError::BadRequest("Inactive user".into()));
    }
    Ok(())
}

pub fn require_superuser(current: &CurrentUser) -> ServiceResult<()> {
    require_active(current)?;
    if !current.user.is_superuser {
        return Err(ServiceError::Forbidden("Insufficient permissions".into()));
    }
    Ok(())
}

/// Every listed permission must be granted; all missing ones are reported.
pub fn require_permissions(current: &CurrentUser, required: &[Permission]) -> ServiceResult<()> {
    require_active(current)?;
    require_all(&current.principal, required)?;
    Ok(())
}
