//! Startup seeding: the default permission/role catalog and an optional
//! bootstrap superuser. Both steps are idempotent.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument};

use authkit_accounts::{NewPermission, NewRole, NewUser};
use authkit_auth::catalog::{DEFAULT_PERMISSIONS, default_roles};
use authkit_auth::{PasswordError, hash_password};
use authkit_core::DomainError;

use crate::store::{RoleStore, StoreError, UserStore};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("invalid bootstrap account: {0}")]
    Invalid(#[from] DomainError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Create any catalog permission or role that is missing. Existing rows are
/// matched by codename / role name and left untouched.
#[instrument(skip(store), err)]
pub async fn seed_rbac<S>(store: &S, now: DateTime<Utc>) -> Result<SeedReport, SeedError>
where
    S: RoleStore + ?Sized,
{
    let mut report = SeedReport::default();

    for entry in DEFAULT_PERMISSIONS {
        if store.find_permission_by_codename(entry.codename).await?.is_some() {
            continue;
        }
        let permission = NewPermission {
            name: entry.name.to_string(),
            codename: entry.codename.to_string(),
            description: Some(entry.description.to_string()),
            resource: entry.resource.to_string(),
            action: entry.action.to_string(),
            is_active: true,
        }
        .into_permission(now);
        store.insert_permission(&permission).await?;
        report.permissions_created += 1;
    }

    for entry in default_roles() {
        if store.find_role_by_name(entry.name).await?.is_some() {
            continue;
        }
        let mut permission_ids = Vec::new();
        for codename in entry.codenames() {
            if let Some(permission) = store.find_permission_by_codename(codename).await? {
                permission_ids.push(permission.id);
            }
        }
        let role = NewRole {
            name: entry.name.to_string(),
            description: Some(entry.description.to_string()),
            is_default: entry.is_default,
            is_active: true,
            priority: entry.priority,
            permission_ids: Vec::new(),
        }
        .into_role(permission_ids, now);
        store.insert_role(&role).await?;
        report.roles_created += 1;
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "rbac catalog seeded"
    );
    Ok(report)
}

/// Create a verified, active superuser unless an account with this email
/// already exists. Returns whether an account was created.
#[instrument(skip(store, password), err)]
pub async fn ensure_superuser<S>(
    store: &S,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<bool, SeedError>
where
    S: UserStore + ?Sized,
{
    let new_user = NewUser {
        email: email.to_string(),
        password: password.to_string(),
        confirm_password: password.to_string(),
        username: None,
        first_name: None,
        last_name: None,
        phone: None,
        bio: None,
        is_active: true,
        is_verified: true,
        is_superuser: true,
    }
    .validated()?;

    if store.find_user_by_email(&new_user.email).await?.is_some() {
        info!("bootstrap superuser already present");
        return Ok(false);
    }

    let hashed = hash_password(&new_user.password)?;
    let user = new_user.into_user(hashed, now);
    store.insert_user(&user).await?;
    info!(user_id = %user.id, "bootstrap superuser created");
    Ok(true)
}
