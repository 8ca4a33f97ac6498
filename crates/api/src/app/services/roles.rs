use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};

use authkit_accounts::{
    BulkOperation, NewPermission, NewRole, Permission, PermissionFilter, PermissionUpdate, Role,
    RoleFilter, RoleStats, RoleUpdate,
};
use authkit_auth::{Principal, can_manage, check_permission};
use authkit_core::{Page, PageRequest, PermissionId, RoleId, UserId};
use authkit_infra::store::{CODENAME_TAKEN, ROLE_NAME_TAKEN};

use super::AppServices;
use crate::app::dto::{
    BulkAssignRequest, BulkAssignResponse, BulkFailure, ManageableResponse, PermissionCheckRequest,
    PermissionCheckResponse, RoleAssignmentRequest, RoleResponse,
};
use crate::app::errors::{ServiceError, ServiceResult};

impl AppServices {
    // -------------------------
    // Permissions
    // -------------------------

    pub async fn create_permission(&self, new: NewPermission) -> ServiceResult<Permission> {
        let new = new.validated()?;
        if self.store.find_permission_by_codename(&new.codename).await?.is_some() {
            return Err(ServiceError::Conflict(CODENAME_TAKEN.into()));
        }
        let permission = new.into_permission(Utc::now());
        self.store.insert_permission(&permission).await?;
        info!(codename = %permission.codename, "permission created");
        Ok(permission)
    }

    pub async fn list_permissions(
        &self,
        filter: PermissionFilter,
        page: PageRequest,
    ) -> ServiceResult<Page<Permission>> {
        let (permissions, total) = self.store.list_permissions(&filter, page).await?;
        Ok(Page::new(permissions, total, page))
    }

    pub async fn get_permission(&self, id: PermissionId) -> ServiceResult<Permission> {
        self.store
            .get_permission(id)
            .await?
            .ok_or(ServiceError::NotFound("Permission"))
    }

    pub async fn update_permission(
        &self,
        id: PermissionId,
        update: PermissionUpdate,
    ) -> ServiceResult<Permission> {
        let update = update.validated()?;
        let mut permission = self.get_permission(id).await?;
        update.apply(&mut permission, Utc::now());
        self.store.update_permission(&permission).await?;
        Ok(permission)
    }

    /// Delete a permission; roles holding it lose it.
    pub async fn delete_permission(&self, id: PermissionId) -> ServiceResult<()> {
        if !self.store.delete_permission(id).await? {
            return Err(ServiceError::NotFound("Permission"));
        }
        info!(permission_id = %id, "permission deleted");
        Ok(())
    }

    // -------------------------
    // Roles
    // -------------------------

    pub async fn create_role(&self, new: NewRole) -> ServiceResult<RoleResponse> {
        let new = new.validated()?;
        if self.store.find_role_by_name(&new.name).await?.is_some() {
            return Err(ServiceError::Conflict(ROLE_NAME_TAKEN.into()));
        }
        let permission_ids = self.known_permission_ids(&new.permission_ids).await?;
        let role = new.into_role(permission_ids, Utc::now());
        self.store.insert_role(&role).await?;
        info!(role = %role.name, "role created");
        self.role_response(role).await
    }

    pub async fn list_roles(&self, filter: RoleFilter, page: PageRequest) -> ServiceResult<Page<RoleResponse>> {
        let (roles, total) = self.store.list_roles(&filter, page).await?;
        let ids: Vec<RoleId> = roles.iter().map(|r| r.id).collect();
        let counts = self.store.role_user_counts(&ids).await?;

        let mut items = Vec::with_capacity(roles.len());
        for role in roles {
            let permissions = self.store.get_permissions(&role.permission_ids).await?;
            let user_count = counts.get(&role.id).copied().unwrap_or(0);
            items.push(RoleResponse::new(role, permissions, user_count));
        }
        Ok(Page::new(items, total, page))
    }

    pub async fn get_role(&self, id: RoleId) -> ServiceResult<RoleResponse> {
        let role = self.find_role(id).await?;
        self.role_response(role).await
    }

    /// Patch a role. System roles are immutable; a new permission set replaces the old one.
    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> ServiceResult<RoleResponse> {
        let mut update = update.validated()?;
        let mut role = self.find_role(id).await?;
        role.ensure_modifiable()?;

        if let Some(name) = update.name_change(&role) {
            if self.store.find_role_by_name(name).await?.is_some() {
                return Err(ServiceError::Conflict(ROLE_NAME_TAKEN.into()));
            }
        }
        if let Some(ids) = update.permission_ids.take() {
            update.permission_ids = Some(self.known_permission_ids(&ids).await?);
        }

        update.apply(&mut role, Utc::now());
        self.store.update_role(&role).await?;
        info!(role = %role.name, "role updated");
        self.role_response(role).await
    }

    pub async fn delete_role(&self, id: RoleId) -> ServiceResult<()> {
        let role = self.find_role(id).await?;
        role.ensure_deletable()?;
        self.store.delete_role(id).await?;
        info!(role = %role.name, "role deleted");
        Ok(())
    }

    pub async fn role_stats(&self) -> ServiceResult<RoleStats> {
        Ok(self.store.role_stats().await?)
    }

    // -------------------------
    // Assignments
    // -------------------------

    /// Replace a user's roles. Unknown role ids are ignored.
    pub async fn assign_roles(&self, request: RoleAssignmentRequest) -> ServiceResult<()> {
        let user = self.get_user(request.user_id).await?;
        let role_ids = self.store.existing_role_ids(&request.role_ids).await?;
        self.store.set_user_roles(user.id, &role_ids).await?;
        info!(user_id = %user.id, roles = role_ids.len(), "roles assigned");
        Ok(())
    }

    /// Apply one add/remove/replace operation to many users, reporting per user.
    pub async fn bulk_assign(&self, request: BulkAssignRequest) -> ServiceResult<BulkAssignResponse> {
        let BulkAssignRequest {
            user_ids,
            role_ids,
            operation,
        } = request;
        let role_ids = self.store.existing_role_ids(&role_ids).await?;
        let mut result = BulkAssignResponse::default();

        for user_id in user_ids {
            match self.apply_bulk(user_id, operation, &role_ids).await {
                Ok(()) => result.success.push(user_id),
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "bulk role assignment failed for user");
                    result.failed.push(BulkFailure {
                        user_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }

    async fn apply_bulk(
        &self,
        user_id: UserId,
        operation: BulkOperation,
        role_ids: &[RoleId],
    ) -> ServiceResult<()> {
        let user = self.get_user(user_id).await?;
        let combined = operation.combine(&user.role_ids, role_ids);
        self.store.set_user_roles(user_id, &combined).await?;
        Ok(())
    }

    /// Which of the user's roles grant `codename`. The superuser flag is not consulted.
    pub async fn check_permission(
        &self,
        request: PermissionCheckRequest,
    ) -> ServiceResult<PermissionCheckResponse> {
        let user = self.get_user(request.user_id).await?;
        let principal = self.principal(&user).await?;
        let check = check_permission(&principal, &request.permission_codename);
        Ok(PermissionCheckResponse {
            has_permission: check.has_permission,
            user_id: user.id,
            permission_codename: request.permission_codename,
            granted_by_roles: check.granted_by_roles,
        })
    }

    /// Whether `actor` ranks above the target user in the role hierarchy.
    pub async fn manageable(&self, actor: &Principal, target: UserId) -> ServiceResult<ManageableResponse> {
        let user = self.get_user(target).await?;
        let target = self.principal(&user).await?;
        let outcome = can_manage(actor, &target);
        Ok(ManageableResponse {
            user_id: user.id,
            can_manage: outcome.is_ok(),
            actor_priority: actor.rank(),
            target_priority: target.rank(),
            reason: outcome.err().map(|e| e.to_string()),
        })
    }

    // -------------------------
    // Helpers
    // -------------------------

    async fn find_role(&self, id: RoleId) -> ServiceResult<Role> {
        self.store.get_role(id).await?.ok_or(ServiceError::NotFound("Role"))
    }

    async fn role_response(&self, role: Role) -> ServiceResult<RoleResponse> {
        let permissions = self.store.get_permissions(&role.permission_ids).await?;
        let counts: HashMap<RoleId, u64> = self.store.role_user_counts(&[role.id]).await?;
        let user_count = counts.get(&role.id).copied().unwrap_or(0);
        Ok(RoleResponse::new(role, permissions, user_count))
    }

    /// Drop ids that do not name an existing permission, keeping request order.
    async fn known_permission_ids(&self, ids: &[PermissionId]) -> ServiceResult<Vec<PermissionId>> {
        let known: Vec<PermissionId> = self
            .store
            .get_permissions(ids)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        let mut out = Vec::with_capacity(known.len());
        for id in ids {
            if known.contains(id) && !out.contains(id) {
                out.push(*id);
            }
        }
        Ok(out)
    }
}
