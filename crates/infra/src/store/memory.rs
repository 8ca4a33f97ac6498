use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use authkit_accounts::{
    AdminUserUpdate, Permission, PermissionFilter, Role, RoleFilter, RoleStats, User, UserFilter,
    UserStats,
};
use authkit_auth::RoleGrant;
use authkit_core::{Entity, PageRequest, PermissionId, RoleId, UserId};

use super::{
    ALREADY_EXISTS, CODENAME_TAKEN, EMAIL_TAKEN, ROLE_NAME_TAKEN, RoleStore, Store, StoreError,
    StoreResult, USERNAME_TAKEN, UserStore,
};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
}

/// Process-local store for development and tests.
///
/// Enforces the same uniqueness rules and cascades as the Postgres schema.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

fn window<T>(mut items: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let skip = usize::try_from(page.skip()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let items = if skip >= items.len() {
        Vec::new()
    } else {
        items.drain(skip..).take(limit).collect()
    };
    (items, total)
}

impl State {
    fn check_user_unique(&self, user: &User) -> StoreResult<()> {
        for other in self.users.values().filter(|u| u.id != user.id) {
            if other.email == user.email {
                return Err(StoreError::Conflict(EMAIL_TAKEN));
            }
            if user.username.is_some() && other.username == user.username {
                return Err(StoreError::Conflict(USERNAME_TAKEN));
            }
        }
        Ok(())
    }

    fn check_role_unique(&self, role: &Role) -> StoreResult<()> {
        if self.roles.values().any(|r| r.id != role.id && r.name == role.name) {
            return Err(StoreError::Conflict(ROLE_NAME_TAKEN));
        }
        Ok(())
    }

    fn check_permission_unique(&self, permission: &Permission) -> StoreResult<()> {
        if self
            .permissions
            .values()
            .any(|p| p.id != permission.id && p.codename == permission.codename)
        {
            return Err(StoreError::Conflict(CODENAME_TAKEN));
        }
        Ok(())
    }

    fn known_permissions(&self, ids: &[PermissionId]) -> Vec<PermissionId> {
        known_ids(&self.permissions, ids)
    }

    fn known_roles(&self, ids: &[RoleId]) -> Vec<RoleId> {
        known_ids(&self.roles, ids)
    }
}

/// `ids` that name a stored entity, deduplicated, in request order.
fn known_ids<E: Entity>(map: &HashMap<E::Id, E>, ids: &[E::Id]) -> Vec<E::Id> {
    let mut out: Vec<E::Id> = Vec::with_capacity(ids.len());
    for id in ids {
        if map.contains_key(id) && !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

fn by_resource_action(a: &Permission, b: &Permission) -> std::cmp::Ordering {
    (a.resource.as_str(), a.action.as_str()).cmp(&(b.resource.as_str(), b.action.as_str()))
}

fn by_priority_name(a: &Role, b: &Role) -> std::cmp::Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name))
}

#[async_trait::async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(ALREADY_EXISTS));
        }
        state.check_user_unique(user)?;
        let mut user = user.clone();
        user.role_ids = state.known_roles(&user.role_ids);
        state.users.insert(user.id, user);
        Ok(())
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: &AdminUserUpdate,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let mut state = self.write()?;
        let Some(current) = state.users.get(&id) else {
            return Ok(None);
        };
        let mut updated = current.clone();
        changes.clone().apply(&mut updated, at);
        state.check_user_unique(&updated)?;
        state.users.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.write()?;
        match state.users.get_mut(&id) {
            Some(user) if user.is_active => {
                user.last_login = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_verification_token(
        &self,
        id: UserId,
        token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        if let Some(user) = state.users.get_mut(&id).filter(|u| !u.is_verified) {
            user.verification_token = Some(token.to_string());
            user.updated_at = Some(at);
        }
        Ok(())
    }

    async fn mark_verified(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.write()?;
        match state.users.get_mut(&id) {
            Some(user) if !user.is_verified => {
                user.is_verified = true;
                user.verification_token = None;
                user.updated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password_reset(
        &self,
        id: UserId,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        user.password_reset_token = Some(token.to_string());
        user.password_reset_token_expires = Some(expires);
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        id: UserId,
        token: &str,
        hashed_password: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        match state.users.get_mut(&id) {
            Some(user) if user.reset_token_matches(token, at) => {
                user.hashed_password = hashed_password.to_string();
                user.password_reset_token = None;
                user.password_reset_token_expires = None;
                user.updated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password(
        &self,
        id: UserId,
        hashed_password: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        user.hashed_password = hashed_password.to_string();
        user.updated_at = Some(at);
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        Ok(self.write()?.users.remove(&id).is_some())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<User>, u64)> {
        let state = self.read()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(window(users, page))
    }

    async fn user_stats(&self) -> StoreResult<UserStats> {
        let state = self.read()?;
        let count = |pred: fn(&User) -> bool| state.users.values().filter(|u| pred(u)).count() as u64;
        Ok(UserStats {
            total_users: state.users.len() as u64,
            active_users: count(|u| u.is_active),
            verified_users: count(|u| u.is_verified),
            superusers: count(|u| u.is_superuser),
        })
    }

    async fn set_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<()> {
        let mut state = self.write()?;
        let role_ids = state.known_roles(role_ids);
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound("User"))?;
        user.role_ids = role_ids;
        Ok(())
    }

    async fn role_grants(&self, id: UserId) -> StoreResult<Vec<RoleGrant>> {
        let state = self.read()?;
        let Some(user) = state.users.get(&id) else {
            return Ok(Vec::new());
        };
        let mut roles: Vec<&Role> = user.role_ids.iter().filter_map(|r| state.roles.get(r)).collect();
        roles.sort_by(|a, b| by_priority_name(a, b));

        let grants = roles
            .into_iter()
            .map(|role| {
                let mut permissions: Vec<&Permission> = role
                    .permission_ids
                    .iter()
                    .filter_map(|p| state.permissions.get(p))
                    .collect();
                permissions.sort_by(|a, b| a.codename.cmp(&b.codename));
                permissions.into_iter().fold(
                    RoleGrant::new(role.name.clone(), role.priority, role.is_active),
                    |grant, p| grant.with_permission(p.codename.clone(), p.is_active),
                )
            })
            .collect();
        Ok(grants)
    }
}

#[async_trait::async_trait]
impl RoleStore for InMemoryStore {
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<Permission>> {
        Ok(self.read()?.permissions.get(&id).cloned())
    }

    async fn find_permission_by_codename(&self, codename: &str) -> StoreResult<Option<Permission>> {
        Ok(self
            .read()?
            .permissions
            .values()
            .find(|p| p.codename == codename)
            .cloned())
    }

    async fn insert_permission(&self, permission: &Permission) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.permissions.contains_key(&permission.id) {
            return Err(StoreError::Conflict(ALREADY_EXISTS));
        }
        state.check_permission_unique(permission)?;
        state.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn update_permission(&self, permission: &Permission) -> StoreResult<()> {
        let mut state = self.write()?;
        state.check_permission_unique(permission)?;
        let existing = state
            .permissions
            .get_mut(&permission.id)
            .ok_or(StoreError::NotFound("Permission"))?;
        *existing = permission.clone();
        Ok(())
    }

    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool> {
        let mut state = self.write()?;
        if state.permissions.remove(&id).is_none() {
            return Ok(false);
        }
        for role in state.roles.values_mut() {
            role.permission_ids.retain(|p| *p != id);
        }
        Ok(true)
    }

    async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Permission>, u64)> {
        let state = self.read()?;
        let mut permissions: Vec<Permission> = state
            .permissions
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        permissions.sort_by(by_resource_action);
        Ok(window(permissions, page))
    }

    async fn get_permissions(&self, ids: &[PermissionId]) -> StoreResult<Vec<Permission>> {
        let state = self.read()?;
        let mut permissions: Vec<Permission> = state
            .known_permissions(ids)
            .iter()
            .filter_map(|id| state.permissions.get(id).cloned())
            .collect();
        permissions.sort_by(by_resource_action);
        Ok(permissions)
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.values().find(|r| r.name == name).cloned())
    }

    async fn insert_role(&self, role: &Role) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.roles.contains_key(&role.id) {
            return Err(StoreError::Conflict(ALREADY_EXISTS));
        }
        state.check_role_unique(role)?;
        let mut role = role.clone();
        role.permission_ids = state.known_permissions(&role.permission_ids);
        state.roles.insert(role.id, role);
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        let mut state = self.write()?;
        state.check_role_unique(role)?;
        let permission_ids = state.known_permissions(&role.permission_ids);
        let existing = state.roles.get_mut(&role.id).ok_or(StoreError::NotFound("Role"))?;
        *existing = Role {
            permission_ids,
            ..role.clone()
        };
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<bool> {
        let mut state = self.write()?;
        if state.roles.remove(&id).is_none() {
            return Ok(false);
        }
        for user in state.users.values_mut() {
            user.role_ids.retain(|r| *r != id);
        }
        Ok(true)
    }

    async fn list_roles(
        &self,
        filter: &RoleFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Role>, u64)> {
        let state = self.read()?;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        roles.sort_by(by_priority_name);
        Ok(window(roles, page))
    }

    async fn existing_role_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<RoleId>> {
        Ok(self.read()?.known_roles(ids))
    }

    async fn role_user_counts(&self, ids: &[RoleId]) -> StoreResult<HashMap<RoleId, u64>> {
        let state = self.read()?;
        let mut counts = HashMap::new();
        for user in state.users.values() {
            for role_id in user.role_ids.iter().filter(|r| ids.contains(r)) {
                *counts.entry(*role_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn default_role(&self) -> StoreResult<Option<Role>> {
        let state = self.read()?;
        let mut candidates: Vec<&Role> = state
            .roles
            .values()
            .filter(|r| r.is_default && r.is_active)
            .collect();
        candidates.sort_by(|a, b| by_priority_name(a, b));
        Ok(candidates.first().map(|r| (*r).clone()))
    }

    async fn role_stats(&self) -> StoreResult<RoleStats> {
        let state = self.read()?;
        Ok(RoleStats {
            total_roles: state.roles.len() as u64,
            active_roles: state.roles.values().filter(|r| r.is_active).count() as u64,
            system_roles: state.roles.values().filter(|r| r.is_system).count() as u64,
            total_permissions: state.permissions.len() as u64,
            active_permissions: state.permissions.values().filter(|p| p.is_active).count() as u64,
        })
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }
}
