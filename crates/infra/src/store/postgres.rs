//! Postgres-backed [`Store`].
//!
//! ## Error mapping
//!
//! | Postgres | `StoreError` |
//! |----------|--------------|
//! | 23505 unique violation | `Conflict` with the fixed message for the constraint |
//! | anything else | `Backend` |
//!
//! Role and permission memberships are written inside the same transaction as
//! the owning row.

use std::collections::HashMap;

use sqlx::postgres::{PgPoolOptions, PgRow};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use authkit_accounts::{
    AdminUserUpdate, Permission, PermissionFilter, Role, RoleFilter, RoleStats, User, UserFilter,
    UserStats,
};
use authkit_auth::RoleGrant;
use authkit_core::{PageRequest, PermissionId, RoleId, UserId};

use super::{
    ALREADY_EXISTS, CODENAME_TAKEN, EMAIL_TAKEN, ROLE_NAME_TAKEN, RoleStore, Store, StoreError,
    StoreResult, USERNAME_TAKEN, UserStore,
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const USER_COLUMNS: &str = "u.id, u.email, u.username, u.hashed_password, u.first_name, \
    u.last_name, u.phone, u.bio, u.avatar_url, u.is_active, u.is_verified, u.is_superuser, \
    u.created_at, u.updated_at, u.last_login, u.verification_token, u.password_reset_token, \
    u.password_reset_token_expires, \
    ARRAY(SELECT ur.role_id FROM user_roles ur WHERE ur.user_id = u.id \
          ORDER BY ur.assigned_at, ur.role_id) AS role_ids";

const ROLE_COLUMNS: &str = "r.id, r.name, r.description, r.is_default, r.is_system, r.is_active, \
    r.priority, r.created_at, r.updated_at, \
    ARRAY(SELECT rp.permission_id FROM role_permissions rp \
          JOIN permissions p ON p.id = rp.permission_id \
          WHERE rp.role_id = r.id ORDER BY p.resource, p.action) AS permission_ids";

const PERMISSION_COLUMNS: &str = "id, name, codename, description, resource, action, is_active, \
    created_at, updated_at";

/// Postgres implementation of the account and RBAC store.
///
/// Thread-safe: the sqlx pool is internally reference counted.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they are missing. Safe to run on every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self, operation: &str) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| map_sqlx_error(operation, e))
    }
}

/// `%term%` with LIKE wildcards in `term` escaped.
fn like_pattern(term: Option<&str>) -> Option<String> {
    let term = term.filter(|t| !t.is_empty())?;
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    Some(escaped)
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    let skip = i64::try_from(page.skip()).unwrap_or(i64::MAX);
    let limit = i64::try_from(page.limit()).unwrap_or(i64::MAX);
    (skip, limit)
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role_ids: Vec<Uuid> = row.try_get("role_ids")?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        hashed_password: row.try_get("hashed_password")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        bio: row.try_get("bio")?,
        avatar_url: row.try_get("avatar_url")?,
        is_active: row.try_get("is_active")?,
        is_verified: row.try_get("is_verified")?,
        is_superuser: row.try_get("is_superuser")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_login: row.try_get("last_login")?,
        verification_token: row.try_get("verification_token")?,
        password_reset_token: row.try_get("password_reset_token")?,
        password_reset_token_expires: row.try_get("password_reset_token_expires")?,
        role_ids: role_ids.into_iter().map(RoleId::from_uuid).collect(),
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    let permission_ids: Vec<Uuid> = row.try_get("permission_ids")?;
    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_default: row.try_get("is_default")?,
        is_system: row.try_get("is_system")?,
        is_active: row.try_get("is_active")?,
        priority: row.try_get("priority")?,
        permission_ids: permission_ids.into_iter().map(PermissionId::from_uuid).collect(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn permission_from_row(row: &PgRow) -> Result<Permission, sqlx::Error> {
    Ok(Permission {
        id: PermissionId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        codename: row.try_get("codename")?,
        description: row.try_get("description")?,
        resource: row.try_get("resource")?,
        action: row.try_get("action")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode<T>(
    operation: &str,
    rows: &[PgRow],
    f: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(|row| f(row).map_err(|e| map_sqlx_error(operation, e)))
        .collect()
}

fn role_uuids(ids: &[RoleId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

fn permission_uuids(ids: &[PermissionId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

async fn replace_user_roles(
    tx: &mut Transaction<'static, Postgres>,
    user_id: UserId,
    role_ids: &[RoleId],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id.as_uuid())
        .execute(&mut **tx)
        .await?;
    // Unknown ids are dropped by the join instead of tripping the foreign key.
    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) \
         SELECT $1, r.id FROM UNNEST($2::uuid[]) WITH ORDINALITY AS wanted(id, ord) \
         JOIN roles r ON r.id = wanted.id \
         ORDER BY wanted.ord \
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id.as_uuid())
    .bind(role_uuids(role_ids))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_role_permissions(
    tx: &mut Transaction<'static, Postgres>,
    role_id: RoleId,
    permission_ids: &[PermissionId],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id.as_uuid())
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) \
         SELECT $1, p.id FROM permissions p WHERE p.id = ANY($2::uuid[]) \
         ON CONFLICT DO NOTHING",
    )
    .bind(role_id.as_uuid())
    .bind(permission_uuids(permission_ids))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_user", e))
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_user_by_email", e))
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_user_by_username", e))
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut tx = self.begin("insert_user").await?;
        sqlx::query(
            "INSERT INTO users (id, email, username, hashed_password, first_name, last_name, \
             phone, bio, avatar_url, is_active, is_verified, is_superuser, created_at, updated_at, \
             last_login, verification_token, password_reset_token, password_reset_token_expires) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.bio)
        .bind(&user.avatar_url)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.is_superuser)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login)
        .bind(&user.verification_token)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_token_expires)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        replace_user_roles(&mut tx, user.id, &user.role_ids)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("insert_user", e))
    }

    #[instrument(skip(self, changes), err)]
    async fn update_user(
        &self,
        id: UserId,
        changes: &AdminUserUpdate,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let profile = &changes.profile;
        let sql = format!(
            "UPDATE users u SET email = COALESCE($2, u.email), \
             username = COALESCE($3, u.username), first_name = COALESCE($4, u.first_name), \
             last_name = COALESCE($5, u.last_name), phone = COALESCE($6, u.phone), \
             bio = COALESCE($7, u.bio), avatar_url = COALESCE($8, u.avatar_url), \
             is_active = COALESCE($9, u.is_active), is_verified = COALESCE($10, u.is_verified), \
             is_superuser = COALESCE($11, u.is_superuser), updated_at = $12 \
             WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&profile.email)
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.phone)
            .bind(&profile.bio)
            .bind(&profile.avatar_url)
            .bind(changes.is_active)
            .bind(changes.is_verified)
            .bind(changes.is_superuser)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("update_user", e))
    }

    #[instrument(skip(self), err)]
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1 AND is_active")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_login", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, token), err)]
    async fn set_verification_token(
        &self,
        id: UserId,
        token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET verification_token = $2, updated_at = $3 \
             WHERE id = $1 AND NOT is_verified",
        )
        .bind(id.as_uuid())
        .bind(token)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_verification_token", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn mark_verified(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_verified = TRUE, verification_token = NULL, updated_at = $2 \
             WHERE id = $1 AND NOT is_verified",
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_verified", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, token), err)]
    async fn set_password_reset(
        &self,
        id: UserId,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_reset_token = $2, password_reset_token_expires = $3 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(token)
        .bind(expires)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_password_reset", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("User"));
        }
        Ok(())
    }

    #[instrument(skip(self, token, hashed_password), err)]
    async fn consume_password_reset(
        &self,
        id: UserId,
        token: &str,
        hashed_password: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET hashed_password = $3, password_reset_token = NULL, \
             password_reset_token_expires = NULL, updated_at = $4 \
             WHERE id = $1 AND password_reset_token = $2 AND password_reset_token_expires >= $4",
        )
        .bind(id.as_uuid())
        .bind(token)
        .bind(hashed_password)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("consume_password_reset", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, hashed_password), err)]
    async fn set_password(
        &self,
        id: UserId,
        hashed_password: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET hashed_password = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(hashed_password)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_password", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("User"));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<User>, u64)> {
        const WHERE: &str = "($1::text IS NULL OR u.email ILIKE $1 OR u.username ILIKE $1 \
                OR u.first_name ILIKE $1 OR u.last_name ILIKE $1) \
            AND ($2::boolean IS NULL OR u.is_active = $2) \
            AND ($3::boolean IS NULL OR u.is_verified = $3) \
            AND ($4::boolean IS NULL OR u.is_superuser = $4)";

        let pattern = like_pattern(filter.search.as_deref());
        let (skip, limit) = page_bounds(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users u WHERE {WHERE}"))
            .bind(&pattern)
            .bind(filter.is_active)
            .bind(filter.is_verified)
            .bind(filter.is_superuser)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE {WHERE} \
             ORDER BY u.created_at DESC, u.id DESC OFFSET $5 LIMIT $6"
        );
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(filter.is_active)
            .bind(filter.is_verified)
            .bind(filter.is_superuser)
            .bind(skip)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;

        Ok((decode("list_users", &rows, user_from_row)?, count(total)))
    }

    #[instrument(skip(self), err)]
    async fn user_stats(&self) -> StoreResult<UserStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE is_active) AS active, \
                    COUNT(*) FILTER (WHERE is_verified) AS verified, \
                    COUNT(*) FILTER (WHERE is_superuser) AS superusers \
             FROM users",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_stats", e))?;

        let get = |name: &str| -> StoreResult<u64> {
            row.try_get::<i64, _>(name)
                .map(count)
                .map_err(|e| map_sqlx_error("user_stats", e))
        };
        Ok(UserStats {
            total_users: get("total")?,
            active_users: get("active")?,
            verified_users: get("verified")?,
            superusers: get("superusers")?,
        })
    }

    #[instrument(skip(self), err)]
    async fn set_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<()> {
        let mut tx = self.begin("set_user_roles").await?;
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_user_roles", e))?;
        if exists.is_none() {
            return Err(StoreError::NotFound("User"));
        }
        replace_user_roles(&mut tx, id, role_ids)
            .await
            .map_err(|e| map_sqlx_error("set_user_roles", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("set_user_roles", e))
    }

    #[instrument(skip(self), err)]
    async fn role_grants(&self, id: UserId) -> StoreResult<Vec<RoleGrant>> {
        let rows = sqlx::query(
            "SELECT r.name, r.priority, r.is_active, \
                    ARRAY(SELECT p.codename FROM role_permissions rp \
                          JOIN permissions p ON p.id = rp.permission_id \
                          WHERE rp.role_id = r.id AND p.is_active \
                          ORDER BY p.codename) AS codenames \
             FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1 \
             ORDER BY r.priority DESC, r.name",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_grants", e))?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let priority: i32 = row.try_get("priority")?;
                let is_active: bool = row.try_get("is_active")?;
                let codenames: Vec<String> = row.try_get("codenames")?;
                Ok(codenames
                    .into_iter()
                    .fold(RoleGrant::new(name, priority, is_active), |grant, codename| {
                        grant.with_permission(codename, true)
                    }))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("role_grants", e))
    }
}

#[async_trait::async_trait]
impl RoleStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn get_permission(&self, id: PermissionId) -> StoreResult<Option<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_permission", e))?;
        row.as_ref()
            .map(permission_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_permission", e))
    }

    #[instrument(skip(self), err)]
    async fn find_permission_by_codename(&self, codename: &str) -> StoreResult<Option<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE codename = $1");
        let row = sqlx::query(&sql)
            .bind(codename)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_permission_by_codename", e))?;
        row.as_ref()
            .map(permission_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_permission_by_codename", e))
    }

    #[instrument(skip(self, permission), fields(codename = %permission.codename), err)]
    async fn insert_permission(&self, permission: &Permission) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO permissions (id, name, codename, description, resource, action, \
             is_active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(&permission.codename)
        .bind(&permission.description)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(permission.is_active)
        .bind(permission.created_at)
        .bind(permission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;
        Ok(())
    }

    #[instrument(skip(self, permission), fields(permission_id = %permission.id), err)]
    async fn update_permission(&self, permission: &Permission) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE permissions SET name = $2, codename = $3, description = $4, resource = $5, \
             action = $6, is_active = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(&permission.codename)
        .bind(&permission.description)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(permission.is_active)
        .bind(permission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_permission", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Permission"));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_permission(&self, id: PermissionId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_permission", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Permission>, u64)> {
        const WHERE: &str = "($1::text IS NULL OR name ILIKE $1 OR codename ILIKE $1 \
                OR description ILIKE $1) \
            AND ($2::text IS NULL OR resource = $2) \
            AND ($3::text IS NULL OR action = $3) \
            AND ($4::boolean IS NULL OR is_active = $4)";

        let pattern = like_pattern(filter.search.as_deref());
        let (skip, limit) = page_bounds(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM permissions WHERE {WHERE}"))
            .bind(&pattern)
            .bind(&filter.resource)
            .bind(&filter.action)
            .bind(filter.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;

        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE {WHERE} \
             ORDER BY resource, action OFFSET $5 LIMIT $6"
        );
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(&filter.resource)
            .bind(&filter.action)
            .bind(filter.is_active)
            .bind(skip)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;

        Ok((decode("list_permissions", &rows, permission_from_row)?, count(total)))
    }

    #[instrument(skip(self), err)]
    async fn get_permissions(&self, ids: &[PermissionId]) -> StoreResult<Vec<Permission>> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ANY($1::uuid[]) \
             ORDER BY resource, action"
        );
        let rows = sqlx::query(&sql)
            .bind(permission_uuids(ids))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_permissions", e))?;
        decode("get_permissions", &rows, permission_from_row)
    }

    #[instrument(skip(self), err)]
    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r WHERE r.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        row.as_ref()
            .map(role_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_role", e))
    }

    #[instrument(skip(self), err)]
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r WHERE r.name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
        row.as_ref()
            .map(role_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_role_by_name", e))
    }

    #[instrument(skip(self, role), fields(role = %role.name), err)]
    async fn insert_role(&self, role: &Role) -> StoreResult<()> {
        let mut tx = self.begin("insert_role").await?;
        sqlx::query(
            "INSERT INTO roles (id, name, description, is_default, is_system, is_active, \
             priority, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_default)
        .bind(role.is_system)
        .bind(role.is_active)
        .bind(role.priority)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

        replace_role_permissions(&mut tx, role.id, &role.permission_ids)
            .await
            .map_err(|e| map_sqlx_error("insert_role", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("insert_role", e))
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update_role(&self, role: &Role) -> StoreResult<()> {
        let mut tx = self.begin("update_role").await?;
        let result = sqlx::query(
            "UPDATE roles SET name = $2, description = $3, is_default = $4, is_system = $5, \
             is_active = $6, priority = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_default)
        .bind(role.is_system)
        .bind(role.is_active)
        .bind(role.priority)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Role"));
        }

        replace_role_permissions(&mut tx, role.id, &role.permission_ids)
            .await
            .map_err(|e| map_sqlx_error("update_role", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_role", e))
    }

    #[instrument(skip(self), err)]
    async fn delete_role(&self, id: RoleId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn list_roles(
        &self,
        filter: &RoleFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Role>, u64)> {
        const WHERE: &str = "($1::text IS NULL OR r.name ILIKE $1 OR r.description ILIKE $1) \
            AND ($2::boolean IS NULL OR r.is_active = $2) \
            AND ($3::boolean IS NULL OR r.is_default = $3) \
            AND ($4::boolean IS NULL OR r.is_system = $4)";

        let pattern = like_pattern(filter.search.as_deref());
        let (skip, limit) = page_bounds(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM roles r WHERE {WHERE}"))
            .bind(&pattern)
            .bind(filter.is_active)
            .bind(filter.is_default)
            .bind(filter.is_system)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE {WHERE} \
             ORDER BY r.priority DESC, r.name OFFSET $5 LIMIT $6"
        );
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(filter.is_active)
            .bind(filter.is_default)
            .bind(filter.is_system)
            .bind(skip)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        Ok((decode("list_roles", &rows, role_from_row)?, count(total)))
    }

    #[instrument(skip(self), err)]
    async fn existing_role_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<RoleId>> {
        let found: Vec<Uuid> = sqlx::query_scalar(
            "SELECT r.id FROM UNNEST($1::uuid[]) WITH ORDINALITY AS wanted(id, ord) \
             JOIN roles r ON r.id = wanted.id \
             GROUP BY r.id ORDER BY MIN(wanted.ord)",
        )
        .bind(role_uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("existing_role_ids", e))?;
        Ok(found.into_iter().map(RoleId::from_uuid).collect())
    }

    #[instrument(skip(self), err)]
    async fn role_user_counts(&self, ids: &[RoleId]) -> StoreResult<HashMap<RoleId, u64>> {
        let rows = sqlx::query(
            "SELECT role_id, COUNT(*) AS users FROM user_roles \
             WHERE role_id = ANY($1::uuid[]) GROUP BY role_id",
        )
        .bind(role_uuids(ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_user_counts", e))?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("role_id")?;
                let users: i64 = row.try_get("users")?;
                Ok((RoleId::from_uuid(id), count(users)))
            })
            .collect::<Result<HashMap<_, _>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("role_user_counts", e))
    }

    #[instrument(skip(self), err)]
    async fn default_role(&self) -> StoreResult<Option<Role>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.is_default AND r.is_active \
             ORDER BY r.priority DESC, r.name LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("default_role", e))?;
        row.as_ref()
            .map(role_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("default_role", e))
    }

    #[instrument(skip(self), err)]
    async fn role_stats(&self) -> StoreResult<RoleStats> {
        let row = sqlx::query(
            "SELECT \
               (SELECT COUNT(*) FROM roles) AS total_roles, \
               (SELECT COUNT(*) FROM roles WHERE is_active) AS active_roles, \
               (SELECT COUNT(*) FROM roles WHERE is_system) AS system_roles, \
               (SELECT COUNT(*) FROM permissions) AS total_permissions, \
               (SELECT COUNT(*) FROM permissions WHERE is_active) AS active_permissions",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_stats", e))?;

        let get = |name: &str| -> StoreResult<u64> {
            row.try_get::<i64, _>(name)
                .map(count)
                .map_err(|e| map_sqlx_error("role_stats", e))
        };
        Ok(RoleStats {
            total_roles: get("total_roles")?,
            active_roles: get("active_roles")?,
            system_roles: get("system_roles")?,
            total_permissions: get("total_permissions")?,
            active_permissions: get("active_permissions")?,
        })
    }
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

/// Client-facing message for a unique constraint named in `migrations/`.
fn unique_violation_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => EMAIL_TAKEN,
        Some("users_username_key") => USERNAME_TAKEN,
        Some("permissions_codename_key") => CODENAME_TAKEN,
        Some("roles_name_key") => ROLE_NAME_TAKEN,
        _ => ALREADY_EXISTS,
    }
}

/// Map sqlx errors onto the store's error space.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                warn!(
                    operation,
                    constraint = db_err.constraint().unwrap_or("unknown"),
                    error = %db_err.message(),
                    "unique violation"
                );
                return StoreError::Conflict(unique_violation_message(db_err.constraint()));
            }
            StoreError::Backend(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
