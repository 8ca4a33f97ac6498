use chrono::Utc;
use tracing::{info, warn};

use authkit_accounts::{AdminUserUpdate, ProfileUpdate, User, UserFilter, UserStats};
use authkit_core::{Page, PageRequest, UserId};

use super::AppServices;
use crate::app::errors::{ServiceError, ServiceResult};

impl AppServices {
    pub async fn update_profile(&self, user: &User, update: ProfileUpdate) -> ServiceResult<User> {
        let update = update.validated()?;
        self.ensure_identity_free(user, &update).await?;

        let changes = AdminUserUpdate {
            profile: update,
            ..AdminUserUpdate::default()
        };
        self.store
            .update_user(user.id, &changes, Utc::now())
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }

    pub async fn delete_account(&self, user: &User) -> ServiceResult<()> {
        if !self.store.delete_user(user.id).await? {
            return Err(ServiceError::NotFound("User"));
        }
        info!(user_id = %user.id, "account deleted by owner");
        Ok(())
    }

    pub async fn list_users(&self, filter: UserFilter, page: PageRequest) -> ServiceResult<Page<User>> {
        let (users, total) = self.store.list_users(&filter, page).await?;
        Ok(Page::new(users, total, page))
    }

    pub async fn user_stats(&self) -> ServiceResult<UserStats> {
        Ok(self.store.user_stats().await?)
    }

    pub async fn get_user(&self, id: UserId) -> ServiceResult<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }

    pub async fn admin_update_user(&self, id: UserId, update: AdminUserUpdate) -> ServiceResult<User> {
        let update = update.validated()?;
        let current = self.get_user(id).await?;
        self.ensure_identity_free(&current, &update.profile).await?;

        let was_active = current.is_active;
        let user = self
            .store
            .update_user(id, &update, Utc::now())
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        info!(user_id = %user.id, "user updated by admin");

        if was_active && !user.is_active {
            if let Err(err) = self
                .mailer
                .send_account_locked(&user.email, &user.display_name())
                .await
            {
                warn!(user_id = %user.id, error = %err, "account locked email not sent");
            }
        }
        Ok(user)
    }

    /// Delete another user's account. Admins cannot delete themselves here.
    pub async fn delete_user(&self, actor: &User, id: UserId) -> ServiceResult<()> {
        if actor.id == id {
            return Err(ServiceError::BadRequest("Cannot delete your own account".into()));
        }
        if !self.store.delete_user(id).await? {
            return Err(ServiceError::NotFound("User"));
        }
        info!(user_id = %id, actor_id = %actor.id, "user deleted");
        Ok(())
    }

    /// Uniqueness of a changed email or username against every other account.
    async fn ensure_identity_free(&self, user: &User, update: &ProfileUpdate) -> ServiceResult<()> {
        if let Some(email) = update.email_change(user) {
            self.ensure_email_free(email).await?;
        }
        if let Some(username) = update.username_change(user) {
            self.ensure_username_free(username).await?;
        }
        Ok(())
    }
}
