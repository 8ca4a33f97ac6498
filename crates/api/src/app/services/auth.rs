use chrono::Utc;
use tracing::{info, warn};

use authkit_accounts::{NewUser, PasswordChange, PasswordReset, Registration, User};
use authkit_auth::{JwtValidator, TokenKind, hash_password, verify_password};
use authkit_core::{UserId, validate};
use authkit_infra::store::{EMAIL_TAKEN, USERNAME_TAKEN};

use super::AppServices;
use crate::app::dto::{LoginRequest, TokenResponse};
use crate::app::errors::{ServiceError, ServiceResult};
use crate::context::CurrentUser;

const INVALID_VERIFICATION_TOKEN: &str = "Invalid or expired verification token";
const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

impl AppServices {
    /// Create an unverified account holding the default role and email a
    /// verification link. Mail failures do not fail the registration.
    pub async fn register(&self, registration: Registration) -> ServiceResult<User> {
        let new_user = NewUser::from(registration.validated()?);
        self.ensure_email_free(&new_user.email).await?;
        if let Some(username) = &new_user.username {
            self.ensure_username_free(username).await?;
        }

        let now = Utc::now();
        let hashed = hash_password(&new_user.password)?;
        let mut user = new_user.into_user(hashed, now);
        if let Some(role) = self.store.default_role().await? {
            user.role_ids.push(role.id);
        }
        let token = self
            .jwt
            .issue(TokenKind::EmailVerification, &user.email, None, now)?
            .token;
        user.verification_token = Some(token.clone());

        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, "user registered");

        if let Err(err) = self
            .mailer
            .send_verification(&user.email, &user.display_name(), &token)
            .await
        {
            warn!(user_id = %user.id, error = %err, "verification email not sent");
        }
        Ok(user)
    }

    pub async fn login(&self, request: LoginRequest) -> ServiceResult<TokenResponse> {
        let email = validate::email(&request.email)?;
        let invalid = || ServiceError::Unauthorized("Invalid email or password".into());
        let deactivated = || ServiceError::Unauthorized("Account is deactivated".into());

        let user = self.store.find_user_by_email(&email).await?.ok_or_else(invalid)?;
        if !verify_password(&request.password, &user.hashed_password) {
            return Err(invalid());
        }
        if !user.is_active {
            return Err(deactivated());
        }
        // Only stamps an account that is still active at write time.
        if !self.store.record_login(user.id, Utc::now()).await? {
            return Err(deactivated());
        }
        info!(user_id = %user.id, "login succeeded");

        self.token_pair(&user)
    }

    /// Exchange a refresh token for a new access/refresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> ServiceResult<TokenResponse> {
        let invalid = || ServiceError::Unauthorized("Invalid refresh token".into());
        let claims = self
            .jwt
            .validate(refresh_token, TokenKind::Refresh, Utc::now())
            .map_err(|_| invalid())?;
        let user_id: UserId = claims.sub.parse().map_err(|_| invalid())?;

        match self.store.get_user(user_id).await? {
            Some(user) if user.is_active => self.token_pair(&user),
            _ => Err(ServiceError::Unauthorized("User not found or inactive".into())),
        }
    }

    /// Resolve a bearer access token to an active user and its roles.
    pub async fn authenticate(&self, access_token: &str) -> ServiceResult<CurrentUser> {
        let claims = self
            .jwt
            .validate(access_token, TokenKind::Access, Utc::now())?;
        let user_id: UserId = claims.sub.parse().map_err(|_| ServiceError::Credentials)?;
        let user = self
            .store
            .get_user(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::Credentials)?;
        let principal = self.principal(&user).await?;
        Ok(CurrentUser { user, principal })
    }

    /// Mark the token's account verified. Verifying twice is not an error.
    pub async fn verify_email(&self, token: &str) -> ServiceResult<()> {
        let invalid = || ServiceError::BadRequest(INVALID_VERIFICATION_TOKEN.into());
        let claims = self
            .jwt
            .validate(token, TokenKind::EmailVerification, Utc::now())
            .map_err(|_| invalid())?;
        let user = self
            .store
            .find_user_by_email(&claims.sub)
            .await?
            .ok_or_else(invalid)?;
        if !self.store.mark_verified(user.id, Utc::now()).await? {
            return Ok(());
        }
        info!(user_id = %user.id, "email verified");

        if let Err(err) = self.mailer.send_welcome(&user.email, &user.display_name()).await {
            warn!(user_id = %user.id, error = %err, "welcome email not sent");
        }
        Ok(())
    }

    /// Issue a fresh verification token for an unverified account.
    ///
    /// Unknown and already verified addresses succeed silently.
    pub async fn resend_verification(&self, email: &str) -> ServiceResult<()> {
        let Some(user) = self.find_by_submitted_email(email).await? else {
            return Ok(());
        };
        if user.is_verified {
            return Ok(());
        }

        let now = Utc::now();
        let token = self
            .jwt
            .issue(TokenKind::EmailVerification, &user.email, None, now)?
            .token;
        self.store.set_verification_token(user.id, &token, now).await?;

        if let Err(err) = self
            .mailer
            .send_verification(&user.email, &user.display_name(), &token)
            .await
        {
            warn!(user_id = %user.id, error = %err, "verification email not sent");
        }
        Ok(())
    }

    /// Store a password reset token on the account and email it.
    ///
    /// Unknown addresses succeed silently.
    pub async fn forgot_password(&self, email: &str) -> ServiceResult<()> {
        let Some(user) = self.find_by_submitted_email(email).await? else {
            return Ok(());
        };

        let issued = self
            .jwt
            .issue(TokenKind::PasswordReset, &user.email, None, Utc::now())?;
        self.store
            .set_password_reset(user.id, &issued.token, issued.expires_at)
            .await?;
        info!(user_id = %user.id, "password reset requested");

        if let Err(err) = self
            .mailer
            .send_password_reset(&user.email, &user.display_name(), &issued.token)
            .await
        {
            warn!(user_id = %user.id, error = %err, "password reset email not sent");
        }
        Ok(())
    }

    /// Set a new password from a reset token. The token is single-use.
    pub async fn reset_password(&self, reset: PasswordReset) -> ServiceResult<()> {
        let reset = reset.validated()?;
        let now = Utc::now();
        let invalid = || ServiceError::BadRequest(INVALID_RESET_TOKEN.into());

        let claims = self
            .jwt
            .validate(&reset.token, TokenKind::PasswordReset, now)
            .map_err(|_| invalid())?;
        let user = self
            .store
            .find_user_by_email(&claims.sub)
            .await?
            .filter(|u| u.reset_token_matches(&reset.token, now))
            .ok_or_else(invalid)?;

        let hashed = hash_password(&reset.new_password)?;
        // The token is checked again by the write, so only one reset can use it.
        if !self
            .store
            .consume_password_reset(user.id, &reset.token, &hashed, now)
            .await?
        {
            return Err(invalid());
        }
        info!(user_id = %user.id, "password reset");

        self.notify_password_changed(&user).await;
        Ok(())
    }

    pub async fn change_password(&self, user: &User, change: PasswordChange) -> ServiceResult<()> {
        let change = change.validated()?;
        if !verify_password(&change.current_password, &user.hashed_password) {
            return Err(ServiceError::Unauthorized("Current password is incorrect".into()));
        }

        let hashed = hash_password(&change.new_password)?;
        self.store.set_password(user.id, &hashed, Utc::now()).await?;
        info!(user_id = %user.id, "password changed");

        self.notify_password_changed(user).await;
        Ok(())
    }

    fn token_pair(&self, user: &User) -> ServiceResult<TokenResponse> {
        let now = Utc::now();
        let subject = user.id.to_string();
        let access = self
            .jwt
            .issue(TokenKind::Access, &subject, Some(&user.email), now)?;
        let refresh = self
            .jwt
            .issue(TokenKind::Refresh, &subject, Some(&user.email), now)?;
        Ok(TokenResponse {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "bearer",
            expires_in: self.jwt.settings().access_ttl.num_seconds(),
        })
    }

    /// Lookup for endpoints that must not reveal whether an address is registered.
    async fn find_by_submitted_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let Ok(email) = validate::email(email) else {
            return Ok(None);
        };
        Ok(self.store.find_user_by_email(&email).await?)
    }

    async fn notify_password_changed(&self, user: &User) {
        if let Err(err) = self
            .mailer
            .send_password_changed(&user.email, &user.display_name())
            .await
        {
            warn!(user_id = %user.id, error = %err, "password changed email not sent");
        }
    }

    pub(super) async fn ensure_email_free(&self, email: &str) -> ServiceResult<()> {
        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(ServiceError::Conflict(EMAIL_TAKEN.into()));
        }
        Ok(())
    }

    pub(super) async fn ensure_username_free(&self, username: &str) -> ServiceResult<()> {
        if self.store.find_user_by_username(username).await?.is_some() {
            return Err(ServiceError::Conflict(USERNAME_TAKEN.into()));
        }
        Ok(())
    }
}
