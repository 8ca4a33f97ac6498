use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use authkit_core::{DomainError, DomainResult, Entity, RoleId, UserId, validate};

use crate::contains_ci;

/// A user account as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub verification_token: Option<String>,
    pub password_reset_token: Option<String>,
    pub password_reset_token_expires: Option<DateTime<Utc>>,
    pub role_ids: Vec<RoleId>,
}

impl User {
    /// A fresh, active, unverified account with no roles.
    pub fn new(email: String, hashed_password: String, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            email,
            username: None,
            hashed_password,
            first_name: None,
            last_name: None,
            phone: None,
            bio: None,
            avatar_url: None,
            is_active: true,
            is_verified: false,
            is_superuser: false,
            created_at: now,
            updated_at: None,
            last_login: None,
            verification_token: None,
            password_reset_token: None,
            password_reset_token_expires: None,
            role_ids: Vec::new(),
        }
    }

    /// "first last" when both are set, whichever one is set otherwise, else the email.
    pub fn full_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_string(),
            (None, Some(last)) => last.to_string(),
            (None, None) => self.email.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) => username.clone(),
            None => self.full_name(),
        }
    }

    /// Whether a reset token presented now matches the one on record.
    pub fn reset_token_matches(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.password_reset_token, self.password_reset_token_expires) {
            (Some(stored), Some(expires)) => stored == token && expires >= now,
            _ => false,
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn check_profile_fields(
    first_name: Option<&str>,
    last_name: Option<&str>,
    phone: Option<&str>,
    bio: Option<&str>,
) -> DomainResult<()> {
    validate::max_len("first_name", first_name, 100)?;
    validate::max_len("last_name", last_name, 100)?;
    validate::max_len("phone", phone, 20)?;
    validate::max_len("bio", bio, 500)?;
    Ok(())
}

fn check_new_password(password: &str, confirm: &str) -> DomainResult<()> {
    validate::password(password)?;
    if password != confirm {
        return Err(DomainError::validation("confirm_password: Passwords do not match"));
    }
    Ok(())
}

/// Command: self-service sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Registration {
    /// Validate fields and normalise the email.
    pub fn validated(mut self) -> DomainResult<Self> {
        self.email = validate::email(&self.email)?;
        check_new_password(&self.password, &self.confirm_password)?;
        if let Some(username) = &self.username {
            validate::username(username)?;
        }
        check_profile_fields(self.first_name.as_deref(), self.last_name.as_deref(), None, None)?;
        Ok(self)
    }
}

/// Command: administrator-created account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

fn yes() -> bool {
    true
}

impl NewUser {
    pub fn validated(mut self) -> DomainResult<Self> {
        self.email = validate::email(&self.email)?;
        check_new_password(&self.password, &self.confirm_password)?;
        if let Some(username) = &self.username {
            validate::username(username)?;
        }
        check_profile_fields(
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.phone.as_deref(),
            self.bio.as_deref(),
        )?;
        Ok(self)
    }

    /// Build the stored record; `hashed_password` is the hash of `self.password`.
    pub fn into_user(self, hashed_password: String, now: DateTime<Utc>) -> User {
        let mut user = User::new(self.email, hashed_password, now);
        user.username = self.username;
        user.first_name = self.first_name;
        user.last_name = self.last_name;
        user.phone = self.phone;
        user.bio = self.bio;
        user.is_active = self.is_active;
        user.is_verified = self.is_verified;
        user.is_superuser = self.is_superuser;
        user
    }
}

impl From<Registration> for NewUser {
    fn from(r: Registration) -> Self {
        Self {
            email: r.email,
            password: r.password,
            confirm_password: r.confirm_password,
            username: r.username,
            first_name: r.first_name,
            last_name: r.last_name,
            phone: None,
            bio: None,
            is_active: true,
            is_verified: false,
            is_superuser: false,
        }
    }
}

/// Command: partial profile change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn validated(mut self) -> DomainResult<Self> {
        if let Some(email) = &self.email {
            self.email = Some(validate::email(email)?);
        }
        if let Some(username) = &self.username {
            validate::username(username)?;
        }
        check_profile_fields(
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.phone.as_deref(),
            self.bio.as_deref(),
        )?;
        validate::max_len("avatar_url", self.avatar_url.as_deref(), 500)?;
        Ok(self)
    }

    /// New email, if it differs from the current one.
    pub fn email_change<'a>(&'a self, user: &User) -> Option<&'a str> {
        self.email.as_deref().filter(|e| *e != user.email)
    }

    /// New username, if it differs from the current one.
    pub fn username_change<'a>(&'a self, user: &User) -> Option<&'a str> {
        self.username
            .as_deref()
            .filter(|u| user.username.as_deref() != Some(*u))
    }

    pub fn apply(self, user: &mut User, now: DateTime<Utc>) {
        if let Some(v) = self.email {
            user.email = v;
        }
        if let Some(v) = self.username {
            user.username = Some(v);
        }
        if let Some(v) = self.first_name {
            user.first_name = Some(v);
        }
        if let Some(v) = self.last_name {
            user.last_name = Some(v);
        }
        if let Some(v) = self.phone {
            user.phone = Some(v);
        }
        if let Some(v) = self.bio {
            user.bio = Some(v);
        }
        if let Some(v) = self.avatar_url {
            user.avatar_url = Some(v);
        }
        user.updated_at = Some(now);
    }
}

/// Command: administrator edit, which may also flip account flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AdminUserUpdate {
    #[serde(flatten)]
    pub profile: ProfileUpdate,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub is_superuser: Option<bool>,
}

impl AdminUserUpdate {
    pub fn validated(mut self) -> DomainResult<Self> {
        self.profile = self.profile.validated()?;
        Ok(self)
    }

    pub fn apply(self, user: &mut User, now: DateTime<Utc>) {
        if let Some(v) = self.is_active {
            user.is_active = v;
        }
        if let Some(v) = self.is_verified {
            user.is_verified = v;
        }
        if let Some(v) = self.is_superuser {
            user.is_superuser = v;
        }
        self.profile.apply(user, now);
    }
}

/// Command: authenticated password change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn validated(self) -> DomainResult<Self> {
        check_new_password(&self.new_password, &self.confirm_password)?;
        Ok(self)
    }
}

/// Command: password reset through an emailed token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PasswordReset {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordReset {
    pub fn validated(self) -> DomainResult<Self> {
        check_new_password(&self.new_password, &self.confirm_password)?;
        Ok(self)
    }
}

/// List filter for users; every `Some` criterion must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_superuser: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(term) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let hit = contains_ci(Some(&user.email), term)
                || contains_ci(user.username.as_deref(), term)
                || contains_ci(user.first_name.as_deref(), term)
                || contains_ci(user.last_name.as_deref(), term);
            if !hit {
                return false;
            }
        }
        self.is_active.is_none_or(|v| user.is_active == v)
            && self.is_verified.is_none_or(|v| user.is_verified == v)
            && self.is_superuser.is_none_or(|v| user.is_superuser == v)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total_users: u64,
    pub active_users: u64,
    pub verified_users: u64,
    pub superusers: u64,
}
