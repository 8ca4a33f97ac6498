//! Field validators for user, role and permission input.
//!
//! Each validator returns `DomainError::Validation` naming the offending field.

use crate::error::{DomainError, DomainResult};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Trim and lowercase an email, then check its `local@domain.tld` shape.
pub fn email(raw: &str) -> DomainResult<String> {
    let normalized = raw.trim().to_lowercase();
    let invalid = || DomainError::validation("email: value is not a valid email address");

    let (local, domain) = normalized.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || normalized.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.len() < 2 || host.starts_with('.') || host.ends_with('.') {
        return Err(invalid());
    }
    if domain.split('.').any(str::is_empty) {
        return Err(invalid());
    }
    Ok(normalized)
}

/// 3-50 characters of letters, digits, `_` and `-`.
pub fn username(value: &str) -> DomainResult<()> {
    let len = value.chars().count();
    if !(3..=50).contains(&len) {
        return Err(DomainError::validation(
            "username: must be between 3 and 50 characters",
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DomainError::validation(
            "username: can only contain letters, numbers, underscores, and hyphens",
        ));
    }
    Ok(())
}

pub fn password(value: &str) -> DomainResult<()> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password: must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Permission codename such as `user.read`.
pub fn codename(value: &str) -> DomainResult<()> {
    bounded("codename", value, 1, 100)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err(DomainError::validation(
            "codename: can only contain letters, numbers, dots, and underscores",
        ));
    }
    Ok(())
}

/// Resource or action segment of a permission.
pub fn identifier(field: &'static str, value: &str) -> DomainResult<()> {
    bounded(field, value, 1, 50)?;
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DomainError::validation(format!(
            "{field}: can only contain letters, numbers, and underscores"
        )));
    }
    Ok(())
}

pub fn role_name(value: &str) -> DomainResult<()> {
    bounded("name", value, 1, 50)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
    {
        return Err(DomainError::validation(
            "name: can only contain letters, numbers, spaces, underscores, and hyphens",
        ));
    }
    Ok(())
}

/// Length check in characters, inclusive on both ends.
pub fn bounded(field: &'static str, value: &str, min: usize, max: usize) -> DomainResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(DomainError::validation(format!(
            "{field}: must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

pub fn max_len(field: &'static str, value: Option<&str>, max: usize) -> DomainResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(DomainError::validation(format!(
            "{field}: must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}
