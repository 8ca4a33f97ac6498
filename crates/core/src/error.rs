use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejection of a command by domain rules.
///
/// Messages are user-facing and start with the offending field where there is
/// one (`"email: value is not a valid email address"`). Lookups, uniqueness and
/// storage failures are reported by the layers that perform them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    /// The record exists but may not be changed this way (e.g. a system role).
    #[error("{0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_passed_through_verbatim() {
        assert_eq!(
            DomainError::validation("password: too short").to_string(),
            "password: too short"
        );
        assert_eq!(
            DomainError::invariant("Cannot modify system roles").to_string(),
            "Cannot modify system roles"
        );
        assert_eq!(DomainError::invalid_id("x").to_string(), "invalid identifier: x");
    }
}
