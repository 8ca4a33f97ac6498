use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Purpose a token was minted for.
///
/// A token is only accepted where its kind is expected: a refresh token cannot
/// authenticate a request and an access token cannot be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims carried by every token.
///
/// `sub` is the user id for access/refresh tokens and the email address for
/// verification/reset tokens. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("wrong token type: expected {expected}, got {actual}")]
    WrongKind { expected: TokenKind, actual: TokenKind },

    #[error("malformed or tampered token: {0}")]
    Malformed(String),

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Deterministically validate the time window and purpose of decoded claims.
///
/// Signature verification happens before this, in [`crate::jwt`].
pub fn validate_claims(
    claims: &Claims,
    expected: TokenKind,
    now: DateTime<Utc>,
) -> Result<(), TokenError> {
    if claims.exp <= claims.iat {
        return Err(TokenError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenError::Expired);
    }
    if claims.typ != expected {
        return Err(TokenError::WrongKind {
            expected,
            actual: claims.typ,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(kind: TokenKind, iat: DateTime<Utc>, ttl: Duration) -> Claims {
        Claims {
            sub: "subject".into(),
            email: None,
            typ: kind,
            iat: iat.timestamp(),
            exp: (iat + ttl).timestamp(),
            jti: "jti".into(),
        }
    }

    #[test]
    fn accepts_token_inside_window() {
        let now = Utc::now();
        let c = claims(TokenKind::Access, now - Duration::minutes(1), Duration::minutes(30));
        assert_eq!(validate_claims(&c, TokenKind::Access, now), Ok(()));
    }

    #[test]
    fn rejects_expired_and_future_tokens() {
        let now = Utc::now();
        let old = claims(TokenKind::Access, now - Duration::hours(2), Duration::minutes(30));
        assert_eq!(validate_claims(&old, TokenKind::Access, now), Err(TokenError::Expired));

        let future = claims(TokenKind::Access, now + Duration::hours(1), Duration::minutes(30));
        assert_eq!(
            validate_claims(&future, TokenKind::Access, now),
            Err(TokenError::NotYetValid)
        );
    }

    #[test]
    fn rejects_kind_mismatch() {
        let now = Utc::now();
        let c = claims(TokenKind::Access, now, Duration::minutes(30));
        assert!(matches!(
            validate_claims(&c, TokenKind::Refresh, now),
            Err(TokenError::WrongKind { .. })
        ));
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&TokenKind::EmailVerification).unwrap();
        assert_eq!(json, "\"email_verification\"");
    }
}
