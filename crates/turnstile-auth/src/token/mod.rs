//! Bearer token issuance, verification and extraction.
//!
//! Tokens are HS256-signed JWTs carrying a [`Principal`] snapshot. They are
//! stateless; explicit invalidation goes through the revocation store.

pub mod extract;
pub mod jwt;

use serde::{Deserialize, Serialize};

use crate::types::Principal;

pub use extract::extract_token;
pub use jwt::TokenCodec;

// ============================================================================
// Errors
// ============================================================================

/// Token issuance and verification errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is structurally invalid or lacks required claims.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// The signature does not verify or the algorithm is not accepted.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token's `exp` is in the past.
    #[error("Token has expired")]
    Expired,

    /// The token's `nbf` is in the future.
    #[error("Token is not yet valid")]
    NotYetValid,

    /// The token was issued by someone else.
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// A token was requested with a zero lifetime.
    #[error("Token lifetime must be greater than zero")]
    InvalidLifetime,

    /// Signing failed.
    #[error("Token encoding failed: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },
}

impl TokenError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            _ => Self::malformed(err.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal identifier.
    pub user_id: u64,

    /// Principal login name.
    pub username: String,

    /// Principal email.
    pub email: String,

    /// Principal role.
    pub role: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration (Unix timestamp).
    pub exp: i64,

    /// Not before (Unix timestamp).
    pub nbf: i64,

    /// Issuer.
    pub iss: String,

    /// Subject; the principal's email.
    pub sub: String,

    /// Unique token identifier.
    pub jti: String,
}

impl TokenClaims {
    /// Seconds of lifetime left at `now`, clamped at zero.
    #[must_use]
    pub fn remaining_secs(&self, now: i64) -> u64 {
        u64::try_from(self.exp - now).unwrap_or(0)
    }

    /// Returns `true` if the token is expired at `now`. A token is still
    /// valid during its `exp` second.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp < now
    }

    /// Extracts the embedded principal.
    #[must_use]
    pub fn into_principal(self) -> Principal {
        Principal {
            id: self.user_id,
            username: self.username,
            email: self.email,
            role: self.role,
        }
    }
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    /// The signed token.
    pub token: String,

    /// Token identifier.
    pub jti: String,

    /// Expiration (Unix timestamp).
    pub expires_at: i64,

    /// Lifetime in seconds.
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: i64) -> TokenClaims {
        TokenClaims {
            user_id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: "user".to_string(),
            iat: 1_000,
            exp,
            nbf: 1_000,
            iss: "turnstile".to_string(),
            sub: "alice@example.com".to_string(),
            jti: "jti-1".to_string(),
        }
    }

    #[test]
    fn test_remaining_secs() {
        let claims = claims(2_000);
        assert_eq!(claims.remaining_secs(1_500), 500);
        assert_eq!(claims.remaining_secs(2_500), 0);
        assert!(claims.is_expired_at(2_001));
        assert!(!claims.is_expired_at(2_000));
        assert!(!claims.is_expired_at(1_999));
    }

    #[test]
    fn test_into_principal() {
        let principal = claims(2_000).into_principal();
        assert_eq!(principal.id, 7);
        assert_eq!(principal.email, "alice@example.com");
        assert_eq!(principal.role, "user");
    }
}
