//! Authentication and authorization error types.
//!
//! Every stage of the pipeline reports failures through [`AuthError`]. The
//! variant decides the HTTP status; see `middleware::error` for the response
//! envelope.

use axum::http::StatusCode;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::token::TokenError;

/// Errors that can occur while authenticating, authorizing or throttling a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credentials were presented.
    #[error("Authentication required")]
    MissingToken,

    /// The token is malformed, has a bad signature or a foreign issuer.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The token has expired.
    #[error("Token has expired")]
    TokenExpired,

    /// The token has been explicitly revoked.
    #[error("Token has been revoked")]
    TokenRevoked,

    /// The authenticated principal may not perform the action.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The caller exhausted its request budget for the current window.
    #[error("Rate limit exceeded, retry in {retry_after}s")]
    RateLimitExceeded {
        /// Seconds until the current window resets.
        retry_after: u64,
        /// Window limit, echoed in response headers.
        limit: u32,
        /// Unix timestamp at which the window resets.
        reset_at: i64,
    },

    /// The handler did not complete before the configured deadline.
    #[error("Request timed out")]
    RequestTimeout,

    /// The token still has too much lifetime left to be refreshed.
    #[error("Token is not eligible for refresh yet")]
    RefreshNotEligible,

    /// The shared cache failed.
    #[error("Cache error: {message}")]
    Cache {
        /// Description of the cache failure.
        message: String,
    },

    /// The pipeline configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `Cache` error.
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error means the caller is not authenticated.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::InvalidToken { .. } | Self::TokenExpired | Self::TokenRevoked
        )
    }

    /// Returns `true` if this error means the caller is authenticated but not allowed.
    #[must_use]
    pub fn is_authorization_error(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Cache { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::InvalidToken { .. }
            | Self::TokenExpired
            | Self::TokenRevoked => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::RefreshNotEligible => StatusCode::BAD_REQUEST,
            Self::Cache { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable error code used in the response envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "unauthorized",
            Self::InvalidToken { .. } => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::TokenRevoked => "token_revoked",
            Self::Forbidden { .. } => "forbidden",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::RequestTimeout => "request_timeout",
            Self::RefreshNotEligible => "refresh_not_eligible",
            Self::Cache { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "internal_error"
            }
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::Encoding { message } => Self::internal(message),
            TokenError::InvalidLifetime => Self::internal(err.to_string()),
            other => Self::invalid_token(other.to_string()),
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        Self::cache(err.to_string())
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::MissingToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TokenRevoked.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::forbidden("nope").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::RateLimitExceeded {
                retry_after: 3,
                limit: 5,
                reset_at: 0
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::RequestTimeout.status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            AuthError::cache("down").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_categories() {
        assert!(AuthError::TokenExpired.is_authentication_error());
        assert!(!AuthError::TokenExpired.is_authorization_error());
        assert!(AuthError::forbidden("x").is_authorization_error());
        assert!(AuthError::internal("x").is_server_error());
        assert!(!AuthError::RequestTimeout.is_server_error());
    }

    #[test]
    fn test_token_error_conversion() {
        assert!(matches!(
            AuthError::from(TokenError::Expired),
            AuthError::TokenExpired
        ));
        assert!(matches!(
            AuthError::from(TokenError::InvalidSignature),
            AuthError::InvalidToken { .. }
        ));
        assert!(matches!(
            AuthError::from(TokenError::encoding("boom")),
            AuthError::Internal { .. }
        ));
    }

    #[test]
    fn test_revoked_message() {
        assert_eq!(AuthError::TokenRevoked.to_string(), "Token has been revoked");
    }
}
