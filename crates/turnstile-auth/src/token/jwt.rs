//! HS256 token codec.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use turnstile_auth::{Principal, TokenCodec};
//!
//! let codec = TokenCodec::new(&config.token);
//! let principal = Principal::new(7, "alice", "alice@example.com", "user");
//!
//! let issued = codec.issue(&principal, Duration::from_secs(3600))?;
//! let claims = codec.verify(&issued.token)?;
//! assert_eq!(claims.user_id, 7);
//! ```

use std::fmt;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{IssuedToken, TokenClaims, TokenError};
use crate::config::TokenConfig;
use crate::types::Principal;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signs and verifies bearer tokens with a shared secret.
///
/// The codec holds no mutable state and can be shared freely.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    default_ttl: Duration,
    leeway: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("default_ttl", &self.default_ttl)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Creates a codec from token configuration.
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            default_ttl: config.default_ttl,
            leeway: config.leeway,
        }
    }

    /// Returns the issuer placed in and required of every token.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the lifetime used by [`issue_default`](Self::issue_default).
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the clock skew tolerated past `exp` and before `nbf`.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Issues a token for `principal` valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidLifetime` for a TTL under one second and
    /// `TokenError::Encoding` if signing fails.
    pub fn issue(&self, principal: &Principal, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(principal, ttl, OffsetDateTime::now_utc())
    }

    /// Issues a token with the configured default lifetime.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub fn issue_default(&self, principal: &Principal) -> Result<IssuedToken, TokenError> {
        self.issue(principal, self.default_ttl)
    }

    /// Issues a token as if the current time were `issued_at`.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub fn issue_at(
        &self,
        principal: &Principal,
        ttl: Duration,
        issued_at: OffsetDateTime,
    ) -> Result<IssuedToken, TokenError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| TokenError::InvalidLifetime)?;
        if ttl_secs == 0 {
            return Err(TokenError::InvalidLifetime);
        }

        let iat = issued_at.unix_timestamp();
        let claims = TokenClaims {
            user_id: principal.id,
            username: principal.username.clone(),
            email: principal.email.clone(),
            role: principal.role.clone(),
            iat,
            exp: iat + ttl_secs,
            nbf: iat,
            iss: self.issuer.clone(),
            sub: principal.email.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = self.encode(&claims)?;
        tracing::debug!(
            user_id = principal.id,
            jti = %claims.jti,
            expires_at = claims.exp,
            "Token issued"
        );

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at: claims.exp,
            expires_in: ttl.as_secs(),
        })
    }

    /// Signs arbitrary claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encoding` if signing fails.
    pub fn encode(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::encoding(e.to_string()))
    }

    /// Verifies a token's signature, issuer and validity window and returns
    /// its claims.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` for a bad signature or foreign algorithm
    /// - `Expired` when `exp` has passed
    /// - `NotYetValid` when `nbf` is in the future
    /// - `InvalidIssuer` when `iss` does not match
    /// - `Malformed` for anything else
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let validation = self.validation(true);
        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// Verifies a token but accepts it past its expiry.
    ///
    /// The signature and issuer are still checked.
    ///
    /// # Errors
    ///
    /// As [`verify`](Self::verify), minus `Expired`.
    pub fn verify_allow_expired(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let validation = self.validation(false);
        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        validation.validate_exp = validate_exp;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = self.leeway.as_secs();
        validation
    }
}
