//! Cache-backed token revocation.
//!
//! Tokens are stateless, so revoking one means remembering its JTI until the
//! token would have expired anyway. Each revoked JTI is stored under
//! `blacklist:<jti>` with a TTL equal to the token's remaining lifetime plus
//! the codec's leeway, so the entry outlives every moment at which the token
//! could still verify and the blacklist never outgrows the set of
//! still-valid tokens.
//!
//! # Security Considerations
//!
//! - Lookups fail closed: if the cache cannot answer, the token is treated
//!   as revoked.
//! - Tokens that are already expired are never written; they cannot be used
//!   anyway.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::cache::Cache;
use crate::error::AuthError;
use crate::token::{IssuedToken, TokenClaims, TokenCodec, TokenError};

const BLACKLIST_PREFIX: &str = "blacklist:";
const REVOKED_MARKER: &str = "1";

/// Cache key of the blacklist entry for a JTI.
#[must_use]
pub fn blacklist_key(jti: &str) -> String {
    format!("{BLACKLIST_PREFIX}{jti}")
}

/// Blacklist of revoked token identifiers.
#[derive(Clone)]
pub struct RevocationStore {
    codec: Arc<TokenCodec>,
    cache: Arc<dyn Cache>,
    refresh_window: Duration,
}

impl std::fmt::Debug for RevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationStore")
            .field("refresh_window", &self.refresh_window)
            .finish_non_exhaustive()
    }
}

impl RevocationStore {
    /// Creates a store.
    ///
    /// `refresh_window` is the remaining lifetime below which a token may be
    /// refreshed.
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>, cache: Arc<dyn Cache>, refresh_window: Duration) -> Self {
        Self {
            codec,
            cache,
            refresh_window,
        }
    }

    /// Revokes a token.
    ///
    /// An already-expired token is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns the verification error for any other invalid token, or a
    /// cache error if the blacklist entry cannot be written.
    pub async fn revoke(&self, token: &str) -> AuthResult<()> {
        match self.codec.verify(token) {
            Ok(claims) => self.revoke_claims(&claims).await,
            Err(TokenError::Expired) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Revokes a token whose claims have already been verified.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the blacklist entry cannot be written.
    pub async fn revoke_claims(&self, claims: &TokenClaims) -> AuthResult<()> {
        let leeway = i64::try_from(self.codec.leeway().as_secs()).unwrap_or(i64::MAX);
        let valid_until = claims.exp.saturating_add(leeway);
        let remaining =
            u64::try_from(valid_until - OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0);
        if remaining == 0 {
            tracing::debug!(jti = %claims.jti, "Token already expired, nothing to revoke");
            return Ok(());
        }

        self.cache
            .set(
                &blacklist_key(&claims.jti),
                REVOKED_MARKER,
                Some(Duration::from_secs(remaining)),
            )
            .await?;

        tracing::info!(
            jti = %claims.jti,
            user_id = claims.user_id,
            ttl_secs = remaining,
            "Token revoked"
        );
        Ok(())
    }

    /// Returns `true` if the token is revoked or cannot be verified.
    pub async fn is_revoked(&self, token: &str) -> bool {
        match self.codec.verify(token) {
            Ok(claims) => self.is_jti_revoked(&claims.jti).await,
            Err(e) => {
                tracing::debug!(error = %e, "Unverifiable token treated as revoked");
                true
            }
        }
    }

    /// Returns `true` if the JTI is blacklisted or the cache cannot answer.
    pub async fn is_jti_revoked(&self, jti: &str) -> bool {
        match self.cache.exists(&[&blacklist_key(jti)]).await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(jti = %jti, error = %e, "Revocation lookup failed, denying token");
                true
            }
        }
    }

    /// Exchanges a token close to expiry for a fresh one.
    ///
    /// The new token carries the same principal and the default lifetime;
    /// the presented token is revoked afterwards.
    ///
    /// # Errors
    ///
    /// - Verification errors for an invalid or expired token
    /// - `AuthError::TokenRevoked` if the token was already revoked
    /// - `AuthError::RefreshNotEligible` if more than the refresh window remains
    pub async fn refresh(&self, token: &str) -> AuthResult<IssuedToken> {
        let claims = self.codec.verify(token)?;

        if self.is_jti_revoked(&claims.jti).await {
            return Err(AuthError::TokenRevoked);
        }

        let remaining = claims.remaining_secs(OffsetDateTime::now_utc().unix_timestamp());
        if remaining > self.refresh_window.as_secs() {
            tracing::debug!(
                jti = %claims.jti,
                remaining_secs = remaining,
                "Refresh requested too early"
            );
            return Err(AuthError::RefreshNotEligible);
        }

        let principal = claims.clone().into_principal();
        let issued = self.codec.issue_default(&principal)?;
        self.revoke_claims(&claims).await?;

        tracing::info!(
            user_id = principal.id,
            old_jti = %claims.jti,
            new_jti = %issued.jti,
            "Token refreshed"
        );
        Ok(issued)
    }
}
