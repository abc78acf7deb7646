//! Principal and request identity types.

use serde::{Deserialize, Serialize};

use crate::token::TokenClaims;

/// Role required by admin routes.
pub const ADMIN_ROLE: &str = "admin";

/// Admin role that is also exempt from the admin rate limit by default.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

// =============================================================================
// Principal
// =============================================================================

/// The authenticated party a token was issued to.
///
/// This is a snapshot taken at issuance time; later changes to the
/// underlying user record are not reflected until a new token is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier.
    pub id: u64,

    /// Login name.
    pub username: String,

    /// Email address, also used as the token subject.
    pub email: String,

    /// Role name, e.g. `"user"` or `"admin"`.
    pub role: String,
}

impl Principal {
    /// Creates a new principal.
    #[must_use]
    pub fn new(
        id: u64,
        username: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
            role: role.into(),
        }
    }

    /// Returns `true` for admin roles, which bypass permission and
    /// ownership checks.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE || self.role == SUPER_ADMIN_ROLE
    }

    /// Returns `true` if the principal holds the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Authenticated request identity.
///
/// Inserted into request extensions by the authentication stages and read by
/// downstream handlers through `CurrentIdentity` / `MaybeIdentity`.
#[derive(Debug, Clone)]
pub struct Identity {
    /// The principal embedded in the token.
    pub principal: Principal,

    /// The raw bearer token as presented.
    pub token: String,

    /// Token identifier.
    pub jti: String,

    /// Token expiry (Unix timestamp).
    pub expires_at: i64,
}

impl Identity {
    /// Builds an identity from verified claims and the raw token.
    #[must_use]
    pub fn from_claims(claims: TokenClaims, token: impl Into<String>) -> Self {
        let expires_at = claims.exp;
        let jti = claims.jti.clone();
        Self {
            principal: claims.into_principal(),
            token: token.into(),
            jti,
            expires_at,
        }
    }

    /// Principal identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.principal.id
    }

    /// Principal role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.principal.role
    }

    /// Returns `true` if the principal holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.principal.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_roles() {
        let admin = Principal::new(1, "root", "root@example.com", "admin");
        let root = Principal::new(2, "root2", "root2@example.com", "super_admin");
        let user = Principal::new(7, "alice", "alice@example.com", "user");

        assert!(admin.is_admin());
        assert!(root.is_admin());
        assert!(!user.is_admin());
        assert!(user.has_role("user"));
        assert!(!user.has_role("editor"));
    }
}
