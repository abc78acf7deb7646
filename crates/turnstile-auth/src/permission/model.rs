//! Permission strings and wildcard matching.
//!
//! A permission has the string form `resource:action[:scope]`:
//!
//! ```text
//! article:create         create any article
//! article:delete:own     delete articles the caller owns
//! article:update:*       update articles in any scope (own still checks owner)
//! file:*                 any action on files
//! *:*                    everything
//! ```
//!
//! `*` matches any value at its own position only; `art*` is a literal, not
//! a prefix pattern.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Wildcard token.
pub const WILDCARD: &str = "*";

// ============================================================================
// Errors
// ============================================================================

/// Errors parsing a permission string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionParseError {
    /// Wrong number of `:`-separated parts.
    #[error("Permission '{0}' must have the form resource:action[:scope]")]
    InvalidFormat(String),

    /// A part was empty.
    #[error("Permission '{0}' has an empty component")]
    EmptyComponent(String),

    /// The scope is not `own`, `all` or `*`.
    #[error("Unknown permission scope '{0}'")]
    UnknownScope(String),
}

// ============================================================================
// Scope
// ============================================================================

/// Restriction on which resource instances a permission covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Only instances owned by the caller.
    Own,
    /// Every instance.
    All,
    /// Wildcard; matches any required scope.
    Any,
}

impl Scope {
    /// Returns the string representation of the scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::All => "all",
            Self::Any => WILDCARD,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scope {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "own" => Ok(Self::Own),
            "all" => Ok(Self::All),
            WILDCARD => Ok(Self::Any),
            other => Err(PermissionParseError::UnknownScope(other.to_string())),
        }
    }
}

// ============================================================================
// Permission
// ============================================================================

/// A single `resource:action[:scope]` grant or requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    /// Resource type, or `*`.
    pub resource: String,
    /// Action, or `*`.
    pub action: String,
    /// Optional scope.
    pub scope: Option<Scope>,
}

impl Permission {
    /// Creates an unscoped permission.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            scope: None,
        }
    }

    /// Returns this permission restricted to `scope`.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Returns `true` if this is `own`-scoped.
    #[must_use]
    pub fn is_own_scoped(&self) -> bool {
        self.scope == Some(Scope::Own)
    }

    /// Returns `true` if holding `self` satisfies `required`.
    ///
    /// Matches on exact equality, or when the held resource is `*`, or the
    /// held action is `*` on the same resource, or the held scope is `*` on
    /// the same resource and action.
    #[must_use]
    pub fn grants(&self, required: &Permission) -> bool {
        if self == required || self.resource == WILDCARD {
            return true;
        }
        if self.resource != required.resource {
            return false;
        }
        if self.action == WILDCARD {
            return true;
        }
        self.action == required.action && self.scope == Some(Scope::Any)
    }
}

/// Returns `true` if any permission in `held` grants `required`.
#[must_use]
pub fn matches(required: &Permission, held: &[Permission]) -> bool {
    held.iter().any(|p| p.grants(required))
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)?;
        if let Some(scope) = self.scope {
            write!(f, ":{scope}")?;
        }
        Ok(())
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(PermissionParseError::InvalidFormat(s.to_string()));
        }
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(PermissionParseError::EmptyComponent(s.to_string()));
        }

        let scope = parts.get(2).map(|raw| raw.parse::<Scope>()).transpose()?;
        Ok(Self {
            resource: parts[0].to_string(),
            action: parts[1].to_string(),
            scope,
        })
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}
