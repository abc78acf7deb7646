//! Permission model and resolution.
//!
//! - [`model`] - `resource:action[:scope]` permissions and wildcard matching
//! - [`roles`] - built-in role defaults and overrides
//! - [`ownership`] - per-resource owner lookups
//! - [`resolver`] - cached effective permissions and the access check

pub mod model;
pub mod ownership;
pub mod resolver;
pub mod roles;

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Principal;

pub use model::{Permission, PermissionParseError, Scope, matches};
pub use ownership::{OwnershipLookup, StaticOwnership};
pub use resolver::PermissionResolver;
pub use roles::RoleTable;

/// Source of a principal's effective permissions.
///
/// [`RoleTable`] is the default. Implement this to layer per-user grants on
/// top of role defaults.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Computes the permission set for `principal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn permissions_for(&self, principal: &Principal) -> AuthResult<Vec<Permission>>;
}
