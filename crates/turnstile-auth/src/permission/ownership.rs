//! Resource ownership lookups.
//!
//! The resolver does not know how resources are stored. Whoever owns the
//! data registers an [`OwnershipLookup`] per resource type; the resolver
//! caches answers under `owner:<resource>:<id>`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::AuthResult;

/// Answers "who owns resource instance `id`?" for one resource type.
///
/// # Example Implementation
///
/// ```ignore
/// struct ArticleOwners { db: Pool }
///
/// #[async_trait::async_trait]
/// impl OwnershipLookup for ArticleOwners {
///     async fn owner_of(&self, id: &str) -> AuthResult<Option<u64>> {
///         let row = self.db.query_opt("SELECT author_id FROM articles WHERE id = $1", &[&id]).await?;
///         Ok(row.map(|r| r.get::<_, i64>(0) as u64))
///     }
/// }
/// ```
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    /// Returns the owning principal id, or `None` if the resource is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn owner_of(&self, resource_id: &str) -> AuthResult<Option<u64>>;
}

/// In-memory ownership table.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnership {
    owners: Arc<DashMap<String, u64>>,
}

impl StaticOwnership {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `owner` as the owner of `resource_id`.
    pub fn insert(&self, resource_id: impl Into<String>, owner: u64) {
        self.owners.insert(resource_id.into(), owner);
    }

    /// Forgets `resource_id`.
    pub fn remove(&self, resource_id: &str) -> Option<u64> {
        self.owners.remove(resource_id).map(|(_, owner)| owner)
    }
}

#[async_trait]
impl OwnershipLookup for StaticOwnership {
    async fn owner_of(&self, resource_id: &str) -> AuthResult<Option<u64>> {
        Ok(self.owners.get(resource_id).map(|owner| *owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_ownership() {
        let owners = StaticOwnership::new();
        owners.insert("42", 7);

        assert_eq!(owners.owner_of("42").await.unwrap(), Some(7));
        assert_eq!(owners.owner_of("43").await.unwrap(), None);

        assert_eq!(owners.remove("42"), Some(7));
        assert_eq!(owners.owner_of("42").await.unwrap(), None);
    }
}
