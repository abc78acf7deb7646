//! Effective permission resolution and access checks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::model::Permission;
use super::ownership::OwnershipLookup;
use super::roles::RoleTable;
use super::PermissionSource;
use crate::AuthResult;
use crate::cache::Cache;
use crate::config::PermissionConfig;
use crate::error::AuthError;
use crate::types::{Identity, Principal};

/// Cache key of a principal's effective permission set.
#[must_use]
pub fn permissions_key(principal_id: u64) -> String {
    format!("permissions:{principal_id}")
}

/// Cache key of a resource instance's owner.
#[must_use]
pub fn owner_key(resource: &str, resource_id: &str) -> String {
    format!("owner:{resource}:{resource_id}")
}

/// Resolves and checks permissions.
///
/// Effective permission sets are read through the cache; ownership answers
/// come from the cache first and then from the lookup registered for the
/// resource type.
#[derive(Clone)]
pub struct PermissionResolver {
    cache: Arc<dyn Cache>,
    source: Arc<dyn PermissionSource>,
    ownership: HashMap<String, Arc<dyn OwnershipLookup>>,
    cache_ttl: Duration,
    ownership_cache_ttl: Duration,
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut resources: Vec<&String> = self.ownership.keys().collect();
        resources.sort();
        f.debug_struct("PermissionResolver")
            .field("ownership", &resources)
            .field("cache_ttl", &self.cache_ttl)
            .field("ownership_cache_ttl", &self.ownership_cache_ttl)
            .finish_non_exhaustive()
    }
}

impl PermissionResolver {
    /// Creates a resolver backed by the built-in role table.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, config: &PermissionConfig, roles: RoleTable) -> Self {
        Self {
            cache,
            source: Arc::new(roles),
            ownership: HashMap::new(),
            cache_ttl: config.cache_ttl,
            ownership_cache_ttl: config.ownership_cache_ttl,
        }
    }

    /// Replaces the permission source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn PermissionSource>) -> Self {
        self.source = source;
        self
    }

    /// Registers the ownership lookup for a resource type.
    #[must_use]
    pub fn with_ownership(
        mut self,
        resource: impl Into<String>,
        lookup: Arc<dyn OwnershipLookup>,
    ) -> Self {
        self.ownership.insert(resource.into(), lookup);
        self
    }

    /// Effective permissions of `principal`.
    ///
    /// Cache failures are logged and the set is computed directly.
    ///
    /// # Errors
    ///
    /// Returns an error only if the permission source fails.
    pub async fn effective_permissions(&self, principal: &Principal) -> AuthResult<Vec<Permission>> {
        let key = permissions_key(principal.id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Permission>>(&raw) {
                Ok(perms) => return Ok(perms),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding unreadable permission cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Permission cache read failed");
            }
        }

        let perms = self.source.permissions_for(principal).await?;

        match serde_json::to_string(&perms) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, Some(self.cache_ttl)).await {
                    tracing::warn!(key = %key, error = %e, "Permission cache write failed");
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Permission set not serializable");
            }
        }

        Ok(perms)
    }

    /// Returns `true` if `principal` holds a permission matching `required`.
    ///
    /// Ownership is not checked.
    ///
    /// # Errors
    ///
    /// Returns an error if the permission source fails.
    pub async fn has_permission(
        &self,
        principal: &Principal,
        required: &Permission,
    ) -> AuthResult<bool> {
        if principal.is_admin() {
            return Ok(true);
        }
        let held = self.effective_permissions(principal).await?;
        Ok(super::model::matches(required, &held))
    }

    /// Checks that `identity` may perform `required`, on `resource_id` when
    /// given.
    ///
    /// Admins pass unconditionally. For everyone else an `own`-scoped
    /// requirement also requires the caller to own the resource, whatever
    /// grant matched; any missing piece of ownership data denies.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` when access is denied.
    pub async fn check(
        &self,
        identity: &Identity,
        required: &Permission,
        resource_id: Option<&str>,
    ) -> AuthResult<()> {
        let principal = &identity.principal;
        if principal.is_admin() {
            return Ok(());
        }

        let held = self.effective_permissions(principal).await?;
        if !held.iter().any(|p| p.grants(required)) {
            tracing::debug!(
                user_id = principal.id,
                role = %principal.role,
                required = %required,
                "Permission denied"
            );
            return Err(AuthError::forbidden(format!("Missing permission {required}")));
        }

        // Only admins skip ownership; wildcard grants still need it.
        if !required.is_own_scoped() {
            return Ok(());
        }

        let Some(resource_id) = resource_id else {
            tracing::debug!(required = %required, "Ownership check without resource id");
            return Err(AuthError::forbidden("Resource identifier required"));
        };

        match self.owner_of(&required.resource, resource_id).await {
            Ok(Some(owner)) if owner == principal.id => Ok(()),
            Ok(_) => {
                tracing::debug!(
                    user_id = principal.id,
                    resource = %required.resource,
                    resource_id = %resource_id,
                    "Ownership denied"
                );
                Err(AuthError::forbidden(format!(
                    "Not the owner of {} {resource_id}",
                    required.resource
                )))
            }
            Err(e) => {
                tracing::warn!(
                    resource = %required.resource,
                    resource_id = %resource_id,
                    error = %e,
                    "Ownership lookup failed"
                );
                Err(AuthError::forbidden("Ownership could not be verified"))
            }
        }
    }

    /// Owner of a resource instance.
    ///
    /// Reads `owner:<resource>:<id>` first. On a miss, asks the registered
    /// lookup and caches a positive answer. Returns `None` when the resource
    /// type has no lookup or the lookup does not know the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn owner_of(&self, resource: &str, resource_id: &str) -> AuthResult<Option<u64>> {
        let key = owner_key(resource, resource_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match raw.parse::<u64>() {
                Ok(owner) => return Ok(Some(owner)),
                Err(_) => {
                    tracing::warn!(key = %key, value = %raw, "Ignoring malformed owner cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Owner cache read failed");
            }
        }

        let Some(lookup) = self.ownership.get(resource) else {
            tracing::debug!(resource = %resource, "No ownership lookup registered");
            return Ok(None);
        };

        let owner = lookup.owner_of(resource_id).await?;
        if let Some(owner) = owner {
            self.cache_owner(resource, resource_id, owner).await;
        }
        Ok(owner)
    }

    /// Primes the owner cache, e.g. right after a resource is created.
    pub async fn cache_owner(&self, resource: &str, resource_id: &str, owner: u64) {
        let key = owner_key(resource, resource_id);
        if let Err(e) = self
            .cache
            .set(&key, &owner.to_string(), Some(self.ownership_cache_ttl))
            .await
        {
            tracing::warn!(key = %key, error = %e, "Owner cache write failed");
        }
    }

    /// Drops the cached permission set of a principal.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the entry cannot be deleted.
    pub async fn clear_cache(&self, principal_id: u64) -> AuthResult<()> {
        self.cache.del(&[&permissions_key(principal_id)]).await?;
        tracing::debug!(user_id = principal_id, "Permission cache cleared");
        Ok(())
    }
}
