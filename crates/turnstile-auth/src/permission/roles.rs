//! Built-in role permissions.

use std::collections::HashMap;

use async_trait::async_trait;

use super::model::Permission;
use super::PermissionSource;
use crate::AuthResult;
use crate::config::{ConfigError, PermissionConfig};
use crate::types::Principal;

const USER_PERMISSIONS: &[&str] = &[
    "article:create",
    "article:read",
    "article:update:own",
    "article:delete:own",
    "file:upload",
    "file:read",
    "file:delete:own",
    "user:read:own",
    "user:update:own",
    "product:read",
    "department:read",
];

const ADMIN_PERMISSIONS: &[&str] = &["*:*"];

const GUEST_PERMISSIONS: &[&str] = &["article:read", "file:read", "product:read", "department:read"];

/// Role name to permission list mapping.
///
/// Unknown roles hold no permissions.
#[derive(Debug, Clone)]
pub struct RoleTable {
    roles: HashMap<String, Vec<Permission>>,
}

impl Default for RoleTable {
    fn default() -> Self {
        let mut roles = HashMap::new();
        for (role, raw) in [
            ("user", USER_PERMISSIONS),
            ("admin", ADMIN_PERMISSIONS),
            ("super_admin", ADMIN_PERMISSIONS),
            ("guest", GUEST_PERMISSIONS),
        ] {
            let perms = raw.iter().filter_map(|s| s.parse().ok()).collect();
            roles.insert(role.to_string(), perms);
        }
        Self { roles }
    }
}

impl RoleTable {
    /// Built-in roles with configured overrides applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if an override does not parse.
    pub fn from_config(config: &PermissionConfig) -> Result<Self, ConfigError> {
        let mut table = Self::default();
        for (role, raw) in &config.roles {
            let perms = raw
                .iter()
                .map(|s| {
                    s.parse::<Permission>().map_err(|e| {
                        ConfigError::InvalidValue(format!("permissions.roles.{role}: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            table.roles.insert(role.clone(), perms);
        }
        Ok(table)
    }

    /// Permissions held by `role`.
    #[must_use]
    pub fn permissions(&self, role: &str) -> &[Permission] {
        self.roles.get(role).map(Vec::as_slice).unwrap_or_default()
    }
}

#[async_trait]
impl PermissionSource for RoleTable {
    async fn permissions_for(&self, principal: &Principal) -> AuthResult<Vec<Permission>> {
        Ok(self.permissions(&principal.role).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let table = RoleTable::default();
        assert_eq!(table.permissions("admin"), &["*:*".parse::<Permission>().unwrap()]);
        assert_eq!(table.permissions("user").len(), USER_PERMISSIONS.len());
        assert!(
            table
                .permissions("guest")
                .iter()
                .all(|p| p.action == "read")
        );
        assert!(table.permissions("nobody").is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut config = PermissionConfig::default();
        config
            .roles
            .insert("guest".to_string(), vec!["article:read".to_string()]);
        config
            .roles
            .insert("editor".to_string(), vec!["article:*".to_string()]);

        let table = RoleTable::from_config(&config).unwrap();
        assert_eq!(table.permissions("guest").len(), 1);
        assert_eq!(table.permissions("editor")[0].action, "*");
        assert_eq!(table.permissions("user").len(), USER_PERMISSIONS.len());
    }

    #[test]
    fn test_invalid_override() {
        let mut config = PermissionConfig::default();
        config
            .roles
            .insert("broken".to_string(), vec!["nope".to_string()]);
        assert!(RoleTable::from_config(&config).is_err());
    }
}
