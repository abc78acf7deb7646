//! Demo account directory backing the login and registration endpoints.

use std::sync::atomic::{AtomicU64, Ordering};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use turnstile_auth::Principal;

use crate::config::UserConfig;

/// Role given to self-registered accounts.
pub const DEFAULT_ROLE: &str = "user";

struct Account {
    principal: Principal,
    password_hash: String,
}

/// Accounts keyed by username, with Argon2id password hashes.
pub struct UserDirectory {
    accounts: DashMap<String, Account>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

impl UserDirectory {
    /// Hashes every configured password.
    pub fn from_config(users: &[UserConfig]) -> Result<Self, argon2::password_hash::Error> {
        let accounts = DashMap::with_capacity(users.len());
        for user in users {
            accounts.insert(
                user.username.clone(),
                Account {
                    principal: Principal::new(
                        user.id,
                        &user.username,
                        email_or_default(&user.username, &user.email),
                        &user.role,
                    ),
                    password_hash: hash_password(&user.password)?,
                },
            );
        }
        let max_id = users.iter().map(|u| u.id).max().unwrap_or(0);
        Ok(Self {
            accounts,
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Returns the principal when the credentials match.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let account = self.accounts.get(username)?;
        match verify_password(password, &account.password_hash) {
            Ok(true) => Some(account.principal.clone()),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(username, error = %e, "Stored password hash is invalid");
                None
            }
        }
    }

    /// Creates an account with the default role. Returns `Ok(None)` if the
    /// username is taken.
    pub fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<Option<Principal>, argon2::password_hash::Error> {
        let password_hash = hash_password(password)?;
        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let principal =
                    Principal::new(id, username, email_or_default(username, email), DEFAULT_ROLE);
                slot.insert(Account {
                    principal: principal.clone(),
                    password_hash,
                });
                Ok(Some(principal))
            }
        }
    }
}

fn email_or_default(username: &str, email: &str) -> String {
    if email.is_empty() {
        format!("{username}@localhost")
    } else {
        email.to_string()
    }
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
