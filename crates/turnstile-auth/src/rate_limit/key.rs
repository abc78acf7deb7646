//! Rate limit key functions.
//!
//! A key function maps a request to the identity whose budget it spends.
//! Keys are namespaced by kind so that an IP and a principal id never
//! collide:
//!
//! ```text
//! ip:203.0.113.7
//! user:42
//! endpoint:POST:/articles:user:42
//! ```

use std::sync::Arc;

use axum::extract::Request;

use super::ip::client_ip;
use crate::types::Identity;

/// Key used when the client address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "ip:unknown";

/// Maps a request to a rate limit key.
pub trait KeyFn: Send + Sync {
    /// Returns the key whose budget this request spends.
    fn key(&self, req: &Request) -> String;
}

impl<F> KeyFn for F
where
    F: Fn(&Request) -> String + Send + Sync,
{
    fn key(&self, req: &Request) -> String {
        self(req)
    }
}

/// Keys by client address.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpKey {
    /// Honour `X-Forwarded-For` / `X-Real-IP`.
    pub trust_forwarded: bool,
}

impl KeyFn for IpKey {
    fn key(&self, req: &Request) -> String {
        client_ip(req.headers(), req.extensions(), self.trust_forwarded)
            .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ip| format!("ip:{ip}"))
    }
}

/// Keys by authenticated principal, falling back to the client address.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalKey {
    /// Fallback for unauthenticated requests.
    pub ip: IpKey,
}

impl KeyFn for PrincipalKey {
    fn key(&self, req: &Request) -> String {
        match req.extensions().get::<Identity>() {
            Some(identity) => format!("user:{}", identity.id()),
            None => self.ip.key(req),
        }
    }
}

/// Keys by method, path and caller, giving each endpoint its own budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointKey {
    /// Caller identity.
    pub caller: PrincipalKey,
}

impl KeyFn for EndpointKey {
    fn key(&self, req: &Request) -> String {
        format!(
            "endpoint:{}:{}:{}",
            req.method(),
            req.uri().path(),
            self.caller.key(req)
        )
    }
}

/// Predicate deciding that a request bypasses a policy.
pub type SkipFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Skips requests whose authenticated principal holds one of `roles`.
#[must_use]
pub fn skip_roles(roles: Vec<String>) -> SkipFn {
    Arc::new(move |req: &Request| {
        req.extensions()
            .get::<Identity>()
            .is_some_and(|identity| roles.iter().any(|role| role == identity.role()))
    })
}
