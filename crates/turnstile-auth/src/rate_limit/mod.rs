//! Rate limiting.
//!
//! - [`limiter`] - fixed-window counters over the shared cache
//! - [`policy`] - named `(limit, window)` budgets
//! - [`key`] - request to key functions and skip predicates
//! - [`ip`] - client address resolution and CIDR filtering

pub mod ip;
pub mod key;
pub mod limiter;
pub mod policy;

pub use ip::{IpFilter, IpVerdict, client_ip};
pub use key::{EndpointKey, IpKey, KeyFn, PrincipalKey, SkipFn, skip_roles};
pub use limiter::{Clock, RateDecision, RateLimiter, RateStatus, window_key};
pub use policy::{PolicyKind, RateLimitPolicy};
