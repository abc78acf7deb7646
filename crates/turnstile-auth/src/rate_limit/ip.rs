//! Client address resolution and CIDR allow/deny filtering.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};
use ipnetwork::IpNetwork;

use crate::config::{ConfigError, IpFilterConfig};

/// Resolves the client address of a request.
///
/// With `trust_forwarded` set, the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Otherwise, or when neither header parses, the socket peer
/// from `ConnectInfo` is used.
#[must_use]
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, trust_forwarded: bool) -> Option<IpAddr> {
    if trust_forwarded
        && let Some(ip) = forwarded_ip(headers)
    {
        return Some(ip);
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // "client, proxy1, proxy2"
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(ip);
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Outcome of an IP filter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVerdict {
    /// The address may proceed.
    Allowed,
    /// The address is on the deny list.
    Denied,
    /// An allow list exists and the address is not on it.
    NotAllowed,
}

/// Parsed allow/deny CIDR lists. Deny entries win over allow entries.
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    allow: Vec<IpNetwork>,
    deny: Vec<IpNetwork>,
}

impl IpFilter {
    /// Parses the configured lists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unparseable entry.
    pub fn from_config(config: &IpFilterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            allow: parse_networks(&config.allow)?,
            deny: parse_networks(&config.deny)?,
        })
    }

    /// Returns `true` if neither list has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }

    /// Decides whether `ip` may proceed.
    ///
    /// An unknown address passes only when no allow list is configured.
    #[must_use]
    pub fn check(&self, ip: Option<IpAddr>) -> IpVerdict {
        let Some(ip) = ip else {
            return if self.allow.is_empty() {
                IpVerdict::Allowed
            } else {
                IpVerdict::NotAllowed
            };
        };

        if self.deny.iter().any(|net| net.contains(ip)) {
            return IpVerdict::Denied;
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|net| net.contains(ip)) {
            return IpVerdict::NotAllowed;
        }
        IpVerdict::Allowed
    }
}

fn parse_networks(entries: &[String]) -> Result<Vec<IpNetwork>, ConfigError> {
    entries
        .iter()
        .map(|entry| {
            entry.trim().parse::<IpNetwork>().map_err(|e| {
                ConfigError::InvalidValue(format!("ip_filter entry '{entry}': {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn filter(allow: &[&str], deny: &[&str]) -> IpFilter {
        IpFilter::from_config(&IpFilterConfig {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_deny_wins() {
        let f = filter(&["10.0.0.0/8"], &["10.1.0.0/16"]);
        assert_eq!(f.check(ip("10.2.3.4")), IpVerdict::Allowed);
        assert_eq!(f.check(ip("10.1.3.4")), IpVerdict::Denied);
        assert_eq!(f.check(ip("192.168.1.1")), IpVerdict::NotAllowed);
    }

    #[test]
    fn test_deny_only() {
        let f = filter(&[], &["203.0.113.7"]);
        assert_eq!(f.check(ip("203.0.113.7")), IpVerdict::Denied);
        assert_eq!(f.check(ip("203.0.113.8")), IpVerdict::Allowed);
        assert_eq!(f.check(None), IpVerdict::Allowed);
    }

    #[test]
    fn test_unknown_address_with_allow_list() {
        let f = filter(&["127.0.0.1"], &[]);
        assert_eq!(f.check(None), IpVerdict::NotAllowed);
    }

    #[test]
    fn test_ipv6() {
        let f = filter(&["2001:db8::/32"], &[]);
        assert_eq!(f.check(ip("2001:db8::1")), IpVerdict::Allowed);
        assert_eq!(f.check(ip("2001:db9::1")), IpVerdict::NotAllowed);
    }

    #[test]
    fn test_client_ip_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 10.0.0.1"),
        );
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo::<SocketAddr>("127.0.0.1:9000".parse().unwrap()));

        assert_eq!(client_ip(&headers, &extensions, true), ip("198.51.100.1"));
        assert_eq!(client_ip(&headers, &extensions, false), ip("127.0.0.1"));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        assert_eq!(client_ip(&headers, &extensions, true), ip("198.51.100.9"));

        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new(), true), None);
    }
}
