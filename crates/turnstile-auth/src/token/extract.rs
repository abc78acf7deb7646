//! Locating the bearer token on an inbound request.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, Uri};
use cookie::Cookie;

/// Query parameter carrying a token.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Cookie carrying a token.
pub const TOKEN_COOKIE: &str = "access_token";

/// Extracts a bearer token from the request.
///
/// Sources are checked in order and the first non-empty value wins:
/// 1. `Authorization: Bearer <token>`
/// 2. `?token=<token>` query parameter
/// 3. `access_token` cookie
#[must_use]
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    from_authorization(headers)
        .or_else(|| from_query(uri))
        .or_else(|| from_cookie(headers))
}

fn from_authorization(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    non_empty(token)
}

fn from_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == TOKEN_QUERY_PARAM)
        .and_then(|(_, value)| non_empty(&value))
}

fn from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == TOKEN_COOKIE)
        .and_then(|cookie| non_empty(cookie.value()))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
