//! Extractors for the identity attached by the authentication stages.
//!
//! # Example
//!
//! ```ignore
//! async fn me(CurrentIdentity(identity): CurrentIdentity) -> String {
//!     format!("Hello, {}!", identity.principal.username)
//! }
//!
//! async fn feed(MaybeIdentity(identity): MaybeIdentity) -> String {
//!     match identity {
//!         Some(identity) => format!("Feed for {}", identity.principal.username),
//!         None => "Public feed".to_string(),
//!     }
//! }
//! ```

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::types::Identity;

/// The authenticated identity. Rejects with 401 when none is attached.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or(AuthError::MissingToken)
    }
}

/// The identity, if the request was authenticated.
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<Identity>);

impl<S> FromRequestParts<S> for MaybeIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(parts.extensions.get::<Identity>().cloned()))
    }
}
