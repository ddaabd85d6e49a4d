//! Pluggable bearer-token authentication and per-catalog authorization.
//!
//! The server calls [`Authenticator::authenticate`] with the token parsed
//! from the `authorization` header (or `None` when the header is absent)
//! before any handler logic runs; the returned identity is threaded into
//! the request context.  An authenticator that also implements
//! [`CatalogAuthorizer`] additionally gates access to the routed catalog.

use async_trait::async_trait;

use crate::error::AirportError;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate the bearer token and return the peer identity.
    ///
    /// `token` is `None` when no `authorization` header was sent; an
    /// authenticator that requires credentials responds with an
    /// unauthenticated error in that case.
    async fn authenticate(&self, token: Option<&str>) -> Result<String, AirportError>;

    /// When the authenticator also authorizes catalogs, expose that side.
    fn as_catalog_authorizer(&self) -> Option<&dyn CatalogAuthorizer> {
        None
    }
}

#[async_trait]
pub trait CatalogAuthorizer: Send + Sync {
    /// Decide whether `identity` may use `catalog`.
    async fn authorize_catalog(
        &self,
        identity: &str,
        catalog: &str,
    ) -> Result<(), AirportError>;
}

/// Authenticator that accepts every request, with or without a token.
/// Used when the embedding process disables authentication.
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn authenticate(&self, _token: Option<&str>) -> Result<String, AirportError> {
        Ok(String::new())
    }
}
