//! Request-identity types shared between `crates/server`'s middleware and the
//! handlers it guards. Trimmed from the gateway workspace's `crates/context`:
//! the OAuth/JWT claim machinery (`crates/context/src/authentication.rs` in
//! the gateway workspace) is dropped, per `spec.md` §1 Non-goals — "does not
//! implement its own user authentication beyond a shared bearer token and
//! per-tenant access tokens".

mod client_identity;

pub use client_identity::ClientIdentity;

use secrecy::SecretString;

/// Set once the admin bearer token (`API_SECRET_KEY`) has been checked against
/// the request's `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminAuthenticated;

/// Set once a File Recall tenant's `access_token` has been checked, carrying
/// the tenant id it authenticated.
#[derive(Debug, Clone)]
pub struct TenantAuthenticated {
    pub tenant_id: String,
}

/// The raw bearer credential extracted from an `Authorization` header, prior
/// to being checked against either the admin secret or a tenant's token.
#[derive(Debug, Clone)]
pub struct BearerToken(pub SecretString);
