//! Handshake authentication
//!
//! An `Authenticator` turns the optional bearer token presented during the
//! WebSocket handshake into an `Identity`, or denies the connection. With
//! authentication disabled the service uses `AllowAll`, which never denies
//! and establishes no identity.

mod jwt;

pub use jwt::{Claims, JwtAuthenticator};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::Result;

/// Claims established for an authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub issuer: Option<String>,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate the handshake token. `Ok(None)` admits an anonymous client.
    async fn validate(&self, token: Option<&str>) -> Result<Option<Identity>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn validate(&self, _token: Option<&str>) -> Result<Option<Identity>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests;
