//! The `error` module defines the error type shared by every layer of `hubcast`.
//!
//! Failures are grouped by how far they are allowed to spread: transport and
//! decode errors stay inside one connection, bus and store errors degrade the
//! service without stopping it, and only bind/config errors are fatal at startup.

use thiserror::Error;

use crate::envelope::ClientId;

#[derive(Debug, Error)]
pub enum HubError {
    /// Network reset, timeout or protocol violation on one socket.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single frame could not be decoded into an envelope.
    #[error("malformed envelope: {0}")]
    Decode(String),

    /// The handshake token was missing or rejected.
    #[error("authentication denied: {0}")]
    Auth(String),

    #[error("message bus unavailable: {0}")]
    BusUnavailable(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("client {0} is already registered")]
    DuplicateClient(ClientId),

    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    #[error("hub is shutting down")]
    ShuttingDown,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl From<tungstenite::Error> for HubError {
    fn from(err: tungstenite::Error) -> Self {
        HubError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Decode(err.to_string())
    }
}

impl From<sled::Error> for HubError {
    fn from(err: sled::Error) -> Self {
        HubError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
