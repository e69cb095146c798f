//! The `transport` module is responsible for the network edge: it accepts
//! TCP sockets, performs the WebSocket handshake, authenticates the client
//! and hands the socket to a `Connection`.
//!
//! Handshake outcomes:
//! - server at `max_connections`: closed with 1013 (try again later)
//! - token denied by the authenticator: closed with 4401, nothing registered
//! - otherwise the connection runs until either side stops

pub mod handshake;
pub mod server;

pub use handshake::{DENIED_CLOSE_CODE, bearer_token};
pub use server::{ServerContext, bind, serve};

#[cfg(test)]
mod tests;
