//! # hubcast
//!
//! `hubcast` is a real-time message hub. Clients hold WebSocket connections
//! to a node and exchange JSON envelopes addressed to everyone (`global`),
//! to a named group, or to a single client. Several nodes can share a
//! message bus so clients on different nodes reach each other.
//!
//! ## Core Modules
//!
//! - `envelope`: the envelope record, routing scopes and inbound frame decoding.
//! - `hub`: the single-task router that owns connections and group membership.
//! - `connection`: one client's socket, its outbound queue and keepalive.
//! - `bus`: the cross-node channel, the relay and the broker adapter.
//! - `auth`: handshake authentication (`AllowAll`, JWT).
//! - `persistence`: best-effort chat history (`NoopStore`, sled).
//! - `transport`: the WebSocket listener and handshake admission.
//! - `service`: wires a node together from configuration.
//! - `config`: layered settings from file and environment.
//! - `utils`: the error type and logging setup.

pub mod auth;
pub mod bus;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod hub;
pub mod persistence;
pub mod service;
pub mod transport;
pub mod utils;
