//! The `envelope` module defines the message record exchanged between every
//! component of the hub: client connections, the router and the bus.

pub mod frame;
pub mod message;
pub mod scope;

pub use frame::InboundFrame;
pub use message::{Envelope, EnvelopeKind, NodeId, SYSTEM_SENDER};
pub use scope::{ClientId, GroupId, Scope};

#[cfg(test)]
mod tests;
