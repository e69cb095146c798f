//! The `bus` module keeps independent hub instances in sync through a shared
//! publish/subscribe channel.
//!
//! - `Bus` is the seam: it opens a `BusLink`, a publishing half and a
//!   receiving half. A link that fails is dropped and a new one is opened.
//! - `MemoryBus` connects hubs inside one process.
//! - `WsBus` connects to a `relay` over WebSocket.
//! - `BrokerAdapter` moves envelopes between a hub and a bus, discarding its
//!   own echoes and reconnecting with exponential backoff.
//!
//! The bus stores nothing: a node that is disconnected misses whatever was
//! published meanwhile.

pub mod adapter;
pub mod backoff;
pub mod memory;
pub mod relay;
pub mod ws;

pub use adapter::{AdapterHandle, BrokerAdapter, BusStatus};
pub use backoff::Backoff;
pub use memory::MemoryBus;
pub use ws::WsBus;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::utils::Result;

#[async_trait]
pub trait Bus: Send + Sync {
    /// Open a new link; fails with `BusUnavailable` when the bus cannot be reached.
    async fn connect(&self) -> Result<BusLink>;
}

#[async_trait]
pub trait BusSink: Send {
    async fn publish(&mut self, envelope: &Envelope) -> Result<()>;
}

#[async_trait]
pub trait BusSource: Send {
    /// Next envelope from the bus. An error means the link is lost.
    async fn next(&mut self) -> Result<Envelope>;
}

pub struct BusLink {
    pub sink: Box<dyn BusSink>,
    pub source: Box<dyn BusSource>,
}
