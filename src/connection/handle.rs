//! Registry-side view of a connection
//!
//! `ConnectionHandle` is what the hub stores for every live client: its id,
//! the identity established during the handshake, and the producer side of
//! its outbound queue.

use std::sync::Arc;

use crate::auth::Identity;
use crate::connection::queue::{OutboundQueue, PushOutcome};
use crate::envelope::{ClientId, Envelope};

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ClientId,
    pub identity: Option<Identity>,
    queue: Arc<OutboundQueue>,
}

impl ConnectionHandle {
    pub fn new(id: ClientId, identity: Option<Identity>, queue: Arc<OutboundQueue>) -> Self {
        Self {
            id,
            identity,
            queue,
        }
    }

    pub fn enqueue(&self, envelope: Arc<Envelope>) -> PushOutcome {
        self.queue.push(envelope)
    }

    /// Close the outbound queue; the write loop drains it and stops.
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }
}
