//! Handle to a running hub
//!
//! Every interaction with a spawned hub goes through its bounded event
//! queue. Requests that need an answer carry a `oneshot` reply channel; a
//! closed queue means the hub has shut down.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::envelope::{ClientId, Envelope, GroupId, NodeId};
use crate::hub::engine::Source;
use crate::utils::{HubError, Result};

#[derive(Debug)]
pub enum HubEvent {
    Register {
        conn: ConnectionHandle,
        reply: oneshot::Sender<Result<()>>,
    },
    Unregister {
        client_id: ClientId,
        reply: Option<oneshot::Sender<()>>,
    },
    Inbound {
        envelope: Envelope,
        source: Source,
    },
    JoinGroup {
        client_id: ClientId,
        group: GroupId,
        reply: oneshot::Sender<Result<()>>,
    },
    LeaveGroup {
        client_id: ClientId,
        group: GroupId,
        reply: oneshot::Sender<Result<()>>,
    },
    Members {
        group: GroupId,
        reply: oneshot::Sender<Vec<ClientId>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    pub node_id: NodeId,
    pub clients: usize,
    pub groups: usize,
}

#[derive(Debug, Clone)]
pub struct HubHandle {
    node_id: Arc<str>,
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    pub(crate) fn new(node_id: NodeId, events: mpsc::Sender<HubEvent>) -> Self {
        Self {
            node_id: node_id.into(),
            events,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Issue a fresh client id for a new connection.
    pub fn next_client_id(&self) -> ClientId {
        format!("client-{}", Uuid::new_v4())
    }

    async fn send(&self, event: HubEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| HubError::ShuttingDown)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> HubEvent) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| HubError::ShuttingDown)
    }

    pub async fn register(&self, conn: ConnectionHandle) -> Result<()> {
        self.request(|reply| HubEvent::Register { conn, reply })
            .await?
    }

    /// Idempotent; resolves once the hub has processed the removal.
    pub async fn unregister(&self, client_id: &str) -> Result<()> {
        let client_id = client_id.to_string();
        self.request(|reply| HubEvent::Unregister {
            client_id,
            reply: Some(reply),
        })
        .await
    }

    /// Submit an envelope produced by a local connection.
    pub async fn submit(&self, envelope: Envelope) -> Result<()> {
        self.send(HubEvent::Inbound {
            envelope,
            source: Source::Local,
        })
        .await
    }

    /// Deliver an envelope received from the bus. It is routed locally only.
    pub async fn deliver_remote(&self, envelope: Envelope) -> Result<()> {
        self.send(HubEvent::Inbound {
            envelope,
            source: Source::Bus,
        })
        .await
    }

    pub async fn join_group(&self, client_id: &str, group: &str) -> Result<()> {
        let (client_id, group) = (client_id.to_string(), group.to_string());
        self.request(|reply| HubEvent::JoinGroup {
            client_id,
            group,
            reply,
        })
        .await?
    }

    pub async fn leave_group(&self, client_id: &str, group: &str) -> Result<()> {
        let (client_id, group) = (client_id.to_string(), group.to_string());
        self.request(|reply| HubEvent::LeaveGroup {
            client_id,
            group,
            reply,
        })
        .await?
    }

    pub async fn members(&self, group: &str) -> Result<Vec<ClientId>> {
        let group = group.to_string();
        self.request(|reply| HubEvent::Members { group, reply }).await
    }

    pub async fn stats(&self) -> Result<HubStats> {
        self.request(|reply| HubEvent::Stats { reply }).await
    }

    /// Drain queued events, refuse new registrations and unregister every client.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| HubEvent::Shutdown { reply }).await
    }
}
