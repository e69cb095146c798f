//! Hub engine
//!
//! The hub owns the registry and makes every routing decision. All mutations
//! and routes are applied by one task, in the order events arrive on the
//! hub's event queue, so registry access needs no locking and every sender's
//! envelopes reach each recipient in submission order.
//!
//! The public API on `Hub` is synchronous and used directly by tests; the
//! running service talks to it through `HubHandle`.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnectionHandle, PushOutcome};
use crate::envelope::{ClientId, Envelope, EnvelopeKind, NodeId, Scope};
use crate::hub::handle::{HubEvent, HubHandle, HubStats};
use crate::hub::registry::Registry;
use crate::utils::{HubError, Result};

/// Where an inbound envelope entered this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Submitted by a connection on this node.
    Local,
    /// Received from the message bus.
    Bus,
}

/// Outcome of routing one envelope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize,
    pub displaced: usize,
}

#[derive(Debug)]
pub struct Hub {
    node_id: NodeId,
    registry: Registry,
    publisher: Option<mpsc::Sender<Arc<Envelope>>>,
    persister: Option<mpsc::Sender<Arc<Envelope>>>,
    persist_remote: bool,
    accepting: bool,
}

impl Hub {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            registry: Registry::new(),
            publisher: None,
            persister: None,
            persist_remote: false,
            accepting: true,
        }
    }

    /// Envelopes accepted from local connections are also sent here for the bus.
    pub fn with_publisher(mut self, publisher: mpsc::Sender<Arc<Envelope>>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Chat envelopes are handed here for best-effort persistence.
    pub fn with_persister(
        mut self,
        persister: mpsc::Sender<Arc<Envelope>>,
        persist_remote: bool,
    ) -> Self {
        self.persister = Some(persister);
        self.persist_remote = persist_remote;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn register(&mut self, conn: ConnectionHandle) -> Result<()> {
        if !self.accepting {
            return Err(HubError::ShuttingDown);
        }
        let client_id = conn.id.clone();
        self.registry.insert(conn)?;
        info!(client_id = %client_id, clients = self.registry.client_count(), "client registered");
        Ok(())
    }

    /// Remove a client and close its queue. Returns false if it was already gone.
    pub fn unregister(&mut self, client_id: &str) -> bool {
        match self.registry.remove(client_id) {
            Some(handle) => {
                handle.close();
                info!(client_id = %client_id, clients = self.registry.client_count(), "client unregistered");
                true
            }
            None => {
                trace!(client_id = %client_id, "unregister for unknown client ignored");
                false
            }
        }
    }

    pub fn join_group(&mut self, client_id: &str, group: &str) -> Result<()> {
        self.registry.join(client_id, group)?;
        debug!(client_id = %client_id, group = %group, "joined group");
        Ok(())
    }

    pub fn leave_group(&mut self, client_id: &str, group: &str) -> Result<()> {
        self.registry.leave(client_id, group)?;
        debug!(client_id = %client_id, group = %group, "left group");
        Ok(())
    }

    /// Enqueue an envelope on every recipient its scope resolves to.
    ///
    /// The sender never receives its own `Global` or `Group` envelope. A full
    /// recipient queue displaces its oldest entry instead of blocking.
    pub fn route(&self, envelope: &Arc<Envelope>) -> RouteReport {
        let mut report = RouteReport::default();
        let sender = envelope.sender_id.as_str();

        let mut deliver = |conn: &ConnectionHandle| match conn.enqueue(Arc::clone(envelope)) {
            PushOutcome::Enqueued => report.delivered += 1,
            PushOutcome::DisplacedOldest => {
                report.delivered += 1;
                report.displaced += 1;
                debug!(client_id = %conn.id, "outbound queue full, dropped oldest envelope");
            }
            PushOutcome::Closed => {
                trace!(client_id = %conn.id, "skipping closed outbound queue");
            }
        };

        match &envelope.scope {
            Scope::Global => self
                .registry
                .handles()
                .filter(|conn| conn.id != sender)
                .for_each(&mut deliver),
            Scope::Group(group) => self
                .registry
                .members(group)
                .filter(|conn| conn.id != sender)
                .for_each(&mut deliver),
            Scope::Direct(target) => match self.registry.get(target) {
                Some(conn) => deliver(conn),
                None => debug!(target = %target, "direct envelope for unknown client dropped"),
            },
        }

        trace!(
            id = %envelope.id,
            scope = %envelope.scope,
            delivered = report.delivered,
            displaced = report.displaced,
            "routed envelope"
        );
        report
    }

    /// Apply an inbound envelope: membership changes, local routing, then
    /// publishing and persistence.
    pub fn accept(&mut self, envelope: Envelope, source: Source) -> RouteReport {
        if source == Source::Bus && envelope.origin_node == self.node_id {
            trace!(id = %envelope.id, "dropping own envelope echoed by the bus");
            return RouteReport::default();
        }

        if source == Source::Local {
            if let Err(e) = self.apply_membership(&envelope) {
                warn!(client_id = %envelope.sender_id, error = %e, "membership change rejected");
                self.reject(&envelope.sender_id, &e.to_string());
                return RouteReport::default();
            }
        }

        let envelope = Arc::new(envelope);
        let report = self.route(&envelope);

        if source == Source::Local && envelope.origin_node == self.node_id {
            self.publish(&envelope);
        }
        if envelope.kind == EnvelopeKind::Chat
            && (source == Source::Local || self.persist_remote)
        {
            self.persist(&envelope);
        }
        report
    }

    fn apply_membership(&mut self, envelope: &Envelope) -> Result<()> {
        match (envelope.kind, &envelope.scope) {
            (EnvelopeKind::Join, Scope::Group(group)) => {
                self.join_group(&envelope.sender_id, group)
            }
            (EnvelopeKind::Leave, Scope::Group(group)) => {
                self.leave_group(&envelope.sender_id, group)
            }
            _ => Ok(()),
        }
    }

    fn reject(&self, client_id: &ClientId, reason: &str) {
        if let Some(conn) = self.registry.get(client_id) {
            let rejection = Envelope::system(
                EnvelopeKind::Rejected,
                client_id,
                &self.node_id,
                json!({ "reason": reason }),
            );
            conn.enqueue(Arc::new(rejection));
        }
    }

    fn publish(&self, envelope: &Arc<Envelope>) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(e) = publisher.try_send(Arc::clone(envelope)) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(id = %envelope.id, "publish queue full, envelope not sent to bus")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    trace!(id = %envelope.id, "bus adapter stopped, envelope not published")
                }
            }
        }
    }

    fn persist(&self, envelope: &Arc<Envelope>) {
        if let Some(persister) = &self.persister {
            if persister.try_send(Arc::clone(envelope)).is_err() {
                warn!(id = %envelope.id, "persistence queue unavailable, envelope not stored");
            }
        }
    }

    /// Stop accepting registrations and unregister every client.
    pub fn close_all(&mut self) {
        self.accepting = false;
        for client_id in self.registry.client_ids() {
            self.unregister(&client_id);
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            node_id: self.node_id.clone(),
            clients: self.registry.client_count(),
            groups: self.registry.group_count(),
        }
    }

    /// Move the hub onto its own task and return the handle used to reach it.
    pub fn spawn(self, event_capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(event_capacity.max(1));
        let handle = HubHandle::new(self.node_id.clone(), tx);
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut events: mpsc::Receiver<HubEvent>) {
        info!(node = %self.node_id, "hub started");
        while let Some(event) = events.recv().await {
            if let HubEvent::Shutdown { reply } = event {
                self.drain_and_close(&mut events).await;
                let _ = reply.send(());
                break;
            }
            self.handle_event(event);
        }
        self.close_all();
        info!(node = %self.node_id, "hub stopped");
    }

    async fn drain_and_close(&mut self, events: &mut mpsc::Receiver<HubEvent>) {
        self.accepting = false;
        events.close();
        while let Some(event) = events.recv().await {
            match event {
                HubEvent::Shutdown { reply } => {
                    let _ = reply.send(());
                }
                event => self.handle_event(event),
            }
        }
        self.close_all();
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register { conn, reply } => {
                let _ = reply.send(self.register(conn));
            }
            HubEvent::Unregister { client_id, reply } => {
                self.unregister(&client_id);
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            HubEvent::Inbound { envelope, source } => {
                self.accept(envelope, source);
            }
            HubEvent::JoinGroup {
                client_id,
                group,
                reply,
            } => {
                let _ = reply.send(self.join_group(&client_id, &group));
            }
            HubEvent::LeaveGroup {
                client_id,
                group,
                reply,
            } => {
                let _ = reply.send(self.leave_group(&client_id, &group));
            }
            HubEvent::Members { group, reply } => {
                let members = self.registry.members(&group).map(|c| c.id.clone()).collect();
                let _ = reply.send(members);
            }
            HubEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            HubEvent::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }
}
