//! Broker adapter
//!
//! Bridges one hub to the bus:
//! - publish path: envelopes the hub accepted from local connections arrive
//!   on a bounded queue and are written to the bus link
//! - subscribe path: a dedicated task reads the link, drops envelopes whose
//!   `origin_node` is this node, and hands the rest to the hub as remote
//!   envelopes, which the hub routes locally and never republishes
//!
//! When the link fails the adapter reports `Degraded`, discards whatever the
//! hub queues for publishing in the meantime, and reconnects with
//! exponential backoff. Local routing never waits on the bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{Backoff, Bus, BusLink, BusSource};
use crate::envelope::{Envelope, NodeId};
use crate::hub::HubHandle;
use crate::utils::{HubError, flag_reaches};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    Connecting,
    Connected,
    Degraded,
    Stopped,
}

enum LinkExit {
    Shutdown,
    Lost(HubError),
}

pub struct BrokerAdapter {
    bus: Arc<dyn Bus>,
    hub: HubHandle,
    node_id: NodeId,
    outbound: mpsc::Receiver<Arc<Envelope>>,
    backoff: Backoff,
    status: watch::Sender<BusStatus>,
    shutdown: watch::Receiver<bool>,
}

/// Control side of a spawned adapter.
pub struct AdapterHandle {
    status: watch::Receiver<BusStatus>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AdapterHandle {
    pub fn status(&self) -> BusStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<BusStatus> {
        self.status.clone()
    }

    /// Wait until the adapter reports `want`, or `timeout` elapses.
    pub async fn wait_for_status(&self, want: BusStatus, timeout: Duration) -> bool {
        let mut status = self.status.clone();
        matches!(
            tokio::time::timeout(timeout, status.wait_for(|s| *s == want)).await,
            Ok(Ok(_))
        )
    }

    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "bus adapter task panicked");
        }
    }
}

impl BrokerAdapter {
    /// `outbound` is the receiving end of the queue given to `Hub::with_publisher`.
    pub fn spawn(
        bus: Arc<dyn Bus>,
        hub: HubHandle,
        outbound: mpsc::Receiver<Arc<Envelope>>,
        backoff: Backoff,
    ) -> AdapterHandle {
        let (status_tx, status_rx) = watch::channel(BusStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let adapter = BrokerAdapter {
            bus,
            node_id: hub.node_id().to_string(),
            hub,
            outbound,
            backoff,
            status: status_tx,
            shutdown: shutdown_rx,
        };
        AdapterHandle {
            status: status_rx,
            shutdown: shutdown_tx,
            task: tokio::spawn(adapter.run()),
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run(mut self) {
        while !self.stopping() {
            match self.bus.connect().await {
                Ok(link) => {
                    self.backoff.reset();
                    self.status.send_replace(BusStatus::Connected);
                    info!(node = %self.node_id, "bus connected");
                    match self.pump(link).await {
                        LinkExit::Shutdown => break,
                        LinkExit::Lost(e) => {
                            warn!(node = %self.node_id, error = %e, "bus link lost, running local-only")
                        }
                    }
                }
                Err(e) => {
                    warn!(node = %self.node_id, attempt = self.backoff.attempts() + 1, error = %e, "bus unavailable")
                }
            }
            self.status.send_replace(BusStatus::Degraded);
            let delay = self.backoff.next_delay();
            if !self.wait_degraded(delay).await {
                break;
            }
        }
        self.status.send_replace(BusStatus::Stopped);
        info!(node = %self.node_id, "bus adapter stopped");
    }

    /// Sleep out the backoff, discarding envelopes queued for publishing.
    /// Returns false when the adapter should stop.
    async fn wait_degraded(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let mut discarded = 0usize;
        let keep_going = loop {
            tokio::select! {
                _ = &mut sleep => break true,
                _ = flag_reaches(&mut self.shutdown, true) => break false,
                next = self.outbound.recv() => match next {
                    Some(_) => discarded += 1,
                    None => break false,
                },
            }
        };
        if discarded > 0 {
            debug!(node = %self.node_id, discarded, "envelopes not published during bus outage");
        }
        keep_going
    }

    async fn pump(&mut self, link: BusLink) -> LinkExit {
        let BusLink { mut sink, source } = link;
        let mut subscriber = tokio::spawn(subscribe_loop(
            source,
            self.hub.clone(),
            self.node_id.clone(),
        ));

        let exit = loop {
            tokio::select! {
                ended = &mut subscriber => {
                    break match ended {
                        Ok(HubError::ShuttingDown) => LinkExit::Shutdown,
                        Ok(e) => LinkExit::Lost(e),
                        Err(e) => LinkExit::Lost(HubError::BusUnavailable(format!("subscriber task failed: {e}"))),
                    };
                }
                _ = flag_reaches(&mut self.shutdown, true) => break LinkExit::Shutdown,
                next = self.outbound.recv() => match next {
                    Some(envelope) => {
                        if let Err(e) = sink.publish(&envelope).await {
                            break LinkExit::Lost(e);
                        }
                        trace!(id = %envelope.id, "published envelope to bus");
                    }
                    None => break LinkExit::Shutdown,
                },
            }
        };
        subscriber.abort();
        exit
    }
}

async fn subscribe_loop(mut source: Box<dyn BusSource>, hub: HubHandle, node_id: NodeId) -> HubError {
    loop {
        match source.next().await {
            Ok(envelope) if envelope.origin_node == node_id => {
                trace!(id = %envelope.id, "discarding own envelope from bus");
            }
            Ok(envelope) => {
                if let Err(e) = hub.deliver_remote(envelope).await {
                    return e;
                }
            }
            Err(e) => return e,
        }
    }
}
