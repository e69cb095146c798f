//! Connection session
//!
//! A `Connection` is created once the handshake and authentication have
//! succeeded. `run` registers it with the hub and then drives two loops:
//! - the read loop (on the calling task) decodes frames and submits them
//! - the write loop (on its own task) drains the outbound queue and sends
//!   periodic pings
//!
//! Whichever loop stops first moves the state to `Closing`, which stops the
//! other. `run` alone unregisters from the hub, so that happens exactly once.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::auth::Identity;
use crate::connection::handle::ConnectionHandle;
use crate::connection::queue::OutboundQueue;
use crate::connection::state::ConnectionState;
use crate::envelope::{ClientId, Envelope, EnvelopeKind, InboundFrame, Scope};
use crate::hub::HubHandle;
use crate::persistence::Store;
use crate::utils::{HubError, Result};

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub queue_capacity: usize,
    pub keepalive_interval: Duration,
    /// Silence longer than this on the socket is treated as a dead peer.
    pub keepalive_timeout: Duration,
    pub history_limit: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            keepalive_interval: Duration::from_secs(20),
            keepalive_timeout: Duration::from_secs(60),
            history_limit: 50,
        }
    }
}

/// Floor for the ping period; a zero period is not a valid interval.
const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(10);

type StateTx = Arc<watch::Sender<ConnectionState>>;

fn transition(state: &StateTx, next: ConnectionState) -> bool {
    state.send_if_modified(|current| {
        if current.can_become(next) {
            *current = next;
            true
        } else {
            false
        }
    })
}

async fn left_active(state: &mut watch::Receiver<ConnectionState>) {
    let _ = state.wait_for(|s| *s != ConnectionState::Active).await;
}

pub struct Connection {
    id: ClientId,
    identity: Option<Identity>,
    queue: Arc<OutboundQueue>,
    hub: HubHandle,
    store: Arc<dyn Store>,
    settings: ConnectionSettings,
    state: StateTx,
}

impl Connection {
    pub fn new(
        hub: HubHandle,
        identity: Option<Identity>,
        store: Arc<dyn Store>,
        settings: ConnectionSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            id: hub.next_client_id(),
            identity,
            queue: Arc::new(OutboundQueue::new(settings.queue_capacity)),
            hub,
            store,
            settings,
            state: Arc::new(state),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.id.clone(), self.identity.clone(), self.queue.clone())
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Register with the hub and serve the socket until either side stops.
    pub async fn run<S>(self, socket: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>>
            + Sink<WsMessage, Error = tungstenite::Error>
            + Send
            + 'static,
    {
        if let Err(e) = self.hub.register(self.handle()).await {
            transition(&self.state, ConnectionState::Closed);
            return Err(e);
        }
        transition(&self.state, ConnectionState::Active);
        info!(client_id = %self.id, "connection active");
        self.queue.push(Arc::new(self.welcome()));

        let (sink, stream) = socket.split();
        let writer = tokio::spawn(write_loop(
            sink,
            self.queue.clone(),
            self.state.clone(),
            self.id.clone(),
            self.settings.keepalive_interval,
        ));

        let result = self.read_loop(stream).await;
        if let Err(e) = &result {
            debug!(client_id = %self.id, error = %e, "read loop ended");
        }

        transition(&self.state, ConnectionState::Closing);
        if let Err(e) = self.hub.unregister(&self.id).await {
            debug!(client_id = %self.id, error = %e, "hub gone before unregister");
        }
        self.queue.close();
        if let Err(e) = writer.await {
            warn!(client_id = %self.id, error = %e, "write loop panicked");
        }
        transition(&self.state, ConnectionState::Closed);
        info!(client_id = %self.id, "connection closed");

        match result {
            Err(HubError::ShuttingDown) => Ok(()),
            other => other,
        }
    }

    fn welcome(&self) -> Envelope {
        Envelope::system(
            EnvelopeKind::Welcome,
            &self.id,
            self.hub.node_id(),
            json!({
                "clientID": self.id,
                "node": self.hub.node_id(),
                "subject": self.identity.as_ref().map(|i| i.subject.clone()),
            }),
        )
    }

    async fn read_loop<R>(&self, mut stream: R) -> Result<()>
    where
        R: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        let mut state = self.state.subscribe();
        loop {
            let frame = tokio::select! {
                _ = left_active(&mut state) => return Ok(()),
                frame = tokio::time::timeout(self.settings.keepalive_timeout, stream.next()) => frame,
            };
            let message = match frame {
                Err(_) => return Err(HubError::Transport("keepalive timeout".to_string())),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(message))) => message,
            };
            match message {
                WsMessage::Text(text) => self.handle_text(text.as_str()).await?,
                WsMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.handle_text(text).await?,
                    Err(_) => self.reject("binary frames must contain UTF-8 JSON"),
                },
                WsMessage::Close(_) => return Ok(()),
                // Pings and pongs only prove liveness.
                _ => {}
            }
        }
    }

    async fn handle_text(&self, text: &str) -> Result<()> {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(client_id = %self.id, error = %e, "dropping malformed frame");
                self.reject(&e.to_string());
                return Ok(());
            }
        };
        let envelope = frame.into_envelope(&self.id, self.hub.node_id());
        match envelope.kind {
            EnvelopeKind::History => {
                self.send_history(&envelope).await;
                Ok(())
            }
            _ => self.hub.submit(envelope).await,
        }
    }

    async fn send_history(&self, request: &Envelope) {
        if matches!(&request.scope, Scope::Direct(target) if *target != self.id) {
            self.reject("cannot read another client's direct history");
            return;
        }
        let limit = request
            .body
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(self.settings.history_limit, |l| l as usize)
            .min(self.settings.history_limit);

        match self.store.fetch_history(&request.scope, limit).await {
            Ok(messages) => {
                let reply = Envelope::system(
                    EnvelopeKind::History,
                    &self.id,
                    self.hub.node_id(),
                    json!({ "scope": request.scope, "messages": messages }),
                );
                self.queue.push(Arc::new(reply));
            }
            Err(e) => {
                warn!(client_id = %self.id, scope = %request.scope, error = %e, "history fetch failed");
                self.reject("history unavailable");
            }
        }
    }

    /// Tell the sender one of its frames was dropped.
    fn reject(&self, reason: &str) {
        let rejection = Envelope::system(
            EnvelopeKind::Rejected,
            &self.id,
            self.hub.node_id(),
            json!({ "reason": reason }),
        );
        self.queue.push(Arc::new(rejection));
    }
}

async fn write_loop<W>(
    mut sink: W,
    queue: Arc<OutboundQueue>,
    state: StateTx,
    client_id: ClientId,
    keepalive_interval: Duration,
) where
    W: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let period = keepalive_interval.max(MIN_KEEPALIVE_INTERVAL);
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let result: Result<()> = loop {
        tokio::select! {
            next = queue.pop() => match next {
                Some(envelope) => {
                    let text = match envelope.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(client_id = %client_id, error = %e, "failed to serialize envelope");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(WsMessage::text(text)).await {
                        break Err(e.into());
                    }
                }
                None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break Ok(());
                }
            },
            _ = ping.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Default::default())).await {
                    break Err(e.into());
                }
            }
        }
    };

    if let Err(e) = result {
        debug!(client_id = %client_id, error = %e, "write loop ended");
    }
    transition(&state, ConnectionState::Closing);
}
