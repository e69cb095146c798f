//! Service assembly
//!
//! `Service::start` wires one node together from `Settings`: the hub task,
//! the optional persister and broker adapter, and the WebSocket listener.
//! `Service::shutdown` stops them in order: the listener stops accepting,
//! the hub drains its queue and unregisters every client, then the adapter
//! stops.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::{AllowAll, Authenticator, JwtAuthenticator};
use crate::bus::{AdapterHandle, BrokerAdapter, Bus, BusStatus, WsBus};
use crate::config::Settings;
use crate::hub::{Hub, HubHandle};
use crate::persistence::{NoopStore, SledStore, Store, spawn_persister};
use crate::transport::{self, ServerContext};
use crate::utils::{HubError, Result};

/// The pluggable parts of a node.
#[derive(Clone)]
pub struct Capabilities {
    pub auth: Arc<dyn Authenticator>,
    pub store: Arc<dyn Store>,
    /// `None` runs the node alone.
    pub bus: Option<Arc<dyn Bus>>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            auth: Arc::new(AllowAll),
            store: Arc::new(NoopStore),
            bus: None,
        }
    }
}

impl Capabilities {
    /// Build the capabilities selected by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let auth: Arc<dyn Authenticator> = if settings.auth.enabled {
            let secret = settings.auth.secret.as_deref().ok_or_else(|| {
                HubError::Auth("auth is enabled but no secret is configured".to_string())
            })?;
            Arc::new(JwtAuthenticator::new(secret, settings.auth.issuer.clone()))
        } else {
            Arc::new(AllowAll)
        };

        let store: Arc<dyn Store> = if settings.persistence.enabled {
            let ttl = settings
                .persistence
                .ttl_secs
                .map(|secs| i64::try_from(secs).unwrap_or(i64::MAX));
            Arc::new(SledStore::open(
                &settings.persistence.path,
                ttl,
                settings.persistence.max_messages_per_scope,
            )?)
        } else {
            Arc::new(NoopStore)
        };

        let bus = settings
            .bus
            .url
            .as_ref()
            .map(|url| Arc::new(WsBus::new(url.clone())) as Arc<dyn Bus>);

        Ok(Self { auth, store, bus })
    }
}

pub struct Service {
    local_addr: SocketAddr,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    adapter: Option<AdapterHandle>,
    listener_stop: watch::Sender<bool>,
    listener_task: JoinHandle<()>,
}

impl Service {
    /// Bind the listener and start every task. Fails only when the address
    /// cannot be bound.
    pub async fn start(settings: &Settings, caps: Capabilities) -> Result<Self> {
        let addr = settings.server.addr();
        let listener = transport::bind(&addr).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| HubError::Bind { addr, source })?;

        let mut hub = Hub::new(settings.server.node_id.clone());
        let mut outbound = None;
        if caps.bus.is_some() {
            let (publisher, rx) = mpsc::channel(settings.hub.publish_queue_capacity.max(1));
            hub = hub.with_publisher(publisher);
            outbound = Some(rx);
        }
        if settings.persistence.enabled {
            let persister = spawn_persister(caps.store.clone(), settings.hub.publish_queue_capacity);
            hub = hub.with_persister(persister, settings.persistence.include_remote);
        }
        let (hub_handle, hub_task) = hub.spawn(settings.hub.event_queue_capacity);

        let adapter = caps.bus.zip(outbound).map(|(bus, outbound)| {
            BrokerAdapter::spawn(bus, hub_handle.clone(), outbound, settings.bus.backoff())
        });

        let ctx = Arc::new(ServerContext::new(
            hub_handle.clone(),
            caps.auth,
            caps.store,
            settings.hub.connection_settings(),
            settings.hub.max_connections,
        ));
        let (listener_stop, stop_rx) = watch::channel(false);
        let listener_task = tokio::spawn(transport::serve(listener, ctx, stop_rx));

        info!(
            node = %settings.server.node_id,
            addr = %local_addr,
            bus = adapter.is_some(),
            persistence = settings.persistence.enabled,
            "service started"
        );
        Ok(Self {
            local_addr,
            hub: hub_handle,
            hub_task,
            adapter,
            listener_stop,
            listener_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node_id(&self) -> &str {
        self.hub.node_id()
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// `None` when the node runs without a bus.
    pub fn bus_status(&self) -> Option<BusStatus> {
        self.adapter.as_ref().map(AdapterHandle::status)
    }

    pub fn adapter(&self) -> Option<&AdapterHandle> {
        self.adapter.as_ref()
    }

    pub async fn shutdown(self) {
        let node = self.hub.node_id().to_string();
        info!(node = %node, "shutting down");

        self.listener_stop.send_replace(true);
        if let Err(e) = self.listener_task.await {
            warn!(node = %node, error = %e, "listener task panicked");
        }

        if let Err(e) = self.hub.shutdown().await {
            warn!(node = %node, error = %e, "hub already stopped");
        }
        if let Err(e) = self.hub_task.await {
            warn!(node = %node, error = %e, "hub task panicked");
        }

        if let Some(adapter) = self.adapter {
            adapter.stop().await;
        }
        info!(node = %node, "shutdown complete");
    }
}
