use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::bus::Backoff;
use crate::connection::ConnectionSettings;

/// Top-level configuration settings for the service.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub hub: HubSettings,
    pub bus: BusSettings,
    pub auth: AuthSettings,
    pub persistence: PersistenceSettings,
    pub log: LogSettings,
}

/// Listening address and the identity of this node on the bus.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub node_id: String,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Queue sizes, admission and keepalive for the hub and its connections.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub max_connections: usize,
    pub event_queue_capacity: usize,
    pub outbound_queue_capacity: usize,
    pub publish_queue_capacity: usize,
    pub keepalive_interval_secs: u64,
    pub keepalive_timeout_secs: u64,
    pub history_limit: usize,
}

impl HubSettings {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            queue_capacity: self.outbound_queue_capacity,
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            keepalive_timeout: Duration::from_secs(self.keepalive_timeout_secs),
            history_limit: self.history_limit,
        }
    }
}

/// Bus relay to join. Without a `url` the node runs alone.
#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    pub url: Option<String>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl BusSettings {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub enabled: bool,
    pub secret: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceSettings {
    pub enabled: bool,
    pub path: String,
    pub ttl_secs: Option<u64>,
    pub max_messages_per_scope: Option<usize>,
    /// Also store chat envelopes that arrived from other nodes.
    pub include_remote: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub hub: Option<PartialHubSettings>,
    pub bus: Option<PartialBusSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub node_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialHubSettings {
    pub max_connections: Option<usize>,
    pub event_queue_capacity: Option<usize>,
    pub outbound_queue_capacity: Option<usize>,
    pub publish_queue_capacity: Option<usize>,
    pub keepalive_interval_secs: Option<u64>,
    pub keepalive_timeout_secs: Option<u64>,
    pub history_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBusSettings {
    pub url: Option<String>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialAuthSettings {
    pub enabled: Option<bool>,
    pub secret: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPersistenceSettings {
    pub enabled: Option<bool>,
    pub path: Option<String>,
    pub ttl_secs: Option<u64>,
    pub max_messages_per_scope: Option<usize>,
    pub include_remote: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let hub = self.hub.unwrap_or_default();
        let bus = self.bus.unwrap_or_default();
        let auth = self.auth.unwrap_or_default();
        let persistence = self.persistence.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                node_id: server
                    .node_id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or(default.server.node_id),
            },
            hub: HubSettings {
                max_connections: hub.max_connections.unwrap_or(default.hub.max_connections),
                event_queue_capacity: hub
                    .event_queue_capacity
                    .unwrap_or(default.hub.event_queue_capacity),
                outbound_queue_capacity: hub
                    .outbound_queue_capacity
                    .unwrap_or(default.hub.outbound_queue_capacity),
                publish_queue_capacity: hub
                    .publish_queue_capacity
                    .unwrap_or(default.hub.publish_queue_capacity),
                keepalive_interval_secs: hub
                    .keepalive_interval_secs
                    .unwrap_or(default.hub.keepalive_interval_secs),
                keepalive_timeout_secs: hub
                    .keepalive_timeout_secs
                    .unwrap_or(default.hub.keepalive_timeout_secs),
                history_limit: hub.history_limit.unwrap_or(default.hub.history_limit),
            },
            bus: BusSettings {
                url: bus.url.filter(|url| !url.is_empty()).or(default.bus.url),
                initial_backoff_ms: bus
                    .initial_backoff_ms
                    .unwrap_or(default.bus.initial_backoff_ms),
                max_backoff_ms: bus.max_backoff_ms.unwrap_or(default.bus.max_backoff_ms),
            },
            auth: AuthSettings {
                enabled: auth.enabled.unwrap_or(default.auth.enabled),
                secret: auth.secret.or(default.auth.secret),
                issuer: auth.issuer.or(default.auth.issuer),
            },
            persistence: PersistenceSettings {
                enabled: persistence.enabled.unwrap_or(default.persistence.enabled),
                path: persistence.path.unwrap_or(default.persistence.path),
                ttl_secs: persistence.ttl_secs.or(default.persistence.ttl_secs),
                max_messages_per_scope: persistence
                    .max_messages_per_scope
                    .or(default.persistence.max_messages_per_scope),
                include_remote: persistence
                    .include_remote
                    .unwrap_or(default.persistence.include_remote),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}

pub fn generate_node_id() -> String {
    format!("node-{}", Uuid::new_v4())
}

/// Provides default values for `Settings`. Each call generates a fresh node id.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                node_id: generate_node_id(),
            },
            hub: HubSettings {
                max_connections: 1000,
                event_queue_capacity: 1024,
                outbound_queue_capacity: 256,
                publish_queue_capacity: 1024,
                keepalive_interval_secs: 20,
                keepalive_timeout_secs: 60,
                history_limit: 50,
            },
            bus: BusSettings {
                url: None,
                initial_backoff_ms: 250,
                max_backoff_ms: 30_000,
            },
            auth: AuthSettings {
                enabled: false,
                secret: None,
                issuer: None,
            },
            persistence: PersistenceSettings {
                enabled: false,
                path: "hubcast_db".to_string(),
                ttl_secs: None,
                max_messages_per_scope: None,
                include_remote: false,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
