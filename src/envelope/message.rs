//! Envelope definitions
//!
//! `Envelope` is the canonical record exchanged between connections, the hub
//! and the bus. Notes on fields:
//! - `id`: opaque unique id; assigned server-side when the client omits it
//! - `kind`: serialized as `type`
//! - `sender_id` / `origin_node`: stamped by the server, never trusted from clients
//! - `timestamp`: milliseconds since UNIX epoch
//! - `body`: opaque JSON payload

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::scope::{ClientId, Scope};

pub type NodeId = String;

/// Sender id used for envelopes produced by the server itself.
pub const SYSTEM_SENDER: &str = "hub";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Chat,
    Join,
    Leave,
    History,
    Welcome,
    Rejected,
}

impl EnvelopeKind {
    /// Kinds only the server may produce.
    pub fn is_server_only(self) -> bool {
        matches!(self, EnvelopeKind::Welcome | EnvelopeKind::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub scope: Scope,
    #[serde(rename = "senderID")]
    pub sender_id: ClientId,
    #[serde(rename = "originNode")]
    pub origin_node: NodeId,
    #[serde(default)]
    pub body: Value,
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(
        kind: EnvelopeKind,
        scope: Scope,
        sender_id: impl Into<ClientId>,
        origin_node: impl Into<NodeId>,
        body: Value,
    ) -> Self {
        Self {
            id: new_envelope_id(),
            kind,
            scope,
            sender_id: sender_id.into(),
            origin_node: origin_node.into(),
            body,
            timestamp: now_millis(),
        }
    }

    /// Build a server-produced envelope addressed to a single client.
    pub fn system(kind: EnvelopeKind, target: &str, origin_node: &str, body: Value) -> Self {
        Self::new(
            kind,
            Scope::Direct(target.to_string()),
            SYSTEM_SENDER,
            origin_node,
            body,
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn new_envelope_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
