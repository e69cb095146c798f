//! Inbound client frames
//!
//! Clients send a reduced form of the envelope: `type`, `scope`, `body` and
//! optionally `id` / `timestamp`. Anything a client claims about the sender or
//! the origin node is ignored; the connection stamps those itself.

use serde::Deserialize;
use serde_json::Value;

use super::message::{Envelope, EnvelopeKind, new_envelope_id, now_millis};
use super::scope::Scope;
use crate::utils::{HubError, Result};

#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl InboundFrame {
    /// Parse and validate a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        frame.validate()?;
        Ok(frame)
    }

    fn validate(&self) -> Result<()> {
        if self.kind.is_server_only() {
            return Err(HubError::Decode(format!(
                "envelope type {:?} is reserved for the server",
                self.kind
            )));
        }
        if matches!(self.kind, EnvelopeKind::Join | EnvelopeKind::Leave)
            && self.scope.group().is_none()
        {
            return Err(HubError::Decode(
                "join and leave require a group scope".to_string(),
            ));
        }
        if matches!(&self.id, Some(id) if id.is_empty()) {
            return Err(HubError::Decode("envelope id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Stamp the frame with its sender and the local node.
    pub fn into_envelope(self, sender_id: &str, origin_node: &str) -> Envelope {
        Envelope {
            id: self.id.unwrap_or_else(new_envelope_id),
            kind: self.kind,
            scope: self.scope,
            sender_id: sender_id.to_string(),
            origin_node: origin_node.to_string(),
            body: self.body,
            timestamp: self.timestamp.unwrap_or_else(now_millis),
        }
    }
}
