//! Bus client for the WebSocket relay
//!
//! Each link is one WebSocket connection to the relay. Envelopes travel as
//! their full JSON form, origin node included.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use super::{Bus, BusLink, BusSink, BusSource};
use crate::envelope::Envelope;
use crate::utils::{HubError, Result};

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WsBus {
    url: String,
}

impl WsBus {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Bus for WsBus {
    async fn connect(&self) -> Result<BusLink> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| HubError::BusUnavailable(format!("{}: {e}", self.url)))?;
        debug!(url = %self.url, "connected to relay");
        let (sink, stream) = stream.split();
        Ok(BusLink {
            sink: Box::new(RelaySink { sink }),
            source: Box::new(RelaySource { stream }),
        })
    }
}

struct RelaySink {
    sink: SplitSink<RelayStream, WsMessage>,
}

#[async_trait]
impl BusSink for RelaySink {
    async fn publish(&mut self, envelope: &Envelope) -> Result<()> {
        let text = envelope.to_json()?;
        self.sink
            .send(WsMessage::text(text))
            .await
            .map_err(|e| HubError::BusUnavailable(e.to_string()))
    }
}

struct RelaySource {
    stream: SplitStream<RelayStream>,
}

#[async_trait]
impl BusSource for RelaySource {
    async fn next(&mut self) -> Result<Envelope> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<Envelope>(text.as_str()) {
                        Ok(envelope) => return Ok(envelope),
                        Err(e) => warn!(error = %e, "ignoring malformed envelope from relay"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(HubError::BusUnavailable(
                        "relay closed the link".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(HubError::BusUnavailable(e.to_string())),
            }
        }
    }
}
