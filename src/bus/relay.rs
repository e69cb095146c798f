//! Standalone bus relay
//!
//! The relay is the shared channel hub instances publish to. Every text
//! frame received from a peer is forwarded to every connected peer, the
//! publisher included; loop prevention is the nodes' job. Nothing is
//! retained, and a peer that falls too far behind loses frames.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::utils::flag_reaches;

/// Accept peers until `shutdown` turns true.
pub async fn serve_relay(
    listener: TcpListener,
    capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let (channel, _) = broadcast::channel::<WsMessage>(capacity.max(1));
    if let Ok(addr) = listener.local_addr() {
        info!("relay listening on ws://{addr}");
    }

    loop {
        tokio::select! {
            _ = flag_reaches(&mut shutdown, true) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(relay_peer(stream, peer, channel.clone()));
                }
                Err(e) => warn!(error = %e, "relay accept failed"),
            },
        }
    }
    info!("relay stopped");
}

async fn relay_peer(stream: TcpStream, peer: SocketAddr, channel: broadcast::Sender<WsMessage>) {
    // Subscribed before the handshake completes so the peer sees every frame
    // published after its connect returns.
    let mut frames = channel.subscribe();
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "relay handshake failed");
            return;
        }
    };
    info!(%peer, "relay peer connected");
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(msg @ WsMessage::Text(_))) => {
                    let _ = channel.send(msg);
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "relay peer read failed");
                    break;
                }
            },
            outgoing = frames.recv() => match outgoing {
                Ok(msg) => {
                    if let Err(e) = sink.send(msg).await {
                        debug!(%peer, error = %e, "relay peer write failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%peer, skipped, "relay peer lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    info!(%peer, "relay peer disconnected");
}
