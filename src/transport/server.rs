//! WebSocket server
//!
//! One task accepts sockets; each socket gets its own task that performs the
//! handshake, checks admission and authentication, then runs the
//! `Connection` until it closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use super::handshake::{DENIED_CLOSE_CODE, bearer_token};
use crate::auth::Authenticator;
use crate::connection::{Connection, ConnectionSettings};
use crate::hub::HubHandle;
use crate::persistence::Store;
use crate::utils::{HubError, Result, flag_reaches};

/// Everything a socket task needs to admit and run a connection.
pub struct ServerContext {
    pub hub: HubHandle,
    pub auth: Arc<dyn Authenticator>,
    pub store: Arc<dyn Store>,
    pub connection: ConnectionSettings,
    permits: Arc<Semaphore>,
}

impl ServerContext {
    pub fn new(
        hub: HubHandle,
        auth: Arc<dyn Authenticator>,
        store: Arc<dyn Store>,
        connection: ConnectionSettings,
        max_connections: usize,
    ) -> Self {
        Self {
            hub,
            auth,
            store,
            connection,
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
        }
    }

    /// Connection slots still free.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| HubError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Accept sockets until `shutdown` turns true. Connections already running
/// are left to the hub's shutdown.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(node = %ctx.hub.node_id(), "listening on ws://{addr}");
    }
    loop {
        tokio::select! {
            _ = flag_reaches(&mut shutdown, true) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_socket(stream, peer, ctx.clone()));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    info!(node = %ctx.hub.node_id(), "listener stopped");
}

async fn handle_socket(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    let mut token = None;
    let capture = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        token = bearer_token(request);
        Ok(response)
    };
    let mut ws = match accept_hdr_async(stream, capture).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };

    let Ok(_permit) = ctx.permits.clone().try_acquire_owned() else {
        warn!(%peer, "connection limit reached");
        refuse(&mut ws, CloseCode::Again, "server at capacity").await;
        return;
    };

    let identity = match ctx.auth.validate(token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(%peer, error = %e, "handshake denied");
            refuse(&mut ws, CloseCode::from(DENIED_CLOSE_CODE), "unauthorized").await;
            return;
        }
    };
    if let Some(identity) = &identity {
        debug!(%peer, subject = %identity.subject, "client authenticated");
    }

    let conn = Connection::new(
        ctx.hub.clone(),
        identity,
        ctx.store.clone(),
        ctx.connection.clone(),
    );
    let client_id = conn.id().to_string();
    if let Err(e) = conn.run(ws).await {
        debug!(%peer, client_id = %client_id, error = %e, "connection ended with error");
    }
}

async fn refuse(ws: &mut WebSocketStream<TcpStream>, code: CloseCode, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if ws.close(Some(frame)).await.is_err() {
        return;
    }
    // Let the peer answer the close before the socket drops.
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
}
