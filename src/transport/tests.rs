use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::server::Request;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::coding::CloseCode;

use super::*;
use crate::auth::{AllowAll, Authenticator, JwtAuthenticator};
use crate::connection::ConnectionSettings;
use crate::hub::{Hub, HubHandle};
use crate::persistence::NoopStore;

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "transport-test-secret";

struct TestServer {
    url: String,
    hub: HubHandle,
    stop: watch::Sender<bool>,
}

async fn start(auth: Arc<dyn Authenticator>, max_connections: usize) -> TestServer {
    let (hub, _task) = Hub::new("node-t").spawn(64);
    let ctx = Arc::new(ServerContext::new(
        hub.clone(),
        auth,
        Arc::new(NoopStore),
        ConnectionSettings::default(),
        max_connections,
    ));
    let listener = bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stop_rx) = watch::channel(false);
    tokio::spawn(serve(listener, ctx, stop_rx));
    TestServer {
        url: format!("ws://{addr}"),
        hub,
        stop,
    }
}

async fn next_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// Connect and consume the welcome, returning the assigned client id.
async fn join(url: &str) -> (ClientWs, String) {
    let (mut ws, _) = connect_async(url).await.unwrap();
    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    let id = welcome["body"]["clientID"].as_str().unwrap().to_string();
    (ws, id)
}

async fn close_code(ws: &mut ClientWs) -> Option<CloseCode> {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(WsMessage::Close(frame)))) => return frame.map(|f| f.code),
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

#[test]
fn test_bearer_token_from_header() {
    let request = Request::builder()
        .uri("/ws")
        .header(AUTHORIZATION, "Bearer abc.def")
        .body(())
        .unwrap();
    assert_eq!(bearer_token(&request).as_deref(), Some("abc.def"));
}

#[test]
fn test_bearer_token_from_query() {
    let request = Request::builder()
        .uri("/ws?room=x&token=a%2Bb")
        .body(())
        .unwrap();
    assert_eq!(bearer_token(&request).as_deref(), Some("a+b"));
}

#[test]
fn test_bearer_token_absent() {
    let request = Request::builder()
        .uri("/ws?token=")
        .header(AUTHORIZATION, "Basic Zm9vOmJhcg==")
        .body(())
        .unwrap();
    assert_eq!(bearer_token(&request), None);
}

#[tokio::test]
async fn test_chat_between_two_clients() {
    let server = start(Arc::new(AllowAll), 16).await;
    let (mut a, a_id) = join(&server.url).await;
    let (mut b, b_id) = join(&server.url).await;
    assert_ne!(a_id, b_id);

    a.send(WsMessage::text(
        json!({"type": "chat", "scope": "global", "body": "hi"}).to_string(),
    ))
    .await
    .unwrap();

    let got = next_json(&mut b).await;
    assert_eq!(got["type"], "chat");
    assert_eq!(got["body"], "hi");
    assert_eq!(got["senderID"], json!(a_id));
    assert_eq!(got["originNode"], "node-t");

    let echoed = tokio::time::timeout(Duration::from_millis(150), a.next()).await;
    assert!(echoed.is_err(), "sender received its own global chat");
}

#[tokio::test]
async fn test_disconnect_unregisters_client() {
    let server = start(Arc::new(AllowAll), 16).await;
    let (mut a, _) = join(&server.url).await;
    assert_eq!(server.hub.stats().await.unwrap().clients, 1);

    a.close(None).await.unwrap();
    for _ in 0..100 {
        if server.hub.stats().await.unwrap().clients == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("client still registered after closing");
}

#[tokio::test]
async fn test_missing_token_is_denied_with_4401() {
    let auth = Arc::new(JwtAuthenticator::new(SECRET, None));
    let server = start(auth, 16).await;

    let (mut ws, _) = connect_async(server.url.as_str()).await.unwrap();
    assert_eq!(close_code(&mut ws).await, Some(CloseCode::Library(4401)));
    assert_eq!(server.hub.stats().await.unwrap().clients, 0);
}

#[tokio::test]
async fn test_invalid_token_is_denied_with_4401() {
    let auth = Arc::new(JwtAuthenticator::new(SECRET, None));
    let server = start(auth, 16).await;
    let forged = JwtAuthenticator::new("another-secret", None)
        .issue("mallory", chrono::Duration::minutes(5))
        .unwrap();

    let url = format!("{}/?token={forged}", server.url);
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    assert_eq!(close_code(&mut ws).await, Some(CloseCode::from(DENIED_CLOSE_CODE)));
}

#[tokio::test]
async fn test_valid_token_in_query_is_admitted() {
    let auth = Arc::new(JwtAuthenticator::new(SECRET, None));
    let token = auth.issue("alice", chrono::Duration::minutes(5)).unwrap();
    let server = start(auth, 16).await;

    let (_ws, _id) = join(&format!("{}/?token={token}", server.url)).await;
    assert_eq!(server.hub.stats().await.unwrap().clients, 1);
}

#[tokio::test]
async fn test_valid_token_in_header_is_admitted() {
    let auth = Arc::new(JwtAuthenticator::new(SECRET, Some("hubcast".to_string())));
    let token = auth.issue("alice", chrono::Duration::minutes(5)).unwrap();
    let server = start(auth, 16).await;

    let mut request = server.url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    let (mut ws, _) = connect_async(request).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "welcome");
}

#[tokio::test]
async fn test_connections_beyond_limit_are_refused() {
    let server = start(Arc::new(AllowAll), 1).await;
    let (_first, _) = join(&server.url).await;

    let (mut second, _) = connect_async(server.url.as_str()).await.unwrap();
    assert_eq!(close_code(&mut second).await, Some(CloseCode::Again));
    assert_eq!(server.hub.stats().await.unwrap().clients, 1);
}

#[tokio::test]
async fn test_stopped_listener_refuses_new_sockets() {
    let server = start(Arc::new(AllowAll), 16).await;
    let (_ws, _) = join(&server.url).await;

    server.stop.send_replace(true);
    let mut refused = false;
    for _ in 0..50 {
        if connect_async(server.url.as_str()).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refused, "listener still accepting after stop");
}
