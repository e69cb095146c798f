//! CLI for hubcast
//!
//! Subcommands:
//! - `server`: run a hub node
//! - `relay`: run the bus relay that hub nodes connect to
//! - `client`: connect to a node, optionally send one message, and print
//!   everything that arrives (useful for smoke tests)

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tracing::{error, info};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use hubcast::config::{load_config, load_config_from};
use hubcast::envelope::Scope;
use hubcast::service::{Capabilities, Service};
use hubcast::transport;
use hubcast::utils::logging;

#[derive(Parser)]
#[command(name = "hubcast")]
enum Command {
    /// Start a hub node
    Server {
        /// Configuration file to read instead of `config/default`
        #[arg(long)]
        config: Option<String>,
    },
    /// Start the bus relay
    Relay {
        #[arg(long, default_value = "127.0.0.1:7000")]
        addr: String,
        /// Frames buffered per peer before a slow peer starts losing them
        #[arg(long, default_value_t = 1024)]
        capacity: usize,
    },
    /// Run a simple client
    Client {
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        #[arg(long)]
        token: Option<String>,
        /// `global`, `group:<id>` or `direct:<id>`
        #[arg(long, default_value = "global")]
        scope: String,
        /// Chat body to send once connected
        #[arg(long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let result = match cmd {
        Command::Server { config } => run_server(config.as_deref()).await,
        Command::Relay { addr, capacity } => {
            logging::init("info");
            run_relay(&addr, capacity).await
        }
        Command::Client {
            url,
            token,
            scope,
            message,
        } => {
            logging::init("info");
            run_client(&url, token.as_deref(), &scope, message.as_deref()).await
        }
    };

    if let Err(e) = result {
        error!("hubcast failed: {e}");
        std::process::exit(1);
    }
}

async fn run_server(config: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = match config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    logging::init(&settings.log.level);

    let caps = Capabilities::from_settings(&settings)?;
    let service = Service::start(&settings, caps).await?;
    info!(node = %service.node_id(), "serving on ws://{}", service.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully.");
    service.shutdown().await;
    Ok(())
}

async fn run_relay(addr: &str, capacity: usize) -> Result<(), Box<dyn std::error::Error>> {
    let listener = transport::bind(addr).await?;
    let (stop, stop_rx) = watch::channel(false);
    let relay = tokio::spawn(hubcast::bus::relay::serve_relay(listener, capacity, stop_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully.");
    stop.send_replace(true);
    relay.await?;
    Ok(())
}

async fn run_client(
    url: &str,
    token: Option<&str>,
    scope: &str,
    message: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope: Scope = scope.parse()?;
    let mut url = Url::parse(url)?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }

    let (mut ws, _response) = connect_async(url.as_str()).await?;

    if let Scope::Group(_) = &scope {
        let join = json!({ "type": "join", "scope": scope });
        ws.send(WsMessage::text(join.to_string())).await?;
    }
    if let Some(body) = message {
        let chat = json!({ "type": "chat", "scope": scope, "body": body });
        ws.send(WsMessage::text(chat.to_string())).await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                ws.close(None).await?;
                break;
            }
            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => println!("{text}"),
                Some(Ok(WsMessage::Close(frame))) => {
                    if let Some(frame) = frame {
                        println!("closed by server: {} {}", u16::from(frame.code), frame.reason);
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }
    Ok(())
}
