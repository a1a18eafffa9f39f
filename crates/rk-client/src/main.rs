//! rk-chat console client
//!
//! Connects to the router over mutual TLS, identifies with the commonName of
//! its certificate, and runs a line-oriented chat console.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rk_client::connection::{attach, Connector, ExponentialBackoff, OUTBOUND_CHANNEL_CAPACITY};
use rk_client::console;
use rk_client::session::{ChatSession, ConnectionState};
use rk_core::common_name_of_pem;
use rk_core::config::{self, ClientConfig};

/// Session events buffered for the console
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "rk-client")]
#[command(about = "rk-chat console client")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address, host:port (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Name the server certificate must be valid for
    #[arg(long)]
    server_name: Option<String>,

    /// Client certificate, PEM; its commonName is the username
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client private key, PEM
    #[arg(long)]
    key: Option<PathBuf>,

    /// CA bundle the server certificate must chain to, PEM
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they don't interleave with the chat on stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config: ClientConfig =
        config::load_or_default(args.config.as_deref(), &config::default_client_config_path())
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(server) = args.server {
        config.server_address = server;
    }
    if let Some(server_name) = args.server_name {
        config.server_name = server_name;
    }
    config.tls.override_with(args.cert, args.key, args.ca);
    config.validate()?;

    let username = common_name_of_pem(&config.tls.cert)
        .with_context(|| format!("Failed to read username from {:?}", config.tls.cert))?;
    println!("[system] connecting to {} as {} ...", config.server_address, username);

    let backoff = ExponentialBackoff::from_config(&config.backoff);
    let connector = Connector::new(config).context("Failed to load TLS material")?;

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let session = Arc::new(ChatSession::new(username, outbound_tx, event_tx));

    let stream = connector.connect_with_retry(backoff).await?;
    println!("[system] connected!");

    let connection = attach(stream, Arc::clone(&session), outbound_rx);
    session.start().await?;

    console::run(Arc::clone(&session), event_rx).await?;

    session
        .set_connection_state(ConnectionState::Disconnected)
        .await;
    connection.reader.abort();
    let _ = connection.reader.await;
    drop(session);
    let _ = connection.writer.await;
    Ok(())
}
