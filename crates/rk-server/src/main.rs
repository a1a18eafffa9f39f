//! rk-chat router daemon
//!
//! Listens for mutually authenticated TLS connections and relays chat
//! messages between admitted participants.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rk_core::config::{self, ServerConfig};
use rk_core::server_tls_config;
use rk_server::{ServerState, TlsListener};

#[derive(Parser)]
#[command(name = "rk-server")]
#[command(about = "rk-chat router daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Server certificate chain, PEM
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Server private key, PEM
    #[arg(long)]
    key: Option<PathBuf>,

    /// CA bundle that client certificates must chain to, PEM
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config: ServerConfig =
        config::load_or_default(args.config.as_deref(), &config::default_server_config_path())
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    config.tls.override_with(args.cert, args.key, args.ca);
    config.validate()?;

    let tls = server_tls_config(&config.tls).with_context(|| {
        format!(
            "Failed to load TLS material (cert {:?}, key {:?}, ca {:?})",
            config.tls.cert, config.tls.key, config.tls.ca
        )
    })?;

    let bind_addr = config.bind_address.clone();
    let state = Arc::new(ServerState::new(config));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    TlsListener::new(tls, state, cancel).run(&bind_addr).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
}
