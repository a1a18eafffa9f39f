//! TLS listener
//!
//! Accepts TCP connections, completes the mutual-TLS handshake, derives the
//! participant's name from its certificate and spawns a worker for it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rk_core::{CommonNameIdentity, IdentityError, IdentityProvider};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::server::handler::serve_connection;
use crate::state::ServerState;

/// Upper bound on the TLS handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection that never reached the registry
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("TLS handshake timed out")]
    Timeout,

    #[error("TLS handshake failed: {0}")]
    Tls(#[from] std::io::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Mutual-TLS chat listener
pub struct TlsListener {
    acceptor: TlsAcceptor,
    identity: Arc<dyn IdentityProvider>,
    state: Arc<ServerState>,
    cancel: CancellationToken,
}

impl TlsListener {
    pub fn new(
        tls: Arc<rustls::ServerConfig>,
        state: Arc<ServerState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            acceptor: TlsAcceptor::from(tls),
            identity: Arc::new(CommonNameIdentity),
            state,
            cancel,
        }
    }

    /// Replace how participant names are derived from certificates
    pub fn with_identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    /// Bind `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve an already-bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "Chat server listening");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Listener shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.spawn_connection(socket, peer_addr),
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn spawn_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!(peer = %peer_addr, "New connection");

        let acceptor = self.acceptor.clone();
        let identity = Arc::clone(&self.identity);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let (stream, username) = match handshake(&acceptor, identity.as_ref(), socket).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(peer = %peer_addr, error = %e, "Rejected connection");
                    return;
                }
            };

            tracing::info!(peer = %peer_addr, user = %username, "Authenticated");
            serve_connection(
                stream,
                username,
                Arc::clone(&state.registry),
                state.config.outbound_queue,
                cancel,
            )
            .await;
        });
    }
}

/// Complete the TLS handshake and bind a verified name to the stream
pub async fn handshake(
    acceptor: &TlsAcceptor,
    identity: &dyn IdentityProvider,
    socket: TcpStream,
) -> Result<(TlsStream<TcpStream>, String), HandshakeError> {
    let stream = tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(socket))
        .await
        .map_err(|_| HandshakeError::Timeout)??;

    let (_, connection) = stream.get_ref();
    let username = identity.derive_identity(connection.peer_certificates())?;
    Ok((stream, username))
}
