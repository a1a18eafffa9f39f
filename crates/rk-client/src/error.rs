//! Client error types

use rk_core::{IdentityError, TlsError};
use rk_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// TCP connect failed
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect plus handshake exceeded the configured timeout
    #[error("Connecting to {0} timed out")]
    Timeout(String),

    /// The server or its certificate was refused during the handshake; not retried
    #[error("TLS handshake rejected: {0}")]
    TlsRejected(String),

    /// Handshake failed for a transport reason
    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    #[error("Gave up after {0} connection attempts")]
    AttemptsExhausted(u32),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection's writer is gone
    #[error("Not connected")]
    Disconnected,
}

impl ClientError {
    /// Whether another connection attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. } | ClientError::Timeout(_) | ClientError::Handshake(_)
        )
    }
}
