//! Per-connection outbound handle and writer task

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::SinkExt;
use rk_protocol::{FrameCodec, Packet, ProtocolError};
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::codec::FramedWrite;

/// How long a routing call waits on a full outbound queue before giving up
/// on that peer
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Unique id distinguishing successive connections that share a username
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A packet could not be queued for a peer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection for {0} is closed")]
    Closed(String),

    #[error("outbound queue for {0} stayed full")]
    Backlogged(String),
}

/// Cloneable sending side of one admitted (or admitting) connection
///
/// Packets are queued on a bounded channel drained by a dedicated writer task,
/// so any number of routing calls can deliver concurrently.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    username: String,
    id: ConnectionId,
    tx: mpsc::Sender<Packet>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver its writer task drains
    pub fn channel(username: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            username: username.into(),
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        };
        (handle, rx)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a packet, waiting up to [`DELIVERY_TIMEOUT`] for queue space
    pub async fn send(&self, packet: Packet) -> Result<(), DeliveryError> {
        self.tx
            .send_timeout(packet, DELIVERY_TIMEOUT)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DeliveryError::Backlogged(self.username.clone()),
                SendTimeoutError::Closed(_) => DeliveryError::Closed(self.username.clone()),
            })
    }

    /// Hold one slot in the outbound queue, waiting up to
    /// [`DELIVERY_TIMEOUT`] for it to free up
    pub async fn reserve(&self) -> Result<mpsc::Permit<'_, Packet>, DeliveryError> {
        match tokio::time::timeout(DELIVERY_TIMEOUT, self.tx.reserve()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(DeliveryError::Closed(self.username.clone())),
            Err(_) => Err(DeliveryError::Backlogged(self.username.clone())),
        }
    }
}

/// Drain queued packets onto the wire until every handle is dropped or the
/// transport fails
pub async fn run_writer<W>(mut rx: mpsc::Receiver<Packet>, writer: W, username: String)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, FrameCodec::new());

    while let Some(packet) = rx.recv().await {
        let kind = packet.kind();
        match sink.send(packet).await {
            Ok(()) => {
                tracing::debug!(user = %username, %kind, "Packet written");
            }
            Err(e @ ProtocolError::FrameTooLarge { .. }) => {
                tracing::warn!(user = %username, %kind, error = %e, "Dropping oversized packet");
            }
            Err(e) => {
                tracing::warn!(user = %username, error = %e, "Write failed, closing writer");
                return;
            }
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(user = %username, error = %e, "Error closing transport");
    }
}
