//! Per-connection worker
//!
//! Reads frames from one authenticated participant, admits it on a matching
//! `Init`, and routes its messages. Whatever ends the read loop, the
//! participant is evicted exactly once.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rk_protocol::{Frame, FrameCodec, Packet, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::connection::{run_writer, AdmitError, ConnectionHandle, Registry, RouteError};

/// How long queued packets may take to flush once the reader has finished
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a connection's session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Peer closed or reset the stream
    Closed,
    /// Unreadable frame or transport failure
    Protocol(ProtocolError),
    /// Peer broke the handshake or sent a server-only packet
    Violation(String),
    /// Admission refused
    Rejected(AdmitError),
    /// Server shutting down
    Shutdown,
}

/// Evicts its connection exactly once: explicitly through
/// [`AdmissionGuard::release`], or from `Drop` if the worker unwinds.
pub struct AdmissionGuard {
    registry: Arc<Registry>,
    handle: Option<ConnectionHandle>,
}

impl AdmissionGuard {
    pub fn new(registry: Arc<Registry>, handle: ConnectionHandle) -> Self {
        Self {
            registry,
            handle: Some(handle),
        }
    }

    pub async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            self.registry.evict_connection(&handle).await;
        }
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(user = %handle.username(), "Worker exited without release, evicting");
                runtime.spawn(async move {
                    registry.evict_connection(&handle).await;
                });
            }
            Err(_) => {
                tracing::error!(user = %handle.username(), "No runtime to evict on");
            }
        }
    }
}

enum WorkerState {
    AwaitingInit,
    Admitted(AdmissionGuard),
}

/// Packet dispatch for one connection
pub struct ClientWorker {
    identity: String,
    handle: ConnectionHandle,
    registry: Arc<Registry>,
    state: WorkerState,
}

impl ClientWorker {
    pub fn new(identity: String, handle: ConnectionHandle, registry: Arc<Registry>) -> Self {
        Self {
            identity,
            handle,
            registry,
            state: WorkerState::AwaitingInit,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self.state, WorkerState::Admitted(_))
    }

    /// Read and dispatch frames until the session ends
    pub async fn run<R>(&mut self, frames: &mut FramedRead<R, FrameCodec>) -> SessionEnd
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = match frames.next().await {
                None => return SessionEnd::Closed,
                Some(Ok(frame)) => frame,
                Some(Err(e)) if e.is_connection_closed() => return SessionEnd::Closed,
                Some(Err(e)) => return SessionEnd::Protocol(e),
            };

            let packet = match frame {
                Frame::Empty => continue,
                Frame::Packet(stamped) => stamped.into_packet(),
            };

            if let ControlFlow::Break(end) = self.dispatch(packet).await {
                return end;
            }
        }
    }

    async fn dispatch(&mut self, packet: Packet) -> ControlFlow<SessionEnd> {
        tracing::debug!(user = %self.identity, kind = %packet.kind(), "Received");

        match packet {
            Packet::Init { sender } => self.on_init(sender).await,
            Packet::Message {
                receiver, content, ..
            } => {
                if !self.is_admitted() {
                    tracing::warn!(user = %self.identity, "Message before init");
                    self.reply_error().await;
                    return ControlFlow::Continue(());
                }
                // Sender is always the verified identity, whatever the client claimed
                let message = Packet::Message {
                    sender: self.identity.clone(),
                    receiver,
                    content,
                };
                match self.registry.route(message).await {
                    Ok(_) | Err(RouteError::UnknownRecipient(_)) => {}
                    Err(e) => tracing::warn!(user = %self.identity, error = %e, "Routing failed"),
                }
                ControlFlow::Continue(())
            }
            other => {
                self.reply_error().await;
                ControlFlow::Break(SessionEnd::Violation(format!(
                    "client sent server-only packet {}",
                    other.kind()
                )))
            }
        }
    }

    async fn on_init(&mut self, sender: String) -> ControlFlow<SessionEnd> {
        if self.is_admitted() {
            tracing::warn!(user = %self.identity, "Repeated init");
            self.reply_error().await;
            return ControlFlow::Continue(());
        }

        if sender != self.identity {
            self.reply_error().await;
            return ControlFlow::Break(SessionEnd::Violation(format!(
                "init as {sender} over a connection verified as {}",
                self.identity
            )));
        }

        match self.registry.admit(self.handle.clone()).await {
            Ok(()) => {
                let guard = AdmissionGuard::new(Arc::clone(&self.registry), self.handle.clone());
                self.state = WorkerState::Admitted(guard);
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.reply_error().await;
                ControlFlow::Break(SessionEnd::Rejected(e))
            }
        }
    }

    async fn reply_error(&self) {
        if let Err(e) = self.handle.send(Packet::Error).await {
            tracing::debug!(user = %self.identity, error = %e, "Could not send error notice");
        }
    }

    /// Evict if admitted
    pub async fn finish(&mut self) {
        if let WorkerState::Admitted(guard) =
            std::mem::replace(&mut self.state, WorkerState::AwaitingInit)
        {
            guard.release().await;
        }
    }
}

/// Serve one authenticated stream until it closes, misbehaves or the server
/// shuts down
pub async fn serve_connection<S>(
    stream: S,
    identity: String,
    registry: Arc<Registry>,
    outbound_queue: usize,
    cancel: CancellationToken,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (handle, rx) = ConnectionHandle::channel(identity.clone(), outbound_queue);
    let writer = tokio::spawn(run_writer(rx, write_half, identity.clone()));

    let mut frames = FramedRead::new(read_half, FrameCodec::new());
    let mut worker = ClientWorker::new(identity.clone(), handle, registry);

    let end = tokio::select! {
        end = worker.run(&mut frames) => end,
        _ = cancel.cancelled() => SessionEnd::Shutdown,
    };
    worker.finish().await;

    match &end {
        SessionEnd::Closed | SessionEnd::Shutdown => {
            tracing::info!(user = %identity, reason = ?end, "Session ended");
        }
        _ => {
            tracing::warn!(user = %identity, reason = ?end, "Session terminated");
        }
    }

    // Dropping the last local handle lets the writer flush and close
    drop(worker);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        tracing::debug!(user = %identity, "Writer did not drain in time");
    }
    end
}
