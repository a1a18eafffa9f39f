//! Shared chat session
//!
//! The background reader applies inbound packets under the state lock and
//! publishes a [`SessionEvent`] once the lock is released; the presentation
//! layer reads state through [`ChatSession::state`] and sends through
//! [`ChatSession::send_message`].
//!
//! Every transmission happens under `send_order`, so messages queued before
//! the roster reach the writer ahead of anything sent after it.

use bytes::Bytes;
use futures::StreamExt;
use rk_protocol::{encode_packet, Frame, FrameCodec, Packet, ProtocolError};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Mutex, RwLock, RwLockReadGuard};
use tokio_util::codec::FramedRead;

use super::state::{Compose, ConnectionState, SessionEvent, SessionState};
use crate::error::ClientError;

/// What happened to a sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Echoed locally, transmitted once the roster arrives
    Queued,
}

/// How the reader loop ended
#[derive(Debug)]
pub enum ReaderEnd {
    Closed,
    Failed(ProtocolError),
}

pub struct ChatSession {
    state: RwLock<SessionState>,
    send_order: Mutex<()>,
    outbound: mpsc::Sender<Bytes>,
    events: mpsc::Sender<SessionEvent>,
}

impl ChatSession {
    /// `outbound` carries encoded frames to the connection writer, `events`
    /// feeds the presentation layer
    pub fn new(
        username: impl Into<String>,
        outbound: mpsc::Sender<Bytes>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: RwLock::new(SessionState::new(username)),
            send_order: Mutex::new(()),
            outbound,
            events,
        }
    }

    /// Read access for rendering
    pub async fn state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().await
    }

    pub async fn username(&self) -> String {
        self.state.read().await.username().to_string()
    }

    pub async fn set_connection_state(&self, connection: ConnectionState) {
        self.state.write().await.set_connection_state(connection);
        self.notify(SessionEvent::StateChanged(connection)).await;
    }

    /// Identify to the server. Called once the transport is up.
    ///
    /// The session is marked active before `Init` leaves, so a roster that
    /// arrives immediately is never overwritten.
    pub async fn start(&self) -> Result<(), ClientError> {
        let username = self.username().await;
        self.set_connection_state(ConnectionState::AwaitingIdentity)
            .await;

        let init = encode_packet(&Packet::Init {
            sender: username.clone(),
        })?;
        self.set_connection_state(ConnectionState::Active { initialized: false })
            .await;
        {
            let _order = self.send_order.lock().await;
            self.transmit(init).await?;
        }

        tracing::info!(user = %username, "Identified to server");
        Ok(())
    }

    /// Send `content` to `receiver` (`"public"` or a username).
    ///
    /// Oversized messages are refused before anything changes. Otherwise the
    /// message is echoed into the room first; a transmission failure after
    /// that leaves the echo in place.
    pub async fn send_message(
        &self,
        receiver: &str,
        content: &str,
    ) -> Result<SendOutcome, ClientError> {
        let order = self.send_order.lock().await;
        let (frame, compose) = {
            let mut state = self.state.write().await;
            let frame = encode_packet(&state.outbound_packet(receiver, content))?;
            (frame, state.compose(receiver, content))
        };

        let outcome = match compose {
            Compose::Send(_) => self.transmit(frame).await.map(|()| SendOutcome::Sent),
            Compose::Queued => {
                tracing::debug!(%receiver, "Queued until user list arrives");
                Ok(SendOutcome::Queued)
            }
        };
        drop(order);

        self.notify(SessionEvent::Refresh).await;
        outcome
    }

    /// Apply one inbound packet and publish the resulting notification
    pub async fn handle_packet(&self, packet: Packet) -> Result<(), ClientError> {
        tracing::debug!(kind = %packet.kind(), "Received");

        // Held through the flush so later sends queue up behind it
        let order = self.send_order.lock().await;
        let (event, flush) = {
            let mut state = self.state.write().await;
            let event = state.apply(packet);
            (event, state.take_pending())
        };

        if !flush.is_empty() {
            tracing::debug!(count = flush.len(), "Flushing queued messages");
        }
        let flushed = self.transmit_all(&flush).await;
        drop(order);

        if let Some(event) = event {
            self.notify(event).await;
        }
        flushed
    }

    /// Dispatch inbound frames until the stream ends, then mark the session
    /// disconnected
    pub async fn run_reader<R>(&self, mut frames: FramedRead<R, FrameCodec>) -> ReaderEnd
    where
        R: AsyncRead + Unpin,
    {
        let end = loop {
            let packet = match frames.next().await {
                None => break ReaderEnd::Closed,
                Some(Ok(Frame::Empty)) => continue,
                Some(Ok(Frame::Packet(stamped))) => stamped.into_packet(),
                Some(Err(e)) if e.is_connection_closed() => break ReaderEnd::Closed,
                Some(Err(e)) => break ReaderEnd::Failed(e),
            };

            if let Err(e) = self.handle_packet(packet).await {
                // Flushing queued messages failed; the reader keeps going
                tracing::warn!(error = %e, "Could not flush queued messages");
            }
        };

        match &end {
            ReaderEnd::Closed => tracing::info!("Server closed the connection"),
            ReaderEnd::Failed(e) => tracing::warn!(error = %e, "Connection failed"),
        }
        self.set_connection_state(ConnectionState::Disconnected).await;
        self.notify(SessionEvent::Disconnected).await;
        end
    }

    pub async fn select_room(&self, name: &str) -> bool {
        let selected = self.state.write().await.select_room(name);
        if selected {
            self.notify(SessionEvent::Refresh).await;
        }
        selected
    }

    pub async fn select_next_room(&self) -> String {
        let name = self.state.write().await.select_next_room().name().to_string();
        self.notify(SessionEvent::Refresh).await;
        name
    }

    pub async fn select_previous_room(&self) -> String {
        let name = self
            .state
            .write()
            .await
            .select_previous_room()
            .name()
            .to_string();
        self.notify(SessionEvent::Refresh).await;
        name
    }

    async fn transmit_all(&self, packets: &[Packet]) -> Result<(), ClientError> {
        for packet in packets {
            self.transmit(encode_packet(packet)?).await?;
        }
        Ok(())
    }

    async fn transmit(&self, frame: Bytes) -> Result<(), ClientError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    async fn notify(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            tracing::trace!("No presentation listening for session events");
        }
    }
}
