//! Outbound TLS connection to the router
//!
//! Connects with retry, then splits the stream into a reader task driving the
//! [`ChatSession`] and a writer task draining its outbound frames.

use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use rk_core::{client_tls_config, ClientConfig};
use rk_protocol::FrameCodec;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};

use super::reconnect::ExponentialBackoff;
use crate::error::ClientError;
use crate::session::{ChatSession, ReaderEnd};

/// Frames buffered between the session and the writer task
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Establishes the mutual-TLS stream to the router
pub struct Connector {
    config: ClientConfig,
    tls: TlsConnector,
}

impl Connector {
    /// Load the client certificate and CA bundle named in `config`
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let tls = client_tls_config(&config.tls)?;
        Ok(Self::with_tls(config, tls))
    }

    pub fn with_tls(config: ClientConfig, tls: Arc<rustls::ClientConfig>) -> Self {
        Self {
            config,
            tls: TlsConnector::from(tls),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect, retrying transport failures with backoff.
    ///
    /// A rejected handshake is returned immediately. With
    /// `max_connect_attempts == 0` transport failures are retried forever.
    pub async fn connect_with_retry(
        &self,
        mut backoff: ExponentialBackoff,
    ) -> Result<TlsStream<TcpStream>, ClientError> {
        let max_attempts = self.config.max_connect_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.try_connect().await {
                Ok(stream) => {
                    tracing::info!(address = %self.config.server_address, "Connected to server");
                    return Ok(stream);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(error = %e, "Connection refused, not retrying");
                    return Err(e);
                }
                Err(e) if max_attempts != 0 && attempt >= max_attempts => {
                    tracing::error!(error = %e, attempts = attempt, "Giving up");
                    return Err(ClientError::AttemptsExhausted(attempt));
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %e, attempt, ?delay, "Connection failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Attempt a single connection
    pub async fn try_connect(&self) -> Result<TlsStream<TcpStream>, ClientError> {
        let address = self.config.server_address.clone();
        let server_name = ServerName::try_from(self.config.server_name.clone())
            .map_err(|_| ClientError::InvalidServerName(self.config.server_name.clone()))?;

        tracing::debug!(%address, "Connecting");
        let connect = async {
            let tcp = TcpStream::connect(&address)
                .await
                .map_err(|source| ClientError::Connect {
                    address: address.clone(),
                    source,
                })?;
            let stream = self
                .tls
                .connect(server_name, tcp)
                .await
                .map_err(classify_handshake_error)?;
            Ok::<_, ClientError>(stream)
        };

        tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| ClientError::Timeout(address.clone()))?
    }
}

/// TLS protocol errors mean the peer refused us or we refused it; anything
/// else is a transport hiccup worth retrying
fn classify_handshake_error(error: std::io::Error) -> ClientError {
    let rejected = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .map(|tls| tls.to_string());
    match rejected {
        Some(reason) => ClientError::TlsRejected(reason),
        None => ClientError::Handshake(error),
    }
}

/// Reader and writer tasks of a live connection
pub struct ActiveConnection {
    pub reader: JoinHandle<ReaderEnd>,
    pub writer: JoinHandle<()>,
}

/// Split `stream` and start the reader and writer tasks
pub fn attach<S>(
    stream: S,
    session: Arc<ChatSession>,
    outbound: mpsc::Receiver<Bytes>,
) -> ActiveConnection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let writer = tokio::spawn(run_writer(outbound, write_half));
    let reader = tokio::spawn(async move {
        session
            .run_reader(FramedRead::new(read_half, FrameCodec::new()))
            .await
    });
    ActiveConnection { reader, writer }
}

/// Write already-encoded frames until the session drops its sender or the
/// transport fails
pub async fn run_writer<W>(mut outbound: mpsc::Receiver<Bytes>, writer: W)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, BytesCodec::new());
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(frame).await {
            tracing::warn!(error = %e, "Write failed, closing writer");
            return;
        }
    }
    if let Err(e) = SinkExt::<Bytes>::close(&mut sink).await {
        tracing::debug!(error = %e, "Error closing transport");
    }
}
