//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or parsing packets
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Encoded payload does not fit the 16-bit length prefix
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Peer closed or reset the stream before a full frame arrived
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Payload is not UTF-8 or not a structurally valid packet
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the far end went away (close, reset or truncated frame)
    pub fn is_connection_closed(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Whether a reader hitting this error must end the session.
    ///
    /// Only `FrameTooLarge` is local to a single outbound packet; everything
    /// else leaves the inbound stream in an unknown position.
    pub fn terminates_session(&self) -> bool {
        !matches!(self, ProtocolError::FrameTooLarge { .. })
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::MalformedPayload(e.to_string())
    }
}

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(e: std::str::Utf8Error) -> Self {
        ProtocolError::MalformedPayload(format!("invalid UTF-8: {}", e))
    }
}
