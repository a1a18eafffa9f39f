//! rk-client: Chat client for rk-chat
//!
//! Connects to the router over mutual TLS, rebuilds rooms and message
//! history from the inbound packet stream, and exposes that state to a
//! presentation layer.

pub mod connection;
pub mod console;
pub mod error;
pub mod session;

pub use connection::{Connector, ExponentialBackoff};
pub use error::ClientError;
pub use session::{ChatSession, ConnectionState, SessionEvent, SessionState};
