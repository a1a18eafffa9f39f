//! Chat server: TLS listener and per-connection workers

mod handler;
mod listener;

pub use handler::{serve_connection, AdmissionGuard, ClientWorker, SessionEnd};
pub use listener::{handshake, HandshakeError, TlsListener};
