//! rk-server: Chat router for rk-chat
//!
//! Accepts mutually authenticated TLS connections, admits each participant
//! under the commonName of its certificate, and relays messages either to
//! everyone or to one named recipient.

pub mod connection;
pub mod server;
pub mod state;

pub use connection::{AdmitError, ConnectionHandle, Registry, RouteError};
pub use server::{serve_connection, TlsListener};
pub use state::ServerState;
