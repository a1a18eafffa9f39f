//! Client session: room state and the shared session handle

mod chat;
mod state;

pub use chat::{ChatSession, ReaderEnd, SendOutcome};
pub use state::{Compose, ConnectionState, Message, Room, SessionEvent, SessionState};
