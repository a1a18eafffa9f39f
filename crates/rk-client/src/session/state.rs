//! Client-side room state rebuilt from inbound packets

use std::collections::VecDeque;
use std::fmt;

use rk_protocol::{Packet, PUBLIC_ROOM};

/// One line of chat history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub username: String,
    pub content: String,
}

/// Ordered message history for the public channel or one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    name: String,
    messages: Vec<Message>,
}

impl Room {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_public(&self) -> bool {
        self.name == PUBLIC_ROOM
    }
}

/// Lifecycle of the connection to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP connect and TLS handshake in progress
    Connecting,
    /// Transport up, `Init` not yet sent
    AwaitingIdentity,
    /// `Init` sent; `initialized` once the roster has arrived
    Active { initialized: bool },
    Disconnected,
}

impl ConnectionState {
    pub fn is_initialized(&self) -> bool {
        matches!(self, ConnectionState::Active { initialized: true })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::AwaitingIdentity => write!(f, "connected, identifying"),
            ConnectionState::Active { initialized: false } => write!(f, "waiting for user list"),
            ConnectionState::Active { initialized: true } => write!(f, "online"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Rooms or messages changed
    Refresh,
    /// The server answered with `Error{}`
    ErrorNotice,
    StateChanged(ConnectionState),
    Disconnected,
}

/// Result of composing an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compose {
    /// Transmit now
    Send(Packet),
    /// Held until the roster arrives
    Queued,
}

/// Rooms, the room cursor and the pre-roster send queue
#[derive(Debug)]
pub struct SessionState {
    username: String,
    connection: ConnectionState,
    rooms: Vec<Room>,
    current: String,
    pending: VecDeque<Packet>,
}

impl SessionState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            connection: ConnectionState::Connecting,
            rooms: vec![Room::new(PUBLIC_ROOM)],
            current: PUBLIC_ROOM.to_string(),
            pending: VecDeque::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Move to `state`. An initialized session never drops back to waiting
    /// for the roster; only a disconnect ends it.
    pub fn set_connection_state(&mut self, state: ConnectionState) {
        let downgrade = matches!(state, ConnectionState::Active { initialized: false });
        if downgrade && self.connection.is_initialized() {
            return;
        }
        self.connection = state;
    }

    /// Rooms in creation order, `public` first
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|room| room.name == name)
    }

    pub fn room_names(&self) -> Vec<&str> {
        self.rooms.iter().map(|room| room.name.as_str()).collect()
    }

    pub fn current_room(&self) -> &Room {
        // rooms[0] is public and is never removed
        self.room(&self.current).unwrap_or(&self.rooms[0])
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply one inbound packet; returns the notification to publish, if any
    pub fn apply(&mut self, packet: Packet) -> Option<SessionEvent> {
        match packet {
            Packet::UserListInit { users } => {
                for user in users {
                    self.ensure_room(&user);
                }
                self.connection = ConnectionState::Active { initialized: true };
                Some(SessionEvent::Refresh)
            }
            Packet::UserJoined { user } => {
                self.ensure_room(&user);
                Some(SessionEvent::Refresh)
            }
            Packet::UserLeft { user } => {
                self.remove_room(&user);
                Some(SessionEvent::Refresh)
            }
            Packet::Message {
                sender,
                receiver,
                content,
            } => {
                let room = if receiver == PUBLIC_ROOM {
                    PUBLIC_ROOM.to_string()
                } else {
                    sender.clone()
                };
                self.append(&room, sender, content);
                Some(SessionEvent::Refresh)
            }
            Packet::Error => Some(SessionEvent::ErrorNotice),
            Packet::Init { sender } => {
                tracing::debug!(%sender, "Ignoring init from server");
                None
            }
        }
    }

    /// Echo an outbound message into its room, then either hand back the
    /// packet to transmit or queue it until the roster arrives.
    ///
    /// The echo is never rolled back, even if transmission later fails. A
    /// message to ourselves is not echoed; the server's copy is the only one.
    pub fn compose(&mut self, receiver: &str, content: &str) -> Compose {
        let packet = self.outbound_packet(receiver, content);
        if receiver != self.username {
            self.append(receiver, self.username.clone(), content.to_string());
        }

        if self.connection.is_initialized() {
            Compose::Send(packet)
        } else {
            self.pending.push_back(packet);
            Compose::Queued
        }
    }

    /// The packet `compose` would produce, without touching state
    pub fn outbound_packet(&self, receiver: &str, content: &str) -> Packet {
        if receiver == PUBLIC_ROOM {
            Packet::public(self.username.as_str(), content)
        } else {
            Packet::direct(self.username.as_str(), receiver, content)
        }
    }

    /// Messages queued before the roster, in compose order; empty until
    /// initialized
    pub fn take_pending(&mut self) -> Vec<Packet> {
        if !self.connection.is_initialized() {
            return Vec::new();
        }
        self.pending.drain(..).collect()
    }

    /// Point the cursor at `name`; false if no such room
    pub fn select_room(&mut self, name: &str) -> bool {
        if self.room(name).is_none() {
            return false;
        }
        self.current = name.to_string();
        true
    }

    pub fn select_next_room(&mut self) -> &Room {
        self.step_cursor(1)
    }

    pub fn select_previous_room(&mut self) -> &Room {
        self.step_cursor(self.rooms.len().saturating_sub(1))
    }

    fn step_cursor(&mut self, offset: usize) -> &Room {
        let position = self
            .rooms
            .iter()
            .position(|room| room.name == self.current)
            .unwrap_or(0);
        let next = (position + offset) % self.rooms.len().max(1);
        self.current = self.rooms[next].name.clone();
        &self.rooms[next]
    }

    fn ensure_room(&mut self, name: &str) -> &mut Room {
        let index = match self.rooms.iter().position(|room| room.name == name) {
            Some(index) => index,
            None => {
                self.rooms.push(Room::new(name));
                self.rooms.len() - 1
            }
        };
        &mut self.rooms[index]
    }

    fn remove_room(&mut self, name: &str) {
        if name == PUBLIC_ROOM {
            return;
        }
        self.rooms.retain(|room| room.name != name);
        if self.current == name {
            self.current = PUBLIC_ROOM.to_string();
        }
    }

    fn append(&mut self, room: &str, username: String, content: String) {
        self.ensure_room(room)
            .messages
            .push(Message { username, content });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(users: &[&str]) -> Packet {
        Packet::UserListInit {
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }

    fn message(username: &str, content: &str) -> Message {
        Message {
            username: username.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_room_reconstruction() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A"]));
        state.apply(Packet::public("A", "hi"));

        assert_eq!(state.room("public").unwrap().messages(), &[message("A", "hi")]);
        assert_eq!(state.room_names(), vec!["public", "A"]);
        assert!(state.room("A").unwrap().messages().is_empty());
    }

    #[test]
    fn test_direct_message_creates_sender_room() {
        let mut state = SessionState::new("me");
        state.apply(roster(&[]));
        assert_eq!(
            state.apply(Packet::direct("B", "me", "psst")),
            Some(SessionEvent::Refresh)
        );

        assert_eq!(state.room("B").unwrap().messages(), &[message("B", "psst")]);
        assert!(state.room("public").unwrap().messages().is_empty());
    }

    #[test]
    fn test_roster_does_not_wipe_history() {
        let mut state = SessionState::new("me");
        state.apply(Packet::direct("A", "me", "early"));
        state.apply(roster(&["A", "B"]));

        assert_eq!(state.room("A").unwrap().messages(), &[message("A", "early")]);
        assert_eq!(state.room_names(), vec!["public", "A", "B"]);
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A"]));
        state.apply(Packet::UserJoined {
            user: "A".to_string(),
        });
        state.apply(Packet::UserJoined {
            user: "C".to_string(),
        });
        assert_eq!(state.room_names(), vec!["public", "A", "C"]);
    }

    #[test]
    fn test_user_left_falls_back_to_public() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A", "B"]));
        assert!(state.select_room("B"));

        state.apply(Packet::UserLeft {
            user: "B".to_string(),
        });

        assert!(state.room("B").is_none());
        assert_eq!(state.current_room().name(), "public");
    }

    #[test]
    fn test_user_left_keeps_other_selection() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A", "B"]));
        state.select_room("B");
        state.apply(Packet::UserLeft {
            user: "A".to_string(),
        });
        assert_eq!(state.current_room().name(), "B");
    }

    #[test]
    fn test_public_room_survives_user_left() {
        let mut state = SessionState::new("me");
        state.apply(roster(&[]));
        state.apply(Packet::UserLeft {
            user: "public".to_string(),
        });
        assert_eq!(state.room_names(), vec!["public"]);
    }

    #[test]
    fn test_error_is_notice_without_mutation() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A"]));
        assert_eq!(state.apply(Packet::Error), Some(SessionEvent::ErrorNotice));
        assert_eq!(state.room_names(), vec!["public", "A"]);
    }

    #[test]
    fn test_compose_before_roster_queues() {
        let mut state = SessionState::new("me");
        state.set_connection_state(ConnectionState::Active { initialized: false });

        assert_eq!(state.compose("public", "first"), Compose::Queued);
        assert_eq!(state.compose("A", "second"), Compose::Queued);
        assert!(state.take_pending().is_empty());

        // Echoed immediately
        assert_eq!(state.room("public").unwrap().messages(), &[message("me", "first")]);
        assert_eq!(state.room("A").unwrap().messages(), &[message("me", "second")]);

        state.apply(roster(&["A"]));
        assert_eq!(
            state.take_pending(),
            vec![
                Packet::public("me", "first"),
                Packet::direct("me", "A", "second")
            ]
        );
        assert_eq!(state.pending_len(), 0);
        assert_eq!(state.room("A").unwrap().messages().len(), 1);
    }

    #[test]
    fn test_compose_when_initialized_sends() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A"]));
        assert_eq!(
            state.compose("A", "hello"),
            Compose::Send(Packet::direct("me", "A", "hello"))
        );
    }

    #[test]
    fn test_cursor_wraps() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A", "B"]));

        assert_eq!(state.select_next_room().name(), "A");
        assert_eq!(state.select_next_room().name(), "B");
        assert_eq!(state.select_next_room().name(), "public");
        assert_eq!(state.select_previous_room().name(), "B");
        assert!(!state.select_room("ghost"));
        assert_eq!(state.current_room().name(), "B");
    }

    #[test]
    fn test_roster_is_not_undone_by_late_activation() {
        let mut state = SessionState::new("me");
        state.apply(roster(&["A"]));
        state.set_connection_state(ConnectionState::Active { initialized: false });
        assert!(state.connection_state().is_initialized());

        state.set_connection_state(ConnectionState::Disconnected);
        assert_eq!(state.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_message_to_self_appears_once() {
        let mut state = SessionState::new("me");
        state.apply(roster(&[]));

        assert_eq!(
            state.compose("me", "note to self"),
            Compose::Send(Packet::direct("me", "me", "note to self"))
        );
        assert!(state.room("me").is_none());

        // The router delivers it back
        state.apply(Packet::direct("me", "me", "note to self"));
        assert_eq!(
            state.room("me").unwrap().messages(),
            &[message("me", "note to self")]
        );
    }
}
