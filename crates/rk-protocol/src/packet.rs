//! Packet types for the rk-chat protocol
//!
//! This module defines the closed set of packets exchanged between clients
//! and the router. Packets are JSON objects tagged by a `type` field and
//! framed by the codec defined in `codec.rs`.
//!
//! # Message Flow
//!
//! 1. Client completes the mutual-TLS handshake and sends `Init`
//! 2. Router replies with `UserListInit` (everyone already connected) and
//!    tells every other participant `UserJoined`
//! 3. `Message` packets flow client → router → recipient(s). A receiver of
//!    `"public"` fans out to everybody except the sender; any other receiver
//!    names exactly one participant
//! 4. A message for an unknown participant is answered with `Error`
//! 5. When a connection ends the router broadcasts `UserLeft`
//!
//! Every packet on the wire also carries `uts`, the unix timestamp (seconds,
//! as a decimal string) stamped when the frame is encoded.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Receiver name that addresses every connected participant
pub const PUBLIC_ROOM: &str = "public";

/// Protocol packets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    /// First packet a client sends; names the participant
    Init {
        /// Participant name, must match the verified certificate identity
        sender: String,
    },

    /// Chat message, public or directed
    Message {
        /// Author of the message
        sender: String,
        /// `"public"` or a participant name
        receiver: String,
        /// Message text
        content: String,
    },

    /// Roster sent to a newly admitted participant
    UserListInit {
        /// Everyone connected before the new participant
        users: Vec<String>,
    },

    /// Another participant was admitted
    UserJoined {
        /// Name of the participant
        user: String,
    },

    /// Another participant disconnected
    UserLeft {
        /// Name of the participant
        user: String,
    },

    /// Routing failure reported back to the sender
    Error,
}

/// Tag of a packet, without its fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Init,
    Message,
    UserListInit,
    UserJoined,
    UserLeft,
    Error,
}

impl PacketKind {
    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::Init => "init",
            PacketKind::Message => "message",
            PacketKind::UserListInit => "user_list_init",
            PacketKind::UserJoined => "user_joined",
            PacketKind::UserLeft => "user_left",
            PacketKind::Error => "error",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Packet {
    /// Build a public message
    pub fn public(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Packet::Message {
            sender: sender.into(),
            receiver: PUBLIC_ROOM.to_string(),
            content: content.into(),
        }
    }

    /// Build a message for one participant
    pub fn direct(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Packet::Message {
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
        }
    }

    /// Get the kind of this packet
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Init { .. } => PacketKind::Init,
            Packet::Message { .. } => PacketKind::Message,
            Packet::UserListInit { .. } => PacketKind::UserListInit,
            Packet::UserJoined { .. } => PacketKind::UserJoined,
            Packet::UserLeft { .. } => PacketKind::UserLeft,
            Packet::Error => PacketKind::Error,
        }
    }

    /// Whether a client may legally send this packet to the router
    pub fn is_client_originated(&self) -> bool {
        matches!(self, Packet::Init { .. } | Packet::Message { .. })
    }
}

/// A packet together with the timestamp it was framed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedPacket {
    /// The packet itself
    #[serde(flatten)]
    pub packet: Packet,
    /// Unix timestamp in seconds, stamped at send time
    #[serde(with = "uts_string")]
    pub uts: u64,
}

impl StampedPacket {
    /// Stamp a packet with the given timestamp
    pub fn new(packet: Packet, uts: u64) -> Self {
        Self { packet, uts }
    }

    /// Stamp a packet with the current time
    pub fn now(packet: Packet) -> Self {
        Self::new(packet, current_unix_secs())
    }

    /// Drop the timestamp
    pub fn into_packet(self) -> Packet {
        self.packet
    }
}

/// Current unix time in whole seconds (0 if the clock is before the epoch)
pub fn current_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `uts` travels as a string of integer seconds; integers are accepted too.
pub(crate) mod uts_string {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(uts: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(uts)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text
                .trim()
                .parse()
                .map_err(|e| D::Error::custom(format!("invalid uts {:?}: {}", text, e))),
            Raw::Number(n) => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags() {
        let cases = [
            (Packet::Init { sender: "a".into() }, "init"),
            (Packet::public("a", "hi"), "message"),
            (Packet::UserListInit { users: vec![] }, "user_list_init"),
            (Packet::UserJoined { user: "a".into() }, "user_joined"),
            (Packet::UserLeft { user: "a".into() }, "user_left"),
            (Packet::Error, "error"),
        ];
        for (packet, tag) in cases {
            let value = serde_json::to_value(&packet).unwrap();
            assert_eq!(value["type"], tag);
            assert_eq!(packet.kind().as_str(), tag);
        }
    }

    #[test]
    fn test_stamped_packet_wire_shape() {
        let stamped = StampedPacket::new(Packet::direct("alice", "bob", "hey"), 1_700_000_000);
        let value = serde_json::to_value(&stamped).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "message",
                "sender": "alice",
                "receiver": "bob",
                "content": "hey",
                "uts": "1700000000"
            })
        );
    }

    #[test]
    fn test_error_packet_has_no_fields() {
        let stamped = StampedPacket::new(Packet::Error, 5);
        let json = serde_json::to_string(&stamped).unwrap();
        assert_eq!(json, r#"{"type":"error","uts":"5"}"#);
    }

    #[test]
    fn test_uts_accepts_integer() {
        let parsed: StampedPacket =
            serde_json::from_str(r#"{"type":"user_left","user":"c","uts":42}"#).unwrap();
        assert_eq!(parsed.uts, 42);
        assert_eq!(parsed.packet, Packet::UserLeft { user: "c".into() });
    }

    #[test]
    fn test_missing_field_rejected() {
        let result: Result<StampedPacket, _> =
            serde_json::from_str(r#"{"type":"message","sender":"a","content":"x","uts":"1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let result: Result<StampedPacket, _> =
            serde_json::from_str(r#"{"type":"typing","user":"a","uts":"1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_originated() {
        assert!(Packet::Init { sender: "a".into() }.is_client_originated());
        assert!(Packet::public("a", "b").is_client_originated());
        assert!(!Packet::Error.is_client_originated());
        assert!(!Packet::UserJoined { user: "a".into() }.is_client_originated());
    }
}
