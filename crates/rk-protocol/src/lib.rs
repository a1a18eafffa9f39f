//! rk-protocol: Wire protocol for rk-chat
//!
//! This crate defines the framing and packet model used between chat
//! clients and the router: a 2-byte big-endian length prefix followed by a
//! UTF-8 JSON packet.

pub mod codec;
pub mod error;
pub mod frame;
pub mod packet;

pub use codec::{decode_payload, encode_packet, encode_stamped, Frame, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use packet::{current_unix_secs, Packet, PacketKind, StampedPacket, PUBLIC_ROOM};
