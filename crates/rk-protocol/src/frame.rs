//! Frame header encoding/decoding
//!
//! Every frame starts with a 2-byte header:
//! - payload_length: 2 bytes (u16, big-endian, max 65535)
//!
//! followed by exactly `payload_length` bytes of UTF-8 JSON.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 2;

/// Maximum payload size (limited by the 16-bit length field)
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Frame header carrying the payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the payload in bytes
    pub payload_length: u16,
}

impl FrameHeader {
    /// Create a header for a payload of `len` bytes
    pub fn for_payload(len: usize) -> Result<Self, ProtocolError> {
        let payload_length = u16::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        })?;
        Ok(Self { payload_length })
    }

    /// Payload length as usize
    pub fn len(&self) -> usize {
        self.payload_length as usize
    }

    /// Whether this header announces an empty frame
    pub fn is_empty(&self) -> bool {
        self.payload_length == 0
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u16(self.payload_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer yet.
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            payload_length: src.get_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_big_endian() {
        let header = FrameHeader::for_payload(0x0102).unwrap();
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[0x01, 0x02]);
    }

    #[test]
    fn test_max_payload_length() {
        let header = FrameHeader::for_payload(MAX_PAYLOAD_SIZE).unwrap();
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[0xFF, 0xFF]);
        assert_eq!(FrameHeader::decode(&mut buf).unwrap().len(), MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = FrameHeader::for_payload(MAX_PAYLOAD_SIZE + 1);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 65536, max: 65535 })
        ));
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0u8][..]);
        assert!(FrameHeader::decode(&mut buf).is_none());
        assert_eq!(buf.len(), 1);
    }
}
