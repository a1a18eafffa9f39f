//! Tokio codec for length-prefixed packets

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::FrameHeader;
use crate::packet::{current_unix_secs, uts_string, Packet, StampedPacket};

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Zero-length payload; carries nothing and should be skipped
    Empty,
    /// A parsed packet and its timestamp
    Packet(StampedPacket),
}

impl Frame {
    /// The packet, if this frame carried one
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Frame::Empty => None,
            Frame::Packet(stamped) => Some(stamped.packet),
        }
    }
}

/// Borrowed form of [`StampedPacket`] so encoding never clones the packet
#[derive(Serialize)]
struct StampedRef<'a> {
    #[serde(flatten)]
    packet: &'a Packet,
    #[serde(with = "uts_string")]
    uts: u64,
}

/// Encode a packet into `dst` with an explicit timestamp.
///
/// Nothing is written if the payload exceeds the 16-bit length budget.
pub fn encode_stamped(packet: &Packet, uts: u64, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(&StampedRef { packet, uts })?;
    let header = FrameHeader::for_payload(payload.len())?;

    header.encode(dst);
    dst.extend_from_slice(&payload);
    Ok(())
}

/// Encode a packet into a complete frame stamped with the current time
pub fn encode_packet(packet: &Packet) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_stamped(packet, current_unix_secs(), &mut buf)?;
    Ok(buf.freeze())
}

/// Parse a frame payload (without its length prefix)
pub fn decode_payload(payload: &[u8]) -> Result<StampedPacket, ProtocolError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Header of the frame whose payload is still arriving
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src) {
                Some(h) => h,
                None => return Ok(None), // Need more data
            },
        };

        let payload_len = header.len();
        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        if header.is_empty() {
            return Ok(Some(Frame::Empty));
        }

        let payload = src.split_to(payload_len);
        let packet = decode_payload(&payload)?;
        Ok(Some(Frame::Packet(packet)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() && self.pending_header.is_none() => Ok(None),
            // Stream ended mid-frame
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_stamped(&packet, current_unix_secs(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{HEADER_SIZE, MAX_PAYLOAD_SIZE};
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::FramedRead;

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::Init {
                sender: "alice".to_string(),
            },
            Packet::public("alice", "hello everyone"),
            Packet::direct("alice", "bob", "psst, ünïcödé ✓"),
            Packet::UserListInit {
                users: vec!["bob".to_string(), "carol".to_string()],
            },
            Packet::UserJoined {
                user: "dave".to_string(),
            },
            Packet::UserLeft {
                user: "dave".to_string(),
            },
            Packet::Error,
        ]
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = FrameCodec::new();

        for packet in sample_packets() {
            let mut buf = BytesMut::new();
            codec.encode(packet.clone(), &mut buf).unwrap();

            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded.into_packet(), Some(packet));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_length_prefix_matches_payload() {
        for packet in sample_packets() {
            let frame = encode_packet(&packet).unwrap();
            let declared = u16::from_be_bytes([frame[0], frame[1]]) as usize;
            assert_eq!(declared, frame.len() - HEADER_SIZE);
        }
    }

    #[test]
    fn test_timestamp_is_stamped() {
        let mut buf = BytesMut::new();
        encode_stamped(&Packet::Error, 1234, &mut buf).unwrap();

        let mut codec = FrameCodec::new();
        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Packet(stamped)) => {
                assert_eq!(stamped.uts, 1234);
                assert_eq!(stamped.packet, Packet::Error);
            }
            other => panic!("Expected packet frame, got {:?}", other),
        }
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();
        let full = encode_packet(&Packet::public("alice", "split me")).unwrap();

        // Only one byte of the header
        let mut partial = BytesMut::from(&full[..1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Header plus part of the payload
        partial.extend_from_slice(&full[1..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // The rest
        partial.extend_from_slice(&full[10..]);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(
            decoded.into_packet(),
            Some(Packet::public("alice", "split me"))
        );
    }

    #[test]
    fn test_multiple_frames_in_one_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for packet in sample_packets() {
            codec.encode(packet, &mut buf).unwrap();
        }

        let mut decoded = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            decoded.extend(frame.into_packet());
        }
        assert_eq!(decoded, sample_packets());
    }

    #[test]
    fn test_empty_frame_is_not_an_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0u8][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Empty));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_encode_rejected() {
        let mut codec = FrameCodec::new();
        let content = "a".repeat(MAX_PAYLOAD_SIZE);
        let mut buf = BytesMut::new();

        let result = codec.encode(Packet::public("alice", content), &mut buf);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 2, 0xC3, 0x28][..]);
        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let payload = br#"{"type":"message","sender":"a"}"#;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(payload);

        let result = FrameCodec::new().decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_truncated_frame_at_eof() {
        let mut codec = FrameCodec::new();
        let full = encode_packet(&Packet::UserJoined { user: "x".into() }).unwrap();
        let mut buf = BytesMut::from(&full[..full.len() - 1]);

        let result = codec.decode_eof(&mut buf);
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[test]
    fn test_clean_eof() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fragmented_stream() {
        let (mut writer, reader) = tokio::io::duplex(8);
        let frame = encode_packet(&Packet::direct("bob", "alice", "one byte at a time")).unwrap();

        let write_task = tokio::spawn(async move {
            for byte in frame.iter() {
                writer.write_all(&[*byte]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut framed = FramedRead::new(reader, FrameCodec::new());
        let decoded = framed.next().await.unwrap().unwrap();
        assert_eq!(
            decoded.into_packet(),
            Some(Packet::direct("bob", "alice", "one byte at a time"))
        );

        write_task.await.unwrap();
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_closed_mid_frame() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(&[0u8, 40, b'{']).await.unwrap();
        drop(writer);

        let mut framed = FramedRead::new(reader, FrameCodec::new());
        let result = framed.next().await.unwrap();
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }
}
