//! WebSocket text framing (RFC 6455 section 5.2)
//!
//! The server only ever sends unmasked, single-frame text messages. The
//! decoder understands exactly that shape and exists for Rust viewers and
//! tests; client-to-server frames (always masked) are never parsed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// FIN bit set, opcode 0x1 (text)
const FIN_TEXT: u8 = 0x81;

const FIN_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const OPCODE_TEXT: u8 = 0x1;

/// Largest length that fits the 7-bit field
const MAX_SHORT_LEN: usize = 125;
/// Marker for a 16-bit extended length
const LEN_16: u8 = 126;
/// Marker for a 64-bit extended length
const LEN_64: u8 = 127;

/// Maximum payload the decoder accepts (16 MB)
const MAX_DECODE_SIZE: usize = 16 * 1024 * 1024;

/// Frame codec error
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("masked frames are not supported")]
    Masked,

    #[error("fragmented frames are not supported")]
    Fragmented,

    #[error("unsupported opcode {0:#x}")]
    UnsupportedOpcode(u8),

    #[error("payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: usize },
}

/// Codec for server-to-client text frames
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl<'a> Encoder<&'a str> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &'a str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_bytes();
        let len = payload.len();

        dst.reserve(header_len(len) + len);
        dst.put_u8(FIN_TEXT);

        if len <= MAX_SHORT_LEN {
            dst.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            dst.put_u8(LEN_16);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(LEN_64);
            dst.put_u64(len as u64);
        }

        dst.put_slice(payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        let first = src[0];
        let second = src[1];

        if first & FIN_BIT == 0 {
            return Err(FrameError::Fragmented);
        }
        let opcode = first & OPCODE_MASK;
        if opcode != OPCODE_TEXT {
            return Err(FrameError::UnsupportedOpcode(opcode));
        }
        if second & MASK_BIT != 0 {
            return Err(FrameError::Masked);
        }

        let (header, len) = match second & !MASK_BIT {
            LEN_16 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (4, u16::from_be_bytes([src[2], src[3]]) as u64)
            }
            LEN_64 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&src[2..10]);
                (10, u64::from_be_bytes(raw))
            }
            short => (2, short as u64),
        };

        if len > MAX_DECODE_SIZE as u64 {
            return Err(FrameError::FrameTooLarge {
                size: len,
                max: MAX_DECODE_SIZE,
            });
        }
        let len = len as usize;

        if src.len() < header + len {
            src.reserve(header + len - src.len());
            return Ok(None);
        }

        src.advance(header);
        let payload = src.split_to(len);
        Ok(Some(String::from_utf8(payload.to_vec())?))
    }
}

/// Number of header bytes for a payload of `len` bytes
pub fn header_len(len: usize) -> usize {
    if len <= MAX_SHORT_LEN {
        2
    } else if len <= u16::MAX as usize {
        4
    } else {
        10
    }
}

/// Encode one text frame into a fresh buffer
pub fn encode_text_frame(text: &str) -> Bytes {
    let mut dst = BytesMut::with_capacity(header_len(text.len()) + text.len());
    // Encoding into a BytesMut cannot fail
    let _ = FrameCodec.encode(text, &mut dst);
    dst.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(len: usize) -> String {
        "abcdefghijklmnopqrstuvwxyz"
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    /// Reassemble a frame by hand, independent of the decoder
    fn reconstruct(frame: &[u8]) -> (u8, Vec<u8>) {
        let first = frame[0];
        assert_eq!(frame[1] & 0x80, 0, "server frames must not be masked");
        let (offset, len) = match frame[1] {
            126 => (4, u16::from_be_bytes([frame[2], frame[3]]) as usize),
            127 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&frame[2..10]);
                (10, u64::from_be_bytes(raw) as usize)
            }
            n => (2, n as usize),
        };
        assert_eq!(frame.len(), offset + len);
        (first, frame[offset..].to_vec())
    }

    // ==================== Length Encoding Tests ====================

    #[test]
    fn test_header_for_boundary_lengths() {
        let cases: [(usize, &[u8]); 7] = [
            (0, &[0x81, 0]),
            (1, &[0x81, 1]),
            (125, &[0x81, 125]),
            (126, &[0x81, 126, 0x00, 0x7E]),
            (65535, &[0x81, 126, 0xFF, 0xFF]),
            (65536, &[0x81, 127, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00]),
            (65537, &[0x81, 127, 0, 0, 0, 0, 0, 0x01, 0x00, 0x01]),
        ];

        for (len, expected_header) in cases {
            let text = payload_of(len);
            let frame = encode_text_frame(&text);

            assert_eq!(
                &frame[..expected_header.len()],
                expected_header,
                "header mismatch for length {}",
                len
            );
            assert_eq!(frame.len(), header_len(len) + len);

            let (first, payload) = reconstruct(&frame);
            assert_eq!(first, 0x81);
            assert_eq!(payload, text.as_bytes(), "payload mismatch for length {}", len);
        }
    }

    #[test]
    fn test_multibyte_length_counts_bytes_not_chars() {
        // 42 three-byte characters = 126 bytes, which needs the 16-bit form
        let text = "€".repeat(42);
        let frame = encode_text_frame(&text);
        assert_eq!(&frame[..4], &[0x81, 126, 0x00, 126]);
    }

    #[test]
    fn test_encoder_appends_to_existing_buffer() {
        let mut codec = FrameCodec::new();
        let mut dst = BytesMut::new();
        codec.encode("one", &mut dst).unwrap();
        codec.encode("two", &mut dst).unwrap();
        assert_eq!(&dst[..], b"\x81\x03one\x81\x03two");
    }

    // ==================== Decoder Tests ====================

    #[test]
    fn test_decode_encoded_frames() {
        let mut codec = FrameCodec::new();
        for len in [0, 125, 126, 70000] {
            let text = payload_of(len);
            let mut buf = BytesMut::from(&encode_text_frame(&text)[..]);
            assert_eq!(codec.decode(&mut buf).unwrap(), Some(text));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut codec = FrameCodec::new();
        let frame = encode_text_frame(&payload_of(300));

        let mut buf = BytesMut::from(&frame[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[3..100]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[100..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(payload_of(300)));
    }

    #[test]
    fn test_decode_rejects_masked_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x81, 0x85, 1, 2, 3, 4, 0, 0, 0, 0, 0][..]);
        assert!(matches!(codec.decode(&mut buf), Err(FrameError::Masked)));
    }

    #[test]
    fn test_decode_rejects_fragment() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0x01, b'a'][..]);
        assert!(matches!(codec.decode(&mut buf), Err(FrameError::Fragmented)));
    }

    #[test]
    fn test_decode_rejects_binary_opcode() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x82, 0x01, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::UnsupportedOpcode(0x2))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x81, 127, 0, 0, 0, 1, 0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }
}
