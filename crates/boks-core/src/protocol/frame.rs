//! Wire frame codec for the Boks BLE protocol.
//!
//! Wire format (both directions):
//! ```text
//! [opcode:1][length:1][payload:length][checksum:1]
//! ```
//! `checksum` is the sum of every preceding byte, modulo 256.
//!
//! # Why an additive checksum? (for beginners)
//!
//! BLE already protects each radio packet with a CRC, so the device only adds a
//! cheap one-byte sum to catch framing mistakes (a truncated notification, a
//! write split across two characteristics).  It is not tamper protection.

use tracing::warn;

use crate::protocol::error::ProtocolError;

/// Opcode byte + length byte + checksum byte.
pub const FRAME_OVERHEAD: usize = 3;

/// The length field is a single byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// A decoded frame borrowing its payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    pub opcode: u8,
    pub payload: &'a [u8],
}

/// Details of a frame whose trailing checksum byte did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub opcode: u8,
    /// Checksum computed over the received bytes.
    pub expected: u8,
    /// Checksum byte actually present in the frame.
    pub received: u8,
}

/// Reasons a byte sequence is not a valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than [`FRAME_OVERHEAD`] bytes.
    TooShort { available: usize },
    /// The length byte claims more payload than the buffer holds.
    Truncated { declared: usize, available: usize },
    /// The checksum byte is wrong.
    Checksum(ChecksumMismatch),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Additive checksum: the sum of all bytes modulo 256.
///
/// # Examples
///
/// ```rust
/// use boks_core::protocol::frame::checksum;
///
/// assert_eq!(checksum(&[0x02, 0x00]), 0x02);
/// assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
/// ```
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Wraps `payload` in a frame: `[opcode, len, ...payload, checksum]`.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds 255 bytes.
///
/// # Examples
///
/// ```rust
/// use boks_core::protocol::frame::encode_frame;
///
/// let frame = encode_frame(0x14, &[]).unwrap();
/// assert_eq!(frame, vec![0x14, 0x00, 0x14]);
/// ```
pub fn encode_frame(opcode: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge { len: payload.len() });
    }

    let mut buf = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.push(opcode);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf.push(checksum(&buf));
    Ok(buf)
}

/// Parses a frame, reporting exactly why it was rejected.
///
/// Bytes after the checksum are ignored, matching the device firmware which
/// pads some notifications.
pub fn try_decode_frame(bytes: &[u8]) -> Result<RawFrame<'_>, FrameError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(FrameError::TooShort {
            available: bytes.len(),
        });
    }

    let opcode = bytes[0];
    let declared = bytes[1] as usize;
    if bytes.len() < declared + FRAME_OVERHEAD {
        return Err(FrameError::Truncated {
            declared,
            available: bytes.len() - FRAME_OVERHEAD,
        });
    }

    let body_end = 2 + declared;
    let expected = checksum(&bytes[..body_end]);
    let received = bytes[body_end];
    if expected != received {
        return Err(FrameError::Checksum(ChecksumMismatch {
            opcode,
            expected,
            received,
        }));
    }

    Ok(RawFrame {
        opcode,
        payload: &bytes[2..body_end],
    })
}

/// Parses a frame, dropping anything malformed.
///
/// Returns `None` for short, truncated or corrupted frames.  On a checksum
/// mismatch `on_checksum_error` is invoked and a `checksum_error` warning is
/// logged; decoding itself never fails loudly because a noisy notification
/// must not break the session.
pub fn decode_frame<'a>(
    bytes: &'a [u8],
    on_checksum_error: &mut dyn FnMut(&ChecksumMismatch),
) -> Option<RawFrame<'a>> {
    match try_decode_frame(bytes) {
        Ok(frame) => Some(frame),
        Err(FrameError::Checksum(mismatch)) => {
            warn!(
                opcode = mismatch.opcode,
                expected = mismatch.expected,
                received = mismatch.received,
                "checksum_error"
            );
            on_checksum_error(&mismatch);
            None
        }
        Err(_) => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn no_checksum_callback() -> impl FnMut(&ChecksumMismatch) {
        |m: &ChecksumMismatch| panic!("unexpected checksum error: {m:?}")
    }

    // ── checksum ─────────────────────────────────────────────────────────────

    #[test]
    fn test_checksum_of_empty_slice_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_checksum_wraps_modulo_256() {
        assert_eq!(checksum(&[0xFF, 0xFF, 0x03]), 0x01);
    }

    #[test]
    fn test_checksum_matches_sum_of_all_but_last_byte() {
        let frame = encode_frame(0x20, &[0xAA; 24]).unwrap();
        let (body, last) = frame.split_at(frame.len() - 1);
        let sum: u32 = body.iter().map(|b| *b as u32).sum();
        assert_eq!(last[0] as u32, sum % 256);
    }

    // ── encode_frame ─────────────────────────────────────────────────────────

    #[test]
    fn test_encode_empty_payload() {
        assert_eq!(encode_frame(0x02, &[]).unwrap(), vec![0x02, 0x00, 0x02]);
    }

    #[test]
    fn test_encode_open_door_frame_matches_device_capture() {
        // Arrange
        let payload = b"123456";

        // Act
        let frame = encode_frame(0x01, payload).unwrap();

        // Assert
        assert_eq!(
            frame,
            vec![0x01, 0x06, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x3C]
        );
    }

    #[test]
    fn test_encode_max_payload_is_accepted() {
        let frame = encode_frame(0x50, &[0u8; 255]).unwrap();
        assert_eq!(frame.len(), 258);
        assert_eq!(frame[1], 0xFF);
    }

    #[test]
    fn test_encode_oversized_payload_is_rejected() {
        let err = encode_frame(0x50, &[0u8; 256]).unwrap_err();
        assert_eq!(err, ProtocolError::PayloadTooLarge { len: 256 });
    }

    // ── decode_frame ─────────────────────────────────────────────────────────

    #[test]
    fn test_decode_valid_frame() {
        let bytes = [0x79, 0x02, 0x00, 0x05, 0x80];
        let frame = decode_frame(&bytes, &mut no_checksum_callback()).unwrap();
        assert_eq!(frame.opcode, 0x79);
        assert_eq!(frame.payload, &[0x00, 0x05]);
    }

    #[test]
    fn test_decode_shorter_than_overhead_returns_none() {
        assert!(decode_frame(&[0x02, 0x00], &mut no_checksum_callback()).is_none());
        assert_eq!(
            try_decode_frame(&[]),
            Err(FrameError::TooShort { available: 0 })
        );
    }

    #[test]
    fn test_decode_declared_length_beyond_buffer_returns_none() {
        let bytes = [0x79, 0x05, 0x00, 0x01];
        assert!(decode_frame(&bytes, &mut no_checksum_callback()).is_none());
        assert_eq!(
            try_decode_frame(&bytes),
            Err(FrameError::Truncated {
                declared: 5,
                available: 1
            })
        );
    }

    #[test]
    fn test_decode_bad_checksum_reports_expected_and_received() {
        // Arrange: ASK_DOOR_STATUS with a corrupted checksum
        let bytes = [0x02, 0x00, 0xFF];
        let mut seen = Vec::new();

        // Act
        let frame = decode_frame(&bytes, &mut |m: &ChecksumMismatch| seen.push(*m));

        // Assert
        assert!(frame.is_none());
        assert_eq!(
            seen,
            vec![ChecksumMismatch {
                opcode: 0x02,
                expected: 0x02,
                received: 0xFF
            }]
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes_after_checksum() {
        let bytes = [0x77, 0x00, 0x77, 0xDE, 0xAD];
        let frame = decode_frame(&bytes, &mut no_checksum_callback()).unwrap();
        assert_eq!(frame.opcode, 0x77);
        assert!(frame.payload.is_empty());
    }
}
