//! Error type shared by the frame codec, the packet catalog and PIN derivation.

use thiserror::Error;

/// Errors raised while building, encoding or decoding protocol values.
///
/// Framing problems on the receive path (short frame, bad checksum, unknown
/// opcode) are *not* reported through this type: those frames are dropped by
/// [`crate::protocol::registry`] and surface only as diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A payload had the wrong size for the packet being decoded.
    #[error("invalid payload length for {context}: expected {expected} bytes, got {received}")]
    InvalidPayloadLength {
        context: &'static str,
        expected: usize,
        received: usize,
    },

    /// A config key is not exactly 8 upper-case hexadecimal characters.
    #[error("config key must be exactly 8 uppercase hexadecimal characters, got {0:?}")]
    InvalidConfigKey(String),

    /// A field holds a value outside the set the device accepts.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// The payload could not be interpreted (non-ASCII text, bad hex, ...).
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// A PIN is not exactly 6 characters drawn from `0-9A-B`.
    #[error("PIN must be exactly 6 characters from [0-9A-B], got {0:?}")]
    InvalidPinFormat(String),

    /// A master code index is outside `0..=255`.
    #[error("index {index} out of range 0..={max}")]
    InvalidIndexRange { index: u32, max: u32 },

    /// A code generation seed is not 32 bytes.
    #[error("seed must be exactly 32 bytes, got {received}")]
    InvalidSeedLength { received: usize },

    /// An NFC UID is not 4 to 10 bytes of hexadecimal.
    #[error("invalid NFC UID {0:?}: expected 4 to 10 bytes of hex, optionally colon-separated")]
    InvalidNfcUidFormat(String),

    /// The single length byte of a frame cannot describe this payload.
    #[error("payload of {len} bytes does not fit in a frame (max 255)")]
    PayloadTooLarge { len: usize },

    /// A PIN derivation key is not 32 bytes.
    #[error("master key must be exactly 32 bytes, got {received}")]
    InvalidKeyLength { received: usize },

    /// `"{prefix} {index}"` does not fit in one 64-byte message block.
    #[error("PIN derivation message too long: {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },

    /// A PIN type prefix is not one of `single-use`, `multi-use`, `master`.
    #[error("Invalid PIN type prefix: {0:?}")]
    InvalidPinType(String),
}

impl ProtocolError {
    /// Stable upper-snake identifier, suitable for matching in logs and UIs.
    pub fn id(&self) -> &'static str {
        match self {
            ProtocolError::InvalidPayloadLength { .. } => "INVALID_PAYLOAD_LENGTH",
            ProtocolError::InvalidConfigKey(_) => "INVALID_CONFIG_KEY",
            ProtocolError::InvalidValue { .. } => "INVALID_VALUE",
            ProtocolError::MalformedData(_) => "MALFORMED_DATA",
            ProtocolError::InvalidPinFormat(_) => "INVALID_PIN_FORMAT",
            ProtocolError::InvalidIndexRange { .. } => "INVALID_INDEX_RANGE",
            ProtocolError::InvalidSeedLength { .. } => "INVALID_SEED_LENGTH",
            ProtocolError::InvalidNfcUidFormat(_) => "INVALID_NFC_UID_FORMAT",
            ProtocolError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ProtocolError::InvalidKeyLength { .. } => "INVALID_KEY_LENGTH",
            ProtocolError::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            ProtocolError::InvalidPinType(_) => "INVALID_PIN_TYPE",
        }
    }
}
