//! Validated value types carried inside packets.
//!
//! Each type can only be built through a checking constructor, so a packet
//! holding a [`Pin`] or a [`ConfigKey`] is valid by construction.  Decoders use
//! the same constructors, which keeps decode and construction rules identical.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::error::ProtocolError;

/// Alphabet of device PINs (base 12).
pub const PIN_ALPHABET: &[u8; 12] = b"0123456789AB";

/// Number of characters in a PIN.
pub const PIN_LEN: usize = 6;

/// Number of ASCII characters in a config key.
pub const CONFIG_KEY_LEN: usize = 8;

/// Number of bytes in a code generation seed or master key.
pub const SEED_LEN: usize = 32;

// ── Config key ────────────────────────────────────────────────────────────────

/// Authorization token required by state-mutating commands: 8 upper-case hex
/// characters, sent on the wire as their ASCII bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigKey(String);

impl ConfigKey {
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidConfigKey`] unless `key` matches `^[0-9A-F]{8}$`.
    pub fn new(key: &str) -> Result<Self, ProtocolError> {
        let valid = key.len() == CONFIG_KEY_LEN
            && key
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
        if !valid {
            return Err(ProtocolError::InvalidConfigKey(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    /// Reads the key from the first 8 bytes of an authenticated payload.
    pub(crate) fn from_payload_prefix(payload: &[u8]) -> Result<Self, ProtocolError> {
        let head = payload
            .get(..CONFIG_KEY_LEN)
            .ok_or(ProtocolError::InvalidPayloadLength {
                context: "config key",
                expected: CONFIG_KEY_LEN,
                received: payload.len(),
            })?;
        Self::new(&ascii(head)?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

// Config keys grant write access to the device; keep them out of logs.
impl fmt::Debug for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfigKey([REDACTED])")
    }
}

impl TryFrom<String> for ConfigKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ConfigKey> for String {
    fn from(key: ConfigKey) -> Self {
        key.0
    }
}

// ── PIN ───────────────────────────────────────────────────────────────────────

/// A 6-character device code over `0-9A-B`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pin(String);

impl Pin {
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPinFormat`] unless `pin` matches `^[0-9A-B]{6}$`.
    pub fn new(pin: &str) -> Result<Self, ProtocolError> {
        let valid = pin.len() == PIN_LEN && pin.bytes().all(|b| PIN_ALPHABET.contains(&b));
        if !valid {
            return Err(ProtocolError::InvalidPinFormat(pin.to_string()));
        }
        Ok(Self(pin.to_string()))
    }

    pub(crate) fn from_ascii(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::new(&ascii(bytes)?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Pin {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> Self {
        pin.0
    }
}

// ── Seed ──────────────────────────────────────────────────────────────────────

/// 32-byte code generation seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidSeedLength`] unless `bytes` is 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let array: [u8; SEED_LEN] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidSeedLength {
                received: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Parses 64 hexadecimal characters.
    pub fn from_hex(hex: &str) -> Result<Self, ProtocolError> {
        Self::from_bytes(&parse_hex(hex)?)
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }
}

// ── NFC UID ───────────────────────────────────────────────────────────────────

/// UID of an NFC tag (4 to 10 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct NfcUid(Vec<u8>);

impl NfcUid {
    pub const MIN_LEN: usize = 4;
    pub const MAX_LEN: usize = 10;

    /// Parses `"04A1B2C3"` or `"04:A1:B2:C3"` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidNfcUidFormat`] for anything other than an
    /// even number of 8 to 20 hex digits.
    pub fn parse(uid: &str) -> Result<Self, ProtocolError> {
        let digits: String = uid.chars().filter(|c| *c != ':').collect();
        let len_ok = (Self::MIN_LEN * 2..=Self::MAX_LEN * 2).contains(&digits.len())
            && digits.len() % 2 == 0;
        if !len_ok || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidNfcUidFormat(uid.to_string()));
        }
        let bytes =
            parse_hex(&digits).map_err(|_| ProtocolError::InvalidNfcUidFormat(uid.to_string()))?;
        Ok(Self(bytes))
    }

    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidNfcUidFormat`] unless 4 to 10 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&bytes.len()) {
            return Err(ProtocolError::InvalidNfcUidFormat(to_hex(bytes)));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for NfcUid {
    type Error = ProtocolError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(&value)
    }
}

impl From<NfcUid> for Vec<u8> {
    fn from(value: NfcUid) -> Self {
        value.0
    }
}

/// Upper-case, colon separated: `04:A1:B2:C3`.
impl fmt::Display for NfcUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_colon_hex(&self.0))
    }
}

// ── Master code index ─────────────────────────────────────────────────────────

/// Checks a master code slot index.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidIndexRange`] for values above 255.
pub fn master_code_index(index: u32) -> Result<u8, ProtocolError> {
    u8::try_from(index).map_err(|_| ProtocolError::InvalidIndexRange {
        index,
        max: u8::MAX as u32,
    })
}

// ── Hex and text helpers ──────────────────────────────────────────────────────

/// Parses a hex string (whitespace and case ignored).
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedData`] for odd lengths or non-hex characters.
pub fn parse_hex(hex: &str) -> Result<Vec<u8>, ProtocolError> {
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(ProtocolError::MalformedData(format!(
            "hex string has odd length {}",
            digits.len()
        )));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let (Some(hi), Some(lo)) = (hex_value(pair[0]), hex_value(pair[1])) else {
                return Err(ProtocolError::MalformedData(format!(
                    "invalid hex byte {:?}",
                    String::from_utf8_lossy(pair)
                )));
            };
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|v| v as u8)
}

/// Upper-case hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Upper-case hex with `:` between bytes.
pub fn to_colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub(crate) fn ascii(bytes: &[u8]) -> Result<String, ProtocolError> {
    if !bytes.is_ascii() {
        return Err(ProtocolError::MalformedData(format!(
            "expected ASCII text, got {}",
            to_hex(bytes)
        )));
    }
    Ok(bytes.iter().map(|b| *b as char).collect())
}
