//! History events streamed by the device after `RequestLogs`.
//!
//! Every history payload starts with a 3-byte big-endian age: the number of
//! seconds between the event and the moment the device sent it.  The absolute
//! timestamp is therefore only meaningful relative to the decode time, which
//! is why history decoders take an explicit `decoded_at`.

use std::borrow::Cow;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize, Serializer};

use crate::protocol::catalog::PacketBody;
use crate::protocol::error::ProtocolError;
use crate::protocol::validation::{to_colon_hex, to_hex};

/// Length of the age prefix.
pub const AGE_LEN: usize = 3;

/// Largest age representable on the wire (24 bits).
pub const MAX_AGE_SECS: u32 = 0x00FF_FFFF;

/// Age prefix shared by all history events.
///
/// The age never exceeds [`MAX_AGE_SECS`], so a header always encodes to
/// the value it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HeaderRepr")]
pub struct HistoryHeader {
    age_secs: u32,
    recorded_at: SystemTime,
}

#[derive(Deserialize)]
struct HeaderRepr {
    age_secs: u32,
    recorded_at: SystemTime,
}

impl From<HeaderRepr> for HistoryHeader {
    fn from(repr: HeaderRepr) -> Self {
        Self {
            age_secs: repr.age_secs.min(MAX_AGE_SECS),
            recorded_at: repr.recorded_at,
        }
    }
}

impl HistoryHeader {
    /// Reads the age from the first three bytes.  Missing bytes count as an
    /// age of zero.
    pub fn decode(payload: &[u8], decoded_at: SystemTime) -> Self {
        let age_secs = match payload {
            [a, b, c, ..] => u32::from_be_bytes([0, *a, *b, *c]),
            _ => 0,
        };
        Self::at(age_secs, decoded_at)
    }

    /// Builds a header for an event `age_secs` before `now`.  Ages above
    /// 24 bits saturate at [`MAX_AGE_SECS`].
    pub fn at(age_secs: u32, now: SystemTime) -> Self {
        let age_secs = age_secs.min(MAX_AGE_SECS);
        let recorded_at = now
            .checked_sub(Duration::from_secs(u64::from(age_secs)))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            age_secs,
            recorded_at,
        }
    }

    pub fn encode(&self) -> [u8; AGE_LEN] {
        let [_, a, b, c] = self.age_secs.to_be_bytes();
        [a, b, c]
    }

    /// Seconds elapsed on the device since the event.
    pub fn age_secs(&self) -> u32 {
        self.age_secs
    }

    /// `decoded_at - age_secs`.
    pub fn recorded_at(&self) -> SystemTime {
        self.recorded_at
    }
}

/// Common accessors over every history event.
pub trait HistoryRecord {
    fn header(&self) -> &HistoryHeader;

    fn age_secs(&self) -> u32 {
        self.header().age_secs()
    }

    fn recorded_at(&self) -> SystemTime {
        self.header().recorded_at()
    }
}

// ── Header-only events ────────────────────────────────────────────────────────

header_history!(
    /// The door was closed.
    DoorCloseHistory
);
header_history!(
    /// The door was opened.
    DoorOpenHistory
);
header_history!(HistoryEraseHistory);
header_history!(BlockResetHistory);
header_history!(PowerOnHistory);
header_history!(BleRebootHistory);
header_history!(
    /// The door was opened with a physical key.
    KeyOpeningHistory
);

// ── Code events ───────────────────────────────────────────────────────────────

const CODE_LEN: usize = 6;
const BLE_MAC_OFFSET: usize = AGE_LEN + CODE_LEN + 2;
const MAC_LEN: usize = 6;

/// Code logged with a keypad or BLE event.
///
/// The device stores six bytes, NUL padded.  They are kept raw (padding
/// trimmed) so that re-encoding reproduces the payload byte for byte, even
/// when the firmware logged something other than ASCII.
///
/// Serialization always emits [`HistoryCode::MASK`]: codes are secrets and
/// decoded history ends up in logs and CLI output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct HistoryCode(Vec<u8>);

impl HistoryCode {
    pub const MASK: &'static str = "******";

    /// # Errors
    ///
    /// [`ProtocolError::InvalidValue`] when `bytes` is longer than six bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > CODE_LEN {
            return Err(ProtocolError::InvalidValue {
                field: "code",
                reason: format!("{} bytes, at most {CODE_LEN} fit in a history record", bytes.len()),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Reads the code stored after the age, trimming NUL padding.
    fn read(payload: &[u8]) -> Self {
        let end = payload.len().min(AGE_LEN + CODE_LEN);
        let mut bytes = payload.get(AGE_LEN..end).unwrap_or_default().to_vec();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        Self(bytes)
    }

    fn encode(&self) -> [u8; CODE_LEN] {
        let mut buf = [0u8; CODE_LEN];
        buf[..self.0.len()].copy_from_slice(&self.0);
        buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The code in clear text; invalid UTF-8 is replaced.
    pub fn reveal(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl TryFrom<&str> for HistoryCode {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_bytes(value.as_bytes())
    }
}

impl TryFrom<String> for HistoryCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_bytes(value.as_bytes())
    }
}

impl PartialEq<&str> for HistoryCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl Serialize for HistoryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(Self::MASK)
    }
}

macro_rules! ble_code_history {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub header: HistoryHeader,
            pub code: HistoryCode,
            /// MAC of the phone that sent the code, in display order.
            pub connected_mac: Option<[u8; MAC_LEN]>,
        }

        impl $name {
            pub fn from_payload_at(payload: &[u8], decoded_at: SystemTime) -> Self {
                // The device stores the MAC little-endian.
                let connected_mac = payload
                    .get(BLE_MAC_OFFSET..BLE_MAC_OFFSET + MAC_LEN)
                    .map(|raw| {
                        let mut mac = [0u8; MAC_LEN];
                        mac.copy_from_slice(raw);
                        mac.reverse();
                        mac
                    });
                Self {
                    header: HistoryHeader::decode(payload, decoded_at),
                    code: HistoryCode::read(payload),
                    connected_mac,
                }
            }

            /// `AA:BB:CC:DD:EE:FF`, when the MAC was logged.
            pub fn mac_address(&self) -> Option<String> {
                self.connected_mac.map(|mac| to_colon_hex(&mac))
            }
        }

        impl HistoryRecord for $name {
            fn header(&self) -> &HistoryHeader {
                &self.header
            }
        }

        impl PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                let mut buf = self.header.encode().to_vec();
                buf.extend_from_slice(&self.code.encode());
                if let Some(mac) = self.connected_mac {
                    buf.extend_from_slice(&[0, 0]);
                    buf.extend(mac.iter().rev());
                }
                buf
            }

            fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
                Ok(Self::from_payload_at(payload, SystemTime::now()))
            }
        }
    };
}

macro_rules! key_code_history {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub header: HistoryHeader,
            pub code: HistoryCode,
        }

        impl $name {
            pub fn from_payload_at(payload: &[u8], decoded_at: SystemTime) -> Self {
                Self {
                    header: HistoryHeader::decode(payload, decoded_at),
                    code: HistoryCode::read(payload),
                }
            }
        }

        impl HistoryRecord for $name {
            fn header(&self) -> &HistoryHeader {
                &self.header
            }
        }

        impl PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                let mut buf = self.header.encode().to_vec();
                buf.extend_from_slice(&self.code.encode());
                buf
            }

            fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
                Ok(Self::from_payload_at(payload, SystemTime::now()))
            }
        }
    };
}

ble_code_history!(
    /// A valid code was entered over BLE.
    CodeBleValidHistory
);
ble_code_history!(CodeBleInvalidHistory);
key_code_history!(
    /// A valid code was typed on the keypad.
    CodeKeyValidHistory
);
key_code_history!(CodeKeyInvalidHistory);

// ── Events with a trailing value ──────────────────────────────────────────────

macro_rules! byte_history {
    ($(#[$meta:meta])* $name:ident { $field:ident }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub header: HistoryHeader,
            pub $field: u8,
        }

        impl $name {
            pub fn from_payload_at(payload: &[u8], decoded_at: SystemTime) -> Self {
                Self {
                    header: HistoryHeader::decode(payload, decoded_at),
                    $field: payload.get(AGE_LEN).copied().unwrap_or(0),
                }
            }
        }

        impl HistoryRecord for $name {
            fn header(&self) -> &HistoryHeader {
                &self.header
            }
        }

        impl PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                let mut buf = self.header.encode().to_vec();
                buf.push(self.$field);
                buf
            }

            fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
                Ok(Self::from_payload_at(payload, SystemTime::now()))
            }
        }
    };
}

byte_history!(
    /// The device powered off; `reason` is the firmware's shutdown cause.
    PowerOffHistory { reason }
);
byte_history!(ErrorHistory { error_code });

macro_rules! data_history {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub header: HistoryHeader,
            pub data: Vec<u8>,
        }

        impl $name {
            pub fn from_payload_at(payload: &[u8], decoded_at: SystemTime) -> Self {
                Self {
                    header: HistoryHeader::decode(payload, decoded_at),
                    data: payload.get(AGE_LEN..).unwrap_or_default().to_vec(),
                }
            }
        }

        impl HistoryRecord for $name {
            fn header(&self) -> &HistoryHeader {
                &self.header
            }
        }

        impl PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                let mut buf = self.header.encode().to_vec();
                buf.extend_from_slice(&self.data);
                buf
            }

            fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
                Ok(Self::from_payload_at(payload, SystemTime::now()))
            }
        }
    };
}

data_history!(
    /// A weight measured by the scale accessory.
    ScaleMeasureHistory
);
data_history!(NfcRegisteringHistory);

/// The door was opened with an NFC tag.
///
/// The UID carries a one-byte length on the wire, so it is limited to
/// [`NfcOpeningHistory::MAX_UID_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NfcOpeningRepr", into = "NfcOpeningRepr")]
pub struct NfcOpeningHistory {
    header: HistoryHeader,
    tag_type: u8,
    uid: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct NfcOpeningRepr {
    header: HistoryHeader,
    tag_type: u8,
    uid: Vec<u8>,
}

impl NfcOpeningHistory {
    pub const MAX_UID_LEN: usize = u8::MAX as usize;

    /// # Errors
    ///
    /// [`ProtocolError::InvalidValue`] when `uid` is longer than
    /// [`MAX_UID_LEN`](Self::MAX_UID_LEN).
    pub fn new(header: HistoryHeader, tag_type: u8, uid: &[u8]) -> Result<Self, ProtocolError> {
        if uid.len() > Self::MAX_UID_LEN {
            return Err(ProtocolError::InvalidValue {
                field: "uid",
                reason: format!("{} bytes, at most {}", uid.len(), Self::MAX_UID_LEN),
            });
        }
        Ok(Self {
            header,
            tag_type,
            uid: uid.to_vec(),
        })
    }

    pub fn from_payload_at(payload: &[u8], decoded_at: SystemTime) -> Self {
        let tag_type = payload.get(AGE_LEN).copied().unwrap_or(0);
        let uid_len = payload.get(AGE_LEN + 1).copied().unwrap_or(0) as usize;
        let start = AGE_LEN + 2;
        let end = payload.len().min(start + uid_len);
        Self {
            header: HistoryHeader::decode(payload, decoded_at),
            tag_type,
            uid: payload.get(start..end).unwrap_or_default().to_vec(),
        }
    }

    pub fn tag_type(&self) -> u8 {
        self.tag_type
    }

    pub fn uid(&self) -> &[u8] {
        &self.uid
    }

    pub fn uid_hex(&self) -> String {
        to_hex(&self.uid)
    }
}

impl TryFrom<NfcOpeningRepr> for NfcOpeningHistory {
    type Error = ProtocolError;

    fn try_from(repr: NfcOpeningRepr) -> Result<Self, Self::Error> {
        Self::new(repr.header, repr.tag_type, &repr.uid)
    }
}

impl From<NfcOpeningHistory> for NfcOpeningRepr {
    fn from(value: NfcOpeningHistory) -> Self {
        Self {
            header: value.header,
            tag_type: value.tag_type,
            uid: value.uid,
        }
    }
}

impl HistoryRecord for NfcOpeningHistory {
    fn header(&self) -> &HistoryHeader {
        &self.header
    }
}

impl PacketBody for NfcOpeningHistory {
    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = self.header.encode().to_vec();
        buf.push(self.tag_type);
        buf.push(self.uid.len() as u8);
        buf.extend_from_slice(&self.uid);
        buf
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self::from_payload_at(payload, SystemTime::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::validation::parse_hex;

    fn fixed_now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_header_decodes_24_bit_big_endian_age() {
        let header = HistoryHeader::decode(&[0x01, 0x02, 0x03], fixed_now());
        assert_eq!(header.age_secs, 0x010203);
        assert_eq!(
            header.recorded_at,
            fixed_now() - Duration::from_secs(0x010203)
        );
    }

    #[test]
    fn test_header_with_short_payload_has_zero_age() {
        let header = HistoryHeader::decode(&[0x05], fixed_now());
        assert_eq!(header.age_secs, 0);
        assert_eq!(header.recorded_at, fixed_now());
    }

    #[test]
    fn test_header_age_saturates_at_24_bits() {
        let header = HistoryHeader::at(u32::MAX, fixed_now());
        assert_eq!(header.age_secs(), MAX_AGE_SECS);
        assert_eq!(header.encode(), [0xFF, 0xFF, 0xFF]);
        assert_eq!(HistoryHeader::decode(&header.encode(), fixed_now()), header);
    }

    #[test]
    fn test_door_open_history_age() {
        // Arrange
        let payload = [0x00, 0x00, 0x3C];

        // Act
        let event = DoorOpenHistory::from_payload_at(&payload, fixed_now());

        // Assert
        assert_eq!(event.age_secs(), 60);
        assert_eq!(event.recorded_at(), fixed_now() - Duration::from_secs(60));
        assert_eq!(event.encode_payload(), payload.to_vec());
    }

    #[test]
    fn test_code_ble_history_reads_code_and_reverses_mac() {
        // Arrange: age 10, code "123456", two padding bytes, MAC little-endian
        let payload = parse_hex("00000A 313233343536 0000 FFEEDDCCBBAA").unwrap();

        // Act
        let event = CodeBleValidHistory::from_payload_at(&payload, fixed_now());

        // Assert
        assert_eq!(event.age_secs(), 10);
        assert_eq!(event.code, "123456");
        assert_eq!(event.mac_address().as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(event.encode_payload(), payload);
    }

    #[test]
    fn test_code_ble_history_without_mac() {
        let payload = parse_hex("000001 3132330000 00").unwrap();
        let event = CodeBleInvalidHistory::from_payload_at(&payload, fixed_now());
        assert_eq!(event.code, "123");
        assert!(event.connected_mac.is_none());
    }

    #[test]
    fn test_code_key_history_trims_nul_padding() {
        let payload = parse_hex("000002 4142000000 00").unwrap();
        let event = CodeKeyInvalidHistory::from_payload_at(&payload, fixed_now());
        assert_eq!(event.code, "AB");
    }

    #[test]
    fn test_code_history_with_non_ascii_byte_reencodes_exactly() {
        // Arrange
        let payload = parse_hex("000001 31E9333435 36").unwrap();

        // Act
        let event = CodeKeyValidHistory::from_payload_at(&payload, fixed_now());

        // Assert
        assert_eq!(event.code.as_bytes(), &[0x31, 0xE9, 0x33, 0x34, 0x35, 0x36]);
        assert_eq!(event.encode_payload(), payload);
        assert_eq!(
            CodeKeyValidHistory::from_payload_at(&event.encode_payload(), fixed_now()),
            event
        );
    }

    #[test]
    fn test_history_code_is_masked_when_serialized() {
        // Arrange
        let payload = parse_hex("00000A 313233343536 0000 FFEEDDCCBBAA").unwrap();
        let event = CodeBleValidHistory::from_payload_at(&payload, fixed_now());

        // Act
        let json = serde_json::to_value(&event).unwrap();

        // Assert
        assert_eq!(json["code"], HistoryCode::MASK);
        assert!(!json.to_string().contains("123456"));
        assert_eq!(event.code.reveal(), "123456");
    }

    #[test]
    fn test_history_code_rejects_more_than_six_bytes() {
        assert!(HistoryCode::try_from("1234567").is_err());
        assert_eq!(HistoryCode::try_from("12").unwrap().as_bytes(), b"12");
    }

    #[test]
    fn test_power_off_history_reason() {
        let event = PowerOffHistory::from_payload_at(&[0, 0, 1, 0x07], fixed_now());
        assert_eq!(event.reason, 7);
    }

    #[test]
    fn test_error_history_defaults_to_zero_when_absent() {
        let event = ErrorHistory::from_payload_at(&[0, 0, 1], fixed_now());
        assert_eq!(event.error_code, 0);
    }

    #[test]
    fn test_nfc_opening_history_reads_type_and_uid() {
        let payload = parse_hex("000005 02 04 04A1B2C3").unwrap();
        let event = NfcOpeningHistory::from_payload_at(&payload, fixed_now());
        assert_eq!(event.tag_type(), 2);
        assert_eq!(event.uid_hex(), "04A1B2C3");
        assert_eq!(event.encode_payload(), payload);
    }

    #[test]
    fn test_nfc_opening_history_clamps_uid_to_available_bytes() {
        let payload = parse_hex("000005 02 08 04A1").unwrap();
        let event = NfcOpeningHistory::from_payload_at(&payload, fixed_now());
        assert_eq!(event.uid(), &[0x04, 0xA1]);
    }

    #[test]
    fn test_nfc_opening_history_rejects_uid_beyond_length_byte() {
        let header = HistoryHeader::at(5, fixed_now());
        assert!(NfcOpeningHistory::new(header.clone(), 1, &[0xAA; 256]).is_err());
        let event = NfcOpeningHistory::new(header, 1, &[0xAA; 255]).unwrap();
        assert_eq!(
            NfcOpeningHistory::from_payload_at(&event.encode_payload(), fixed_now()),
            event
        );
    }

    #[test]
    fn test_scale_measure_history_keeps_raw_data() {
        let event = ScaleMeasureHistory::from_payload_at(&[0, 0, 0, 1, 2, 3], fixed_now());
        assert_eq!(event.data, vec![1, 2, 3]);
    }
}
