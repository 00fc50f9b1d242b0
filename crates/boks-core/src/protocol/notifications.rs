//! Uplink notifications (device to client).
//!
//! Decoding is tolerant: the firmware has shipped several payload variants,
//! so missing bytes fall back to zero instead of failing the packet.

use serde::{Deserialize, Serialize};

use crate::protocol::catalog::PacketBody;
use crate::protocol::error::ProtocolError;
use crate::protocol::validation::{to_colon_hex, to_hex};

// ── Generic outcomes ──────────────────────────────────────────────────────────

empty_packet!(
    /// Generic success reply to a command.
    OperationSuccess
);
byte_notification!(
    /// Generic failure reply; `error_code` is firmware-specific.
    OperationError { error_code }
);
empty_packet!(ValidOpenCode);
empty_packet!(InvalidOpenCode);
empty_packet!(
    /// Terminates the history stream.
    EndHistory
);
empty_packet!(ErrorCrc);
empty_packet!(
    /// The config key was rejected.
    ErrorUnauthorized
);
empty_packet!(ErrorBadRequest);

// ── Door ──────────────────────────────────────────────────────────────────────

macro_rules! door_status {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub inverted: u8,
            pub raw: u8,
        }

        impl $name {
            /// The firmware sends both the state and its complement; the door is
            /// open only when the pair is consistent.
            pub fn is_open(&self) -> bool {
                self.raw == 0x01 && self.inverted == 0x00
            }
        }

        impl PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                vec![self.inverted, self.raw]
            }

            fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
                Ok(Self {
                    inverted: payload.first().copied().unwrap_or(0),
                    raw: payload.get(1).copied().unwrap_or(0),
                })
            }
        }
    };
}

door_status!(
    /// Unsolicited door state change.
    NotifyDoorStatus
);
door_status!(
    /// Reply to `AskDoorStatus`.
    AnswerDoorStatus
);

// ── Counters ──────────────────────────────────────────────────────────────────

/// Number of stored history events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyLogsCount {
    pub count: u16,
}

impl PacketBody for NotifyLogsCount {
    fn encode_payload(&self) -> Vec<u8> {
        self.count.to_be_bytes().to_vec()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let count = match payload {
            [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
            _ => 0,
        };
        Ok(Self { count })
    }
}

/// Number of stored master and user (single/multi-use) codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyCodesCount {
    pub master: u16,
    pub other: u16,
}

impl PacketBody for NotifyCodesCount {
    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = self.master.to_be_bytes().to_vec();
        buf.extend_from_slice(&self.other.to_be_bytes());
        buf
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        match payload {
            [m_hi, m_lo, o_hi, o_lo, ..] => Ok(Self {
                master: u16::from_be_bytes([*m_hi, *m_lo]),
                other: u16::from_be_bytes([*o_hi, *o_lo]),
            }),
            _ => Ok(Self::default()),
        }
    }
}

// ── Code generation ───────────────────────────────────────────────────────────

empty_packet!(CodeGenerationSuccess);
empty_packet!(CodeGenerationError);
byte_notification!(
    /// Percentage of code tables generated so far.
    CodeGenerationProgress { progress }
);
empty_packet!(SetConfigurationSuccess);

// ── NFC ───────────────────────────────────────────────────────────────────────

/// A tag was presented during a registration scan.
///
/// The UID is kept raw: the scan reports whatever the reader saw, even when
/// it would not be accepted for registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfcTagFound {
    pub uid: Vec<u8>,
}

impl NfcTagFound {
    pub fn uid_hex(&self) -> String {
        to_hex(&self.uid)
    }
}

impl PacketBody for NfcTagFound {
    fn encode_payload(&self) -> Vec<u8> {
        self.uid.clone()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            uid: payload.to_vec(),
        })
    }
}

empty_packet!(NfcTagAlreadyExistsScan);
empty_packet!(NfcScanTimeout);
empty_packet!(NfcTagRegistered);
empty_packet!(NfcTagAlreadyRegistered);
empty_packet!(NfcTagUnregistered);

// ── Scale ─────────────────────────────────────────────────────────────────────

empty_packet!(ScaleBondingSuccess);
byte_notification!(ScaleBondingError { error_code });
byte_notification!(ScaleBondingProgress { progress });
empty_packet!(ScaleForgetSuccess);
empty_packet!(ScaleTareEmptyOk);
empty_packet!(ScaleTareLoadedOk);
empty_packet!(ScaleDisconnected);
data_packet!(ScaleRawSensors);
data_packet!(ScaleFaulty);

/// MAC address of the bonded scale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleMacAddress {
    pub mac: Vec<u8>,
}

impl ScaleMacAddress {
    /// `AA:BB:CC:DD:EE:FF`.
    pub fn mac_address(&self) -> String {
        to_colon_hex(&self.mac)
    }
}

impl PacketBody for ScaleMacAddress {
    fn encode_payload(&self) -> Vec<u8> {
        self.mac.clone()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            mac: payload.to_vec(),
        })
    }
}

/// Largest weight magnitude representable on the wire.
pub const MAX_WEIGHT_MAGNITUDE: i32 = 0x00FF_FFFF;

/// Weight reading from the scale.
///
/// Wire layout: `[sign][magnitude:3 BE]` with sign `0x01` for negative.
/// The magnitude is checked on construction so every value encodes exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScaleWeightRepr", into = "ScaleWeightRepr")]
pub struct ScaleWeight {
    weight: i32,
}

#[derive(Serialize, Deserialize)]
struct ScaleWeightRepr {
    weight: i32,
}

impl ScaleWeight {
    /// # Errors
    ///
    /// [`ProtocolError::InvalidValue`] when `|weight|` exceeds
    /// [`MAX_WEIGHT_MAGNITUDE`].
    pub fn new(weight: i32) -> Result<Self, ProtocolError> {
        if weight.unsigned_abs() > MAX_WEIGHT_MAGNITUDE as u32 {
            return Err(ProtocolError::InvalidValue {
                field: "weight",
                reason: format!("magnitude of {weight} exceeds {MAX_WEIGHT_MAGNITUDE}"),
            });
        }
        Ok(Self { weight })
    }

    pub fn weight(&self) -> i32 {
        self.weight
    }
}

impl TryFrom<ScaleWeightRepr> for ScaleWeight {
    type Error = ProtocolError;

    fn try_from(repr: ScaleWeightRepr) -> Result<Self, Self::Error> {
        Self::new(repr.weight)
    }
}

impl From<ScaleWeight> for ScaleWeightRepr {
    fn from(value: ScaleWeight) -> Self {
        Self {
            weight: value.weight,
        }
    }
}

impl PacketBody for ScaleWeight {
    fn encode_payload(&self) -> Vec<u8> {
        let sign = u8::from(self.weight < 0);
        let [_, a, b, c] = self.weight.unsigned_abs().to_be_bytes();
        vec![sign, a, b, c]
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let weight = match payload {
            [sign, a, b, c, ..] => {
                let magnitude = u32::from_be_bytes([0, *a, *b, *c]) as i32;
                if *sign == 0x01 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            _ => 0,
        };
        Ok(Self { weight })
    }
}
