//! The opcode catalog: one declarative table from which [`Opcode`],
//! [`Packet`] and every opcode-based dispatch are generated.
//!
//! # Why a table? (for beginners)
//!
//! The device speaks roughly eighty distinct messages.  Writing the
//! `u8 -> Opcode` conversion, the `Packet -> Opcode` lookup and the
//! `Opcode -> decoder` dispatch by hand means keeping four long `match`
//! blocks in sync.  Here each message is listed exactly once; the
//! `packet_catalog!` macro expands the list into all of them, so a message
//! cannot be half-registered, and [`Opcode::ALL`] lets tests walk the whole
//! catalog.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::protocol::commands::*;
use crate::protocol::error::ProtocolError;
use crate::protocol::frame::encode_frame;
use crate::protocol::history::*;
use crate::protocol::notifications::*;

/// Payload serialization implemented by every packet struct.
pub trait PacketBody: Sized {
    /// Serializes the fields into the frame payload (no opcode, length or checksum).
    fn encode_payload(&self) -> Vec<u8>;

    /// Rebuilds the packet from a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the payload violates the packet's domain
    /// rules.  Notifications are tolerant and rarely fail; commands are strict.
    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError>;
}

/// Broad role of a message in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    /// Sent by the client to the device.
    Command,
    /// Sent by the device, outside the history stream.
    Notification,
    /// A logged device event, streamed in response to `RequestLogs`.
    History,
}

macro_rules! packet_catalog {
    ($( $kind:ident $name:ident = $value:literal, )*) => {
        /// Every opcode known to the client.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $( $name = $value, )*
        }

        impl Opcode {
            /// All opcodes, in catalog order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            pub fn kind(self) -> PacketKind {
                match self {
                    $( Opcode::$name => packet_catalog!(@kind $kind), )*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$name => stringify!($name), )*
                }
            }

            pub const fn as_u8(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for Opcode {
            /// The unrecognised byte.
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                match value {
                    $( $value => Ok(Opcode::$name), )*
                    other => Err(other),
                }
            }
        }

        /// A decoded or ready-to-send protocol message.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum Packet {
            $( $name($name), )*
        }

        impl Packet {
            pub fn opcode(&self) -> Opcode {
                match self {
                    $( Packet::$name(_) => Opcode::$name, )*
                }
            }

            /// Serializes the payload only.
            pub fn encode_payload(&self) -> Vec<u8> {
                match self {
                    $( Packet::$name(p) => p.encode_payload(), )*
                }
            }

            /// Decodes a payload, stamping history events relative to `decoded_at`.
            ///
            /// # Errors
            ///
            /// Propagates the packet's own payload validation error.
            pub fn decode_at(
                opcode: Opcode,
                payload: &[u8],
                decoded_at: SystemTime,
            ) -> Result<Packet, ProtocolError> {
                match opcode {
                    $( Opcode::$name => {
                        packet_catalog!(@decode $kind $name, payload, decoded_at).map(Packet::$name)
                    } )*
                }
            }

            /// Returns the history header accessors if this is a history event.
            pub fn as_history(&self) -> Option<&dyn HistoryRecord> {
                match self {
                    $( Packet::$name(p) => packet_catalog!(@history $kind p), )*
                }
            }
        }

        $(
            impl $name {
                pub const OPCODE: Opcode = Opcode::$name;
            }

            impl From<$name> for Packet {
                fn from(p: $name) -> Self {
                    Packet::$name(p)
                }
            }
        )*
    };

    (@kind command) => { PacketKind::Command };
    (@kind notification) => { PacketKind::Notification };
    (@kind history) => { PacketKind::History };

    (@decode history $ty:ident, $payload:expr, $now:expr) => {
        Ok::<_, ProtocolError>($ty::from_payload_at($payload, $now))
    };
    (@decode $other:ident $ty:ident, $payload:expr, $now:expr) => {
        <$ty as PacketBody>::from_payload($payload)
    };

    (@history history $p:ident) => { Some($p as &dyn HistoryRecord) };
    (@history $other:ident $p:ident) => {{
        let _ = $p;
        None
    }};
}

packet_catalog! {
    // ── Downlink commands ────────────────────────────────────────────────────
    command OpenDoor = 0x01,
    command AskDoorStatus = 0x02,
    command RequestLogs = 0x03,
    command Reboot = 0x06,
    command GetLogsCount = 0x07,
    command TestBattery = 0x08,
    command MasterCodeEdit = 0x09,
    command SingleUseCodeToMulti = 0x0A,
    command MultiCodeToSingleUse = 0x0B,
    command DeleteMasterCode = 0x0C,
    command DeleteSingleUseCode = 0x0D,
    command DeleteMultiUseCode = 0x0E,
    command ReactivateCode = 0x0F,
    command GenerateCodes = 0x10,
    command CreateMasterCode = 0x11,
    command CreateSingleUseCode = 0x12,
    command CreateMultiUseCode = 0x13,
    command CountCodes = 0x14,
    command GenerateCodesSupport = 0x15,
    command SetConfiguration = 0x16,
    command RegisterNfcTagScanStart = 0x17,
    command RegisterNfcTag = 0x18,
    command UnregisterNfcTag = 0x19,
    command RegenerateCodesPart1 = 0x20,
    command RegenerateCodesPart2 = 0x21,

    // ── Scale commands ───────────────────────────────────────────────────────
    command ScaleBond = 0x50,
    command ScaleGetMacAddress = 0x52,
    command ScaleForgetBonding = 0x53,
    command ScaleTareEmpty = 0x55,
    command ScaleTareLoaded = 0x56,
    command ScaleMeasureWeight = 0x57,
    command ScalePrepareDfu = 0x60,
    command ScaleGetRawSensors = 0x61,
    command ScaleReconnect = 0x62,

    // ── Uplink notifications ─────────────────────────────────────────────────
    notification OperationSuccess = 0x77,
    notification OperationError = 0x78,
    notification NotifyLogsCount = 0x79,
    notification ValidOpenCode = 0x81,
    notification InvalidOpenCode = 0x82,
    notification NotifyDoorStatus = 0x84,
    notification AnswerDoorStatus = 0x85,
    notification EndHistory = 0x92,
    notification CodeGenerationSuccess = 0xC0,
    notification CodeGenerationError = 0xC1,
    notification CodeGenerationProgress = 0xC2,
    notification NotifyCodesCount = 0xC3,
    notification SetConfigurationSuccess = 0xC4,
    notification NfcTagFound = 0xC5,
    notification NfcTagAlreadyExistsScan = 0xC6,
    notification NfcScanTimeout = 0xC7,
    notification NfcTagRegistered = 0xC8,
    notification NfcTagAlreadyRegistered = 0xC9,
    notification NfcTagUnregistered = 0xCA,
    notification ErrorCrc = 0xE0,
    notification ErrorUnauthorized = 0xE1,
    notification ErrorBadRequest = 0xE2,

    // ── Scale notifications ──────────────────────────────────────────────────
    notification ScaleBondingSuccess = 0xB0,
    notification ScaleBondingError = 0xB1,
    notification ScaleMacAddress = 0xB2,
    notification ScaleForgetSuccess = 0xB3,
    notification ScaleBondingProgress = 0xB4,
    notification ScaleTareEmptyOk = 0xB5,
    notification ScaleTareLoadedOk = 0xB6,
    notification ScaleWeight = 0xB7,
    notification ScaleDisconnected = 0xB8,
    notification ScaleRawSensors = 0xB9,
    notification ScaleFaulty = 0xBA,

    // ── History events ───────────────────────────────────────────────────────
    history CodeBleValidHistory = 0x86,
    history CodeKeyValidHistory = 0x87,
    history CodeBleInvalidHistory = 0x88,
    history CodeKeyInvalidHistory = 0x89,
    history DoorCloseHistory = 0x90,
    history DoorOpenHistory = 0x91,
    history HistoryEraseHistory = 0x93,
    history PowerOffHistory = 0x94,
    history BlockResetHistory = 0x95,
    history PowerOnHistory = 0x96,
    history BleRebootHistory = 0x97,
    history ScaleMeasureHistory = 0x98,
    history KeyOpeningHistory = 0x99,
    history ErrorHistory = 0xA0,
    history NfcOpeningHistory = 0xA1,
    history NfcRegisteringHistory = 0xA2,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}

impl Packet {
    /// Encodes the complete wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds 255 bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_frame(self.opcode().as_u8(), &self.encode_payload())
    }

    /// Decodes a payload using the current time for history timestamps.
    ///
    /// # Errors
    ///
    /// Propagates the packet's own payload validation error.
    pub fn decode(opcode: Opcode, payload: &[u8]) -> Result<Packet, ProtocolError> {
        Self::decode_at(opcode, payload, SystemTime::now())
    }

    pub fn kind(&self) -> PacketKind {
        self.opcode().kind()
    }

    pub fn is_history(&self) -> bool {
        self.kind() == PacketKind::History
    }
}

// ── Payload length helpers ────────────────────────────────────────────────────

/// Fails unless `payload` is exactly `expected` bytes long.
pub(crate) fn require_exact(
    payload: &[u8],
    expected: usize,
    context: &'static str,
) -> Result<(), ProtocolError> {
    if payload.len() != expected {
        return Err(ProtocolError::InvalidPayloadLength {
            context,
            expected,
            received: payload.len(),
        });
    }
    Ok(())
}

/// Fails unless `payload` is at least `needed` bytes long.
pub(crate) fn require_min(
    payload: &[u8],
    needed: usize,
    context: &'static str,
) -> Result<(), ProtocolError> {
    if payload.len() < needed {
        return Err(ProtocolError::InvalidPayloadLength {
            context,
            expected: needed,
            received: payload.len(),
        });
    }
    Ok(())
}
