//! Downlink commands (client to device).
//!
//! Authenticated commands start with the 8 ASCII bytes of the config key.
//! Every constructor validates its inputs, and every decoder applies the same
//! rules, so an invalid command value cannot exist.

use serde::{Deserialize, Serialize};

use crate::protocol::catalog::{require_exact, require_min, PacketBody};
use crate::protocol::error::ProtocolError;
use crate::protocol::validation::{master_code_index, ConfigKey, NfcUid, Pin, Seed, CONFIG_KEY_LEN};

// ── Unauthenticated commands ──────────────────────────────────────────────────

/// Opens the door with a user code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDoor {
    pub pin: Pin,
}

impl OpenDoor {
    pub fn new(pin: &str) -> Result<Self, ProtocolError> {
        Ok(Self { pin: Pin::new(pin)? })
    }
}

impl PacketBody for OpenDoor {
    fn encode_payload(&self) -> Vec<u8> {
        self.pin.as_bytes().to_vec()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        require_exact(payload, 6, "OpenDoor")?;
        Ok(Self {
            pin: Pin::from_ascii(payload)?,
        })
    }
}

empty_packet!(
    /// Asks for the current door state; answered by `AnswerDoorStatus`.
    AskDoorStatus
);
empty_packet!(
    /// Starts the history stream, terminated by `EndHistory`.
    RequestLogs
);
empty_packet!(Reboot);
empty_packet!(GetLogsCount);
empty_packet!(TestBattery);
empty_packet!(
    /// Asks for the number of stored codes; answered by `NotifyCodesCount`.
    CountCodes
);

// ── Code management ───────────────────────────────────────────────────────────

/// Replaces the PIN stored in a master code slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCodeEdit {
    pub config_key: ConfigKey,
    pub index: u8,
    pub pin: Pin,
}

impl MasterCodeEdit {
    pub fn new(config_key: &str, index: u32, pin: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            config_key: ConfigKey::new(config_key)?,
            index: master_code_index(index)?,
            pin: Pin::new(pin)?,
        })
    }
}

impl PacketBody for MasterCodeEdit {
    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(15);
        buf.extend_from_slice(self.config_key.as_bytes());
        buf.push(self.index);
        buf.extend_from_slice(self.pin.as_bytes());
        buf
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        require_exact(payload, 15, "MasterCodeEdit")?;
        Ok(Self {
            config_key: ConfigKey::from_payload_prefix(payload)?,
            index: payload[8],
            pin: Pin::from_ascii(&payload[9..15])?,
        })
    }
}

auth_pin_packet!(
    /// Converts a single-use code into a multi-use code.
    SingleUseCodeToMulti
);
auth_pin_packet!(
    /// Converts a multi-use code into a single-use code.
    MultiCodeToSingleUse
);
auth_pin_packet!(DeleteSingleUseCode);
auth_pin_packet!(DeleteMultiUseCode);
auth_pin_packet!(
    /// Re-enables a previously disabled code.
    ReactivateCode
);
auth_pin_packet!(CreateSingleUseCode);
auth_pin_packet!(CreateMultiUseCode);

/// Clears a master code slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMasterCode {
    pub config_key: ConfigKey,
    pub index: u8,
}

impl DeleteMasterCode {
    pub fn new(config_key: &str, index: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            config_key: ConfigKey::new(config_key)?,
            index: master_code_index(index)?,
        })
    }
}

impl PacketBody for DeleteMasterCode {
    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = self.config_key.as_bytes().to_vec();
        buf.push(self.index);
        buf
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        require_exact(payload, 9, "DeleteMasterCode")?;
        Ok(Self {
            config_key: ConfigKey::from_payload_prefix(payload)?,
            index: payload[8],
        })
    }
}

/// Stores a master code in a slot.  Note the wire order: PIN before index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMasterCode {
    pub config_key: ConfigKey,
    pub pin: Pin,
    pub index: u8,
}

impl CreateMasterCode {
    pub fn new(config_key: &str, index: u32, pin: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            config_key: ConfigKey::new(config_key)?,
            pin: Pin::new(pin)?,
            index: master_code_index(index)?,
        })
    }
}

impl PacketBody for CreateMasterCode {
    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(15);
        buf.extend_from_slice(self.config_key.as_bytes());
        buf.extend_from_slice(self.pin.as_bytes());
        buf.push(self.index);
        buf
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        require_exact(payload, 15, "CreateMasterCode")?;
        Ok(Self {
            config_key: ConfigKey::from_payload_prefix(payload)?,
            pin: Pin::from_ascii(&payload[8..14])?,
            index: payload[14],
        })
    }
}

// ── Code generation ───────────────────────────────────────────────────────────

/// Seeds the initial code tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateCodes {
    pub seed: Seed,
}

impl PacketBody for GenerateCodes {
    fn encode_payload(&self) -> Vec<u8> {
        self.seed.as_bytes().to_vec()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            seed: Seed::from_bytes(payload)?,
        })
    }
}

/// Seeds the code tables during a support (after-sales) procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateCodesSupport {
    pub seed: Seed,
}

impl PacketBody for GenerateCodesSupport {
    fn encode_payload(&self) -> Vec<u8> {
        self.seed.as_bytes().to_vec()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            seed: Seed::from_bytes(payload)?,
        })
    }
}

/// Number of key bytes carried by each regeneration packet.
pub const REGENERATE_PART_LEN: usize = 16;

macro_rules! regenerate_part {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub config_key: ConfigKey,
            pub part: [u8; REGENERATE_PART_LEN],
        }

        impl $name {
            pub fn new(config_key: &str, part: &[u8]) -> Result<Self, ProtocolError> {
                Ok(Self {
                    config_key: ConfigKey::new(config_key)?,
                    part: regenerate_part_bytes(part)?,
                })
            }
        }

        impl PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                let mut buf = Vec::with_capacity(CONFIG_KEY_LEN + REGENERATE_PART_LEN);
                buf.extend_from_slice(self.config_key.as_bytes());
                buf.extend_from_slice(&self.part);
                buf
            }

            fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
                require_exact(payload, CONFIG_KEY_LEN + REGENERATE_PART_LEN, stringify!($name))?;
                Ok(Self {
                    config_key: ConfigKey::from_payload_prefix(payload)?,
                    part: regenerate_part_bytes(&payload[CONFIG_KEY_LEN..])?,
                })
            }
        }
    };
}

regenerate_part!(
    /// First half of a new 32-byte master key.
    RegenerateCodesPart1
);
regenerate_part!(
    /// Second half of a new 32-byte master key.
    RegenerateCodesPart2
);

fn regenerate_part_bytes(part: &[u8]) -> Result<[u8; REGENERATE_PART_LEN], ProtocolError> {
    part.try_into().map_err(|_| ProtocolError::InvalidValue {
        field: "regenerate part",
        reason: format!("expected {REGENERATE_PART_LEN} bytes, got {}", part.len()),
    })
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Toggles a device feature flag (for example La Poste NFC support).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetConfiguration {
    pub config_key: ConfigKey,
    pub config_type: u8,
    pub value: bool,
}

impl SetConfiguration {
    pub fn new(config_key: &str, config_type: u8, value: bool) -> Result<Self, ProtocolError> {
        Ok(Self {
            config_key: ConfigKey::new(config_key)?,
            config_type,
            value,
        })
    }
}

impl PacketBody for SetConfiguration {
    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = self.config_key.as_bytes().to_vec();
        buf.push(self.config_type);
        buf.push(u8::from(self.value));
        buf
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        require_exact(payload, 10, "SetConfiguration")?;
        let value = match payload[9] {
            0x00 => false,
            0x01 => true,
            other => {
                return Err(ProtocolError::InvalidValue {
                    field: "SetConfiguration.value",
                    reason: format!("must be 0x00 or 0x01, got 0x{other:02X}"),
                })
            }
        };
        Ok(Self {
            config_key: ConfigKey::from_payload_prefix(payload)?,
            config_type: payload[8],
            value,
        })
    }
}

// ── NFC ───────────────────────────────────────────────────────────────────────

/// Puts the reader in tag-scan mode; the tag is reported by `NfcTagFound`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNfcTagScanStart {
    pub config_key: ConfigKey,
}

impl RegisterNfcTagScanStart {
    pub fn new(config_key: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            config_key: ConfigKey::new(config_key)?,
        })
    }
}

impl PacketBody for RegisterNfcTagScanStart {
    fn encode_payload(&self) -> Vec<u8> {
        self.config_key.as_bytes().to_vec()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        require_exact(payload, CONFIG_KEY_LEN, "RegisterNfcTagScanStart")?;
        Ok(Self {
            config_key: ConfigKey::from_payload_prefix(payload)?,
        })
    }
}

macro_rules! nfc_uid_command {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub config_key: ConfigKey,
            pub uid: NfcUid,
        }

        impl $name {
            /// `uid` accepts `04A1B2C3` or `04:A1:B2:C3`.
            pub fn new(config_key: &str, uid: &str) -> Result<Self, ProtocolError> {
                Ok(Self {
                    config_key: ConfigKey::new(config_key)?,
                    uid: NfcUid::parse(uid)?,
                })
            }
        }

        impl PacketBody for $name {
            fn encode_payload(&self) -> Vec<u8> {
                encode_key_and_uid(&self.config_key, &self.uid)
            }

            fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
                let (config_key, uid) = decode_key_and_uid(payload, stringify!($name))?;
                Ok(Self { config_key, uid })
            }
        }
    };
}

nfc_uid_command!(
    /// Registers a tag as an opening credential.
    RegisterNfcTag
);
nfc_uid_command!(UnregisterNfcTag);

fn encode_key_and_uid(config_key: &ConfigKey, uid: &NfcUid) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONFIG_KEY_LEN + 1 + uid.as_bytes().len());
    buf.extend_from_slice(config_key.as_bytes());
    buf.push(uid.as_bytes().len() as u8);
    buf.extend_from_slice(uid.as_bytes());
    buf
}

fn decode_key_and_uid(
    payload: &[u8],
    context: &'static str,
) -> Result<(ConfigKey, NfcUid), ProtocolError> {
    require_min(payload, CONFIG_KEY_LEN + 1, context)?;
    let uid_len = payload[CONFIG_KEY_LEN] as usize;
    let start = CONFIG_KEY_LEN + 1;
    require_exact(payload, start + uid_len, context)?;
    Ok((
        ConfigKey::from_payload_prefix(payload)?,
        NfcUid::from_bytes(&payload[start..])?,
    ))
}

// ── Scale ─────────────────────────────────────────────────────────────────────

data_packet!(
    /// Starts bonding with a scale accessory.
    ScaleBond
);
empty_packet!(ScaleGetMacAddress);
empty_packet!(ScaleForgetBonding);
empty_packet!(ScaleTareEmpty);
data_packet!(ScaleTareLoaded);
empty_packet!(
    /// Requests a weight reading; answered by `ScaleWeight`.
    ScaleMeasureWeight
);
empty_packet!(ScalePrepareDfu);
empty_packet!(ScaleGetRawSensors);
empty_packet!(ScaleReconnect);
