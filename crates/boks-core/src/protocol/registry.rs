//! Opcode to packet lookup for inbound traffic.
//!
//! Everything here is forgiving: unknown opcodes, bad frames and payloads that
//! fail validation all yield `None`, because firmware may emit messages this
//! client does not understand and a single bad notification must never end
//! the session.

use tracing::{debug, warn};

use crate::protocol::catalog::{Opcode, Packet};
use crate::protocol::commands::{RegenerateCodesPart1, RegenerateCodesPart2, REGENERATE_PART_LEN};
use crate::protocol::error::ProtocolError;
use crate::protocol::frame::{decode_frame, ChecksumMismatch};
use crate::protocol::validation::SEED_LEN;

/// Builds the packet for `opcode` from its payload.
///
/// Returns `None` for opcodes missing from the catalog and for payloads the
/// packet rejects.
pub fn create_from_payload(opcode: u8, payload: &[u8]) -> Option<Packet> {
    let Ok(op) = Opcode::try_from(opcode) else {
        debug!(opcode, "ignoring unknown opcode");
        return None;
    };

    match Packet::decode(op, payload) {
        Ok(packet) => Some(packet),
        Err(err) => {
            warn!(opcode, error = %err, "dropping undecodable packet");
            None
        }
    }
}

/// Decodes a full frame and looks up its packet.
///
/// `on_checksum_error` is invoked when the frame is intact but its checksum
/// byte is wrong.
pub fn create_from_frame(
    bytes: &[u8],
    on_checksum_error: &mut dyn FnMut(&ChecksumMismatch),
) -> Option<Packet> {
    let frame = decode_frame(bytes, on_checksum_error)?;
    create_from_payload(frame.opcode, frame.payload)
}

/// Splits a new 32-byte master key into the two regeneration commands.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidConfigKey`] for a malformed config key and
/// [`ProtocolError::InvalidValue`] unless the key is exactly 32 bytes.
pub fn create_regenerate_packets(
    config_key: &str,
    new_master_key: &[u8],
) -> Result<(RegenerateCodesPart1, RegenerateCodesPart2), ProtocolError> {
    if new_master_key.len() != SEED_LEN {
        return Err(ProtocolError::InvalidValue {
            field: "master key",
            reason: format!(
                "expected {SEED_LEN} bytes, got {}",
                new_master_key.len()
            ),
        });
    }
    let (first, second) = new_master_key.split_at(REGENERATE_PART_LEN);
    Ok((
        RegenerateCodesPart1::new(config_key, first)?,
        RegenerateCodesPart2::new(config_key, second)?,
    ))
}
