//! Wire protocol: frame codec, opcode catalog, packet payloads and the
//! inbound registry.

#[macro_use]
mod macros;

pub mod battery;
pub mod catalog;
pub mod commands;
pub mod error;
pub mod frame;
pub mod history;
pub mod notifications;
pub mod registry;
pub mod validation;

pub use catalog::{Opcode, Packet, PacketBody, PacketKind};
pub use error::ProtocolError;
pub use frame::{
    checksum, decode_frame, encode_frame, try_decode_frame, ChecksumMismatch, FrameError, RawFrame,
};
pub use history::{HistoryCode, HistoryHeader, HistoryRecord};
pub use registry::{create_from_frame, create_from_payload, create_regenerate_packets};
