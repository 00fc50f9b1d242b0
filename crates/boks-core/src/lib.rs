//! # boks-core
//!
//! Protocol engine for Boks BLE parcel boxes: the wire frame codec, the opcode
//! catalog with every command, notification and history event, and the PIN
//! derivation primitive.
//!
//! The crate is synchronous and performs no I/O.  The async transaction layer
//! and the transports live in `boks-client`.
//!
//! # Architecture overview (for beginners)
//!
//! A Boks box exposes one BLE service with a write characteristic (client to
//! device) and a notify characteristic (device to client).  Every message in
//! either direction is a small frame:
//!
//! ```text
//! [opcode][length][payload ...][checksum]
//! ```
//!
//! - **`protocol`** – Turns frames into typed [`Packet`] values and back.  The
//!   opcode catalog lists every message once; lookups, dispatch and
//!   completeness tests are generated from it.
//!
//! - **`crypto`** – Reproduces the device's code tables: given the 32-byte
//!   master key, [`derive_pin`] computes the single-use, multi-use or master
//!   code at any index.

pub mod crypto;
pub mod protocol;

pub use crypto::pin::{derive_pin, derive_pin_for, PinType};
pub use protocol::catalog::{Opcode, Packet, PacketKind};
pub use protocol::error::ProtocolError;
pub use protocol::registry::{create_from_frame, create_from_payload};
