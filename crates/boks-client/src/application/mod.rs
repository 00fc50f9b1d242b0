//! Application layer of the client.
//!
//! - **`transport`** – the `Transport` trait the orchestrator drives, plus
//!   the GATT identifiers of the Boks service.
//! - **`client`** – `BoksClient`, the single-flight transaction orchestrator.
//! - **`transaction`** – the record of one request/response exchange.
//! - **`diagnostics`** – typed log events and the sink they are delivered to.
//! - **`error`** – `ClientError`.

pub mod client;
pub mod diagnostics;
pub mod error;
pub mod transaction;
pub mod transport;
