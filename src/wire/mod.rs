//! Bitcoin P2P wire format.
//!
//! - [`cursor`] / [`writer`]: little-endian primitives and var-ints
//! - [`address`]: `net_addr` records
//! - [`parse`]: per-command payload decoders
//! - [`frame`]: the 24-byte message header used on the socket
//!
//! Protocol reference:
//! https://developer.bitcoin.org/reference/p2p_networking.html
pub mod address;
pub mod command;
pub mod cursor;
pub mod frame;
pub mod message;
pub mod parse;
pub mod types;
pub mod writer;

pub use address::{AddressForm, EndpointRecord};
pub use command::Command;
pub use message::Payload;
pub use types::{Hash256, InventoryItem, InventoryKind, Services, Transaction};
