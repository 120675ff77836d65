//! peerwatch: a Bitcoin P2P gossip client.
//!
//! - [`wire`]: message codecs
//! - [`network`]: handshake, dispatch, batched fetching and discovery
//! - [`transport`]: TCP connection pool and seed lookup
//! - [`stats`]: transaction propagation tracking used by the daemon

pub mod config;
pub mod constants;
pub mod error;
pub mod network;
pub mod shutdown;
pub mod stats;
pub mod transport;
pub mod wire;

pub use config::{Config, NetworkConfig};
pub use error::{AppError, DecodeError, FetchError, FrameError};
pub use network::{NetworkEvent, NetworkHandle, NetworkSession};
