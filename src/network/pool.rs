//! Boundary between the session core and whatever owns the sockets.
//!
//! The pool opens and accepts connections, frames bytes, and reports what
//! happens as [`PoolEvent`]s on an unbounded channel. The session never
//! touches a socket; it only calls back through [`ConnectionPool`].

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::wire::{Command, EndpointRecord};

/// Pool-assigned identity of one connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Notice,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone)]
pub enum PoolEvent {
    PeerConnected {
        peer: PeerId,
        remote: SocketAddr,
        inbound: bool,
    },
    Message {
        peer: PeerId,
        command: Command,
        payload: Bytes,
    },
    /// The connection is gone, whoever closed it.
    PeerRemoved { peer: PeerId },
    /// Number of open connections changed.
    Status { active: usize },
    Error { severity: Severity, message: String },
}

pub trait ConnectionPool: Send + Sync + 'static {
    /// Start dialing. `seeds` are the first candidates.
    fn launch(&self, seeds: Vec<SocketAddr>);

    /// Queue one framed message. Unknown peers are ignored.
    fn send(&self, peer: PeerId, command: Command, payload: Vec<u8>);

    /// Close a connection. A `PeerRemoved` event follows.
    fn remove_peer(&self, peer: PeerId, reason: &str);

    /// Up to `count` distinct connected peers accepted by `filter`, in random
    /// order.
    fn sample_peers(&self, count: usize, filter: &dyn Fn(PeerId) -> bool) -> Vec<PeerId>;

    /// Offer addresses learned from the network as dial candidates.
    fn add_candidates(&self, endpoints: Vec<EndpointRecord>);

    /// Close every connection and stop dialing.
    fn shutdown(&self);
}
