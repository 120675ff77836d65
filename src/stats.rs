//! Transaction propagation statistics.
//!
//! For every transaction hash announced via `inv`, count the distinct hosts
//! that announced it and express that as a share of the peers we are
//! connected to.

use std::collections::HashSet;
use std::net::IpAddr;
use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::network::events::NetworkEvent;
use crate::wire::types::hash_hex;
use crate::wire::{Hash256, InventoryKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationSample {
    pub tx: String,
    pub nodes: usize,
    pub percent_of_nodes: u64,
}

pub struct PropagationTracker {
    announcers: LruCache<Hash256, HashSet<IpAddr>>,
    /// Connected peers, raised to the widest spread seen so far
    peers: usize,
}

impl PropagationTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            announcers: LruCache::new(capacity),
            peers: 1,
        }
    }

    pub fn set_active_peers(&mut self, active: usize) {
        self.peers = active;
    }

    pub fn peers(&self) -> usize {
        self.peers
    }

    pub fn tracked(&self) -> usize {
        self.announcers.len()
    }

    pub fn record(&mut self, hash: Hash256, host: IpAddr) -> PropagationSample {
        let hosts = self.announcers.get_or_insert_mut(hash, HashSet::new);
        let first = hosts.is_empty();
        hosts.insert(host);
        let nodes = hosts.len();

        if !first && self.peers < nodes {
            self.peers = nodes;
        }

        let percent = (nodes as f64 / self.peers.max(1) as f64 * 100.0).round() as u64;
        PropagationSample {
            tx: hash_hex(&hash),
            nodes,
            percent_of_nodes: percent,
        }
    }
}

/// Log a sample for every announced transaction until `shutdown`.
pub async fn run(
    mut events: broadcast::Receiver<NetworkEvent>,
    mut tracker: PropagationTracker,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(NetworkEvent::Inventory { peer, item }) if item.kind == InventoryKind::Transaction => {
                let sample = tracker.record(item.hash, peer.addr.ip());
                info!(
                    tx = %sample.tx,
                    nodes = sample.nodes,
                    percent_of_nodes = %format!("{}%", sample.percent_of_nodes),
                    "transaction announced"
                );
            }
            Ok(NetworkEvent::PeerStatus { active }) => tracker.set_active_peers(active),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Stats fell behind; {} events skipped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
