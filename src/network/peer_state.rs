//! Per-peer side records kept by the session.
//!
//! The pool owns the connection; the session owns one [`PeerInfo`] per
//! [`PeerId`], created on connect and dropped on removal. Dropping a record
//! drops its timer handles, which cancels them.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::network::events::PeerRef;
use crate::network::fetch::PeerFetchState;
use crate::network::pool::PeerId;
use crate::network::timer::TimerHandle;
use crate::wire::Services;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Connected, our `version` not yet sent
    Connecting,
    /// Our `version` sent, waiting for theirs and for `verack`
    AwaitingVerack,
    Active,
}

/// What the remote told us in its `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    pub version: u32,
    pub services: Services,
    pub nonce: [u8; 8],
    pub client: String,
    pub height: u32,
}

#[derive(Debug)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub inbound: bool,
    pub state: HandshakeState,
    /// Set once a valid `version` has been accepted.
    pub remote: Option<RemoteVersion>,
    /// `verack` seen before the remote's `version`.
    pub early_verack: bool,
    /// Version or verack watchdog, whichever is current.
    pub handshake_timer: Option<TimerHandle>,
    pub fetch: PeerFetchState,
}

impl PeerInfo {
    pub fn new(id: PeerId, addr: SocketAddr, inbound: bool) -> Self {
        Self {
            id,
            addr,
            inbound,
            state: HandshakeState::Connecting,
            remote: None,
            early_verack: false,
            handshake_timer: None,
            fetch: PeerFetchState::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == HandshakeState::Active
    }

    pub fn version_received(&self) -> bool {
        self.remote.is_some()
    }

    pub fn peer_ref(&self) -> PeerRef {
        PeerRef {
            id: self.id,
            addr: self.addr,
        }
    }

    pub fn cancel_handshake_timer(&mut self) {
        if let Some(timer) = self.handshake_timer.take() {
            timer.cancel();
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<PeerId, PeerInfo>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: PeerInfo) -> Option<PeerInfo> {
        self.peers.insert(info.id, info)
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerInfo> {
        self.peers.get(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut PeerInfo> {
        self.peers.get_mut(&id)
    }

    pub fn remove(&mut self, id: PeerId) -> Option<PeerInfo> {
        self.peers.remove(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn is_active(&self, id: PeerId) -> bool {
        self.peers.get(&id).is_some_and(PeerInfo::is_active)
    }

    pub fn active_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_active()).count()
    }

    pub fn active_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.is_active())
            .map(|p| p.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn peer_ref(&self, id: PeerId) -> Option<PeerRef> {
        self.peers.get(&id).map(PeerInfo::peer_ref)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = PeerInfo> + '_ {
        self.peers.drain().map(|(_, info)| info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u64) -> PeerInfo {
        PeerInfo::new(PeerId(id), format!("10.0.0.{}:8333", id).parse().unwrap(), false)
    }

    #[test]
    fn test_new_peer_is_not_active() {
        let peer = info(1);
        assert_eq!(peer.state, HandshakeState::Connecting);
        assert!(!peer.is_active());
        assert!(!peer.version_received());
    }

    #[test]
    fn test_active_accounting() {
        let mut table = PeerTable::new();
        table.insert(info(1));
        table.insert(info(2));
        table.insert(info(3));
        table.get_mut(PeerId(3)).unwrap().state = HandshakeState::Active;
        table.get_mut(PeerId(1)).unwrap().state = HandshakeState::Active;

        assert_eq!(table.len(), 3);
        assert_eq!(table.active_count(), 2);
        assert_eq!(table.active_ids(), vec![PeerId(1), PeerId(3)]);
        assert!(!table.is_active(PeerId(2)));
        assert!(!table.is_active(PeerId(9)));

        table.remove(PeerId(1));
        assert_eq!(table.active_count(), 1);
    }
}
