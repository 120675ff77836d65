//! Shared harness: a recording pool and helpers for driving a session by
//! hand under a paused clock.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use peerwatch::config::NetworkConfig;
use peerwatch::network::{
    ConnectionPool, NetworkEvent, NetworkHandle, NetworkSession, PeerId, PoolEvent, TimerEvent,
};
use peerwatch::wire::types::{VersionMessage, WireTime};
use peerwatch::wire::writer::PayloadWriter;
use peerwatch::wire::{Command, EndpointRecord, InventoryItem, Services};

#[derive(Default)]
pub struct Recorded {
    pub launched: Option<Vec<SocketAddr>>,
    pub sent: Vec<(PeerId, Command, Vec<u8>)>,
    pub removed: Vec<(PeerId, String)>,
    pub candidates: Vec<EndpointRecord>,
    pub shutdown: bool,
    /// What `sample_peers` draws from, in order
    pub connected: Vec<PeerId>,
}

#[derive(Default)]
pub struct MockPool {
    pub recorded: Mutex<Recorded>,
}

impl MockPool {
    pub fn sent_to(&self, peer: PeerId) -> Vec<(Command, Vec<u8>)> {
        self.recorded
            .lock()
            .sent
            .iter()
            .filter(|(to, _, _)| *to == peer)
            .map(|(_, command, payload)| (command.clone(), payload.clone()))
            .collect()
    }

    pub fn commands_to(&self, peer: PeerId) -> Vec<Command> {
        self.sent_to(peer).into_iter().map(|(c, _)| c).collect()
    }

    pub fn count(&self, command: &Command) -> usize {
        self.recorded
            .lock()
            .sent
            .iter()
            .filter(|(_, c, _)| c == command)
            .count()
    }

    pub fn removal_reason(&self, peer: PeerId) -> Option<String> {
        self.recorded
            .lock()
            .removed
            .iter()
            .find(|(p, _)| *p == peer)
            .map(|(_, reason)| reason.clone())
    }
}

impl ConnectionPool for MockPool {
    fn launch(&self, seeds: Vec<SocketAddr>) {
        self.recorded.lock().launched = Some(seeds);
    }

    fn send(&self, peer: PeerId, command: Command, payload: Vec<u8>) {
        self.recorded.lock().sent.push((peer, command, payload));
    }

    fn remove_peer(&self, peer: PeerId, reason: &str) {
        let mut recorded = self.recorded.lock();
        recorded.removed.push((peer, reason.to_string()));
        recorded.connected.retain(|p| *p != peer);
    }

    fn sample_peers(&self, count: usize, filter: &dyn Fn(PeerId) -> bool) -> Vec<PeerId> {
        self.recorded
            .lock()
            .connected
            .iter()
            .copied()
            .filter(|p| filter(*p))
            .take(count)
            .collect()
    }

    fn add_candidates(&self, endpoints: Vec<EndpointRecord>) {
        self.recorded.lock().candidates.extend(endpoints);
    }

    fn shutdown(&self) {
        self.recorded.lock().shutdown = true;
    }
}

pub struct Harness {
    pub session: NetworkSession,
    pub pool: Arc<MockPool>,
    pub handle: NetworkHandle,
    pub events: broadcast::Receiver<NetworkEvent>,
}

impl Harness {
    /// A launched session with default configuration.
    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        let pool = Arc::new(MockPool::default());
        let (mut session, handle) = NetworkSession::new(config, pool.clone());
        let events = handle.subscribe();
        session.launch(Vec::new());
        Self {
            session,
            pool,
            handle,
            events,
        }
    }

    pub fn connect(&mut self, id: u64) -> PeerId {
        let peer = PeerId(id);
        self.session.handle_pool_event(PoolEvent::PeerConnected {
            peer,
            remote: peer_addr(id),
            inbound: false,
        });
        self.pool.recorded.lock().connected.push(peer);
        peer
    }

    pub fn deliver(&mut self, peer: PeerId, command: Command, payload: Vec<u8>) {
        self.session.handle_pool_event(PoolEvent::Message {
            peer,
            command,
            payload: Bytes::from(payload),
        });
    }

    /// Connect and complete the handshake.
    pub fn activate(&mut self, id: u64) -> PeerId {
        let peer = self.connect(id);
        self.deliver(peer, Command::Version, version_payload([id as u8; 8], public_addr()));
        self.deliver(peer, Command::Verack, Vec::new());
        assert!(self.session.peer(peer).unwrap().is_active());
        peer
    }

    /// Handle timers until one matches.
    pub async fn advance_until(&mut self, want: impl Fn(&TimerEvent) -> bool) -> TimerEvent {
        loop {
            let event = self
                .session
                .next_timer()
                .await
                .expect("timer channel closed");
            if want(&event) {
                return event;
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<NetworkEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn diagnostics(&mut self) -> Vec<String> {
        self.drain_events()
            .into_iter()
            .filter_map(|e| match e {
                NetworkEvent::Diagnostic { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

pub fn peer_addr(id: u64) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, id as u8], 8333))
}

pub fn public_addr() -> SocketAddr {
    "203.0.113.5:8333".parse().unwrap()
}

pub fn version_payload(nonce: [u8; 8], seen_as: SocketAddr) -> Vec<u8> {
    VersionMessage {
        version: 70015,
        services: Services(1),
        time: WireTime::now(),
        addr_recv: EndpointRecord::from_socket_addr(seen_as, Services(1)),
        addr_from: EndpointRecord::unknown(Services(1)),
        nonce,
        client: "/Satoshi:0.21.0/".to_string(),
        height: 700_000,
        relay: Some(true),
    }
    .encode()
}

pub fn tx_items(n: u8) -> Vec<InventoryItem> {
    (0..n).map(|i| InventoryItem::transaction([i; 32])).collect()
}

/// A minimal one-input, one-output transaction; `tag` varies the script.
pub fn tx_payload(tag: u8) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_u32(1)
        .put_var_int(1)
        .put(&[0x11; 32])
        .put_u32(0)
        .put_var_bytes(&[tag, 0x51])
        .put_u32(0xffff_ffff)
        .put_var_int(1)
        .put_u64(50_000)
        .put_var_bytes(&[0x76, 0xa9, tag])
        .put_u32(0);
    w.into_vec()
}

pub fn inv_payload(items: &[(u32, [u8; 32])]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_var_int(items.len() as u64);
    for (code, hash) in items {
        w.put_u32(*code).put(hash);
    }
    w.into_vec()
}
