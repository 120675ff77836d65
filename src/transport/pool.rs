//! TCP implementation of [`ConnectionPool`].
//!
//! Each connection runs on its own task: a read half that turns frames into
//! [`PoolEvent::Message`]s and a write half that drains the peer's outbox.
//! The first half to stop closes the connection. A maintenance task keeps
//! the number of connections between `min_peers` and `max_peers` by dialing
//! from a bounded, de-duplicated candidate list.

use std::collections::{HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::constants::pool::{CONNECT_TIMEOUT, DIAL_BATCH, MAINTENANCE_INTERVAL, MAX_CANDIDATES};
use crate::network::pool::{ConnectionPool, PeerId, PoolEvent, Severity};
use crate::wire::frame::{read_frame, write_frame};
use crate::wire::{Command, EndpointRecord};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub magic: u32,
    pub min_peers: usize,
    pub max_peers: usize,
    pub idle_timeout: Duration,
    /// Port to accept inbound connections on, if any
    pub listen_port: Option<u16>,
}

impl From<&NetworkConfig> for PoolConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            magic: config.magic,
            min_peers: config.min_peers,
            max_peers: config.max_peers,
            idle_timeout: config.idle_timeout(),
            listen_port: config.listen.then_some(config.port),
        }
    }
}

enum Outbound {
    Frame { command: Command, payload: Vec<u8> },
    Close(String),
}

struct PeerSlot {
    remote: SocketAddr,
    outbox: mpsc::UnboundedSender<Outbound>,
}

/// FIFO of addresses to dial; an address is queued at most once.
struct CandidateList {
    queue: VecDeque<SocketAddr>,
    queued: HashSet<SocketAddr>,
    capacity: usize,
}

impl CandidateList {
    fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            capacity,
        }
    }

    fn push(&mut self, addr: SocketAddr) -> bool {
        if !self.queued.insert(addr) {
            return false;
        }
        self.queue.push_back(addr);
        while self.queue.len() > self.capacity {
            if let Some(evicted) = self.queue.pop_front() {
                self.queued.remove(&evicted);
            }
        }
        true
    }

    fn pop(&mut self) -> Option<SocketAddr> {
        let addr = self.queue.pop_front()?;
        self.queued.remove(&addr);
        Some(addr)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

struct PoolInner {
    config: PoolConfig,
    peers: DashMap<PeerId, PeerSlot>,
    candidates: Mutex<CandidateList>,
    next_id: AtomicU64,
    dialing: AtomicUsize,
    launched: AtomicBool,
    events: mpsc::UnboundedSender<PoolEvent>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct TcpPool {
    inner: Arc<PoolInner>,
}

impl TcpPool {
    pub fn new(config: PoolConfig) -> (Self, mpsc::UnboundedReceiver<PoolEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = PoolInner {
            config,
            peers: DashMap::new(),
            candidates: Mutex::new(CandidateList::new(MAX_CANDIDATES)),
            next_id: AtomicU64::new(1),
            dialing: AtomicUsize::new(0),
            launched: AtomicBool::new(false),
            events,
            shutdown: CancellationToken::new(),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn connected(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn candidate_count(&self) -> usize {
        self.inner.candidates.lock().len()
    }
}

impl ConnectionPool for TcpPool {
    fn launch(&self, seeds: Vec<SocketAddr>) {
        if self.inner.launched.swap(true, Ordering::SeqCst) {
            warn!("connection pool already launched");
            return;
        }
        {
            let mut candidates = self.inner.candidates.lock();
            for seed in seeds {
                candidates.push(seed);
            }
        }

        tokio::spawn(maintain(self.inner.clone()));
        if let Some(port) = self.inner.config.listen_port {
            tokio::spawn(accept_loop(self.inner.clone(), port));
        }
    }

    fn send(&self, peer: PeerId, command: Command, payload: Vec<u8>) {
        match self.inner.peers.get(&peer) {
            Some(slot) => {
                let _ = slot.outbox.send(Outbound::Frame { command, payload });
            }
            None => debug!("dropping {} for unknown {}", command, peer),
        }
    }

    fn remove_peer(&self, peer: PeerId, reason: &str) {
        if let Some(slot) = self.inner.peers.get(&peer) {
            let _ = slot.outbox.send(Outbound::Close(reason.to_string()));
        }
    }

    fn sample_peers(&self, count: usize, filter: &dyn Fn(PeerId) -> bool) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self
            .inner
            .peers
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| filter(*id))
            .collect();
        ids.shuffle(&mut rand::thread_rng());
        ids.truncate(count);
        ids
    }

    fn add_candidates(&self, endpoints: Vec<EndpointRecord>) {
        let mut candidates = self.inner.candidates.lock();
        let added = endpoints
            .iter()
            .filter(|e| e.is_routable() && e.port != 0)
            .filter(|e| candidates.push(e.socket_addr()))
            .count();
        debug!(
            "📇 {} new candidates ({} offered, {} queued)",
            added,
            endpoints.len(),
            candidates.len()
        );
    }

    fn shutdown(&self) {
        info!("🛑 Closing all peer connections");
        self.inner.shutdown.cancel();
    }
}

impl PoolInner {
    fn emit(&self, event: PoolEvent) {
        // The session stopped listening; nothing left to tell.
        let _ = self.events.send(event);
    }

    fn emit_status(&self) {
        self.emit(PoolEvent::Status {
            active: self.peers.len(),
        });
    }

    fn is_connected_to(&self, addr: SocketAddr) -> bool {
        self.peers.iter().any(|entry| entry.value().remote == addr)
    }

    /// Dial candidates until the connection budget for this tick is spent.
    fn top_up(self: &Arc<Self>) {
        let connected = self.peers.len();
        let in_progress = self.dialing.load(Ordering::SeqCst);
        let open_slots = self
            .config
            .max_peers
            .saturating_sub(connected + in_progress)
            .min(DIAL_BATCH);
        if open_slots == 0 {
            return;
        }

        let mut targets = Vec::with_capacity(open_slots);
        {
            let mut candidates = self.candidates.lock();
            while targets.len() < open_slots {
                let Some(addr) = candidates.pop() else {
                    break;
                };
                if !self.is_connected_to(addr) {
                    targets.push(addr);
                }
            }
        }

        if targets.is_empty() && connected < self.config.min_peers {
            self.emit(PoolEvent::Error {
                severity: Severity::Notice,
                message: format!(
                    "Only {} peers connected (minimum {}) and no candidates to dial",
                    connected, self.config.min_peers
                ),
            });
            return;
        }

        for addr in targets {
            self.dialing.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(dial(self.clone(), addr));
        }
    }

    fn attach(self: &Arc<Self>, stream: TcpStream, remote: SocketAddr, inbound: bool) {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (outbox, rx) = mpsc::unbounded_channel();
        self.peers.insert(id, PeerSlot { remote, outbox });

        self.emit(PoolEvent::PeerConnected {
            peer: id,
            remote,
            inbound,
        });
        self.emit_status();
        tokio::spawn(run_connection(self.clone(), id, remote, stream, rx));
    }
}

async fn maintain(inner: Arc<PoolInner>) {
    let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = ticker.tick() => inner.top_up(),
        }
    }
    debug!("pool maintenance stopped");
}

async fn dial(inner: Arc<PoolInner>, addr: SocketAddr) {
    let result = tokio::select! {
        _ = inner.shutdown.cancelled() => None,
        r = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)) => Some(r),
    };
    inner.dialing.fetch_sub(1, Ordering::SeqCst);

    match result {
        Some(Ok(Ok(stream))) if !inner.shutdown.is_cancelled() => {
            if inner.peers.len() >= inner.config.max_peers {
                debug!("dropping fresh connection to {}: pool is full", addr);
                return;
            }
            inner.attach(stream, addr, false);
        }
        Some(Ok(Err(e))) => debug!("connect to {} failed: {}", addr, e),
        Some(Err(_)) => debug!("connect to {} timed out", addr),
        _ => {}
    }
}

async fn accept_loop(inner: Arc<PoolInner>, port: u16) {
    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = match TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(e) => {
            inner.emit(PoolEvent::Error {
                severity: Severity::Error,
                message: format!("Failed to listen on {}: {}", bind, e),
            });
            return;
        }
    };
    info!("👂 Listening for peers on {}", bind);

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    if inner.peers.len() >= inner.config.max_peers {
                        debug!("rejecting inbound {}: pool is full", remote);
                        continue;
                    }
                    inner.attach(stream, remote, true);
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
        }
    }
}

async fn run_connection(
    inner: Arc<PoolInner>,
    id: PeerId,
    remote: SocketAddr,
    stream: TcpStream,
    outbox: mpsc::UnboundedReceiver<Outbound>,
) {
    let (reader, writer) = stream.into_split();
    // Both halves run in this task; whichever finishes first ends the
    // connection and the other is dropped mid-await.
    let reason = tokio::select! {
        reason = read_loop(&inner, id, reader) => reason,
        reason = write_loop(&inner, writer, outbox) => reason,
    };

    inner.peers.remove(&id);
    debug!("🔌 {} ({}) closed: {}", remote, id, reason);
    inner.emit(PoolEvent::PeerRemoved { peer: id });
    inner.emit_status();
}

async fn read_loop(inner: &PoolInner, id: PeerId, reader: OwnedReadHalf) -> String {
    let mut reader = BufReader::new(reader);
    let magic = inner.config.magic;
    loop {
        match tokio::time::timeout(inner.config.idle_timeout, read_frame(&mut reader, magic)).await
        {
            Err(_) => return "idle timeout".to_string(),
            Ok(Ok(Some(frame))) => inner.emit(PoolEvent::Message {
                peer: id,
                command: frame.command,
                payload: frame.payload,
            }),
            Ok(Ok(None)) => return "closed by remote".to_string(),
            Ok(Err(e)) => return e.to_string(),
        }
    }
}

async fn write_loop(
    inner: &PoolInner,
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<Outbound>,
) -> String {
    let magic = inner.config.magic;
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => return "shutdown".to_string(),
            next = outbox.recv() => match next {
                Some(Outbound::Frame { command, payload }) => {
                    if let Err(e) = write_frame(&mut writer, magic, &command, &payload).await {
                        return format!("write {} failed: {}", command, e);
                    }
                }
                Some(Outbound::Close(reason)) => return reason,
                None => return "outbox closed".to_string(),
            },
        }
    }
}
