//! The protocol engine.
//!
//! A [`NetworkSession`] owns every piece of mutable protocol state: the peer
//! table, fetch batches, timers and the learned external address. It runs on
//! a single task and takes input from three channels:
//!
//! - [`PoolEvent`]s from the connection pool
//! - [`TimerEvent`]s from its own [`Scheduler`]
//! - [`SessionCommand`]s from any number of [`NetworkHandle`]s
//!
//! Nothing here is shared across threads except the [`EventBus`], so handlers
//! run to completion without locks.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::FetchError;
use crate::network::dispatch::Router;
use crate::network::events::{CommandEvent, EventBus, NetworkEvent};
use crate::network::fetch::{Completion, FetchResult};
use crate::network::peer_state::{PeerInfo, PeerTable};
use crate::network::pool::{ConnectionPool, PeerId, PoolEvent};
use crate::network::timer::{Scheduler, TimerEvent, TimerHandle};
use crate::wire::address::host_bytes;
use crate::wire::{Command, InventoryItem};

/// Lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    New,
    Launching,
    Running,
    Shutdown,
}

#[derive(Debug)]
pub enum SessionCommand {
    GetData {
        peer: PeerId,
        items: Vec<InventoryItem>,
        force: bool,
        completion: Completion,
    },
    Shutdown,
}

pub struct NetworkSession {
    pub(crate) config: NetworkConfig,
    /// Sent in our `version`; seeing it come back means we dialed ourselves.
    pub(crate) nonce: [u8; 8],
    pub(crate) state: SessionState,
    pub(crate) pool: Arc<dyn ConnectionPool>,
    pub(crate) peers: PeerTable,
    pub(crate) events: Arc<EventBus>,
    pub(crate) scheduler: Scheduler,
    pub(crate) router: Router,
    /// Raw 16-byte host we believe we are reachable at
    pub(crate) external_address: Option<[u8; 16]>,
    /// The external address came from configuration and is never replaced.
    pub(crate) external_fixed: bool,
    pub(crate) next_batch_id: u64,
    pub(crate) discovery_timer: Option<TimerHandle>,
    timers: Option<mpsc::UnboundedReceiver<TimerEvent>>,
    commands: Option<mpsc::UnboundedReceiver<SessionCommand>>,
}

impl NetworkSession {
    pub fn new(config: NetworkConfig, pool: Arc<dyn ConnectionPool>) -> (Self, NetworkHandle) {
        let (scheduler, timers) = Scheduler::new();
        let (command_tx, commands) = mpsc::unbounded_channel();
        let events = Arc::new(EventBus::new());

        let external_address = match config.external_ip() {
            Ok(ip) => ip.map(host_bytes),
            Err(e) => {
                warn!("{}; learning the external address from peers instead", e);
                None
            }
        };

        let session = Self {
            nonce: rand::random::<u64>().to_le_bytes(),
            state: SessionState::New,
            pool,
            peers: PeerTable::new(),
            events: events.clone(),
            scheduler,
            router: Router::new(),
            external_fixed: external_address.is_some(),
            external_address,
            next_batch_id: 1,
            discovery_timer: None,
            timers: Some(timers),
            commands: Some(commands),
            config,
        };
        let handle = NetworkHandle {
            commands: command_tx,
            events,
        };
        (session, handle)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nonce(&self) -> [u8; 8] {
        self.nonce
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn peer(&self, id: PeerId) -> Option<&PeerInfo> {
        self.peers.get(id)
    }

    pub fn active_peer_count(&self) -> usize {
        self.peers.active_count()
    }

    pub fn external_address(&self) -> Option<[u8; 16]> {
        self.external_address
    }

    /// Hand the seed list to the pool and start connecting.
    pub fn launch(&mut self, seeds: Vec<SocketAddr>) {
        if self.state != SessionState::New {
            warn!("launch ignored in state {:?}", self.state);
            return;
        }
        info!("🚀 Launching with {} seed addresses", seeds.len());
        self.state = SessionState::Launching;
        self.pool.launch(seeds);
        self.events.publish(NetworkEvent::Launched);
    }

    pub fn handle_pool_event(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::PeerConnected {
                peer,
                remote,
                inbound,
            } => self.on_peer_connected(peer, remote, inbound),
            PoolEvent::Message {
                peer,
                command,
                payload,
            } => self.dispatch(peer, command, payload),
            PoolEvent::PeerRemoved { peer } => {
                if let Some(info) = self.forget_peer(peer) {
                    debug!("🔌 {} ({}) disconnected", info.addr, peer);
                }
            }
            PoolEvent::Status { active } => {
                self.events.publish(NetworkEvent::PeerStatus { active });
            }
            PoolEvent::Error { severity, message } => {
                self.events.diagnostic(severity, message);
            }
        }
    }

    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::VersionTimeout { peer } => self.on_version_timeout(peer),
            TimerEvent::VerackTimeout { peer } => self.on_verack_timeout(peer),
            TimerEvent::Debounce { peer, generation } => self.on_debounce(peer, generation),
            TimerEvent::FetchWatchdog { peer, batch } => self.on_fetch_watchdog(peer, batch),
            TimerEvent::DiscoveryTick => self.on_discovery_tick(),
        }
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::GetData {
                peer,
                items,
                force,
                completion,
            } => self.get_data(peer, items, Some(completion), force),
            SessionCommand::Shutdown => self.shutdown(),
        }
    }

    /// Wait for the next timer and handle it. For driving a session by hand
    /// instead of through [`run`](Self::run).
    pub async fn next_timer(&mut self) -> Option<TimerEvent> {
        let event = self.timers.as_mut()?.recv().await?;
        self.handle_timer(event);
        Some(event)
    }

    /// Drive the session until shutdown is requested, through `shutdown` or
    /// a handle, or until the pool goes away. `shutdown` is cancelled on the
    /// way out so tasks sharing the token stop with the session.
    pub async fn run(
        mut self,
        mut pool_events: mpsc::UnboundedReceiver<PoolEvent>,
        shutdown: CancellationToken,
    ) {
        let (Some(mut timers), Some(mut commands)) = (self.timers.take(), self.commands.take())
        else {
            warn!("session loop already started");
            return;
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.shutdown();
                    break;
                }
                event = pool_events.recv() => match event {
                    Some(event) => self.handle_pool_event(event),
                    None => {
                        info!("Connection pool closed");
                        self.shutdown();
                        break;
                    }
                },
                Some(event) = timers.recv() => self.handle_timer(event),
                Some(command) = commands.recv() => {
                    let stop = matches!(command, SessionCommand::Shutdown);
                    self.handle_command(command);
                    if stop {
                        break;
                    }
                }
            }
        }
        shutdown.cancel();
        info!("🛑 Session loop stopped");
    }

    /// Terminal. Fails every outstanding request with
    /// [`FetchError::Shutdown`] and closes the pool.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Shutdown {
            return;
        }
        info!("🛑 Shutting down network session");
        self.state = SessionState::Shutdown;
        self.discovery_timer = None;

        for mut info in self.peers.drain() {
            info.cancel_handshake_timer();
            info.fetch.abort(FetchError::Shutdown);
        }
        self.pool.shutdown();
    }

    /// Drop a peer for a protocol reason.
    pub(crate) fn evict(&mut self, peer: PeerId, reason: &str) {
        if let Some(info) = self.forget_peer(peer) {
            warn!("🚫 Dropping {} ({}): {}", info.addr, peer, reason);
        }
        self.pool.remove_peer(peer, reason);
    }

    fn forget_peer(&mut self, peer: PeerId) -> Option<PeerInfo> {
        let mut info = self.peers.remove(peer)?;
        info.cancel_handshake_timer();
        info.fetch.abort(FetchError::PeerRemoved);
        Some(info)
    }
}

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct NetworkHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: Arc<EventBus>,
}

impl NetworkHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_command(&self, command: Command) -> broadcast::Receiver<CommandEvent> {
        self.events.subscribe_command(command)
    }

    /// Queue a request and return the channel its result arrives on.
    pub fn request_data(
        &self,
        peer: PeerId,
        items: Vec<InventoryItem>,
        force: bool,
    ) -> oneshot::Receiver<FetchResult> {
        let (completion, rx) = oneshot::channel();
        // If the session is gone the sender is dropped with the command and
        // the receiver sees a closed channel.
        let _ = self.commands.send(SessionCommand::GetData {
            peer,
            items,
            force,
            completion,
        });
        rx
    }

    pub async fn get_data(
        &self,
        peer: PeerId,
        items: Vec<InventoryItem>,
        force: bool,
    ) -> FetchResult {
        self.request_data(peer, items, force)
            .await
            .unwrap_or(Err(FetchError::Shutdown))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }
}
