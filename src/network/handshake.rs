//! Version handshake.
//!
//! ```text
//!  connect ──► send version ──► AwaitingVerack ──(version)──► send verack
//!     │                              │                            │
//!   10s: "no version received"       └──────────(verack)──────────┴──► Active
//!                                                        10s: "no acknowledgment received"
//! ```
//!
//! A `verack` that overtakes the remote's `version` is held until the
//! version arrives. A remote echoing our own nonce is us, and is dropped.

use std::net::SocketAddr;

use tracing::{debug, info};

use crate::constants::handshake::{DISCOVERY_GRACE, VERACK_TIMEOUT, VERSION_TIMEOUT};
use crate::network::dispatch::Propagation;
use crate::network::events::NetworkEvent;
use crate::network::peer_state::{HandshakeState, PeerInfo, RemoteVersion};
use crate::network::pool::{PeerId, Severity};
use crate::network::session::{NetworkSession, SessionState};
use crate::network::timer::TimerEvent;
use crate::wire::address::format_host;
use crate::wire::types::{VersionMessage, WireTime};
use crate::wire::{Command, EndpointRecord, Payload, Services};

impl NetworkSession {
    pub(crate) fn on_peer_connected(&mut self, peer: PeerId, remote: SocketAddr, inbound: bool) {
        if self.state == SessionState::Shutdown {
            self.pool.remove_peer(peer, "shutting down");
            return;
        }
        if self.peers.contains(peer) {
            debug!("duplicate connect event for {}", peer);
            return;
        }

        debug!(
            "🔗 {} connected ({}, {})",
            remote,
            peer,
            if inbound { "inbound" } else { "outbound" }
        );
        let mut info = PeerInfo::new(peer, remote, inbound);
        info.handshake_timer = Some(
            self.scheduler
                .schedule(VERSION_TIMEOUT, TimerEvent::VersionTimeout { peer }),
        );
        self.peers.insert(info);
        self.send_version(peer);
    }

    /// Our half of the handshake.
    pub(crate) fn send_version(&mut self, peer: PeerId) {
        let addr_from = self.local_endpoint();
        let Some(info) = self.peers.get_mut(peer) else {
            return;
        };

        let version = VersionMessage {
            version: self.config.protocol_version,
            services: Services(self.config.services),
            time: WireTime::now(),
            addr_recv: EndpointRecord::from_socket_addr(info.addr, Services::NODE_NETWORK),
            addr_from,
            nonce: self.nonce,
            client: self.config.client_name.clone(),
            height: self.config.known_height,
            relay: None,
        };
        info.state = HandshakeState::AwaitingVerack;
        self.pool.send(peer, Command::Version, version.encode());
    }

    /// The address we advertise in `addr_from`: the known external address
    /// if there is one, otherwise all zeroes.
    pub(crate) fn local_endpoint(&self) -> EndpointRecord {
        let mut endpoint = EndpointRecord::unknown(Services(self.config.services));
        if let Some(raw) = self.external_address {
            endpoint.raw_host = raw;
            endpoint.host = format_host(&raw);
            if self.config.listen {
                endpoint.port = self.config.port;
            }
        }
        endpoint
    }

    pub(crate) fn handle_version(&mut self, peer: PeerId, payload: &Payload) -> Propagation {
        let Payload::Version(version) = payload else {
            return Propagation::Continue;
        };

        if version.nonce == self.nonce {
            self.evict(peer, "connected to self");
            return Propagation::Stop;
        }

        let Some(info) = self.peers.get_mut(peer) else {
            return Propagation::Stop;
        };
        if info.version_received() {
            debug!("ignoring repeated version from {}", info.addr);
            return Propagation::Continue;
        }

        info.cancel_handshake_timer();
        info.remote = Some(RemoteVersion {
            version: version.version,
            services: version.services,
            nonce: version.nonce,
            client: version.client.clone(),
            height: version.height,
        });
        let early_verack = info.early_verack;

        self.pool.send(peer, Command::Verack, Vec::new());
        self.discover_external_address(&version.addr_recv);

        if early_verack {
            self.complete_handshake(peer);
        } else if let Some(info) = self.peers.get_mut(peer) {
            info.handshake_timer = Some(
                self.scheduler
                    .schedule(VERACK_TIMEOUT, TimerEvent::VerackTimeout { peer }),
            );
        }
        Propagation::Continue
    }

    pub(crate) fn handle_verack(&mut self, peer: PeerId, _payload: &Payload) -> Propagation {
        let Some(info) = self.peers.get_mut(peer) else {
            return Propagation::Continue;
        };
        if info.is_active() {
            debug!("ignoring repeated verack from {}", info.addr);
            return Propagation::Continue;
        }
        if !info.version_received() {
            debug!("verack from {} arrived before its version", info.addr);
            info.early_verack = true;
            return Propagation::Continue;
        }
        self.complete_handshake(peer);
        Propagation::Continue
    }

    fn complete_handshake(&mut self, peer: PeerId) {
        let Some(info) = self.peers.get_mut(peer) else {
            return;
        };
        info.cancel_handshake_timer();
        info.early_verack = false;
        info.state = HandshakeState::Active;

        let (client, height) = info
            .remote
            .as_ref()
            .map(|r| (r.client.as_str(), r.height))
            .unwrap_or(("", 0));
        info!("🤝 Handshake complete with {} {} height {}", info.addr, client, height);

        if self.state == SessionState::Launching {
            self.state = SessionState::Running;
            info!("✅ Network running");
            self.events.publish(NetworkEvent::Running);
            self.discovery_timer = Some(
                self.scheduler
                    .schedule(DISCOVERY_GRACE, TimerEvent::DiscoveryTick),
            );
        }
    }

    pub(crate) fn on_version_timeout(&mut self, peer: PeerId) {
        let waiting = self
            .peers
            .get(peer)
            .is_some_and(|info| !info.version_received());
        if waiting {
            self.evict(peer, "no version received");
        } else {
            debug!("version timer for {} no longer applies", peer);
        }
    }

    pub(crate) fn on_verack_timeout(&mut self, peer: PeerId) {
        let waiting = self
            .peers
            .get(peer)
            .is_some_and(|info| info.version_received() && !info.is_active());
        if waiting {
            self.evict(peer, "no acknowledgment received");
        } else {
            debug!("verack timer for {} no longer applies", peer);
        }
    }

    /// Learn our own address from what a peer says it sees.
    fn discover_external_address(&mut self, seen: &EndpointRecord) {
        if self.external_fixed || !seen.is_routable() {
            return;
        }
        if self.external_address == Some(seen.raw_host) {
            return;
        }
        self.external_address = Some(seen.raw_host);
        self.events.diagnostic(
            Severity::Info,
            format!("External address discovered to be {}", seen.host),
        );
    }
}
