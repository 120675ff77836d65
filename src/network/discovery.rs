//! Periodic `getaddr` polling.
//!
//! Runs two seconds after the first handshake and then every
//! [`DISCOVERY_INTERVAL`]. Answers arrive as `addr` messages, which the
//! dispatcher forwards to the pool as dial candidates.

use tracing::debug;

use crate::constants::handshake::{DISCOVERY_INTERVAL, DISCOVERY_SAMPLE};
use crate::network::pool::Severity;
use crate::network::session::{NetworkSession, SessionState};
use crate::network::timer::TimerEvent;
use crate::wire::Command;

impl NetworkSession {
    pub(crate) fn on_discovery_tick(&mut self) {
        if self.state != SessionState::Running {
            debug!("discovery tick ignored in state {:?}", self.state);
            return;
        }

        let peers = &self.peers;
        let sampled = self
            .pool
            .sample_peers(DISCOVERY_SAMPLE, &|id| peers.is_active(id));

        if sampled.is_empty() {
            self.events
                .diagnostic(Severity::Info, "No peers available to poll for peers");
        } else {
            for peer in &sampled {
                self.pool.send(*peer, Command::GetAddr, Vec::new());
            }
            self.events.diagnostic(
                Severity::Info,
                format!("Sent GETADDR to {} peers", sampled.len()),
            );
        }

        self.discovery_timer = Some(
            self.scheduler
                .schedule(DISCOVERY_INTERVAL, TimerEvent::DiscoveryTick),
        );
    }
}
