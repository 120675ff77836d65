//! Pub/sub surface for applications.
//!
//! Every decoded message goes out twice: once on the global channel as a
//! [`NetworkEvent::Message`] and once on the channel for its command. Values
//! are cloned at the boundary so no subscriber can observe another's copy.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::network::pool::{PeerId, Severity};
use crate::wire::{Command, InventoryItem, Payload};

const GLOBAL_CAPACITY: usize = 10_000;
const COMMAND_CAPACITY: usize = 1_000;

/// A peer as seen by subscribers: pool id plus remote address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerRef {
    pub id: PeerId,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// The pool has been started with the seed list.
    Launched,
    /// The first peer finished its handshake.
    Running,
    Message {
        peer: PeerRef,
        command: Command,
        payload: Payload,
    },
    Inventory {
        peer: PeerRef,
        item: InventoryItem,
    },
    PeerStatus {
        active: usize,
    },
    Diagnostic {
        severity: Severity,
        message: String,
    },
}

/// Delivered on a per-command channel.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub peer: PeerRef,
    pub payload: Payload,
}

pub struct EventBus {
    global_tx: broadcast::Sender<NetworkEvent>,
    /// Per-command channels, created on first subscription
    commands: RwLock<HashMap<Command, broadcast::Sender<CommandEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(GLOBAL_CAPACITY);
        Self {
            global_tx,
            commands: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.global_tx.subscribe()
    }

    /// Subscribe to one command's decoded payloads
    pub fn subscribe_command(&self, command: Command) -> broadcast::Receiver<CommandEvent> {
        let mut commands = self.commands.write();
        commands
            .entry(command)
            .or_insert_with(|| broadcast::channel(COMMAND_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, event: NetworkEvent) {
        // No subscribers is not an error.
        let _ = self.global_tx.send(event);
    }

    pub fn publish_command(&self, command: &Command, event: CommandEvent) {
        if let Some(tx) = self.commands.read().get(command) {
            let _ = tx.send(event);
        }
    }

    /// Log and publish a diagnostic
    pub fn diagnostic(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info | Severity::Notice => info!("📣 {}", message),
            Severity::Warning | Severity::Error => warn!("⚠️  {}", message),
        }
        self.publish(NetworkEvent::Diagnostic { severity, message });
    }

    pub fn subscriber_count(&self) -> usize {
        self.global_tx.receiver_count()
            + self
                .commands
                .read()
                .values()
                .map(|tx| tx.receiver_count())
                .sum::<usize>()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
