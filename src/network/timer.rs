//! One-shot timers that report back into the session loop.
//!
//! A timer is a spawned sleep raced against a [`CancellationToken`]. When the
//! sleep wins it sends its [`TimerEvent`] on the session's timer channel;
//! the loop then checks the event against current state, so a timer that
//! fires after its condition went away is a no-op.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::network::pool::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    VersionTimeout { peer: PeerId },
    VerackTimeout { peer: PeerId },
    /// `generation` ties the event to the debounce that armed it.
    Debounce { peer: PeerId, generation: u64 },
    FetchWatchdog { peer: PeerId, batch: u64 },
    DiscoveryTick,
}

/// Cancels its timer when dropped.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<TimerEvent>,
}

impl Scheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Arm a timer. Must be called from within a tokio runtime.
    pub fn schedule(&self, delay: Duration, event: TimerEvent) -> TimerHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Receiver gone means the session has ended.
                    let _ = tx.send(event);
                }
            }
        });
        TimerHandle { token }
    }
}
