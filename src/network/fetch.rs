//! Batched `getdata` requests.
//!
//! Requests for one peer accumulate in its [`PeerFetchState`] and go out as a
//! single `getdata` once the peer has been quiet for [`DEBOUNCE`] or the
//! batch reaches [`BATCH_LIMIT`] items. Each peer has at most one batch on
//! the wire; a flush while one is outstanding waits for it to resolve.
//!
//! A batch resolves when every requested item has been answered by `tx`,
//! `block` or `notfound`, or when its watchdog fires. Every completion
//! sender handed to [`NetworkSession::get_data`] receives exactly one result.

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::constants::fetch::{BATCH_LIMIT, DEBOUNCE, WATCHDOG};
use crate::error::FetchError;
use crate::network::pool::PeerId;
use crate::network::session::{NetworkSession, SessionState};
use crate::network::timer::{TimerEvent, TimerHandle};
use crate::wire::types::InvMessage;
use crate::wire::{Command, InventoryItem, Transaction};

/// One object delivered in answer to a `getdata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedObject {
    Tx(Transaction),
    /// Blocks are not decoded; this is the raw `block` payload.
    Block(Bytes),
}

pub type FetchResult = Result<Vec<FetchedObject>, FetchError>;
pub type Completion = oneshot::Sender<FetchResult>;

/// An answer from the peer that counts against its in-flight batch.
#[derive(Debug, Clone)]
pub enum FetchResponse {
    /// `notfound` listing this many items
    NotFound(usize),
    Object(FetchedObject),
}

/// A `getdata` that has been sent and not yet resolved.
#[derive(Debug)]
pub struct InFlightBatch {
    pub id: u64,
    pub requested: usize,
    pub outstanding: usize,
    pub results: Vec<FetchedObject>,
    pub listeners: Vec<Completion>,
    pub watchdog: Option<TimerHandle>,
}

#[derive(Debug, Default)]
pub struct PeerFetchState {
    /// Items queued for the next flush
    pub pending: Vec<InventoryItem>,
    /// Senders completed when the next flush resolves
    pub listeners: Vec<Completion>,
    pub debounce: Option<TimerHandle>,
    /// Bumped every time the debounce is re-armed.
    pub debounce_generation: u64,
    pub in_flight: Option<InFlightBatch>,
    /// A flush was requested while `in_flight` was set.
    pub flush_deferred: bool,
}

impl PeerFetchState {
    /// Fail every pending and in-flight request with `err`.
    pub fn abort(&mut self, err: FetchError) {
        self.debounce = None;
        self.pending.clear();
        self.flush_deferred = false;
        if let Some(batch) = self.in_flight.take() {
            complete_all(batch.listeners, Err(err));
        }
        complete_all(std::mem::take(&mut self.listeners), Err(err));
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

fn complete_all(listeners: Vec<Completion>, result: FetchResult) {
    for listener in listeners {
        // The requester may have stopped waiting.
        let _ = listener.send(result.clone());
    }
}

impl NetworkSession {
    /// Queue `items` for `peer`. With `force` the batch is sent now;
    /// otherwise it waits for a quiet period or for the batch to fill.
    pub fn get_data(
        &mut self,
        peer: PeerId,
        items: Vec<InventoryItem>,
        completion: Option<Completion>,
        force: bool,
    ) {
        if self.state == SessionState::Shutdown {
            if let Some(completion) = completion {
                let _ = completion.send(Err(FetchError::Shutdown));
            }
            return;
        }

        let Some(info) = self.peers.get_mut(peer).filter(|p| p.is_active()) else {
            debug!("getdata for {} refused: peer not active", peer);
            if let Some(completion) = completion {
                let _ = completion.send(Err(FetchError::PeerNotActive));
            }
            return;
        };

        let fetch = &mut info.fetch;
        fetch.pending.extend(items);
        if let Some(completion) = completion {
            fetch.listeners.push(completion);
        }

        if !force && fetch.pending.len() < BATCH_LIMIT {
            fetch.debounce_generation += 1;
            let generation = fetch.debounce_generation;
            // Replacing the handle cancels the previous debounce.
            fetch.debounce = Some(
                self.scheduler
                    .schedule(DEBOUNCE, TimerEvent::Debounce { peer, generation }),
            );
            return;
        }

        self.flush_getdata(peer);
    }

    /// Send everything queued for `peer` as one `getdata`.
    pub(crate) fn flush_getdata(&mut self, peer: PeerId) {
        let shutting_down = self.state == SessionState::Shutdown;
        let Some(info) = self.peers.get_mut(peer) else {
            return;
        };
        let fetch = &mut info.fetch;
        fetch.debounce = None;

        if fetch.has_in_flight() {
            if !fetch.pending.is_empty() || !fetch.listeners.is_empty() {
                debug!("getdata flush for {} deferred until the current batch resolves", peer);
                fetch.flush_deferred = true;
            }
            return;
        }
        fetch.flush_deferred = false;

        let items = std::mem::take(&mut fetch.pending);
        let listeners = std::mem::take(&mut fetch.listeners);
        if items.is_empty() {
            // Requests that asked for nothing still get their one answer.
            complete_all(listeners, Err(FetchError::NotFound));
            return;
        }
        if shutting_down {
            complete_all(listeners, Err(FetchError::Shutdown));
            return;
        }

        let id = self.next_batch_id;
        self.next_batch_id += 1;
        let requested = items.len();

        debug!("📤 getdata to {}: {} items (batch {})", peer, requested, id);
        self.pool
            .send(peer, Command::GetData, InvMessage { items }.encode());

        let watchdog = self
            .scheduler
            .schedule(WATCHDOG, TimerEvent::FetchWatchdog { peer, batch: id });
        fetch.in_flight = Some(InFlightBatch {
            id,
            requested,
            outstanding: requested,
            results: Vec::new(),
            listeners,
            watchdog: Some(watchdog),
        });
    }

    /// Count an answer from `peer` against its in-flight batch.
    pub(crate) fn on_fetch_response(&mut self, peer: PeerId, response: FetchResponse) {
        let Some(batch) = self
            .peers
            .get_mut(peer)
            .and_then(|info| info.fetch.in_flight.as_mut())
        else {
            return;
        };

        match response {
            FetchResponse::NotFound(missing) => {
                // The missing count replaces one pending slot, then the
                // notfound itself resolves one more.
                batch.outstanding = (batch.outstanding + 1).saturating_sub(missing);
                batch.outstanding = batch.outstanding.saturating_sub(1);
            }
            FetchResponse::Object(object) => {
                batch.results.push(object);
                batch.outstanding = batch.outstanding.saturating_sub(1);
            }
        }

        if batch.outstanding == 0 {
            self.resolve_batch(peer);
        } else {
            debug!("batch {} for {}: {} outstanding", batch.id, peer, batch.outstanding);
        }
    }

    fn resolve_batch(&mut self, peer: PeerId) {
        let Some(info) = self.peers.get_mut(peer) else {
            return;
        };
        let Some(batch) = info.fetch.in_flight.take() else {
            return;
        };
        let deferred = info.fetch.flush_deferred;

        let result = if batch.results.is_empty() {
            Err(FetchError::NotFound)
        } else {
            Ok(batch.results)
        };
        debug!(
            "📥 batch {} for {} resolved ({} requested)",
            batch.id, peer, batch.requested
        );
        complete_all(batch.listeners, result);

        if deferred {
            self.flush_getdata(peer);
        }
    }

    pub(crate) fn on_fetch_watchdog(&mut self, peer: PeerId, batch_id: u64) {
        let Some(info) = self.peers.get_mut(peer) else {
            debug!("fetch watchdog for departed {} ignored", peer);
            return;
        };
        if info.fetch.in_flight.as_ref().map(|b| b.id) != Some(batch_id) {
            debug!("fetch watchdog for resolved batch {} ignored", batch_id);
            return;
        }
        let Some(batch) = info.fetch.in_flight.take() else {
            return;
        };
        let deferred = info.fetch.flush_deferred;

        warn!(
            "⏱️  {} left {} of {} items unanswered",
            peer, batch.outstanding, batch.requested
        );
        complete_all(batch.listeners, Err(FetchError::PeerUnresponsive));

        if deferred {
            self.flush_getdata(peer);
        }
    }

    pub(crate) fn on_debounce(&mut self, peer: PeerId, generation: u64) {
        let current = self
            .peers
            .get(peer)
            .is_some_and(|info| info.fetch.debounce_generation == generation && info.fetch.debounce.is_some());
        if current {
            self.flush_getdata(peer);
        }
    }
}
