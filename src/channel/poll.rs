use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::http::POLL_BATCH;
use super::{ChatMessage, ConsoleApi, TransportError};

const SEEN_HIGH_WATER: usize = 200;
const SEEN_KEEP: usize = 100;

/// Bounded set of message ids already delivered, oldest evicted first.
#[derive(Debug, Default)]
pub(crate) struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenIds {
    /// Returns true the first time `id` is seen.
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > SEEN_HIGH_WATER {
            while self.order.len() > SEEN_KEEP {
                if let Some(old) = self.order.pop_front() {
                    self.ids.remove(&old);
                }
            }
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}

/// Delivery state shared by every [`PollStream`] of one connection.
///
/// Outlives a single stream so that a reconnect after a failed poll neither
/// re-primes (skipping commands posted during the outage) nor replays
/// messages already delivered.
#[derive(Debug, Default)]
pub struct PollCursor {
    seen: SeenIds,
    primed: bool,
}

pub type SharedCursor = Arc<Mutex<PollCursor>>;

fn lock(cursor: &SharedCursor) -> MutexGuard<'_, PollCursor> {
    cursor.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inbound stream built from periodic recent-messages queries.
///
/// Messages already in the channel when the first stream starts are treated
/// as seen, so a restart never answers old commands. A failed query ends the
/// iterator with an error and the client reconnects as for a broken stream.
/// Messages without an id cannot be deduplicated and are never delivered.
pub struct PollStream {
    api: Arc<dyn ConsoleApi>,
    interval: Duration,
    cursor: SharedCursor,
    pending: VecDeque<ChatMessage>,
}

impl PollStream {
    pub fn start(
        api: Arc<dyn ConsoleApi>,
        interval: Duration,
        cursor: SharedCursor,
    ) -> Result<Self, TransportError> {
        if !lock(&cursor).primed {
            let history = api.recent_messages(POLL_BATCH)?;
            let mut state = lock(&cursor);
            for msg in history.iter().filter(|m| !m.id.is_empty()) {
                state.seen.insert(&msg.id);
            }
            state.primed = true;
            debug!(seen = state.seen.len(), "poll cursor primed");
        }
        Ok(Self {
            api,
            interval,
            cursor,
            pending: VecDeque::new(),
        })
    }

    fn poll_once(&mut self) -> Result<(), TransportError> {
        let batch = self.api.recent_messages(POLL_BATCH)?;
        let mut state = lock(&self.cursor);
        for msg in batch {
            if msg.id.is_empty() {
                debug!(sender = %msg.sender_id, "skipping polled message without id");
            } else if state.seen.insert(&msg.id) {
                self.pending.push_back(msg);
            }
        }
        Ok(())
    }
}

impl Iterator for PollStream {
    type Item = Result<ChatMessage, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return Some(Ok(msg));
            }
            thread::sleep(self.interval);
            if let Err(e) = self.poll_once() {
                return Some(Err(e));
            }
        }
    }
}
