//! Request bookkeeping for in-flight fetches.
//!
//! Fetches are never cancelled. Each slot (usually a cache key) remembers the
//! newest request id it handed out; a result whose id is older than that was
//! superseded and gets dropped on arrival.

use std::collections::HashMap;

pub type RequestId = u64;

#[derive(Debug, Default, Clone)]
pub struct RequestTracker {
    next: RequestId,
    latest: HashMap<String, RequestId>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for `slot`, superseding any earlier one.
    pub fn begin(&mut self, slot: impl Into<String>) -> RequestId {
        self.next += 1;
        self.latest.insert(slot.into(), self.next);
        self.next
    }

    pub fn is_current(&self, slot: &str, id: RequestId) -> bool {
        self.latest.get(slot) == Some(&id)
    }

    /// Accept a finished request. Returns false (and keeps the slot) if it was superseded.
    pub fn finish(&mut self, slot: &str, id: RequestId) -> bool {
        if !self.is_current(slot, id) {
            tracing::debug!(slot, id, "discarding superseded result");
            return false;
        }
        self.latest.remove(slot);
        true
    }

    /// Forget a slot, e.g. when its view goes away. Late results for it are dropped.
    pub fn abandon(&mut self, slot: &str) {
        self.latest.remove(slot);
    }

    pub fn in_flight(&self) -> usize {
        self.latest.len()
    }
}
