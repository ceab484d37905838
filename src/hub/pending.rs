use crate::event::Event;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Result delivered to a paired dispatch callback
#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    /// A response carrying the request's pair id arrived in time
    Response(Arc<Event>),
    /// No response within the timeout (or the hub shut down first)
    TimedOut,
}

impl ResponseOutcome {
    pub fn into_response(self) -> Option<Arc<Event>> {
        match self {
            ResponseOutcome::Response(event) => Some(event),
            ResponseOutcome::TimedOut => None,
        }
    }
}

pub(crate) type ResponseCallback = Box<dyn FnOnce(ResponseOutcome) + Send + 'static>;

pub(crate) struct PendingResponse {
    // Mutex keeps the map Sync; the callback itself need only be Send
    callback: Mutex<Option<ResponseCallback>>,
    timer: Option<AbortHandle>,
}

impl PendingResponse {
    /// Run the callback. Only the holder of a removed entry can call this.
    pub(crate) fn fire(self, outcome: ResponseOutcome) {
        let callback = self
            .callback
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = callback {
            callback(outcome);
        }
    }

    /// Stop the timeout timer, if one is attached
    pub(crate) fn disarm(&self) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
    }
}

/// One-shot response callbacks keyed by the request's response id.
///
/// Whoever removes an entry owns its callback, so the response path and
/// the timeout path can never both fire.
pub(crate) struct PendingResponses {
    entries: DashMap<Uuid, PendingResponse>,
}

impl PendingResponses {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a callback under `key`. Returns false, leaving the existing
    /// entry untouched, if `key` is already pending.
    pub(crate) fn insert(&self, key: Uuid, callback: ResponseCallback) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(PendingResponse {
                    callback: Mutex::new(Some(callback)),
                    timer: None,
                });
                true
            }
        }
    }

    /// Attach the timeout timer. Returns false if the entry is already gone,
    /// in which case the caller should abort the timer itself.
    pub(crate) fn attach_timer(&self, key: Uuid, timer: AbortHandle) -> bool {
        match self.entries.get_mut(&key) {
            Some(mut entry) => {
                entry.timer = Some(timer);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take(&self, key: Uuid) -> Option<PendingResponse> {
        self.entries.remove(&key).map(|(_, pending)| pending)
    }

    pub(crate) fn drain(&self) -> Vec<PendingResponse> {
        let keys: Vec<Uuid> = self.entries.iter().map(|entry| *entry.key()).collect();
        keys.into_iter().filter_map(|key| self.take(key)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
