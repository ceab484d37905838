use crate::event::{Event, EventSource, EventType};
use dashmap::DashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A module's callback for events routed to it.
///
/// Each registered listener runs on its own worker task and sees its events
/// in hub order, one at a time. Listeners may call back into the hub.
pub trait Listener: Send + Sync + 'static {
    fn hear(&self, event: &Event);
}

impl<F> Listener for F
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn hear(&self, event: &Event) {
        self(event)
    }
}

/// Handle returned by registration, used to unregister
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Route = (EventType, EventSource);

struct ListenerSlot {
    id: ListenerId,
    tx: mpsc::UnboundedSender<Arc<Event>>,
}

/// Routing table from (type, source) to listener workers.
///
/// Registration and removal may happen while the dispatch loop is running;
/// `matching` takes its snapshot shard by shard and releases every guard
/// before any event is handed off.
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    routes: DashMap<Route, Vec<ListenerSlot>>,
    index: DashMap<ListenerId, Route>,
    runtime: Handle,
}

impl ListenerRegistry {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            routes: DashMap::new(),
            index: DashMap::new(),
            runtime,
        }
    }

    pub(crate) fn register(
        &self,
        event_type: EventType,
        source: EventSource,
        listener: Arc<dyn Listener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();

        self.runtime.spawn(run_listener_worker(id, listener, rx));

        let route = (event_type, source);
        self.index.insert(id, route.clone());
        self.routes
            .entry(route)
            .or_default()
            .push(ListenerSlot { id, tx });

        id
    }

    /// Remove a listener; its worker exits once queued events are drained.
    pub(crate) fn unregister(&self, id: ListenerId) -> bool {
        let Some((_, route)) = self.index.remove(&id) else {
            return false;
        };

        if let Some(mut slots) = self.routes.get_mut(&route) {
            slots.retain(|slot| slot.id != id);
        }
        self.routes.remove_if(&route, |_, slots| slots.is_empty());
        true
    }

    /// Senders of every listener whose route matches the event, in registration order
    pub(crate) fn matching(
        &self,
        event: &Event,
    ) -> Vec<(ListenerId, mpsc::UnboundedSender<Arc<Event>>)> {
        let wildcard_type = EventType::wildcard();
        let wildcard_source = EventSource::wildcard();
        let candidates = [
            (event.event_type().clone(), event.source().clone()),
            (event.event_type().clone(), wildcard_source.clone()),
            (wildcard_type.clone(), event.source().clone()),
            (wildcard_type, wildcard_source),
        ];

        let mut matched = Vec::new();
        for route in &candidates {
            if let Some(slots) = self.routes.get(route) {
                matched.extend(slots.iter().map(|slot| (slot.id, slot.tx.clone())));
            }
        }

        matched.sort_by_key(|(id, _)| *id);
        matched
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Drop every route; workers stop after draining what they already hold.
    pub(crate) fn clear(&self) {
        self.routes.clear();
        self.index.clear();
    }
}

async fn run_listener_worker(
    id: ListenerId,
    listener: Arc<dyn Listener>,
    mut rx: mpsc::UnboundedReceiver<Arc<Event>>,
) {
    while let Some(event) = rx.recv().await {
        let outcome = catch_unwind(AssertUnwindSafe(|| listener.hear(&event)));
        if outcome.is_err() {
            error!(
                listener_id = %id,
                event_id = %event.unique_id(),
                "Listener panicked while handling event"
            );
        }
    }

    debug!(listener_id = %id, "Listener worker stopped");
}
