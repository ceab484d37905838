// Event hub: ordered publish/subscribe between modules.
//
// Every publisher feeds one unbounded queue drained by a single dispatch
// loop, so all listeners observe one global order. The loop never runs
// listener code itself: it hands each event to the per-listener worker
// channels, and only then moves on to the next event.

use crate::event::{event_source, event_type, Event, EventError, EventSource, EventType};
use crate::variant::VariantMap;
use dashmap::DashMap;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

mod listener;
mod metrics;
mod pending;
#[cfg(test)]
mod tests;

pub use listener::{Listener, ListenerId};
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use pending::ResponseOutcome;

use listener::ListenerRegistry;
use pending::PendingResponses;

/// Data key naming the module whose shared state changed
pub const STATE_OWNER_KEY: &str = "stateowner";

/// Event hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Timeout used by [`EventHub::request_default`]
    #[serde(default = "default_response_timeout_ms")]
    pub default_response_timeout_ms: u64,
    /// Pending paired dispatches above this count are logged
    #[serde(default = "default_max_pending_responses")]
    pub max_pending_responses: usize,
}

fn default_response_timeout_ms() -> u64 {
    5000
}

fn default_max_pending_responses() -> usize {
    1024
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_response_timeout_ms: default_response_timeout_ms(),
            max_pending_responses: default_max_pending_responses(),
        }
    }
}

/// Errors returned by hub operations
#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    /// `start` was called outside a tokio runtime
    NoRuntime,
    /// The hub no longer accepts events
    ShutDown,
    /// A paired dispatch with the same response id is still waiting
    DuplicatePairedDispatch(Uuid),
    InvalidEvent(EventError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::NoRuntime => write!(f, "event hub must be started inside a tokio runtime"),
            HubError::ShutDown => write!(f, "event hub is shut down"),
            HubError::DuplicatePairedDispatch(id) => {
                write!(f, "paired dispatch {} is already pending", id)
            }
            HubError::InvalidEvent(e) => write!(f, "invalid event: {}", e),
        }
    }
}

impl std::error::Error for HubError {}

impl From<EventError> for HubError {
    fn from(err: EventError) -> Self {
        HubError::InvalidEvent(err)
    }
}

enum HubMessage {
    Event(Arc<Event>),
    Shutdown,
}

struct HubInner {
    queue_tx: mpsc::UnboundedSender<HubMessage>,
    registry: ListenerRegistry,
    pending: PendingResponses,
    shared_states: DashMap<String, Arc<VariantMap>>,
    metrics: HubMetrics,
    config: HubConfig,
    runtime: Handle,
    running: AtomicBool,
}

impl HubInner {
    fn enqueue(&self, event: Arc<Event>) -> Result<(), HubError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(HubError::ShutDown);
        }

        self.metrics.record_event();
        debug!(
            event_id = %event.unique_id(),
            event_type = %event.event_type(),
            source = %event.source(),
            "Event queued"
        );

        self.queue_tx
            .send(HubMessage::Event(event))
            .map_err(|_| HubError::ShutDown)
    }

    /// Hand one event to every matching listener, completing a paired
    /// dispatch first if the event answers one.
    fn deliver(&self, event: &Arc<Event>) {
        if let Some(pair_id) = event.pair_id() {
            if let Some(pending) = self.pending.take(pair_id) {
                pending.disarm();
                self.metrics.record_response();
                let response = Arc::clone(event);
                self.runtime
                    .spawn(async move { pending.fire(ResponseOutcome::Response(response)) });
            }
        }

        for (listener_id, tx) in self.registry.matching(event) {
            if tx.send(Arc::clone(event)).is_ok() {
                self.metrics.record_delivery();
            } else {
                debug!(listener_id = %listener_id, "Listener worker gone, skipping");
            }
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for pending in self.pending.drain() {
            pending.disarm();
            self.runtime
                .spawn(async move { pending.fire(ResponseOutcome::TimedOut) });
        }
        self.registry.clear();
    }
}

async fn run_dispatch_loop(inner: Arc<HubInner>, mut queue_rx: mpsc::UnboundedReceiver<HubMessage>) {
    info!("Event hub dispatch loop started");

    while let Some(message) = queue_rx.recv().await {
        match message {
            HubMessage::Event(event) => inner.deliver(&event),
            HubMessage::Shutdown => break,
        }
    }

    inner.stop();
    info!(
        total_events = inner.metrics.total_events(),
        "Event hub dispatch loop stopped"
    );
}

/// Cloneable handle to a running event hub
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// Start the hub's dispatch loop on the current tokio runtime
    pub fn start(config: HubConfig) -> Result<Self, HubError> {
        let runtime = Handle::try_current().map_err(|_| HubError::NoRuntime)?;
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(HubInner {
            queue_tx,
            registry: ListenerRegistry::new(runtime.clone()),
            pending: PendingResponses::new(),
            shared_states: DashMap::new(),
            metrics: HubMetrics::new(),
            config,
            runtime: runtime.clone(),
            running: AtomicBool::new(true),
        });

        runtime.spawn(run_dispatch_loop(Arc::clone(&inner), queue_rx));
        Ok(Self { inner })
    }

    /// Register a listener for a (type, source) route.
    ///
    /// Either axis may be the wildcard. Listeners sharing a route are
    /// served in registration order.
    pub fn register_listener(
        &self,
        event_type: EventType,
        source: EventSource,
        listener: impl Listener,
    ) -> ListenerId {
        let route = format!("{}/{}", event_type, source);
        let id = self
            .inner
            .registry
            .register(event_type, source, Arc::new(listener));
        info!(listener_id = %id, route = %route, "Listener registered");
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let removed = self.inner.registry.unregister(id);
        if removed {
            info!(listener_id = %id, "Listener unregistered");
        }
        removed
    }

    /// Publish an event. Never blocks on listener execution.
    pub fn dispatch(&self, event: Event) -> Result<(), HubError> {
        self.inner.enqueue(Arc::new(event))
    }

    /// Publish a request and wait for its response without blocking.
    ///
    /// `on_outcome` runs exactly once: with the first event whose `pair_id`
    /// equals the request's `response_id`, or with `TimedOut`. Dispatching a
    /// copy of a request that is still pending fails with
    /// `DuplicatePairedDispatch`.
    pub fn dispatch_paired<F>(
        &self,
        event: Event,
        timeout: Duration,
        on_outcome: F,
    ) -> Result<(), HubError>
    where
        F: FnOnce(ResponseOutcome) + Send + 'static,
    {
        if !self.is_running() {
            return Err(HubError::ShutDown);
        }

        let key = event.response_id();
        let pending_count = self.inner.pending.len();
        if pending_count >= self.inner.config.max_pending_responses {
            warn!(
                pending = pending_count,
                limit = self.inner.config.max_pending_responses,
                "Pending paired dispatches above configured limit"
            );
        }
        if !self.inner.pending.insert(key, Box::new(on_outcome)) {
            warn!(response_id = %key, "Paired dispatch already pending");
            return Err(HubError::DuplicatePairedDispatch(key));
        }

        let inner = Arc::clone(&self.inner);
        let timer = self.inner.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(pending) = inner.pending.take(key) {
                inner.metrics.record_timeout();
                debug!(response_id = %key, "Paired dispatch timed out");
                pending.fire(ResponseOutcome::TimedOut);
            }
        });
        if !self.inner.pending.attach_timer(key, timer.abort_handle()) {
            timer.abort();
        }

        if let Err(e) = self.inner.enqueue(Arc::new(event)) {
            if let Some(pending) = self.inner.pending.take(key) {
                pending.disarm();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Publish a request and wait for the response; `Ok(None)` on timeout.
    pub async fn request(
        &self,
        event: Event,
        timeout: Duration,
    ) -> Result<Option<Arc<Event>>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch_paired(event, timeout, move |outcome| {
            let _ = tx.send(outcome);
        })?;

        match rx.await {
            Ok(outcome) => Ok(outcome.into_response()),
            Err(_) => Err(HubError::ShutDown),
        }
    }

    /// [`request`](Self::request) with the configured default timeout
    pub async fn request_default(&self, event: Event) -> Result<Option<Arc<Event>>, HubError> {
        let timeout = Duration::from_millis(self.inner.config.default_response_timeout_ms);
        self.request(event, timeout).await
    }

    /// Replace `owner`'s shared state and announce the change on the hub
    pub fn set_shared_state(&self, owner: &str, state: VariantMap) -> Result<(), HubError> {
        let event = Event::builder(
            "Shared State Change",
            event_type::HUB,
            event_source::SHARED_STATE,
        )
        .insert(STATE_OWNER_KEY, owner)
        .build()?;

        self.inner
            .shared_states
            .insert(owner.to_string(), Arc::new(state));
        self.dispatch(event)
    }

    /// Latest shared state published by `owner`
    pub fn shared_state(&self, owner: &str) -> Option<Arc<VariantMap>> {
        self.inner
            .shared_states
            .get(owner)
            .map(|state| Arc::clone(state.value()))
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner
            .metrics
            .snapshot(self.inner.pending.len(), self.inner.registry.len())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stop accepting events. Events queued before the call are still
    /// delivered; pending paired dispatches then resolve as `TimedOut`.
    pub fn shutdown(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            let _ = self.inner.queue_tx.send(HubMessage::Shutdown);
            info!("Event hub shutdown requested");
        }
    }
}
