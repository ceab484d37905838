use crate::variant::{Variant, VariantMap};
use chrono::Utc;
use std::fmt;
use uuid::Uuid;

mod names;
mod validation;
#[cfg(test)]
mod tests;

pub use names::{event_source, event_type, EventSource, EventType};
pub use validation::EventError;

/// Event is an immutable record of something that happened.
///
/// Events are created through [`EventBuilder`] and never change afterwards;
/// the hub shares them between listeners behind an `Arc`.
#[derive(Clone, Debug)]
pub struct Event {
    name: String,
    event_type: EventType,
    source: EventSource,

    /// UUIDv7 identifier (time-ordered, unique per process)
    unique_id: Uuid,

    /// Key a paired dispatch waits under; responses copy it into `pair_id`
    response_id: Uuid,

    /// Unix epoch milliseconds
    timestamp_ms: i64,

    data: VariantMap,

    /// Set on responses: the `response_id` of the request answered
    pair_id: Option<Uuid>,

    /// Rule consequence hops between this event and a publisher event
    chain_depth: u32,
}

impl Event {
    /// Start building an event. Type and source are resolved against the
    /// interned registries when [`EventBuilder::build`] runs.
    pub fn builder(
        name: impl Into<String>,
        event_type: impl Into<String>,
        source: impl Into<String>,
    ) -> EventBuilder {
        EventBuilder {
            name: name.into(),
            event_type: event_type.into(),
            source: source.into(),
            data: VariantMap::new(),
            timestamp_ms: None,
            pair_id: None,
            chain_depth: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn unique_id(&self) -> Uuid {
        self.unique_id
    }

    pub fn response_id(&self) -> Uuid {
        self.response_id
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn data(&self) -> &VariantMap {
        &self.data
    }

    pub fn pair_id(&self) -> Option<Uuid> {
        self.pair_id
    }

    pub fn is_response(&self) -> bool {
        self.pair_id.is_some()
    }

    pub fn chain_depth(&self) -> u32 {
        self.chain_depth
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event[name={}, type={}, source={}, id={}, data={}]",
            self.name,
            self.event_type,
            self.source,
            self.unique_id,
            Variant::Map(self.data.clone())
        )
    }
}

/// The only mutation surface for events; `build` consumes it.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    name: String,
    event_type: String,
    source: String,
    data: VariantMap,
    timestamp_ms: Option<i64>,
    pair_id: Option<Uuid>,
    chain_depth: u32,
}

impl EventBuilder {
    /// Replace the payload
    pub fn data(mut self, data: VariantMap) -> Self {
        self.data = data;
        self
    }

    /// Add a single payload entry
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Override the creation timestamp (defaults to now)
    pub fn timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Mark the event as the response to `request`
    pub fn in_response_to(mut self, request: &Event) -> Self {
        self.pair_id = Some(request.response_id);
        self
    }

    /// Mark the event as a consequence of `trigger`, one hop further down the chain
    pub(crate) fn caused_by(mut self, trigger: &Event) -> Self {
        self.chain_depth = trigger.chain_depth.saturating_add(1);
        self
    }

    /// Validate and freeze the event.
    ///
    /// Fails if the name, type or source is blank, or if type/source is a wildcard.
    pub fn build(self) -> Result<Event, EventError> {
        let (event_type, source) =
            validation::validate_names(&self.name, &self.event_type, &self.source)?;

        Ok(Event {
            name: self.name,
            event_type,
            source,
            unique_id: Uuid::now_v7(),
            response_id: Uuid::new_v4(),
            timestamp_ms: self
                .timestamp_ms
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
            data: self.data,
            pair_id: self.pair_id,
            chain_depth: self.chain_depth,
        })
    }
}
