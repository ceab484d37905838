// Key resolution shared by condition matchers and token substitution.
//
// Plain keys are dotted paths into the event data; keys starting with `~`
// address event metadata or another module's shared state.

use crate::event::Event;
use crate::hub::EventHub;
use crate::variant::{Variant, VariantMap};
use chrono::{DateTime, SecondsFormat};
use std::sync::Arc;

const STATE_PREFIX: &str = "~state.";

/// Read access to module shared states during evaluation
pub trait StateSource {
    fn shared_state(&self, owner: &str) -> Option<Arc<VariantMap>>;
}

impl StateSource for EventHub {
    fn shared_state(&self, owner: &str) -> Option<Arc<VariantMap>> {
        EventHub::shared_state(self, owner)
    }
}

/// State source with nothing in it
pub struct NoSharedState;

impl StateSource for NoSharedState {
    fn shared_state(&self, _owner: &str) -> Option<Arc<VariantMap>> {
        None
    }
}

/// Resolve `key` against an event.
///
/// | Key | Value |
/// |---|---|
/// | `a.b.0.c` | dotted path into the event data (list segments are indices) |
/// | `~type`, `~source`, `~name`, `~id` | event metadata as strings |
/// | `~timestampms` / `~timestampu` | creation time in ms / s since epoch |
/// | `~timestampz` | creation time as RFC 3339 UTC |
/// | `~state.<owner>/<path>` | dotted path into `owner`'s shared state |
pub fn resolve_key(key: &str, event: &Event, states: &dyn StateSource) -> Option<Variant> {
    if let Some(rest) = key.strip_prefix(STATE_PREFIX) {
        let (owner, path) = rest.split_once('/')?;
        let state = states.shared_state(owner)?;
        return lookup_path(&state, path);
    }

    match key {
        "~type" => Some(Variant::from(event.event_type().name())),
        "~source" => Some(Variant::from(event.source().name())),
        "~name" => Some(Variant::from(event.name())),
        "~id" => Some(Variant::from(event.unique_id().to_string())),
        "~timestampms" => Some(Variant::from(event.timestamp_ms())),
        "~timestampu" => Some(Variant::from(event.timestamp_ms().div_euclid(1000))),
        "~timestampz" => DateTime::from_timestamp_millis(event.timestamp_ms())
            .map(|t| Variant::from(t.to_rfc3339_opts(SecondsFormat::Millis, true))),
        _ if key.starts_with('~') => None,
        _ => lookup_path(event.data(), key),
    }
}

/// Dotted-path lookup. A top-level key containing dots wins over traversal.
pub(crate) fn lookup_path(map: &VariantMap, path: &str) -> Option<Variant> {
    if let Some(value) = map.get(path) {
        return Some(value.clone());
    }

    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Variant::Map(m) => m.get(segment)?,
            Variant::Object(obj) => obj.as_map().get(segment)?,
            Variant::List(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}
