use super::{EventSource, EventType};
use std::fmt;

/// Construction errors for Event
#[derive(Debug, Clone, PartialEq)]
pub enum EventError {
    MissingName,
    MissingType,
    MissingSource,
    /// Wildcard names are for listener registration only
    ReservedName(String),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::MissingName => write!(f, "event name is required"),
            EventError::MissingType => write!(f, "event type is required"),
            EventError::MissingSource => write!(f, "event source is required"),
            EventError::ReservedName(name) => {
                write!(f, "'{}' is reserved for listener registration", name)
            }
        }
    }
}

impl std::error::Error for EventError {}

/// Validates the naming fields of an event under construction.
///
/// Validation rules:
/// - Name: not blank
/// - Type and source: not blank, not the wildcard sentinel
pub(crate) fn validate_names(
    name: &str,
    event_type: &str,
    source: &str,
) -> Result<(EventType, EventSource), EventError> {
    if name.trim().is_empty() {
        return Err(EventError::MissingName);
    }

    let event_type = EventType::get(event_type).ok_or(EventError::MissingType)?;
    if event_type.is_wildcard() {
        return Err(EventError::ReservedName(event_type.name().to_string()));
    }

    let source = EventSource::get(source).ok_or(EventError::MissingSource)?;
    if source.is_wildcard() {
        return Err(EventError::ReservedName(source.name().to_string()));
    }

    Ok((event_type, source))
}
