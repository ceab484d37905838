//! Rules engine: declarative rules evaluated against hub traffic.
//!
//! A [`Rule`] pairs a [`RuleCondition`] tree with consequence templates.
//! The [`RulesEngine`] listens to every event on the hub, evaluates the
//! active rule set against it, and publishes resolved consequences back
//! onto the hub as `rulesresponse` events.

use crate::event::{Event, EventSource, EventType};
use crate::variant::VariantMap;
use std::fmt;

mod condition;
mod engine;
mod parser;
mod resolve;
mod token;

pub use condition::{LogicalOp, Matcher, MatcherOp, RuleCondition};
pub use engine::{RuleSet, RuleSetStatus, RulesConfig, RulesEngine};
pub use parser::{parse_bundle, ParsedBundle};
pub use resolve::{resolve_key, NoSharedState, StateSource};
pub use token::{expand_tokens, expand_variant};

/// Rule engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    /// A single rule definition could not be parsed
    Parse { index: usize, reason: String },
    /// The document as a whole has the wrong shape
    InvalidDocument(String),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::Parse { index, reason } => {
                write!(f, "rule #{} could not be parsed: {}", index, reason)
            }
            RuleError::InvalidDocument(reason) => write!(f, "invalid rules document: {}", reason),
        }
    }
}

impl std::error::Error for RuleError {}

/// Restricts a rule to events of one type and/or source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleScope {
    pub event_type: Option<EventType>,
    pub source: Option<EventSource>,
}

impl RuleScope {
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type
            .as_ref()
            .map_or(true, |t| t == event.event_type())
            && self.source.as_ref().map_or(true, |s| s == event.source())
    }
}

/// Template for an event published when a rule matches
#[derive(Debug, Clone, PartialEq)]
pub struct Consequence {
    /// Identifies the consequence in logs
    pub id: Option<String>,
    /// Consequence kind, e.g. "dispatch" or "add"; informational
    pub kind: Option<String>,
    /// Name of the published event; may contain `%key%` tokens
    pub name: Option<String>,
    /// Type of the published event, token-expanded like `name`; falls back
    /// to the engine's configured type
    pub event_type: Option<String>,
    /// Payload template; `%key%` tokens are resolved against the trigger
    pub detail: VariantMap,
}

/// A condition plus the consequences it triggers
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub scope: RuleScope,
    pub condition: RuleCondition,
    pub consequences: Vec<Consequence>,
}
