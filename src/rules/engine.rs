use super::parser::parse_bundle;
use super::resolve::{resolve_key, StateSource};
use super::token::{expand_tokens, expand_variant};
use super::{Consequence, Rule, RuleError};
use crate::event::{event_source, event_type, Event, EventError, EventSource, EventType};
use crate::hub::{EventHub, ListenerId};
use crate::variant::{Variant, VariantMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{debug, info, warn};

const DEFAULT_CONSEQUENCE_NAME: &str = "Rules Consequence";

/// Rules engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    /// Longest allowed chain of rule-triggered events (0 = unbounded)
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: u32,
    /// Event type for consequences that do not name one
    #[serde(default = "default_consequence_event_type")]
    pub consequence_event_type: String,
}

fn default_max_chain_depth() -> u32 {
    32
}

fn default_consequence_event_type() -> String {
    event_type::RULES_ENGINE.to_string()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            consequence_event_type: default_consequence_event_type(),
        }
    }
}

/// An immutable, versioned set of rules
#[derive(Debug)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    /// Engine-assigned, increments on every swap
    pub version: u64,
    pub document_version: Option<i64>,
    pub loaded_at: DateTime<Utc>,
}

impl RuleSet {
    fn empty() -> Self {
        Self {
            rules: Vec::new(),
            version: 0,
            document_version: None,
            loaded_at: Utc::now(),
        }
    }

    pub fn status(&self) -> RuleSetStatus {
        RuleSetStatus {
            version: self.version,
            document_version: self.document_version,
            rule_count: self.rules.len(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Diagnostics view of the active rule set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSetStatus {
    pub version: u64,
    pub document_version: Option<i64>,
    pub rule_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Evaluates the active rule set against every hub event and publishes
/// the resulting consequences.
pub struct RulesEngine {
    hub: EventHub,
    config: RulesConfig,
    active: RwLock<Arc<RuleSet>>,
    next_version: AtomicU64,
    listener_id: ListenerId,
}

impl RulesEngine {
    /// Create an engine with an empty rule set and attach it to every
    /// event on `hub`.
    pub fn register(hub: EventHub, config: RulesConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<RulesEngine>| {
            let weak = weak.clone();
            let listener_id = hub.register_listener(
                EventType::wildcard(),
                EventSource::wildcard(),
                move |event: &Event| {
                    if let Some(engine) = weak.upgrade() {
                        engine.on_event(event);
                    }
                },
            );

            info!(
                listener_id = %listener_id,
                max_chain_depth = config.max_chain_depth,
                "Rules engine registered"
            );

            Self {
                hub,
                config,
                active: RwLock::new(Arc::new(RuleSet::empty())),
                next_version: AtomicU64::new(1),
                listener_id,
            }
        })
    }

    /// Parse `document` and make it the active rule set.
    ///
    /// Rules that fail to parse are logged and left out. The swap is
    /// atomic: evaluations already running keep the set they started with.
    pub fn load_rules(&self, document: &Variant) -> Result<RuleSetStatus, RuleError> {
        let bundle = parse_bundle(document)?;

        for error in &bundle.errors {
            match error {
                RuleError::Parse { index, reason } => {
                    warn!(rule_index = index, reason = %reason, "Skipping malformed rule")
                }
                other => warn!(error = %other, "Skipping malformed rule"),
            }
        }

        let rule_set = RuleSet {
            rules: bundle.rules,
            version: self.next_version.fetch_add(1, Ordering::SeqCst),
            document_version: bundle.document_version,
            loaded_at: Utc::now(),
        };
        let status = rule_set.status();

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(rule_set);

        info!(
            version = status.version,
            document_version = ?status.document_version,
            rule_count = status.rule_count,
            rejected = bundle.errors.len(),
            "Rule set activated"
        );
        Ok(status)
    }

    /// Snapshot of the active rule set
    pub fn rule_set(&self) -> Arc<RuleSet> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn status(&self) -> RuleSetStatus {
        self.rule_set().status()
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Consequence events the active rule set produces for `event`, without publishing them
    pub fn evaluate(&self, event: &Event) -> Vec<Event> {
        self.evaluate_with(&self.rule_set(), event)
    }

    /// Consequence events `rule_set` produces for `event`.
    ///
    /// Rules run in order. A rule whose consequences cannot all be built
    /// contributes nothing. Returns nothing when the consequences would
    /// exceed the configured chain depth.
    pub fn evaluate_with(&self, rule_set: &RuleSet, event: &Event) -> Vec<Event> {
        let states: &dyn StateSource = &self.hub;
        let resolve = |key: &str| resolve_key(key, event, states);

        let mut produced = Vec::new();
        for (index, rule) in rule_set.rules.iter().enumerate() {
            if !rule.scope.matches(event) || !rule.condition.evaluate(&resolve) {
                continue;
            }

            let built: Result<Vec<Event>, EventError> = rule
                .consequences
                .iter()
                .map(|consequence| self.build_consequence(consequence, event, &resolve))
                .collect();

            match built {
                Ok(events) => {
                    debug!(
                        rule_index = index,
                        trigger_id = %event.unique_id(),
                        consequences = events.len(),
                        "Rule matched"
                    );
                    produced.extend(events);
                }
                Err(e) => warn!(
                    rule_index = index,
                    trigger_id = %event.unique_id(),
                    error = %e,
                    "Rule matched but a consequence could not be built"
                ),
            }
        }

        let max_depth = self.config.max_chain_depth;
        if max_depth > 0 && !produced.is_empty() && event.chain_depth() >= max_depth {
            warn!(
                trigger_id = %event.unique_id(),
                chain_depth = event.chain_depth(),
                max_chain_depth = max_depth,
                dropped = produced.len(),
                "Rule chain depth exceeded, consequences dropped"
            );
            return Vec::new();
        }

        produced
    }

    fn build_consequence(
        &self,
        consequence: &Consequence,
        trigger: &Event,
        resolve: &dyn Fn(&str) -> Option<Variant>,
    ) -> Result<Event, EventError> {
        let detail: VariantMap = consequence
            .detail
            .iter()
            .map(|(key, value)| (key.clone(), expand_variant(value, resolve)))
            .collect();

        let name = match &consequence.name {
            Some(template) => expand_tokens(template, resolve),
            None => DEFAULT_CONSEQUENCE_NAME.to_string(),
        };
        let event_type = match &consequence.event_type {
            Some(template) => expand_tokens(template, resolve),
            None => self.config.consequence_event_type.clone(),
        };

        let event = Event::builder(name, event_type, event_source::RULES_RESPONSE)
            .data(detail)
            .caused_by(trigger)
            .build()?;

        debug!(
            consequence_id = consequence.id.as_deref().unwrap_or("-"),
            consequence_type = consequence.kind.as_deref().unwrap_or("-"),
            event_id = %event.unique_id(),
            "Consequence resolved"
        );
        Ok(event)
    }

    fn on_event(&self, event: &Event) {
        for consequence in self.evaluate(event) {
            let event_id = consequence.unique_id();
            if let Err(e) = self.hub.dispatch(consequence) {
                warn!(event_id = %event_id, error = %e, "Failed to publish rule consequence");
            }
        }
    }

    /// Detach from the hub; the loaded rules stay queryable
    pub fn stop(&self) {
        if self.hub.unregister_listener(self.listener_id) {
            info!(listener_id = %self.listener_id, "Rules engine stopped");
        }
    }
}
