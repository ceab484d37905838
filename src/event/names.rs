use dashmap::DashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Well-known event type names
pub mod event_type {
    /// Registering for this type receives events of every type
    pub const WILDCARD: &str = "pulse.eventtype.wildcard";
    pub const HUB: &str = "pulse.eventtype.hub";
    pub const RULES_ENGINE: &str = "pulse.eventtype.rulesengine";
}

/// Well-known event source names
pub mod event_source {
    /// Registering for this source receives events of every source
    pub const WILDCARD: &str = "pulse.eventsource.wildcard";
    pub const SHARED_STATE: &str = "pulse.eventsource.sharedstate";
    pub const RULES_RESPONSE: &str = "pulse.eventsource.rulesresponse";
    pub const REQUEST_CONTENT: &str = "pulse.eventsource.requestcontent";
    pub const RESPONSE_CONTENT: &str = "pulse.eventsource.responsecontent";
}

/// Process-wide table of canonical names.
///
/// Entries are never removed: every interned name lives as long as the process.
struct NamePool {
    names: DashMap<String, Arc<str>>,
}

impl NamePool {
    fn new() -> Self {
        Self {
            names: DashMap::new(),
        }
    }

    /// Canonicalize (trim + lowercase) and return the pooled name.
    /// Blank input has no canonical form.
    fn intern(&self, raw: &str) -> Option<Arc<str>> {
        let canonical = raw.trim().to_lowercase();
        if canonical.is_empty() {
            return None;
        }
        Some(self.intern_canonical(canonical))
    }

    fn intern_canonical(&self, canonical: String) -> Arc<str> {
        if let Some(existing) = self.names.get(&canonical) {
            return existing.value().clone();
        }

        // entry() holds the shard lock, so concurrent first lookups agree on one Arc
        let entry = self
            .names
            .entry(canonical.clone())
            .or_insert_with(|| Arc::from(canonical.as_str()));
        debug_assert_eq!(&**entry.value(), canonical.as_str());
        entry.value().clone()
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

macro_rules! interned_name {
    ($(#[$meta:meta])* $name:ident, $pool:ident, $wildcard:expr) => {
        static $pool: OnceLock<NamePool> = OnceLock::new();

        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Arc<str>);

        impl $name {
            fn pool() -> &'static NamePool {
                $pool.get_or_init(NamePool::new)
            }

            /// Look up (creating on first use) the singleton for `name`.
            ///
            /// Returns `None` for `None`, empty, or whitespace-only names.
            pub fn get<'a>(name: impl Into<Option<&'a str>>) -> Option<Self> {
                name.into().and_then(|n| Self::pool().intern(n)).map($name)
            }

            /// Sentinel that matches every value on this axis when registering listeners
            pub fn wildcard() -> Self {
                $name(Self::pool().intern_canonical($wildcard.to_string()))
            }

            pub fn is_wildcard(&self) -> bool {
                &*self.0 == $wildcard
            }

            /// Canonical (trimmed, lower-cased) name
            pub fn name(&self) -> &str {
                &self.0
            }

            /// True when both handles point at the same pooled singleton
            pub fn ptr_eq(a: &Self, b: &Self) -> bool {
                Arc::ptr_eq(&a.0, &b.0)
            }

            /// Number of distinct names interned so far
            pub fn interned_count() -> usize {
                Self::pool().len()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), &*self.0)
            }
        }
    };
}

interned_name!(
    /// Interned, case-insensitive event type
    EventType,
    EVENT_TYPES,
    event_type::WILDCARD
);

interned_name!(
    /// Interned, case-insensitive event source
    EventSource,
    EVENT_SOURCES,
    event_source::WILDCARD
);
