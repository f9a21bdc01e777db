//! Persisted limit counters and their store keys.

use serde::{Deserialize, Serialize};

/// Prefix shared by every counter key.
const KEY_PREFIX: &str = "rl";

/// Subcategory used by the min-interval limiter.
pub const MIN_INTERVAL_SUBCATEGORY: &str = "min";

/// A counter record as held by the counter store.
///
/// An absent record reads as the default `{ timestamp: 0, count: 0 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCounter {
    /// Time of the last accepted call, in clock milliseconds
    #[serde(rename = "t")]
    pub timestamp: u64,
    /// Accumulated calls not yet drained
    #[serde(rename = "c")]
    pub count: u64,
}

/// A key that uniquely identifies a counter in the store.
///
/// Counters are namespaced by actor and rule key, and optionally by a
/// subcategory so that several strategies on the same rule never share a
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The actor being limited
    pub actor: String,
    /// The rule key protecting the resource
    pub rule_key: String,
    /// Strategy-specific namespace, e.g. `"min"`
    pub subcategory: Option<String>,
}

impl CounterKey {
    /// Create a key for the default (bucket) counter.
    pub fn new(actor: &str, rule_key: &str) -> Self {
        Self {
            actor: actor.to_string(),
            rule_key: rule_key.to_string(),
            subcategory: None,
        }
    }

    /// Namespace this key under a subcategory.
    pub fn with_subcategory(mut self, subcategory: &str) -> Self {
        self.subcategory = Some(subcategory.to_string());
        self
    }

    /// Render the key as stored: `rl_{actor}_{rule}[_{subcategory}]`.
    pub fn to_store_key(&self) -> String {
        match &self.subcategory {
            Some(sub) => format!("{}_{}_{}_{}", KEY_PREFIX, self.actor, self.rule_key, sub),
            None => format!("{}_{}_{}", KEY_PREFIX, self.actor, self.rule_key),
        }
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
