//! Rate limit rules and their validation.
//!
//! Rules are supplied per call site. A rule is either a leaky bucket or a
//! legacy `max`/`duration`/`minInterval` limit, which is normalized into
//! bucket and min-interval semantics by [`LimitPlan`](super::LimitPlan).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{GateError, Result};

/// Milliseconds per drip when a bucket rule does not say.
pub const DEFAULT_DRIP_RATE_MS: u64 = 1000;
/// Amount drained per drip when a bucket rule does not say.
pub const DEFAULT_DRIP_SIZE: u64 = 1;

fn default_drip_rate() -> u64 {
    DEFAULT_DRIP_RATE_MS
}

fn default_drip_size() -> u64 {
    DEFAULT_DRIP_SIZE
}

/// A rate limit protecting one resource or group of resources.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRule {
    /// Identifies the protected resource
    pub key: String,
    /// How the limit is expressed
    pub kind: RuleKind,
}

/// The two ways a limit can be expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleKind {
    /// Leaky bucket limit
    Bucket(BucketRule),
    /// Window and/or minimum-interval limit
    Legacy(LegacyRule),
}

/// Leaky bucket parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRule {
    /// Bucket capacity
    pub size: u64,
    /// Milliseconds between drips
    #[serde(default = "default_drip_rate", alias = "dripRate", alias = "driprate")]
    pub drip_rate: u64,
    /// Amount drained per drip
    #[serde(default = "default_drip_size", alias = "dripSize", alias = "dripsize")]
    pub drip_size: u64,
}

/// Legacy limit parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRule {
    /// Calls allowed per `duration`
    #[serde(default)]
    pub max: Option<u64>,
    /// Window length in milliseconds
    #[serde(default)]
    pub duration: Option<u64>,
    /// Minimum milliseconds between calls
    #[serde(default, alias = "minInterval", alias = "mininterval")]
    pub min_interval: Option<u64>,
}

impl RateLimitRule {
    /// Create a bucket rule with default drip settings.
    pub fn bucket(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            kind: RuleKind::Bucket(BucketRule {
                size,
                drip_rate: DEFAULT_DRIP_RATE_MS,
                drip_size: DEFAULT_DRIP_SIZE,
            }),
        }
    }

    /// Create a legacy rule.
    pub fn legacy(key: impl Into<String>, legacy: LegacyRule) -> Self {
        Self {
            key: key.into(),
            kind: RuleKind::Legacy(legacy),
        }
    }

    /// Override the drip settings of a bucket rule. No-op for legacy rules.
    pub fn with_drip(mut self, drip_rate: u64, drip_size: u64) -> Self {
        if let RuleKind::Bucket(ref mut bucket) = self.kind {
            bucket.drip_rate = drip_rate;
            bucket.drip_size = drip_size;
        }
        self
    }

    /// Check the rule's parameters.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| GateError::InvalidRule {
            key: self.key.clone(),
            reason: reason.to_string(),
        };

        if self.key.is_empty() {
            return Err(invalid("key must not be empty"));
        }

        match &self.kind {
            RuleKind::Bucket(bucket) => {
                if bucket.size == 0 {
                    return Err(invalid("size must be greater than zero"));
                }
                if bucket.drip_rate == 0 {
                    return Err(invalid("dripRate must be greater than zero"));
                }
                if bucket.drip_size == 0 {
                    return Err(invalid("dripSize must be greater than zero"));
                }
            }
            RuleKind::Legacy(legacy) => {
                let has_window = match (legacy.max, legacy.duration) {
                    (Some(0), _) => return Err(invalid("max must be greater than zero")),
                    (_, Some(0)) => return Err(invalid("duration must be greater than zero")),
                    (Some(_), Some(_)) => true,
                    (None, None) => false,
                    _ => return Err(invalid("max and duration must be set together")),
                };
                let has_min_interval = legacy.min_interval.is_some_and(|ms| ms > 0);

                if !has_window && !has_min_interval {
                    return Err(invalid("legacy rule needs max/duration or minInterval"));
                }
            }
        }

        Ok(())
    }
}

/// A validated set of named rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: BTreeMap<String, RateLimitRule>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from configured rule kinds, keyed by name.
    ///
    /// Each rule's key is its name.
    pub fn from_kinds(kinds: &BTreeMap<String, RuleKind>) -> Result<Self> {
        let mut set = Self::new();
        for (name, kind) in kinds {
            set.insert(RateLimitRule {
                key: name.clone(),
                kind: kind.clone(),
            })?;
        }
        Ok(set)
    }

    /// Validate and add a rule, replacing any rule with the same key.
    pub fn insert(&mut self, rule: RateLimitRule) -> Result<()> {
        rule.validate()?;
        self.rules.insert(rule.key.clone(), rule);
        Ok(())
    }

    /// Look up a rule by key.
    pub fn get(&self, key: &str) -> Option<&RateLimitRule> {
        self.rules.get(key)
    }

    /// Iterate over rules in key order.
    pub fn iter(&self) -> impl Iterator<Item = &RateLimitRule> {
        self.rules.values()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> BTreeMap<String, RuleKind> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_bucket_with_defaults() {
        let kinds = parse(
            r#"
drive_upload:
  type: bucket
  size: 10
"#,
        );
        assert_eq!(
            kinds["drive_upload"],
            RuleKind::Bucket(BucketRule {
                size: 10,
                drip_rate: 1000,
                drip_size: 1,
            })
        );
    }

    #[test]
    fn test_parse_camel_case_fields() {
        let kinds = parse(
            r#"
notes_create:
  type: legacy
  max: 300
  duration: 3600000
  minInterval: 1000
drive_upload:
  type: bucket
  size: 10
  dripRate: 5000
  dripSize: 2
"#,
        );
        assert_eq!(
            kinds["notes_create"],
            RuleKind::Legacy(LegacyRule {
                max: Some(300),
                duration: Some(3_600_000),
                min_interval: Some(1000),
            })
        );
        match &kinds["drive_upload"] {
            RuleKind::Bucket(b) => {
                assert_eq!(b.drip_rate, 5000);
                assert_eq!(b.drip_size, 2);
            }
            other => panic!("expected bucket, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_set_uses_names_as_keys() {
        let kinds = parse(
            r#"
following_create:
  type: legacy
  max: 50
  duration: 3600000
"#,
        );
        let set = RuleSet::from_kinds(&kinds).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("following_create").unwrap().key, "following_create");
    }

    #[test]
    fn test_validate_rejects_zero_bucket_size() {
        let rule = RateLimitRule::bucket("r", 0);
        assert!(matches!(rule.validate(), Err(GateError::InvalidRule { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_drip_rate() {
        let rule = RateLimitRule::bucket("r", 5).with_drip(0, 1);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_legacy() {
        let rule = RateLimitRule::legacy("r", LegacyRule::default());
        assert!(rule.validate().is_err());

        let rule = RateLimitRule::legacy(
            "r",
            LegacyRule {
                min_interval: Some(0),
                ..Default::default()
            },
        );
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_half_window() {
        let rule = RateLimitRule::legacy(
            "r",
            LegacyRule {
                max: Some(10),
                ..Default::default()
            },
        );
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_min_interval_only() {
        let rule = RateLimitRule::legacy(
            "r",
            LegacyRule {
                min_interval: Some(5000),
                ..Default::default()
            },
        );
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        assert!(RateLimitRule::bucket("", 5).validate().is_err());
    }

    #[test]
    fn test_insert_replaces_same_key() {
        let mut set = RuleSet::new();
        set.insert(RateLimitRule::bucket("r", 5)).unwrap();
        set.insert(RateLimitRule::bucket("r", 7)).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("r").unwrap().kind, RateLimitRule::bucket("r", 7).kind);
    }
}
