//! Resolution of rules into limiter invocations.

use super::rules::{BucketRule, RateLimitRule, RuleKind, DEFAULT_DRIP_SIZE};

/// The limiter invocations a rule resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitPlan {
    /// Run the bucket limiter alone.
    Bucket(BucketRule),
    /// Run whichever strategies are present and merge their results.
    Legacy {
        /// Bucket equivalent of a `max`/`duration` window
        bucket: Option<BucketRule>,
        /// Minimum milliseconds between calls
        min_interval: Option<u64>,
    },
}

impl LimitPlan {
    /// Resolve a rule.
    ///
    /// A legacy window of `max` calls per `duration` ms becomes a bucket of
    /// size `max` draining one call every `round(duration / max)` ms. A zero
    /// `minInterval` means no min-interval limit.
    pub fn resolve(rule: &RateLimitRule) -> Self {
        match &rule.kind {
            RuleKind::Bucket(bucket) => LimitPlan::Bucket(bucket.clone()),
            RuleKind::Legacy(legacy) => {
                let bucket = match (legacy.max, legacy.duration) {
                    (Some(max), Some(duration)) if max > 0 && duration > 0 => Some(BucketRule {
                        size: max,
                        // A drip rate of zero would never drain.
                        drip_rate: ((duration as f64 / max as f64).round() as u64).max(1),
                        drip_size: DEFAULT_DRIP_SIZE,
                    }),
                    _ => None,
                };
                let min_interval = legacy.min_interval.filter(|ms| *ms > 0);

                LimitPlan::Legacy {
                    bucket,
                    min_interval,
                }
            }
        }
    }
}

impl std::fmt::Display for LimitPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bucket = |f: &mut std::fmt::Formatter<'_>, b: &BucketRule| {
            write!(
                f,
                "bucket(size={}, dripRate={}ms, dripSize={})",
                b.size, b.drip_rate, b.drip_size
            )
        };

        match self {
            LimitPlan::Bucket(b) => bucket(f, b),
            LimitPlan::Legacy {
                bucket: b,
                min_interval,
            } => {
                write!(f, "legacy[")?;
                if let Some(ms) = min_interval {
                    write!(f, "minInterval({}ms)", ms)?;
                    if b.is_some() {
                        write!(f, " + ")?;
                    }
                }
                if let Some(b) = b {
                    bucket(f, b)?;
                }
                write!(f, "]")
            }
        }
    }
}
