//! Leaky bucket evaluation.
//!
//! Each accepted call adds one to the counter and the counter drains by
//! `drip_size` every `drip_rate` milliseconds. A call is blocked while the
//! drained count is at or above capacity.

use std::time::Duration;

use super::counter::LimitCounter;
use super::info::LimitInfo;
use super::rules::BucketRule;

/// The result of evaluating one call against a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Evaluation {
    pub info: LimitInfo,
    /// Counter to persist, `None` when the call was blocked
    pub update: Option<LimitCounter>,
    pub ttl: Duration,
}

/// Capacity of the bucket for a call of the given factor.
///
/// Fractional capacities round up, and every call may use at least one slot.
pub(crate) fn capacity(rule: &BucketRule, factor: f64) -> u64 {
    ((rule.size as f64 * factor).ceil() as u64).max(1)
}

/// Evaluate a call at `now` against the stored `counter`.
///
/// The factor scales capacity only. Every accepted call costs one.
pub(crate) fn evaluate(
    rule: &BucketRule,
    factor: f64,
    counter: LimitCounter,
    now: u64,
) -> Evaluation {
    let capacity = capacity(rule, factor);
    let LimitCounter {
        mut timestamp,
        mut count,
    } = counter;

    let drips = (now.saturating_sub(timestamp) / rule.drip_rate).saturating_mul(rule.drip_size);
    count = count.saturating_sub(drips);

    let blocked = count >= capacity;
    if !blocked {
        count += 1;
        timestamp = now;
    }

    let remaining = capacity.saturating_sub(count);
    let reset_ms = if remaining > 0 {
        0
    } else {
        rule.drip_rate.saturating_sub(now.saturating_sub(timestamp))
    };
    let full_reset_ms = count.div_ceil(rule.drip_size).saturating_mul(rule.drip_rate);

    Evaluation {
        info: LimitInfo::from_millis(blocked, remaining, reset_ms, full_reset_ms),
        update: (!blocked).then_some(LimitCounter { timestamp, count }),
        ttl: Duration::from_millis(full_reset_ms),
    }
}
