//! Minimum interval evaluation.
//!
//! Allows `max(ceil(factor), 1)` calls, then blocks until `min_interval`
//! milliseconds have passed since the last accepted call. The counter resets
//! lazily on the first read after the interval has elapsed.

use std::time::Duration;

use super::bucket::Evaluation;
use super::counter::LimitCounter;
use super::info::LimitInfo;

/// Calls allowed per interval for a call of the given factor.
pub(crate) fn max_calls(factor: f64) -> u64 {
    (factor.ceil() as u64).max(1)
}

/// Evaluate a call at `now` against the stored `counter`.
pub(crate) fn evaluate(
    min_interval: u64,
    factor: f64,
    counter: LimitCounter,
    now: u64,
) -> Evaluation {
    let max_calls = max_calls(factor);
    let LimitCounter {
        mut timestamp,
        mut count,
    } = counter;

    if count >= max_calls && now.saturating_sub(timestamp) >= min_interval {
        count = 0;
    }

    let blocked = count >= max_calls;
    if !blocked {
        count += 1;
        timestamp = now;
    }

    let remaining = max_calls.saturating_sub(count);
    let full_reset_ms = min_interval.saturating_sub(now.saturating_sub(timestamp));
    let reset_ms = if remaining < 1 { full_reset_ms } else { 0 };

    Evaluation {
        info: LimitInfo::from_millis(blocked, remaining, reset_ms, full_reset_ms),
        update: (!blocked).then_some(LimitCounter { timestamp, count }),
        // Kept until the interval has fully elapsed, matching the bucket limiter.
        ttl: Duration::from_millis(full_reset_ms),
    }
}
