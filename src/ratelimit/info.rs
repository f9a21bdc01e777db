//! Per-call limit results.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The outcome of a single limit check.
///
/// `blocked` is a normal result, not an error. Callers reject the request
/// and may use the reset fields as retry hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitInfo {
    /// Whether the caller must reject the request
    pub blocked: bool,
    /// Calls left before blocking
    pub remaining: u64,
    /// Seconds until another call is permitted
    pub reset_sec: u64,
    /// Milliseconds until another call is permitted
    pub reset_ms: u64,
    /// Seconds until the counter drains to zero
    pub full_reset_sec: u64,
    /// Milliseconds until the counter drains to zero
    pub full_reset_ms: u64,
}

impl LimitInfo {
    /// The result returned when limiting does not apply.
    pub fn unlimited() -> Self {
        Self {
            blocked: false,
            remaining: u64::MAX,
            reset_sec: 0,
            reset_ms: 0,
            full_reset_sec: 0,
            full_reset_ms: 0,
        }
    }

    /// Build a result from millisecond resets, deriving the second fields.
    pub(crate) fn from_millis(
        blocked: bool,
        remaining: u64,
        reset_ms: u64,
        full_reset_ms: u64,
    ) -> Self {
        Self {
            blocked,
            remaining,
            reset_sec: ms_to_secs_ceil(reset_ms),
            reset_ms,
            full_reset_sec: ms_to_secs_ceil(full_reset_ms),
            full_reset_ms,
        }
    }

    /// Combine the results of the min-interval and bucket limiters.
    ///
    /// The most restrictive result wins. A limiter that did not run counts as
    /// unblocked, with one call remaining and no reset time.
    pub fn merge(min_interval: Option<LimitInfo>, bucket: Option<LimitInfo>) -> Self {
        let parts = [min_interval, bucket];
        let field =
            |f: fn(&LimitInfo) -> u64, missing: u64| parts.map(|p| p.as_ref().map_or(missing, f));

        let remaining = field(|i| i.remaining, 1);
        let reset_sec = field(|i| i.reset_sec, 0);
        let reset_ms = field(|i| i.reset_ms, 0);
        let full_reset_sec = field(|i| i.full_reset_sec, 0);
        let full_reset_ms = field(|i| i.full_reset_ms, 0);

        Self {
            blocked: parts.iter().flatten().any(|i| i.blocked),
            remaining: remaining[0].min(remaining[1]),
            reset_sec: reset_sec[0].max(reset_sec[1]),
            reset_ms: reset_ms[0].max(reset_ms[1]),
            full_reset_sec: full_reset_sec[0].max(full_reset_sec[1]),
            full_reset_ms: full_reset_ms[0].max(full_reset_ms[1]),
        }
    }

    /// Time until another call is permitted.
    pub fn retry_after(&self) -> Duration {
        Duration::from_millis(self.reset_ms)
    }

    /// Response headers describing this result.
    ///
    /// `Retry-After` is only present when the call was blocked.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Clear", self.full_reset_sec.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_sec.to_string()),
        ];
        if self.blocked {
            headers.push(("Retry-After", self.reset_sec.to_string()));
        }
        headers
    }
}

fn ms_to_secs_ceil(ms: u64) -> u64 {
    ms.div_ceil(1000)
}
