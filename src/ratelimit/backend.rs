//! Rate limiter trait for the request dispatch layer.

use async_trait::async_trait;

use super::info::LimitInfo;
use super::rules::RateLimitRule;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// Endpoint dispatch depends on this trait rather than on [`RateLimiter`]
/// directly, so handlers can be tested against a stub gate.
///
/// [`RateLimiter`]: super::RateLimiter
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check and count a call by `actor` against `rule`, weighted by `factor`.
    async fn limit(&self, rule: &RateLimitRule, actor: &str, factor: f64) -> Result<LimitInfo>;
}
