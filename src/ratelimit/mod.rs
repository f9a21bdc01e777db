//! Rate limiting logic.

mod backend;
mod bucket;
mod counter;
mod descriptor;
mod info;
mod limiter;
mod min_interval;
mod pending;
mod rules;

pub use backend::RateLimiterBackend;
pub use counter::{CounterKey, LimitCounter, MIN_INTERVAL_SUBCATEGORY};
pub use descriptor::LimitPlan;
pub use info::LimitInfo;
pub use limiter::RateLimiter;
pub use rules::{
    BucketRule, LegacyRule, RateLimitRule, RuleKind, RuleSet, DEFAULT_DRIP_RATE_MS,
    DEFAULT_DRIP_SIZE,
};
