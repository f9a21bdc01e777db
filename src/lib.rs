//! Fedigate - request rate limiting for federated social servers
//!
//! This crate gates API calls per actor and per resource. Limits are either
//! leaky buckets or legacy window/min-interval limits, and all counters live
//! in a shared counter store so that many server processes enforce the same
//! limits.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
