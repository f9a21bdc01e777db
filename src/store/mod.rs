//! Counter store adapters.
//!
//! The limiter keeps no state of its own. Every counter lives in an external
//! key-value store that supports per-key expiry, so idle actors disappear
//! without explicit cleanup.

mod memory;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::ratelimit::LimitCounter;

pub use memory::MemoryStore;

/// Errors raised by a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing service could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value storage for limit counters.
///
/// Implementations must be safe to share between tasks. Single-key `get` and
/// `set` are expected to be atomic; nothing stronger is assumed.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<LimitCounter>, StoreError>;

    /// Store `value` under `key`, expiring it after `ttl`.
    async fn set(&self, key: &str, value: LimitCounter, ttl: Duration) -> Result<(), StoreError>;
}
