//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use futures::future::OptionFuture;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::bucket::{self, Evaluation};
use super::counter::{CounterKey, LimitCounter, MIN_INTERVAL_SUBCATEGORY};
use super::descriptor::LimitPlan;
use super::info::LimitInfo;
use super::min_interval;
use super::pending::PendingWrites;
use super::rules::{RateLimitRule, RuleSet};
use crate::clock::{Clock, SystemClock};
use crate::config::{DisabledFlag, RateLimitingConfig};
use crate::error::{GateError, Result};
use crate::store::CounterStore;

/// Default bound on counter store operations.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// The rate limiter gating API calls per actor and rule.
///
/// Holds no counters itself: every check reads the counter store and, when
/// the call is accepted, writes the updated counter back in a detached task.
/// Concurrent checks for the same counter may both read the same value and
/// both be accepted; the last write wins.
pub struct RateLimiter {
    /// Backing counter store
    store: Arc<dyn CounterStore>,
    /// Time source for counter timestamps
    clock: Arc<dyn Clock>,
    /// Process-wide off switch
    disabled: DisabledFlag,
    /// Bound on each store read and write
    store_timeout: Duration,
    /// Named rules for [`RateLimiter::limit_named`]
    rules: RwLock<RuleSet>,
    /// Detached writes still in flight
    writes: Arc<PendingWrites>,
}

impl RateLimiter {
    /// Create a rate limiter on the given store with default settings.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            disabled: DisabledFlag::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            rules: RwLock::new(RuleSet::new()),
            writes: Arc::new(PendingWrites::default()),
        }
    }

    /// Create a rate limiter from configuration.
    ///
    /// The returned limiter owns a fresh [`DisabledFlag`]; use
    /// [`RateLimiter::disabled_flag`] to flip it on reload.
    pub fn from_config(
        store: Arc<dyn CounterStore>,
        config: &RateLimitingConfig,
        rules: RuleSet,
    ) -> Self {
        Self::new(store)
            .with_disabled_flag(DisabledFlag::from(config))
            .with_store_timeout(config.store_timeout())
            .with_rules(rules)
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing off switch.
    pub fn with_disabled_flag(mut self, disabled: DisabledFlag) -> Self {
        self.disabled = disabled;
        self
    }

    /// Bound each store operation by `timeout`.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Register named rules.
    pub fn with_rules(self, rules: RuleSet) -> Self {
        self.set_rules(rules);
        self
    }

    /// Replace the named rules.
    pub fn set_rules(&self, rules: RuleSet) {
        *self.rules.write() = rules;
    }

    /// Get the current named rules.
    pub fn rules(&self) -> RuleSet {
        self.rules.read().clone()
    }

    /// Handle to this limiter's off switch.
    pub fn disabled_flag(&self) -> DisabledFlag {
        self.disabled.clone()
    }

    /// Check and count a call by `actor` against `rule`.
    ///
    /// `factor` weighs the call: it scales bucket capacity and the number of
    /// calls allowed per min-interval. A factor of zero exempts the call.
    /// Errors only when the factor is invalid or the counter store cannot be
    /// read; a blocked call is reported through [`LimitInfo::blocked`].
    pub async fn limit(&self, rule: &RateLimitRule, actor: &str, factor: f64) -> Result<LimitInfo> {
        if self.disabled.is_disabled() {
            return Ok(LimitInfo::unlimited());
        }

        if !factor.is_finite() || factor < 0.0 {
            return Err(GateError::InvalidFactor(factor));
        }

        if factor == 0.0 {
            trace!(key = %rule.key, actor = %actor, "Exempt from rate limit");
            return Ok(LimitInfo::unlimited());
        }

        trace!(
            key = %rule.key,
            actor = %actor,
            factor = factor,
            "Checking rate limit"
        );

        let info = match LimitPlan::resolve(rule) {
            LimitPlan::Bucket(bucket) => {
                let key = CounterKey::new(actor, &rule.key);
                let counter = self.read_counter(&key).await?;
                let eval = bucket::evaluate(&bucket, factor, counter, self.clock.now_ms());
                self.apply(key, eval)
            }
            LimitPlan::Legacy {
                bucket,
                min_interval,
            } => {
                let bucket_key = CounterKey::new(actor, &rule.key);
                let min_key = bucket_key.clone().with_subcategory(MIN_INTERVAL_SUBCATEGORY);

                // Both reads must succeed before either counter is written.
                let min_read: OptionFuture<_> =
                    min_interval.map(|_| self.read_counter(&min_key)).into();
                let bucket_read: OptionFuture<_> =
                    bucket.as_ref().map(|_| self.read_counter(&bucket_key)).into();
                let (min_counter, bucket_counter) = tokio::join!(min_read, bucket_read);
                let min_counter = min_counter.transpose()?;
                let bucket_counter = bucket_counter.transpose()?;

                let now = self.clock.now_ms();
                let min_info = min_interval.zip(min_counter).map(|(ms, counter)| {
                    self.apply(min_key, min_interval::evaluate(ms, factor, counter, now))
                });
                let bucket_info = bucket.zip(bucket_counter).map(|(bucket, counter)| {
                    self.apply(bucket_key, bucket::evaluate(&bucket, factor, counter, now))
                });

                LimitInfo::merge(min_info, bucket_info)
            }
        };

        if info.blocked {
            debug!(
                key = %rule.key,
                actor = %actor,
                reset_ms = info.reset_ms,
                "Rate limit exceeded"
            );
        }

        Ok(info)
    }

    /// Check a call against a named rule.
    pub async fn limit_named(&self, name: &str, actor: &str, factor: f64) -> Result<LimitInfo> {
        let rule = self
            .rules
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GateError::UnknownRule(name.to_string()))?;

        self.limit(&rule, actor, factor).await
    }

    /// Read a stored counter without changing it.
    pub async fn peek(
        &self,
        rule_key: &str,
        actor: &str,
        subcategory: Option<&str>,
    ) -> Result<Option<LimitCounter>> {
        let mut key = CounterKey::new(actor, rule_key);
        if let Some(sub) = subcategory {
            key = key.with_subcategory(sub);
        }
        let store_key = key.to_store_key();

        match tokio::time::timeout(self.store_timeout, self.store.get(&store_key)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.timeout_error(store_key)),
        }
    }

    /// Wait for every detached counter write to finish.
    pub async fn flush(&self) {
        self.writes.wait_idle().await;
    }

    /// Number of detached counter writes still in flight.
    pub fn pending_writes(&self) -> usize {
        self.writes.in_flight()
    }

    /// Read a counter, treating an absent record as empty.
    async fn read_counter(&self, key: &CounterKey) -> Result<LimitCounter> {
        let store_key = key.to_store_key();

        match tokio::time::timeout(self.store_timeout, self.store.get(&store_key)).await {
            Ok(Ok(counter)) => Ok(counter.unwrap_or_default()),
            Ok(Err(e)) => {
                warn!(counter_key = %store_key, error = %e, "Failed to read rate limit counter");
                Err(e.into())
            }
            Err(_) => {
                warn!(counter_key = %store_key, "Timed out reading rate limit counter");
                Err(self.timeout_error(store_key))
            }
        }
    }

    /// Persist the evaluation's update, if any, and return its result.
    fn apply(&self, key: CounterKey, eval: Evaluation) -> LimitInfo {
        trace!(
            counter_key = %key,
            blocked = eval.info.blocked,
            remaining = eval.info.remaining,
            "Evaluated rate limit counter"
        );

        if let Some(counter) = eval.update {
            self.persist(key, counter, eval.ttl);
        }
        eval.info
    }

    /// Write a counter in the background. Failures are logged, never returned.
    fn persist(&self, key: CounterKey, counter: LimitCounter, ttl: Duration) {
        let store = Arc::clone(&self.store);
        let timeout = self.store_timeout;
        let guard = self.writes.start();

        tokio::spawn(async move {
            let _guard = guard;
            let store_key = key.to_store_key();

            match tokio::time::timeout(timeout, store.set(&store_key, counter, ttl)).await {
                Ok(Ok(())) => {
                    trace!(
                        counter_key = %store_key,
                        count = counter.count,
                        "Persisted rate limit counter"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        key = %key.rule_key,
                        actor = %key.actor,
                        error = %e,
                        "Failed to persist rate limit counter"
                    );
                }
                Err(_) => {
                    warn!(
                        key = %key.rule_key,
                        actor = %key.actor,
                        timeout_ms = timeout.as_millis() as u64,
                        "Timed out persisting rate limit counter"
                    );
                }
            }
        });
    }

    fn timeout_error(&self, key: String) -> GateError {
        GateError::StoreTimeout {
            key,
            timeout_ms: self.store_timeout.as_millis() as u64,
        }
    }
}

#[async_trait::async_trait]
impl super::backend::RateLimiterBackend for RateLimiter {
    async fn limit(&self, rule: &RateLimitRule, actor: &str, factor: f64) -> Result<LimitInfo> {
        RateLimiter::limit(self, rule, actor, factor).await
    }
}
