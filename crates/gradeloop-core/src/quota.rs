// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Monthly quota metering for expensive AI-backed actions.
//!
//! Counters are keyed by `(resource_type, subject_id)` and live in the
//! shared store. The monthly window is lazy: the expiry is set exactly once,
//! at the first increment, and never extended afterwards, so a counter
//! resets a fixed duration after its first use rather than on a calendar
//! boundary.
//!
//! Callers charge **before** performing the gated action and treat
//! `total > ceiling` as rejection. The charge is not refunded on that path:
//! the design errs toward slight overcounting rather than letting work
//! proceed unmetered, and charge-then-check stays race-free under
//! concurrent increments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{CoreError, Result};
use crate::kv::{KeyTtl, KeyValueStore};

/// Default quota window: 30 days from first use.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default maximum staleness of the read cache.
pub const DEFAULT_CACHE_STALENESS: Duration = Duration::from_secs(60);

/// Cache visibility mode for an increment, chosen per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// Publish the post-increment total to the cache in the same call; the
    /// next read anywhere sees the new total.
    Immediate,
    /// Leave the cached total to lapse on its own; reads may see a stale
    /// total until the staleness bound passes.
    Delayed,
}

/// Current consumption against the subject's plan ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaStatus {
    /// Accumulated total in the current window.
    pub total: f64,
    /// Plan-derived ceiling for this subject and resource type.
    pub ceiling: f64,
}

impl QuotaStatus {
    /// Whether the subject has consumed past its ceiling.
    pub fn exceeded(&self) -> bool {
        self.total > self.ceiling
    }
}

/// Plan-derived ceiling lookup, provided by the billing/plan layer.
#[async_trait]
pub trait PlanCeilings: Send + Sync {
    /// The ceiling for a subject and resource type in the current window.
    async fn ceiling(&self, subject_id: &str, resource_type: &str) -> Result<f64>;
}

/// Per-subject, per-resource-type monthly counters on the shared store.
pub struct QuotaLedger {
    store: Arc<dyn KeyValueStore>,
    ceilings: Arc<dyn PlanCeilings>,
    window: Duration,
    cache_staleness: Duration,
}

impl QuotaLedger {
    /// Create a ledger with the default 30-day window.
    pub fn new(store: Arc<dyn KeyValueStore>, ceilings: Arc<dyn PlanCeilings>) -> Self {
        Self {
            store,
            ceilings,
            window: DEFAULT_WINDOW,
            cache_staleness: DEFAULT_CACHE_STALENESS,
        }
    }

    /// Override the quota window.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Override the read-cache staleness bound.
    pub fn with_cache_staleness(mut self, staleness: Duration) -> Self {
        self.cache_staleness = staleness;
        self
    }

    fn counter_key(resource_type: &str, subject_id: &str) -> String {
        format!("quota:{}:{}", resource_type, subject_id)
    }

    fn cache_key(resource_type: &str, subject_id: &str) -> String {
        format!("quota:cache:{}:{}", resource_type, subject_id)
    }

    /// Atomically add `amount` (may be fractional) to the subject's counter
    /// and return the post-increment total.
    ///
    /// The first increment of a window sets the counter's expiry; later
    /// increments never extend it. The charge is never rolled back, even if
    /// the caller goes on to reject the action because the returned total
    /// is over the ceiling.
    #[instrument(skip(self))]
    pub async fn increment(
        &self,
        subject_id: &str,
        resource_type: &str,
        amount: f64,
        invalidation: Invalidation,
    ) -> Result<f64> {
        let key = Self::counter_key(resource_type, subject_id);
        let total = self.store.incr_by_float(&key, amount).await?;

        // Lazy window: a counter without an expiry gets one. Two concurrent
        // first increments can both observe NoExpiry and both set the window;
        // the resulting skew is bounded by one round trip, and the window is
        // never extended after that.
        if self.store.ttl(&key).await? == KeyTtl::NoExpiry {
            self.store.expire(&key, self.window).await?;
            debug!(key, window_secs = self.window.as_secs(), "quota window opened");
        }

        match invalidation {
            Invalidation::Immediate => {
                // Publish rather than delete: a check that read the counter
                // before this increment cannot clobber the fresh total,
                // because check writes the cache with set_nx.
                self.store
                    .set(
                        &Self::cache_key(resource_type, subject_id),
                        &total.to_string(),
                        Some(self.cache_staleness),
                    )
                    .await?;
            }
            Invalidation::Delayed => {
                // Cached totals carry the staleness bound as their TTL and
                // lapse on their own.
            }
        }

        debug!(key, total, "quota incremented");
        Ok(total)
    }

    /// Read the current total and the subject's ceiling without mutating
    /// the counter.
    ///
    /// Totals are served from a short-lived read cache when present. A
    /// fresh read refreshes the cache with the staleness bound as its TTL,
    /// using `set_nx` so it cannot overwrite a fresher total published by
    /// a concurrent [`Invalidation::Immediate`] increment.
    pub async fn check(&self, subject_id: &str, resource_type: &str) -> Result<QuotaStatus> {
        let ceiling = self.ceilings.ceiling(subject_id, resource_type).await?;

        let cache_key = Self::cache_key(resource_type, subject_id);
        if let Some(cached) = self.store.get(&cache_key).await? {
            if let Ok(total) = cached.parse::<f64>() {
                return Ok(QuotaStatus { total, ceiling });
            }
            // Unparseable cache entries are dropped, not trusted.
            self.store.del(&cache_key).await?;
        }

        let counter_key = Self::counter_key(resource_type, subject_id);
        let total = match self.store.get(&counter_key).await? {
            Some(raw) => raw.parse::<f64>().map_err(|e| CoreError::CorruptValue {
                key: counter_key.clone(),
                details: e.to_string(),
            })?,
            None => 0.0,
        };

        self.store
            .set_nx(&cache_key, &total.to_string(), self.cache_staleness)
            .await?;

        Ok(QuotaStatus { total, ceiling })
    }
}
