// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable step journal: checkpointed, bounded-retry steps.
//!
//! Each step's result, once computed, is persisted in the shared store and
//! never recomputed - re-invoking the enclosing workflow (at-least-once
//! event delivery) replays checkpoints instead of repeating work. A step
//! that exhausts its retries is recorded as a permanent failure, so
//! redelivery cannot retry it forever either.
//!
//! Journal semantics per step key:
//!
//! 1. First run with a step id: executes the operation, saves the result.
//! 2. Subsequent runs with the same step id: return the saved result
//!    without executing.
//! 3. Transient errors are retried up to the attempt bound within a run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gradeloop_core::KeyValueStore;

use crate::error::{GradingError, Result};

/// Default bound on attempts per step.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default lifetime of journal entries.
pub const DEFAULT_JOURNAL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Persisted state of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum StepRecord<T> {
    Completed { value: T },
    Failed { error: String, attempts: u32 },
}

/// Outcome of running a journaled step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult<T> {
    /// The step's value, freshly computed or replayed from the checkpoint.
    Completed(T),
    /// The step exhausted its retries, now or in a previous run.
    Failed {
        /// The last error before giving up.
        error: String,
        /// How many attempts were made.
        attempts: u32,
    },
}

impl<T> StepResult<T> {
    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            StepResult::Completed(value) => Some(value),
            StepResult::Failed { .. } => None,
        }
    }
}

/// Step journal for one workflow run, keyed by run id.
pub struct StepJournal {
    store: Arc<dyn KeyValueStore>,
    run_id: String,
    max_attempts: u32,
    ttl: Duration,
}

impl StepJournal {
    /// Create a journal for `run_id` with default attempt bound and TTL.
    pub fn new(store: Arc<dyn KeyValueStore>, run_id: &str) -> Self {
        Self {
            store,
            run_id: run_id.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ttl: DEFAULT_JOURNAL_TTL,
        }
    }

    /// Override the per-step attempt bound (minimum 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the journal entry lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn step_key(&self, step_id: &str) -> String {
        format!("grading:{}:step:{}", self.run_id, step_id)
    }

    /// Run a step with memoization and bounded retries.
    ///
    /// An existing `Completed` checkpoint is returned without executing
    /// `op`; an existing `Failed` checkpoint is a permanent failure and is
    /// not re-run. Non-retryable errors abort the run without writing a
    /// checkpoint, so a later trigger can try again.
    pub async fn run_step<T, F, Fut>(&self, step_id: &str, op: F) -> Result<StepResult<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.step_key(step_id);
        if let Some(raw) = self.store.get(&key).await? {
            return Ok(match serde_json::from_str::<StepRecord<T>>(&raw)? {
                StepRecord::Completed { value } => {
                    debug!(step_id, "step checkpoint hit, skipping execution");
                    StepResult::Completed(value)
                }
                StepRecord::Failed { error, attempts } => {
                    debug!(step_id, "step permanently failed in a previous run");
                    StepResult::Failed { error, attempts }
                }
            });
        }

        let mut attempt = 0;
        let failure = loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    let raw = serde_json::to_string(&StepRecord::Completed { value: &value })?;
                    self.store.set(&key, &raw, Some(self.ttl)).await?;
                    debug!(step_id, attempt, "step completed");
                    return Ok(StepResult::Completed(value));
                }
                Err(e) if e.is_retryable() => {
                    warn!(step_id, attempt, error = %e, "step attempt failed");
                    if attempt >= self.max_attempts {
                        break e;
                    }
                }
                Err(e) => return Err(e),
            }
        };

        let record: StepRecord<()> = StepRecord::Failed {
            error: failure.to_string(),
            attempts: attempt,
        };
        self.store
            .set(&key, &serde_json::to_string(&record)?, Some(self.ttl))
            .await?;
        warn!(step_id, attempts = attempt, "step failed permanently");
        Ok(StepResult::Failed {
            error: failure.to_string(),
            attempts: attempt,
        })
    }

    /// Run a step that the workflow cannot complete without.
    ///
    /// Same memoization and retry bound as [`run_step`](Self::run_step),
    /// but exhaustion returns the last error instead of recording a
    /// permanent failure - the next trigger retries from this step with
    /// all earlier checkpoints intact. Used for the fetch and aggregation
    /// steps.
    pub async fn run_required_step<T, F, Fut>(&self, step_id: &str, op: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.step_key(step_id);
        if let Some(raw) = self.store.get(&key).await? {
            match serde_json::from_str::<StepRecord<T>>(&raw)? {
                StepRecord::Completed { value } => {
                    debug!(step_id, "step checkpoint hit, skipping execution");
                    return Ok(value);
                }
                // Required steps never stay failed; fall through and re-run.
                StepRecord::Failed { .. } => {}
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    let raw = serde_json::to_string(&StepRecord::Completed { value: &value })?;
                    self.store.set(&key, &raw, Some(self.ttl)).await?;
                    debug!(step_id, attempt, "step completed");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(step_id, attempt, error = %e, "step attempt failed");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
