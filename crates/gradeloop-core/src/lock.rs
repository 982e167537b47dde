// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Named mutual-exclusion locks with a TTL safety net.
//!
//! Locks guard expensive derived-artifact generation against duplicate
//! concurrent runs. There is no queueing: a second acquirer fails fast and
//! reports "already in progress" to its caller. A holder that crashes
//! without releasing is reclaimed by the TTL, so a wedged process cannot
//! block the resource for longer than the safety-net duration. The guarded
//! operation itself must stay idempotent (checked via an existence probe),
//! since the TTL bounds unavailability but not whether the original job's
//! side effects landed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::kv::KeyValueStore;

/// Outcome of a lock-guarded generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome<T> {
    /// The artifact already exists; nothing was generated and no lock was
    /// held beyond the probe.
    AlreadyExists,
    /// Another holder is generating right now. The caller should poll or
    /// wait for notification rather than retry immediately.
    InProgress,
    /// This call generated the artifact.
    Generated(T),
}

/// Short-lived named locks on the shared store.
pub struct MutexLock {
    store: Arc<dyn KeyValueStore>,
}

impl MutexLock {
    /// Create a lock manager on the given store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn lock_key(resource_key: &str) -> String {
        format!("lock:{}", resource_key)
    }

    /// Attempt to become the holder of `resource_key`. Returns true iff
    /// this call created the lock; the expiry is set atomically with it.
    pub async fn acquire(&self, resource_key: &str, ttl: Duration) -> Result<bool> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set_nx(&Self::lock_key(resource_key), &token, ttl)
            .await?;
        if acquired {
            debug!(resource_key, ttl_secs = ttl.as_secs(), "lock acquired");
        } else {
            debug!(resource_key, "lock busy");
        }
        Ok(acquired)
    }

    /// Unconditionally delete the lock entry. Holders must call this on
    /// every exit path, success or failure.
    pub async fn release(&self, resource_key: &str) -> Result<()> {
        self.store.del(&Self::lock_key(resource_key)).await?;
        debug!(resource_key, "lock released");
        Ok(())
    }

    /// Non-mutating probe: is anyone holding the lock right now?
    pub async fn is_held(&self, resource_key: &str) -> Result<bool> {
        self.store.exists(&Self::lock_key(resource_key)).await
    }

    /// Double-checked generation of a derived artifact.
    ///
    /// Probes for the artifact before locking (idempotent fast path),
    /// fails fast with [`GenerationOutcome::InProgress`] when the lock is
    /// busy, re-probes inside the lock to close the race where another
    /// process finished between the first probe and the acquire, and
    /// releases on every exit path.
    pub async fn run_guarded<T, E, PFut, GFut>(
        &self,
        resource_key: &str,
        ttl: Duration,
        exists: impl Fn() -> PFut,
        generate: impl FnOnce() -> GFut,
    ) -> std::result::Result<GenerationOutcome<T>, E>
    where
        E: From<CoreError>,
        PFut: Future<Output = std::result::Result<bool, E>>,
        GFut: Future<Output = std::result::Result<T, E>>,
    {
        if exists().await? {
            return Ok(GenerationOutcome::AlreadyExists);
        }

        if !self.acquire(resource_key, ttl).await.map_err(E::from)? {
            return Ok(GenerationOutcome::InProgress);
        }

        let result = async {
            if exists().await? {
                return Ok(GenerationOutcome::AlreadyExists);
            }
            let value = generate().await?;
            Ok(GenerationOutcome::Generated(value))
        }
        .await;

        if let Err(e) = self.release(resource_key).await {
            // The TTL will reclaim the lock; nothing more to do here.
            warn!(resource_key, error = %e, "failed to release lock");
        }

        result
    }
}
