// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Monotonic version gate for optimistic concurrency control.
//!
//! Collaborative paper edits are ordered, not merged: a writer bumps a
//! version number locally (logical clock or timestamp), calls
//! [`VersionGate::try_advance`], and persists its edit only on `true`.
//! A `false` return means the edit is stale relative to a concurrent
//! writer and must be discarded or re-merged against the latest state by
//! the caller; this layer makes only the accept/reject decision.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{CoreError, Result};
use crate::kv::KeyValueStore;

/// Default lifetime of a version record; inactive documents expire.
pub const DEFAULT_VERSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Strict-greater-than compare-and-set per document.
pub struct VersionGate {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl VersionGate {
    /// Create a gate with the default record lifetime.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            ttl: DEFAULT_VERSION_TTL,
        }
    }

    /// Override the version record lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn version_key(document_id: &str) -> String {
        format!("docver:{}", document_id)
    }

    /// Accept `candidate_version` iff it is strictly greater than the
    /// stored version; on acceptance the stored version becomes
    /// `candidate_version` and its TTL is refreshed. Runs as one atomic
    /// store operation - no separate read-then-write round trip.
    pub async fn try_advance(&self, document_id: &str, candidate_version: i64) -> Result<bool> {
        let advanced = self
            .store
            .version_cas(&Self::version_key(document_id), candidate_version, self.ttl)
            .await?;
        debug!(document_id, candidate_version, advanced, "version gate");
        Ok(advanced)
    }

    /// The highest version successfully applied, or 0 if none recorded.
    pub async fn current(&self, document_id: &str) -> Result<i64> {
        let key = Self::version_key(document_id);
        match self.store.get(&key).await? {
            Some(raw) => raw.parse::<i64>().map_err(|e| CoreError::CorruptValue {
                key,
                details: e.to_string(),
            }),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn gate() -> VersionGate {
        VersionGate::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_fresh_document_is_version_zero() {
        let gate = gate();
        assert_eq!(gate.current("doc:9").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_monotonic_acceptance_scenario() {
        let gate = gate();

        assert!(gate.try_advance("doc:9", 5).await.unwrap());
        assert_eq!(gate.current("doc:9").await.unwrap(), 5);

        assert!(!gate.try_advance("doc:9", 3).await.unwrap());
        assert_eq!(gate.current("doc:9").await.unwrap(), 5);

        assert!(gate.try_advance("doc:9", 6).await.unwrap());
        assert_eq!(gate.current("doc:9").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_equal_version_is_rejected() {
        let gate = gate();
        assert!(gate.try_advance("doc:9", 4).await.unwrap());
        assert!(!gate.try_advance("doc:9", 4).await.unwrap());
        assert_eq!(gate.current("doc:9").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_documents_are_independent() {
        let gate = gate();
        assert!(gate.try_advance("doc:9", 7).await.unwrap());
        assert_eq!(gate.current("doc:10").await.unwrap(), 0);
        assert!(gate.try_advance("doc:10", 1).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_candidate_wins_once() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                VersionGate::new(store).try_advance("doc:9", 5).await.unwrap()
            }));
        }
        let wins = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_inactive_record_expires() {
        let gate = gate().with_ttl(Duration::from_millis(30));
        assert!(gate.try_advance("doc:9", 5).await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(gate.current("doc:9").await.unwrap(), 0);
        // After expiry the clock restarts; lower versions are accepted again.
        assert!(gate.try_advance("doc:9", 1).await.unwrap());
    }
}
