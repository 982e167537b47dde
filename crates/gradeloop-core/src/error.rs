// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gradeloop-core.
//!
//! Only infrastructure failures live here. Expected coordination outcomes
//! (quota exceeded, lock contention, stale version) are ordinary return
//! values on the components that produce them.

use thiserror::Error;

/// Result type using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the coordination layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The key-value store could not be reached or refused the command.
    ///
    /// There is deliberately no local fallback for this case: quota and
    /// lock state must come from the shared store or not at all.
    #[error("store unavailable: {details}")]
    StoreUnavailable {
        /// Details from the underlying client.
        details: String,
    },

    /// A stored value could not be interpreted (e.g. a counter that does
    /// not parse as a number).
    #[error("unexpected value at '{key}': {details}")]
    CorruptValue {
        /// The key holding the unexpected value.
        key: String,
        /// What was wrong with it.
        details: String,
    },

    /// The plan-ceiling collaborator failed to resolve a subject's ceiling.
    #[error("ceiling lookup failed for '{subject_id}'/'{resource_type}': {details}")]
    CeilingLookup {
        /// Subject whose ceiling was requested.
        subject_id: String,
        /// Resource type whose ceiling was requested.
        resource_type: String,
        /// Details from the collaborator.
        details: String,
    },
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::StoreUnavailable {
            details: err.to_string(),
        }
    }
}
