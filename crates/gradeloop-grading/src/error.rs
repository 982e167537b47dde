// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gradeloop-grading.

use thiserror::Error;

use crate::generate::GeneratorError;

/// Result type using GradingError.
pub type Result<T> = std::result::Result<T, GradingError>;

/// Errors that can occur while triggering or running a grading workflow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GradingError {
    /// The document referenced by the trigger does not exist.
    #[error("document '{document_id}' not found")]
    DocumentNotFound {
        /// The document ID that was not found.
        document_id: String,
    },

    /// The submission referenced by the trigger does not exist.
    #[error("submission '{submission_id}' not found")]
    SubmissionNotFound {
        /// The submission ID that was not found.
        submission_id: String,
    },

    /// The coordination store (step journal) is unavailable. The run aborts
    /// and is safe to re-trigger.
    #[error(transparent)]
    Store(#[from] gradeloop_core::CoreError),

    /// The document store failed an operation.
    #[error("document store error during '{operation}': {details}")]
    DocumentStore {
        /// The operation that failed.
        operation: String,
        /// Details from the collaborator.
        details: String,
    },

    /// Event dispatch to the bus failed.
    #[error("event dispatch failed for '{event}': {details}")]
    Dispatch {
        /// The event name.
        event: String,
        /// Details from the collaborator.
        details: String,
    },

    /// The object-generation service failed.
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// Serialization of step state or payloads failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GradingError {
    /// Whether the step mechanism should retry this error automatically.
    ///
    /// Transient infrastructure failures (collaborator hiccups, bad model
    /// replies) are retried up to the bound; semantic failures (missing
    /// records) and journal unavailability are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GradingError::Generator(_)
                | GradingError::DocumentStore { .. }
                | GradingError::Dispatch { .. }
        )
    }
}
