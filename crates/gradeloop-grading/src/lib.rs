// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradeloop Grading - Durable subjective-answer grading.
//!
//! This crate orchestrates asynchronous grading of a submission's
//! subjective sections. Objective sections are scored deterministically at
//! submission time ([`score_objective`]); subjective sections (summary,
//! translation, essay) are graded by an external object-generation service,
//! one independent journaled step per section, and the results are
//! aggregated into a single submission update.
//!
//! # State machine
//!
//! ```text
//! Triggered ──► Fetching(document, submission)
//!                    │
//!                    ▼
//!        ┌───── per-section fan-out ─────┐
//!        │  Scoring ── retry ◄─┐         │
//!        │     │               │         │
//!        │     ├── ok ──────── │ ──┐     │
//!        │     └── exhausted ──┴─► Failed(section)
//!        └───────────────────────────────┘
//!                    │ (all sections settled)
//!                    ▼
//!               Aggregating ──► Persisted ──► Done
//! ```
//!
//! Every step checkpoints its result in the shared store, so the
//! at-least-once trigger event can be redelivered freely: completed steps
//! replay, a permanently failed section stays failed (it contributes 0 and
//! is visibly flagged in the feedback map), and the aggregation update is
//! applied at most once.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use gradeloop_grading::{GradingRequested, GradingWorkflow};
//!
//! let workflow = GradingWorkflow::new(store, documents, generator);
//!
//! // At the call site of a submission:
//! GradingWorkflow::trigger(bus.as_ref(), GradingRequested {
//!     submission_id: submission.id.clone(),
//!     document_id: submission.document_id.clone(),
//!     user_id: submission.user_id.clone(),
//! }).await?;
//!
//! // In the event handler (invoked by the bus, possibly more than once):
//! let outcome = workflow.handle(event).await?;
//! ```

pub mod error;
pub mod events;
pub mod evidence;
pub mod generate;
pub mod journal;
pub mod scorer;
pub mod store;
pub mod types;
pub mod workflow;

pub use error::{GradingError, Result};
pub use events::{EventBus, GRADING_REQUESTED, GradingRequested};
pub use evidence::{detect_copied_phrases, word_count};
pub use generate::{GeneratorError, ObjectGenerator};
pub use journal::{StepJournal, StepResult};
pub use scorer::score_objective;
pub use store::{DocumentStore, MemoryDocumentStore};
pub use types::{
    Answer, Document, DocumentSection, Section, SectionFeedback, Submission, SubmissionStatus,
};
pub use workflow::{GradingOutcome, GradingWorkflow};
