// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document-store seam and the in-memory implementation.
//!
//! The persistent document store is an external collaborator; the workflow
//! reads documents and submissions through it and writes back exactly one
//! update per run. The update touches only the subjective fields (feedback,
//! combined score, grading status) - the objective fields written at
//! submission time are merged with, never overwritten - so the two writers
//! of a submission never race on the same field set.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{GradingError, Result};
use crate::types::{Document, SectionFeedback, Submission, SubmissionStatus};

/// Persistent storage for documents and submissions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document by id.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Load a submission by id.
    async fn get_submission(&self, id: &str) -> Result<Option<Submission>>;

    /// Write grading output onto a submission as a single update. `score`
    /// is the combined total (objective plus subjective); only the
    /// subjective field set is replaced.
    async fn update_submission_feedback(
        &self,
        id: &str,
        feedback: &HashMap<String, SectionFeedback>,
        score: f64,
    ) -> Result<()>;
}

/// In-memory document store for tests and embedded use.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, Document>>,
    submissions: Mutex<HashMap<String, Submission>>,
    update_count: Mutex<u32>,
    failing_updates: Mutex<u32>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document.
    pub fn with_document(self, document: Document) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(document.id.clone(), document);
        self
    }

    /// Seed a submission.
    pub fn with_submission(self, submission: Submission) -> Self {
        self.submissions
            .lock()
            .unwrap()
            .insert(submission.id.clone(), submission);
        self
    }

    /// Make the next `count` feedback updates fail.
    pub fn fail_next_updates(&self, count: u32) {
        *self.failing_updates.lock().unwrap() = count;
    }

    /// How many feedback updates have been applied.
    pub fn update_count(&self) -> u32 {
        *self.update_count.lock().unwrap()
    }

    /// Read back a submission (test helper).
    pub fn submission(&self, id: &str) -> Option<Submission> {
        self.submissions.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.lock().unwrap().get(id).cloned())
    }

    async fn get_submission(&self, id: &str) -> Result<Option<Submission>> {
        Ok(self.submissions.lock().unwrap().get(id).cloned())
    }

    async fn update_submission_feedback(
        &self,
        id: &str,
        feedback: &HashMap<String, SectionFeedback>,
        score: f64,
    ) -> Result<()> {
        {
            let mut failing = self.failing_updates.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(GradingError::DocumentStore {
                    operation: "update_submission_feedback".to_string(),
                    details: "injected failure".to_string(),
                });
            }
        }

        let mut submissions = self.submissions.lock().unwrap();
        let submission =
            submissions
                .get_mut(id)
                .ok_or_else(|| GradingError::SubmissionNotFound {
                    submission_id: id.to_string(),
                })?;

        // Subjective fields only; objective_score and answers stay as the
        // submission-time writer left them.
        submission.feedback = feedback.clone();
        submission.subjective_score = Some(score - submission.objective_score);
        submission.status = SubmissionStatus::Graded;
        submission.graded_at = Some(Utc::now());

        *self.update_count.lock().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentSection, Section};

    fn submission() -> Submission {
        Submission {
            id: "sub-1".to_string(),
            document_id: "doc-1".to_string(),
            user_id: "u1".to_string(),
            answers: HashMap::new(),
            objective_score: 3.0,
            subjective_score: None,
            feedback: HashMap::new(),
            status: SubmissionStatus::Submitted,
            submitted_at: Utc::now(),
            graded_at: None,
        }
    }

    #[tokio::test]
    async fn test_update_merges_subjective_fields_only() {
        let store = MemoryDocumentStore::new().with_submission(submission());

        let mut feedback = HashMap::new();
        feedback.insert(
            "s1".to_string(),
            SectionFeedback::Translation {
                score: 4.0,
                rationale: "accurate".to_string(),
            },
        );
        store
            .update_submission_feedback("sub-1", &feedback, 7.0)
            .await
            .unwrap();

        let updated = store.submission("sub-1").unwrap();
        assert_eq!(updated.objective_score, 3.0);
        assert_eq!(updated.subjective_score, Some(4.0));
        assert_eq!(updated.total_score(), 7.0);
        assert_eq!(updated.status, SubmissionStatus::Graded);
        assert!(updated.graded_at.is_some());
        assert_eq!(updated.feedback, feedback);
    }

    #[tokio::test]
    async fn test_update_unknown_submission_errors() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update_submission_feedback("missing", &HashMap::new(), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::SubmissionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryDocumentStore::new().with_submission(submission());
        store.fail_next_updates(1);

        let err = store
            .update_submission_feedback("sub-1", &HashMap::new(), 3.0)
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::DocumentStore { .. }));

        store
            .update_submission_feedback("sub-1", &HashMap::new(), 3.0)
            .await
            .unwrap();
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let document = Document {
            id: "doc-1".to_string(),
            title: "paper".to_string(),
            sections: vec![DocumentSection {
                id: "s1".to_string(),
                section: Section::Essay {
                    topic: "on rivers".to_string(),
                    max_score: 10.0,
                },
            }],
        };
        let store = MemoryDocumentStore::new().with_document(document.clone());
        assert_eq!(store.get_document("doc-1").await.unwrap(), Some(document));
        assert_eq!(store.get_document("doc-2").await.unwrap(), None);
    }
}
