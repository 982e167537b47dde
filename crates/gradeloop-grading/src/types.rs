// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain types for assessment documents, submissions, and feedback.
//!
//! Sections and feedback are closed tagged unions, one variant per section
//! kind, so grading-service output is type-checked at the workflow boundary
//! before it can reach aggregation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scored unit within an assessment document.
///
/// Objective kinds (fill-in-blank, multiple-choice) are scored
/// deterministically at submission time; subjective kinds (summary,
/// translation, essay) are graded asynchronously by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Section {
    /// Fill-in-blank with a single expected answer.
    FillInBlank {
        /// The expected answer text.
        answer: String,
        /// Points awarded for an exact match.
        points: f64,
    },
    /// Multiple choice with one correct option.
    MultipleChoice {
        /// The options presented to the user.
        options: Vec<String>,
        /// Index of the correct option.
        correct: usize,
        /// Points awarded for the correct choice.
        points: f64,
    },
    /// Free-text summary of the source text.
    Summary {
        /// The text being summarized.
        source_text: String,
        /// Maximum sub-score for this section.
        max_score: f64,
    },
    /// Free-text translation of the source text.
    Translation {
        /// The text being translated.
        source_text: String,
        /// Maximum sub-score for this section.
        max_score: f64,
    },
    /// Free-form essay on a topic.
    Essay {
        /// The essay topic.
        topic: String,
        /// Maximum sub-score for this section.
        max_score: f64,
    },
}

impl Section {
    /// Whether this section requires asynchronous AI-assisted grading.
    pub fn is_subjective(&self) -> bool {
        matches!(
            self,
            Section::Summary { .. } | Section::Translation { .. } | Section::Essay { .. }
        )
    }

    /// The maximum score this section can contribute.
    pub fn max_score(&self) -> f64 {
        match self {
            Section::FillInBlank { points, .. } | Section::MultipleChoice { points, .. } => *points,
            Section::Summary { max_score, .. }
            | Section::Translation { max_score, .. }
            | Section::Essay { max_score, .. } => *max_score,
        }
    }
}

/// A section together with its id within the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    /// Section id, unique within the document.
    pub id: String,
    /// The section definition.
    #[serde(flatten)]
    pub section: Section,
}

/// An assessment document: a sequence of scored sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// The scored sections, in presentation order.
    pub sections: Vec<DocumentSection>,
}

/// A user's raw answer to one section. The shape depends on the section
/// kind: objective choices carry an option index, everything else is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// A selected option index (multiple choice).
    Choice {
        /// The selected option.
        selected: usize,
    },
    /// Free text (fill-in-blank and all subjective kinds).
    Text {
        /// The raw answer text.
        text: String,
    },
}

/// Per-section grading feedback, tagged by section kind.
///
/// A section that exhausted its retries is recorded as [`SectionFeedback::
/// Failed`], visible in the feedback map rather than silently dropped; it
/// contributes 0 to the aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionFeedback {
    /// Summary grading result.
    Summary {
        /// Sub-score for this section.
        score: f64,
        /// Grader rationale.
        rationale: String,
        /// Verbatim passages of 4+ consecutive words copied from the
        /// source, detected locally before grading.
        copied_phrases: Vec<String>,
        /// Word count of the answer, computed locally.
        word_count: usize,
    },
    /// Translation grading result.
    Translation {
        /// Sub-score for this section.
        score: f64,
        /// Grader rationale.
        rationale: String,
    },
    /// Essay grading result (quantitative score plus qualitative analysis).
    Essay {
        /// Sub-score for this section.
        score: f64,
        /// Rationale from the quantitative pass.
        rationale: String,
        /// Qualitative analysis from the second pass.
        analysis: String,
    },
    /// The section exhausted its retries; permanent failure.
    Failed {
        /// The last error before giving up.
        reason: String,
        /// How many attempts were made.
        attempts: u32,
    },
}

impl SectionFeedback {
    /// The sub-score this feedback contributes to the aggregate. Failed
    /// sections contribute 0.
    pub fn score(&self) -> f64 {
        match self {
            SectionFeedback::Summary { score, .. }
            | SectionFeedback::Translation { score, .. }
            | SectionFeedback::Essay { score, .. } => *score,
            SectionFeedback::Failed { .. } => 0.0,
        }
    }

    /// Whether this is a permanent per-section failure marker.
    pub fn is_failed(&self) -> bool {
        matches!(self, SectionFeedback::Failed { .. })
    }
}

/// Lifecycle status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Submitted; objective score known, grading pending.
    Submitted,
    /// Grading completed and persisted.
    Graded,
}

/// One user's attempt at a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission id.
    pub id: String,
    /// The document this submission answers.
    pub document_id: String,
    /// The submitting user.
    pub user_id: String,
    /// Raw answers keyed by section id.
    pub answers: HashMap<String, Answer>,
    /// Deterministic score over objective sections, written at submission
    /// time.
    pub objective_score: f64,
    /// Sum of subjective sub-scores; `None` until grading completes.
    pub subjective_score: Option<f64>,
    /// Per-section feedback keyed by section id, written by the workflow.
    pub feedback: HashMap<String, SectionFeedback>,
    /// Lifecycle status.
    pub status: SubmissionStatus,
    /// When the user submitted.
    pub submitted_at: DateTime<Utc>,
    /// When grading was persisted, if it has been.
    pub graded_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Combined score: objective plus subjective (0 while ungraded).
    pub fn total_score(&self) -> f64 {
        self.objective_score + self.subjective_score.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_kind_predicates() {
        let summary = Section::Summary {
            source_text: "text".to_string(),
            max_score: 5.0,
        };
        assert!(summary.is_subjective());
        assert_eq!(summary.max_score(), 5.0);

        let blank = Section::FillInBlank {
            answer: "x".to_string(),
            points: 2.0,
        };
        assert!(!blank.is_subjective());
        assert_eq!(blank.max_score(), 2.0);
    }

    #[test]
    fn test_section_serde_tagging() {
        let entry = DocumentSection {
            id: "s1".to_string(),
            section: Section::Translation {
                source_text: "原文".to_string(),
                max_score: 4.0,
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "translation");
        assert_eq!(json["id"], "s1");

        let back: DocumentSection = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_failed_feedback_contributes_zero() {
        let failed = SectionFeedback::Failed {
            reason: "gave up".to_string(),
            attempts: 3,
        };
        assert_eq!(failed.score(), 0.0);
        assert!(failed.is_failed());

        let graded = SectionFeedback::Essay {
            score: 7.5,
            rationale: "solid".to_string(),
            analysis: "structure holds".to_string(),
        };
        assert_eq!(graded.score(), 7.5);
        assert!(!graded.is_failed());
    }

    #[test]
    fn test_feedback_rejects_unknown_kind() {
        let raw = serde_json::json!({ "kind": "haiku", "score": 1.0 });
        assert!(serde_json::from_value::<SectionFeedback>(raw).is_err());
    }
}
