// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The durable grading workflow.
//!
//! One run per submission: fetch the document and the raw answers, fan out
//! an independent grading step per subjective section, then aggregate the
//! sub-scores into a single submission update. Every step is journaled
//! (see [`crate::journal`]), so the at-least-once trigger can be delivered
//! any number of times without double-counting, and a run that dies midway
//! resumes from its checkpoints on the next delivery.
//!
//! A section that exhausts its retries is marked failed, contributes 0,
//! and does not block its siblings or the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use gradeloop_core::KeyValueStore;

use crate::error::{GradingError, Result};
use crate::events::{EventBus, GRADING_REQUESTED, GradingRequested};
use crate::evidence::{detect_copied_phrases, word_count};
use crate::generate::{
    EssayQualGrade, EssayQuantGrade, ObjectGenerator, SummaryGrade, TranslationGrade,
    essay_qual_schema, essay_quant_schema, parse_grade, summary_grade_schema,
    translation_grade_schema,
};
use crate::journal::{DEFAULT_JOURNAL_TTL, DEFAULT_MAX_ATTEMPTS, StepJournal, StepResult};
use crate::store::DocumentStore;
use crate::types::{Answer, Document, Section, SectionFeedback, Submission};

/// Document and submission loaded as one checkpointed unit.
#[derive(Debug, Serialize, Deserialize)]
struct FetchedRun {
    document: Document,
    submission: Submission,
}

/// Terminal summary of a grading run.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingOutcome {
    /// The graded submission.
    pub submission_id: String,
    /// Combined objective + subjective score written to the submission.
    pub total_score: f64,
    /// Subjective sections graded successfully.
    pub graded_sections: usize,
    /// Subjective sections recorded as permanently failed.
    pub failed_sections: usize,
}

/// Durable, step-checkpointed grading orchestration.
pub struct GradingWorkflow {
    store: Arc<dyn KeyValueStore>,
    documents: Arc<dyn DocumentStore>,
    generator: Arc<dyn ObjectGenerator>,
    max_attempts: u32,
    journal_ttl: Duration,
}

impl GradingWorkflow {
    /// Create a workflow with default retry bound and journal lifetime.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn ObjectGenerator>,
    ) -> Self {
        Self {
            store,
            documents,
            generator,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            journal_ttl: DEFAULT_JOURNAL_TTL,
        }
    }

    /// Override the per-step attempt bound.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the step journal lifetime.
    pub fn with_journal_ttl(mut self, ttl: Duration) -> Self {
        self.journal_ttl = ttl;
        self
    }

    /// Fire a grading request to the event bus. The run itself happens
    /// asynchronously when the bus delivers the event to [`handle`](Self::handle).
    pub async fn trigger(bus: &dyn EventBus, request: GradingRequested) -> Result<()> {
        bus.send(GRADING_REQUESTED, serde_json::to_value(&request)?)
            .await
    }

    /// Event-handler entry point: run (or resume) grading for a submission.
    ///
    /// Safe under duplicate delivery: completed steps replay from their
    /// checkpoints and the aggregation update is applied at most once.
    #[instrument(skip(self, event), fields(submission_id = %event.submission_id))]
    pub async fn handle(&self, event: GradingRequested) -> Result<GradingOutcome> {
        info!(
            document_id = %event.document_id,
            user_id = %event.user_id,
            "grading run triggered"
        );

        let journal = StepJournal::new(self.store.clone(), &event.submission_id)
            .with_max_attempts(self.max_attempts)
            .with_ttl(self.journal_ttl);

        let fetched = self.fetch(&journal, &event).await?;

        // Fan-out: one independent grading future per subjective section.
        let mut section_futures: Vec<BoxFuture<'_, Result<(String, SectionFeedback)>>> =
            Vec::new();
        for entry in &fetched.document.sections {
            let answer = answer_text(&fetched.submission, &entry.id);
            let fut: BoxFuture<'_, Result<(String, SectionFeedback)>> = match &entry.section {
                Section::Summary {
                    source_text,
                    max_score,
                } => Box::pin(self.grade_summary(&journal, &entry.id, source_text, *max_score, answer)),
                Section::Translation {
                    source_text,
                    max_score,
                } => Box::pin(self.grade_translation(
                    &journal, &entry.id, source_text, *max_score, answer,
                )),
                Section::Essay { topic, max_score } => {
                    Box::pin(self.grade_essay(&journal, &entry.id, topic, *max_score, answer))
                }
                Section::FillInBlank { .. } | Section::MultipleChoice { .. } => continue,
            };
            section_futures.push(fut);
        }

        let mut feedback = HashMap::new();
        let mut failed_sections = 0;
        for result in join_all(section_futures).await {
            let (section_id, section_feedback) = result?;
            if section_feedback.is_failed() {
                failed_sections += 1;
            }
            feedback.insert(section_id, section_feedback);
        }

        // Aggregation happens-after every section future above.
        let subjective_total: f64 = feedback.values().map(SectionFeedback::score).sum();
        let total_score = fetched.submission.objective_score + subjective_total;

        let documents = self.documents.clone();
        let submission_id = event.submission_id.clone();
        let feedback_to_write = feedback.clone();
        journal
            .run_required_step("aggregate", || {
                let documents = documents.clone();
                let submission_id = submission_id.clone();
                let feedback = feedback_to_write.clone();
                async move {
                    documents
                        .update_submission_feedback(&submission_id, &feedback, total_score)
                        .await?;
                    Ok(total_score)
                }
            })
            .await?;

        let graded_sections = feedback.len() - failed_sections;
        info!(total_score, graded_sections, failed_sections, "grading run persisted");
        Ok(GradingOutcome {
            submission_id: event.submission_id,
            total_score,
            graded_sections,
            failed_sections,
        })
    }

    /// Load the document and the submission as one checkpointed unit.
    async fn fetch(&self, journal: &StepJournal, event: &GradingRequested) -> Result<FetchedRun> {
        let documents = self.documents.clone();
        let document_id = event.document_id.clone();
        let submission_id = event.submission_id.clone();
        journal
            .run_required_step("fetch", || {
                let documents = documents.clone();
                let document_id = document_id.clone();
                let submission_id = submission_id.clone();
                async move {
                    let document = documents.get_document(&document_id).await?.ok_or_else(|| {
                        GradingError::DocumentNotFound {
                            document_id: document_id.clone(),
                        }
                    })?;
                    let submission =
                        documents.get_submission(&submission_id).await?.ok_or_else(|| {
                            GradingError::SubmissionNotFound {
                                submission_id: submission_id.clone(),
                            }
                        })?;
                    Ok(FetchedRun {
                        document,
                        submission,
                    })
                }
            })
            .await
    }

    async fn grade_summary(
        &self,
        journal: &StepJournal,
        section_id: &str,
        source_text: &str,
        max_score: f64,
        answer: String,
    ) -> Result<(String, SectionFeedback)> {
        // Local pre-pass: copy detection and word count are evidence for
        // the grader, never computed by the model.
        let copied_phrases = detect_copied_phrases(source_text, &answer);
        let words = word_count(&answer);

        let prompt = summary_prompt(source_text, &answer, &copied_phrases, words, max_score);
        let result = self
            .generation_step::<SummaryGrade>(
                journal,
                &format!("section:{}", section_id),
                prompt,
                summary_grade_schema(),
            )
            .await?;

        let feedback = match result {
            StepResult::Completed(grade) => SectionFeedback::Summary {
                score: grade.score.clamp(0.0, max_score),
                rationale: grade.rationale,
                copied_phrases,
                word_count: words,
            },
            StepResult::Failed { error, attempts } => SectionFeedback::Failed {
                reason: error,
                attempts,
            },
        };
        Ok((section_id.to_string(), feedback))
    }

    async fn grade_translation(
        &self,
        journal: &StepJournal,
        section_id: &str,
        source_text: &str,
        max_score: f64,
        answer: String,
    ) -> Result<(String, SectionFeedback)> {
        let prompt = translation_prompt(source_text, &answer, max_score);
        let result = self
            .generation_step::<TranslationGrade>(
                journal,
                &format!("section:{}", section_id),
                prompt,
                translation_grade_schema(),
            )
            .await?;

        let feedback = match result {
            StepResult::Completed(grade) => SectionFeedback::Translation {
                score: grade.score.clamp(0.0, max_score),
                rationale: grade.rationale,
            },
            StepResult::Failed { error, attempts } => SectionFeedback::Failed {
                reason: error,
                attempts,
            },
        };
        Ok((section_id.to_string(), feedback))
    }

    /// Essays run as two dependent steps - quantitative scoring, then
    /// qualitative analysis - because the two calls have different output
    /// shapes and fail independently.
    async fn grade_essay(
        &self,
        journal: &StepJournal,
        section_id: &str,
        topic: &str,
        max_score: f64,
        answer: String,
    ) -> Result<(String, SectionFeedback)> {
        let quant_prompt = essay_quant_prompt(topic, &answer, max_score);
        let quant = match self
            .generation_step::<EssayQuantGrade>(
                journal,
                &format!("section:{}:quant", section_id),
                quant_prompt,
                essay_quant_schema(),
            )
            .await?
        {
            StepResult::Completed(grade) => grade,
            StepResult::Failed { error, attempts } => {
                return Ok((
                    section_id.to_string(),
                    SectionFeedback::Failed {
                        reason: error,
                        attempts,
                    },
                ));
            }
        };

        let qual_prompt = essay_qual_prompt(topic, &answer, quant.score);
        let feedback = match self
            .generation_step::<EssayQualGrade>(
                journal,
                &format!("section:{}:qual", section_id),
                qual_prompt,
                essay_qual_schema(),
            )
            .await?
        {
            StepResult::Completed(qual) => SectionFeedback::Essay {
                score: quant.score.clamp(0.0, max_score),
                rationale: quant.rationale,
                analysis: qual.analysis,
            },
            StepResult::Failed { error, attempts } => SectionFeedback::Failed {
                reason: error,
                attempts,
            },
        };
        Ok((section_id.to_string(), feedback))
    }

    /// One journaled generate-and-parse step.
    async fn generation_step<T>(
        &self,
        journal: &StepJournal,
        step_id: &str,
        prompt: String,
        schema: serde_json::Value,
    ) -> Result<StepResult<T>>
    where
        T: Serialize + serde::de::DeserializeOwned,
    {
        let generator = self.generator.clone();
        journal
            .run_step(step_id, || {
                let generator = generator.clone();
                let prompt = prompt.clone();
                let schema = schema.clone();
                async move {
                    let reply = generator.generate(&prompt, &schema).await?;
                    Ok(parse_grade::<T>(reply)?)
                }
            })
            .await
    }
}

/// The raw answer text for a section; missing or mis-shaped answers grade
/// as empty text.
fn answer_text(submission: &Submission, section_id: &str) -> String {
    match submission.answers.get(section_id) {
        Some(Answer::Text { text }) => text.clone(),
        _ => String::new(),
    }
}

fn summary_prompt(
    source_text: &str,
    answer: &str,
    copied_phrases: &[String],
    words: usize,
    max_score: f64,
) -> String {
    let copied = if copied_phrases.is_empty() {
        "none".to_string()
    } else {
        copied_phrases.join("; ")
    };
    format!(
        "Grade the summary below on a 0 to {max_score} scale and explain the score.\n\
         [source text]\n{source_text}\n\
         [student summary, {words} words]\n{answer}\n\
         [verbatim passages copied from the source]\n{copied}"
    )
}

fn translation_prompt(source_text: &str, answer: &str, max_score: f64) -> String {
    format!(
        "Grade the translation below on a 0 to {max_score} scale and explain the score.\n\
         [source text]\n{source_text}\n\
         [student translation]\n{answer}"
    )
}

fn essay_quant_prompt(topic: &str, answer: &str, max_score: f64) -> String {
    format!(
        "Score the essay below on a 0 to {max_score} scale and explain the score.\n\
         [topic]\n{topic}\n\
         [student essay]\n{answer}"
    )
}

fn essay_qual_prompt(topic: &str, answer: &str, score: f64) -> String {
    format!(
        "The essay below was scored {score}. Analyze its structure, argument, \
         and language.\n\
         [topic]\n{topic}\n\
         [student essay]\n{answer}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;

    use crate::types::SubmissionStatus;

    #[test]
    fn test_answer_text_shapes() {
        let mut answers = HashMap::new();
        answers.insert(
            "s1".to_string(),
            Answer::Text {
                text: "an answer".to_string(),
            },
        );
        answers.insert("s2".to_string(), Answer::Choice { selected: 1 });
        let submission = Submission {
            id: "sub-1".to_string(),
            document_id: "doc-1".to_string(),
            user_id: "u1".to_string(),
            answers,
            objective_score: 0.0,
            subjective_score: None,
            feedback: HashMap::new(),
            status: SubmissionStatus::Submitted,
            submitted_at: Utc::now(),
            graded_at: None,
        };
        assert_eq!(answer_text(&submission, "s1"), "an answer");
        assert_eq!(answer_text(&submission, "s2"), "");
        assert_eq!(answer_text(&submission, "missing"), "");
    }

    #[test]
    fn test_summary_prompt_carries_evidence() {
        let prompt = summary_prompt(
            "source",
            "answer",
            &["the quick brown fox".to_string()],
            12,
            5.0,
        );
        assert!(prompt.contains("12 words"));
        assert!(prompt.contains("the quick brown fox"));
        assert!(prompt.contains("0 to 5"));
    }

    #[test]
    fn test_summary_prompt_without_copying() {
        let prompt = summary_prompt("source", "answer", &[], 3, 5.0);
        assert!(prompt.contains("none"));
    }
}
