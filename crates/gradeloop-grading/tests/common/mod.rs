// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for grading workflow tests.
//!
//! Provides mock collaborators and document/submission fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use gradeloop_grading::generate::{GeneratorError, ObjectGenerator};
use gradeloop_grading::{
    Answer, Document, DocumentSection, EventBus, Result, Section, Submission, SubmissionStatus,
    score_objective,
};

/// Mock object generator with scripted failures and call recording.
pub struct MockGenerator {
    score: f64,
    calls: Mutex<Vec<String>>,
    // (needle, remaining failures); -1 means fail forever
    failures: Mutex<Vec<(String, i64)>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            score: 4.0,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Fail with a transient error whenever the prompt contains `needle`,
    /// `times` times (-1 = forever).
    pub fn failing_when_contains(self, needle: &str, times: i64) -> Self {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), times));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl ObjectGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, schema: &Value) -> std::result::Result<Value, GeneratorError> {
        self.calls.lock().unwrap().push(prompt.to_string());

        {
            let mut failures = self.failures.lock().unwrap();
            for (needle, remaining) in failures.iter_mut() {
                if prompt.contains(needle.as_str()) && *remaining != 0 {
                    if *remaining > 0 {
                        *remaining -= 1;
                    }
                    return Err(GeneratorError::Transient("injected failure".to_string()));
                }
            }
        }

        let wants_analysis = schema["required"]
            .as_array()
            .is_some_and(|required| required.iter().any(|field| field == "analysis"));
        Ok(if wants_analysis {
            json!({ "analysis": "mock analysis" })
        } else {
            json!({ "score": self.score, "rationale": "mock rationale" })
        })
    }
}

/// Event bus that records every dispatch.
#[derive(Default)]
pub struct RecordingBus {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn send(&self, event: &str, payload: Value) -> Result<()> {
        self.sent.lock().unwrap().push((event.to_string(), payload));
        Ok(())
    }
}

pub const SOURCE_TEXT: &str =
    "The tide rises and the tide falls while the twilight darkens over the sands.";

/// A paper with one objective section and all three subjective kinds.
pub fn fixture_document() -> Document {
    Document {
        id: "doc-1".to_string(),
        title: "reading paper 7".to_string(),
        sections: vec![
            DocumentSection {
                id: "blank".to_string(),
                section: Section::FillInBlank {
                    answer: "twilight".to_string(),
                    points: 2.0,
                },
            },
            DocumentSection {
                id: "sum".to_string(),
                section: Section::Summary {
                    source_text: SOURCE_TEXT.to_string(),
                    max_score: 5.0,
                },
            },
            DocumentSection {
                id: "trans".to_string(),
                section: Section::Translation {
                    source_text: SOURCE_TEXT.to_string(),
                    max_score: 4.0,
                },
            },
            DocumentSection {
                id: "essay".to_string(),
                section: Section::Essay {
                    topic: "what the tide means".to_string(),
                    max_score: 10.0,
                },
            },
        ],
    }
}

/// A submission answering every section; the summary copies four
/// consecutive words from the source, the translation carries a unique
/// marker for failure injection.
pub fn fixture_submission(document: &Document) -> Submission {
    let mut answers = HashMap::new();
    answers.insert(
        "blank".to_string(),
        Answer::Text {
            text: "twilight".to_string(),
        },
    );
    answers.insert(
        "sum".to_string(),
        Answer::Text {
            text: "It says the tide rises and the tide keeps moving.".to_string(),
        },
    );
    answers.insert(
        "trans".to_string(),
        Answer::Text {
            text: "TRANS-MARKER the sea goes up and down at dusk.".to_string(),
        },
    );
    answers.insert(
        "essay".to_string(),
        Answer::Text {
            text: "ESSAY-MARKER the tide stands for time passing.".to_string(),
        },
    );

    let objective_score = score_objective(document, &answers);
    Submission {
        id: "sub-1".to_string(),
        document_id: document.id.clone(),
        user_id: "u1".to_string(),
        answers,
        objective_score,
        subjective_score: None,
        feedback: HashMap::new(),
        status: SubmissionStatus::Submitted,
        submitted_at: Utc::now(),
        graded_at: None,
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
