// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object-generation seam and per-kind reply schemas.
//!
//! The concrete model client lives outside this crate; the workflow only
//! sees [`ObjectGenerator`]. Replies are deserialized into the typed grade
//! structs below before they can reach aggregation, so a schema-violating
//! reply is rejected at this boundary.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

/// Errors from the object-generation service.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// Infrastructure-level failure (timeout, network, rate limit);
    /// regeneration may succeed.
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// The reply did not match the requested schema. Also retried, bounded,
    /// since regeneration may produce a conforming reply.
    #[error("reply did not match the requested schema: {0}")]
    Invalid(String),
}

/// Turns a prompt and a reply schema into a validated structured result.
/// Wraps an external model call; synchronous from the step's point of view.
#[async_trait]
pub trait ObjectGenerator: Send + Sync {
    /// Generate a reply conforming to `schema`.
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<Value, GeneratorError>;
}

/// Reply schema for summary grading.
pub fn summary_grade_schema() -> Value {
    score_and_rationale_schema()
}

/// Reply schema for translation grading.
pub fn translation_grade_schema() -> Value {
    score_and_rationale_schema()
}

/// Reply schema for the quantitative essay pass.
pub fn essay_quant_schema() -> Value {
    score_and_rationale_schema()
}

/// Reply schema for the qualitative essay pass.
pub fn essay_qual_schema() -> Value {
    json!({
        "type": "object",
        "required": ["analysis"],
        "properties": {
            "analysis": { "type": "string" }
        }
    })
}

fn score_and_rationale_schema() -> Value {
    json!({
        "type": "object",
        "required": ["score", "rationale"],
        "properties": {
            "score": { "type": "number", "minimum": 0 },
            "rationale": { "type": "string" }
        }
    })
}

/// Graded summary reply.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct SummaryGrade {
    /// Awarded sub-score.
    pub score: f64,
    /// Grader rationale.
    pub rationale: String,
}

/// Graded translation reply.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct TranslationGrade {
    /// Awarded sub-score.
    pub score: f64,
    /// Grader rationale.
    pub rationale: String,
}

/// Quantitative essay reply.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct EssayQuantGrade {
    /// Awarded sub-score.
    pub score: f64,
    /// Grader rationale.
    pub rationale: String,
}

/// Qualitative essay reply.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct EssayQualGrade {
    /// Narrative analysis of the essay.
    pub analysis: String,
}

/// Deserialize a generator reply into a typed grade, mapping shape
/// mismatches to [`GeneratorError::Invalid`].
pub fn parse_grade<T: DeserializeOwned>(reply: Value) -> Result<T, GeneratorError> {
    serde_json::from_value(reply).map_err(|e| GeneratorError::Invalid(e.to_string()))
}
