// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic scoring of objective sections.
//!
//! Runs synchronously at submission time, before any asynchronous grading.
//! This is the only writer of the objective score; the workflow later
//! writes only the subjective fields, so the two writers never race on the
//! same field set.

use std::collections::HashMap;

use crate::types::{Answer, Document, Section};

/// Score all objective sections of `document` against `answers`.
///
/// Unanswered or mismatched sections score 0; subjective sections are
/// ignored here entirely.
pub fn score_objective(document: &Document, answers: &HashMap<String, Answer>) -> f64 {
    document
        .sections
        .iter()
        .map(|entry| match (&entry.section, answers.get(&entry.id)) {
            (Section::FillInBlank { answer, points }, Some(Answer::Text { text })) => {
                if text.trim() == answer.trim() {
                    *points
                } else {
                    0.0
                }
            }
            (Section::MultipleChoice { correct, points, .. }, Some(Answer::Choice { selected })) => {
                if selected == correct {
                    *points
                } else {
                    0.0
                }
            }
            _ => 0.0,
        })
        .sum()
}
