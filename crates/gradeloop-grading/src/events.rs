// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event-bus seam and grading trigger payloads.
//!
//! The bus delivers at least once, asynchronously, with no ordering
//! guarantee across distinct events. Handlers must therefore tolerate
//! duplicate delivery; the workflow's step journal makes re-invocation
//! idempotent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Event name that triggers a grading run.
pub const GRADING_REQUESTED: &str = "grading.requested";

/// Payload of a [`GRADING_REQUESTED`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingRequested {
    /// The submission to grade.
    pub submission_id: String,
    /// The document it answers.
    pub document_id: String,
    /// The submitting user.
    pub user_id: String,
}

/// At-least-once fan-out mechanism, provided by the platform.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Dispatch `payload` under `event`. Fire-and-forget: returning `Ok`
    /// means accepted for delivery, not delivered.
    async fn send(&self, event: &str, payload: Value) -> Result<()>;
}
