// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradeloop Core - Coordination primitives for the grading platform.
//!
//! This crate provides the shared-state coordination layer used by gradeloop's
//! request handlers and background workflows. All coordination state lives in an
//! external key-value store; the processes themselves stay stateless, so any
//! number of them can run concurrently on different machines.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Request / Event Handlers                    │
//! │              (stateless, many processes/machines)             │
//! └──────────────────────────────────────────────────────────────┘
//!        │                  │                     │
//!        ▼                  ▼                     ▼
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ QuotaLedger │   │  MutexLock   │   │   VersionGate    │
//! │  (metering) │   │ (generation  │   │   (optimistic    │
//! │             │   │   guard)     │   │   concurrency)   │
//! └─────────────┘   └──────────────┘   └──────────────────┘
//!        │                  │                     │
//!        └──────────────────┼─────────────────────┘
//!                           ▼
//!                 ┌───────────────────┐
//!                 │  KeyValueStore    │
//!                 │ (Redis / memory)  │
//!                 └───────────────────┘
//! ```
//!
//! # Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`QuotaLedger`] | Per-subject monthly counters for metered actions |
//! | [`MutexLock`] | Set-if-absent named locks with a TTL safety net |
//! | [`VersionGate`] | Strict-greater-than compare-and-set per document |
//! | [`KeyValueStore`] | Store seam with Redis and in-memory backends |
//!
//! Semantic outcomes - quota exceeded, lock held by someone else, stale
//! version - are returned as values, never as errors. Only store
//! unavailability surfaces as an error, and there is no local fallback:
//! coordination correctness is preferred over availability.

pub mod config;
pub mod error;
pub mod kv;
pub mod lock;
pub mod quota;
pub mod version;

pub use config::{Config, ConfigError};
pub use error::{CoreError, Result};
pub use kv::{KeyTtl, KeyValueStore, MemoryStore, RedisStore};
pub use lock::{GenerationOutcome, MutexLock};
pub use quota::{Invalidation, PlanCeilings, QuotaLedger, QuotaStatus};
pub use version::VersionGate;
