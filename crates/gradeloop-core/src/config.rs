// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Gradeloop coordination-layer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL.
    pub redis_url: String,
    /// Quota window length (lazy, from first use).
    pub quota_window: Duration,
    /// Safety-net TTL for generation locks.
    pub lock_ttl: Duration,
    /// Lifetime of document version records.
    pub version_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `GRADELOOP_REDIS_URL`: Redis connection string
    ///
    /// Optional (with defaults):
    /// - `GRADELOOP_QUOTA_WINDOW_DAYS`: quota window in days (default: 30)
    /// - `GRADELOOP_LOCK_TTL_SECS`: lock safety-net TTL in seconds (default: 300)
    /// - `GRADELOOP_VERSION_TTL_DAYS`: version record lifetime in days (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let redis_url = std::env::var("GRADELOOP_REDIS_URL")
            .map_err(|_| ConfigError::Missing("GRADELOOP_REDIS_URL"))?;

        let quota_window_days: u64 = std::env::var("GRADELOOP_QUOTA_WINDOW_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("GRADELOOP_QUOTA_WINDOW_DAYS", "must be a positive integer")
            })?;

        let lock_ttl_secs: u64 = std::env::var("GRADELOOP_LOCK_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("GRADELOOP_LOCK_TTL_SECS", "must be a positive integer")
            })?;

        let version_ttl_days: u64 = std::env::var("GRADELOOP_VERSION_TTL_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("GRADELOOP_VERSION_TTL_DAYS", "must be a positive integer")
            })?;

        Ok(Self {
            redis_url,
            quota_window: Duration::from_secs(quota_window_days * 24 * 60 * 60),
            lock_ttl: Duration::from_secs(lock_ttl_secs),
            version_ttl: Duration::from_secs(version_ttl_days * 24 * 60 * 60),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
