// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `OjConfig` — the one small, explicitly-constructed config struct every
//! component receives ("persistent global state...
//! is avoided; each component receives its Queue Service handle explicitly.
//! The Durable Store's file path is the only ambient configuration").
//!
//! Loaded from an optional TOML file layered under struct defaults, with a
//! couple of environment variable overrides for the fields operators tune
//! most often.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry backoff for store lock contention and for Worker
/// Runtime startup registration retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            factor: 2.0,
            max_delay: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given 1-indexed attempt, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay.as_secs_f64() * exp * 1000.0).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Floor below which the heartbeat liveness threshold may never be
/// configured: never less than 10 seconds.
pub const HEARTBEAT_THRESHOLD_FLOOR: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OjConfig {
    /// Directory holding `{store_name}_jobs.sqlite3` and `{store_name}_cache.sqlite3`.
    pub store_dir: PathBuf,
    /// Filename stem shared by both store files.
    pub store_name: String,
    /// How often a Worker refreshes its heartbeat while idle or busy.
    pub heartbeat_interval: Duration,
    /// Liveness threshold past which a Worker is presumed dead (floor 10s).
    pub heartbeat_threshold: Duration,
    /// Worker idle-poll cadence.
    pub poll_interval: Duration,
    /// Per-attempt timeout for a converter invocation.
    pub converter_timeout: Duration,
    /// Max attempts for a converter invocation before surfacing as failed.
    pub converter_max_attempts: u32,
    /// Global bound on concurrent external subprocess invocations across
    /// all Worker Runtimes in the same process.
    pub global_subprocess_permits: usize,
    /// Backoff policy for store write-lock contention.
    pub lock_retry: RetryPolicy,
}

impl Default for OjConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("."),
            store_name: "oj".to_string(),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_threshold: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            converter_timeout: Duration::from_secs(60),
            converter_max_attempts: 3,
            global_subprocess_permits: 50,
            lock_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("heartbeat_threshold must be >= {floor_secs}s, got {got_secs}s")]
    ThresholdTooLow { floor_secs: u64, got_secs: u64 },
}

impl OjConfig {
    pub fn jobs_db_path(&self) -> PathBuf {
        self.store_dir.join(format!("{}_jobs.sqlite3", self.store_name))
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.store_dir.join(format!("{}_cache.sqlite3", self.store_name))
    }

    /// Layer a TOML file's fields over `Self::default()`. Missing fields keep
    /// their default.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let cfg: OjConfig = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply the handful of environment variable overrides operators tune
    /// most: `OJ_STORE_DIR` for the store directory. (`OJ_LOG` governs the
    /// tracing `EnvFilter` in the binary crate, not this struct.)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("OJ_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_threshold < HEARTBEAT_THRESHOLD_FLOOR {
            return Err(ConfigError::ThresholdTooLow {
                floor_secs: HEARTBEAT_THRESHOLD_FLOOR.as_secs(),
                got_secs: self.heartbeat_threshold.as_secs(),
            });
        }
        Ok(())
    }
}
