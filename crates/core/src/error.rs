// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The five error kinds and the `JobError` record that travels
//! through the Durable Store as data — as opposed to the `thiserror` enums
//! each crate defines for its own process-local failures (`StorageError`,
//! `QueueError`, `WorkerError`, `PoolError`, `BackendError`), which never
//! touch a row.

use serde::{Deserialize, Serialize};

/// Categorizes why a Job failed or was denied; determines retry and
/// surfacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The input cannot be processed (syntax error, bad reference). Never retried.
    InputError,
    /// External converter executable not found; configuration error. Never retried.
    ToolMissing,
    /// Timeout, lock contention, resource exhaustion. Retried up to a bound.
    Transient,
    /// Store corruption, worker died mid-job, pool cannot start workers.
    Infrastructure,
    /// Client cancellation via `cancel_for_input`. Benign, not retried.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputError => "input-error",
            ErrorKind::ToolMissing => "tool-missing",
            ErrorKind::Transient => "transient",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "input-error" => Some(ErrorKind::InputError),
            "tool-missing" => Some(ErrorKind::ToolMissing),
            "transient" => Some(ErrorKind::Transient),
            "infrastructure" => Some(ErrorKind::Infrastructure),
            "cancelled" => Some(ErrorKind::Cancelled),
            _ => None,
        }
    }

    /// Default `is_transient` for a bare kind, before a converter has had a
    /// chance to say otherwise.
    pub fn default_is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    /// Default `is_fatal` — whether retrying within the same claim is pointless.
    pub fn default_is_fatal(&self) -> bool {
        matches!(self, ErrorKind::InputError | ErrorKind::ToolMissing)
    }
}

crate::simple_display! {
    ErrorKind {
        InputError => "input-error",
        ToolMissing => "tool-missing",
        Transient => "transient",
        Infrastructure => "infrastructure",
        Cancelled => "cancelled",
    }
}

/// A structured failure record, persisted on a terminal `failed` Job and
/// surfaced to the Processing Backend's caller as `{status, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    /// Captured whenever available — always for subprocess converters
    /// (their stderr), `None` for in-process converters with no subprocess
    /// to capture from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    pub is_transient: bool,
    pub is_fatal: bool,
    /// Free-form structured detail, e.g. `{"attempts": 3, "retry_exhausted": true}`.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl JobError {
    /// Construct a `JobError` using the kind's default transient/fatal flags.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            is_transient: kind.default_is_transient(),
            is_fatal: kind.default_is_fatal(),
            kind,
            message: message.into(),
            traceback: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled by client request").with_details_transient()
    }

    fn with_details_transient(mut self) -> Self {
        // cancellation is transient in the sense that a retry is never
        // attempted, but it is not "is_fatal" per spec (benign non-error)
        self.is_transient = true;
        self.is_fatal = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_round_trips_through_str() {
        for k in [
            ErrorKind::InputError,
            ErrorKind::ToolMissing,
            ErrorKind::Transient,
            ErrorKind::Infrastructure,
            ErrorKind::Cancelled,
        ] {
            assert_eq!(ErrorKind::from_str(k.as_str()), Some(k));
        }
    }

    #[test]
    fn input_error_is_never_transient_and_always_fatal() {
        let e = JobError::new(ErrorKind::InputError, "bad reference");
        assert!(!e.is_transient);
        assert!(e.is_fatal);
    }

    #[test]
    fn transient_defaults_non_fatal() {
        let e = JobError::transient("lock contention");
        assert!(e.is_transient);
        assert!(!e.is_fatal);
    }

    #[test]
    fn cancelled_is_benign() {
        let e = JobError::cancelled();
        assert_eq!(e.kind, ErrorKind::Cancelled);
        assert!(!e.is_fatal);
    }
}
