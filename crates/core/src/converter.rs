// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The converter contract. One per Job kind:
//! `convert(input_path, output_path, params, report_progress) -> result_payload | error`.
//!
//! Lives in `oj-core` (rather than `oj-worker`) because both the Worker
//! Runtime (which drives it) and `oj-convert` (which provides the
//! `EchoConverter`/`FlakyConverter` stand-ins for the out-of-scope
//! renderers) need the same trait without a dependency cycle.

use crate::error::ErrorKind;
use crate::kind::JobParams;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A converter failure, trapped and categorized by the Worker Runtime before
/// it ever reaches the Durable Store as a `JobError`.
#[derive(Debug, Clone)]
pub struct ConverterError {
    pub kind: ErrorKind,
    pub message: String,
    pub is_transient: bool,
    pub is_fatal: bool,
    pub traceback: Option<String>,
}

impl ConverterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            is_transient: kind.default_is_transient(),
            is_fatal: kind.default_is_fatal(),
            kind,
            message: message.into(),
            traceback: None,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

/// The successful output of one converter invocation.
#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub payload: Vec<u8>,
    pub metadata: serde_json::Value,
}

impl ConvertOutcome {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload, metadata: serde_json::Value::Null }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Handed to a converter so it can periodically check whether its Job has
/// been cancelled. The Worker Runtime wires this to `Queue::is_cancelled`,
/// throttled to at most once per 5s so cancellation stays prompt without
/// hammering the store.
#[derive(Clone)]
pub struct ProgressReporter {
    cancelled: Arc<AtomicBool>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// The Worker Runtime calls this when it observes cancellation via
    /// `is_cancelled` polling, so the next `report_progress` call inside the
    /// converter sees it.
    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// The converter calls this periodically; `true` means it must return
    /// promptly ("the converter MAY ... raise a cancellation error").
    pub fn report_progress(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// One converter per Job kind. Free to create temporary files; the Worker
/// Runtime provides a usable working directory and is responsible for
/// wall-clock timeout/retry around the call, not the converter itself.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        input_path: &Path,
        output_path: &Path,
        params: &JobParams,
        progress: ProgressReporter,
    ) -> Result<ConvertOutcome, ConverterError>;
}
