// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `FlakyConverter` (test-support) — fails its first `fail_count`
//! invocations *per input path* with a configured [`ErrorKind`], then
//! succeeds by echoing the input bytes: a converter that raises a transient
//! error on attempts 1 and 2 and succeeds on attempt 3.
//!
//! Counts by input path rather than globally so a test can enqueue several
//! jobs against one `FlakyConverter` instance without their attempt counts
//! interfering.

use async_trait::async_trait;
use oj_core::{ConvertOutcome, Converter, ConverterError, ErrorKind, JobParams, ProgressReporter};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

pub struct FlakyConverter {
    fail_count: u32,
    fail_kind: ErrorKind,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FlakyConverter {
    /// Fail the first `fail_count` invocations for a given input path with
    /// `fail_kind`, then succeed.
    pub fn new(fail_count: u32, fail_kind: ErrorKind) -> Self {
        Self { fail_count, fail_kind, attempts: Mutex::new(HashMap::new()) }
    }

    /// Convenience constructor matching §8 scenario 6 exactly: two
    /// transient failures then success.
    pub fn transient_then_success(fail_count: u32) -> Self {
        Self::new(fail_count, ErrorKind::Transient)
    }

    /// Always fails, for the "exhausted retry budget" half of scenario 6.
    pub fn always_fails(fail_kind: ErrorKind) -> Self {
        Self::new(u32::MAX, fail_kind)
    }

    pub fn attempts_for(&self, input_path: &Path) -> u32 {
        self.attempts.lock().get(&input_path.display().to_string()).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Converter for FlakyConverter {
    async fn convert(
        &self,
        input_path: &Path,
        output_path: &Path,
        _params: &JobParams,
        _progress: ProgressReporter,
    ) -> Result<ConvertOutcome, ConverterError> {
        let key = input_path.display().to_string();
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(key).or_insert(0);
            *count += 1;
            *count
        };

        if attempt <= self.fail_count {
            return Err(ConverterError::new(self.fail_kind, format!("flaky converter failing attempt {attempt}")));
        }

        let payload = tokio::fs::read(input_path)
            .await
            .map_err(|e| ConverterError::new(ErrorKind::Infrastructure, format!("failed to read input: {e}")))?;
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConverterError::new(ErrorKind::Infrastructure, format!("failed to create output dir: {e}")))?;
        }
        tokio::fs::write(output_path, &payload)
            .await
            .map_err(|e| ConverterError::new(ErrorKind::Infrastructure, format!("failed to write output: {e}")))?;
        Ok(ConvertOutcome::new(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oj_core::kind::NotebookParams;

    fn params() -> JobParams {
        JobParams::Notebook(NotebookParams { template: "default".into(), extract_code: false })
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.src");
        let output = dir.path().join("out.html");
        tokio::fs::write(&input, b"content").await.unwrap();

        let converter = FlakyConverter::transient_then_success(2);
        for _ in 0..2 {
            let err = converter.convert(&input, &output, &params(), ProgressReporter::new()).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Transient);
        }
        let outcome = converter.convert(&input, &output, &params(), ProgressReporter::new()).await.unwrap();
        assert_eq!(outcome.payload, b"content");
        assert_eq!(converter.attempts_for(&input), 3);
    }

    #[tokio::test]
    async fn always_fails_never_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.src");
        let output = dir.path().join("out.html");
        tokio::fs::write(&input, b"content").await.unwrap();

        let converter = FlakyConverter::always_fails(ErrorKind::Transient);
        for _ in 0..5 {
            assert!(converter.convert(&input, &output, &params(), ProgressReporter::new()).await.is_err());
        }
    }
}
