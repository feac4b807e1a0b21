// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `EchoConverter` — a direct, in-process [`Converter`] that reads
//! `input_path` and writes the same bytes to `output_path` unchanged.

use async_trait::async_trait;
use oj_core::{ConvertOutcome, Converter, ConverterError, ErrorKind, JobParams, ProgressReporter};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct EchoConverter;

#[async_trait]
impl Converter for EchoConverter {
    async fn convert(
        &self,
        input_path: &Path,
        output_path: &Path,
        _params: &JobParams,
        _progress: ProgressReporter,
    ) -> Result<ConvertOutcome, ConverterError> {
        let payload = tokio::fs::read(input_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ConverterError::new(ErrorKind::InputError, format!("input not found: {}", input_path.display()))
            }
            other => ConverterError::new(ErrorKind::Infrastructure, format!("failed to read input: {other}")),
        })?;

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
    async fn copies_input_bytes_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.src");
        let output = dir.path().join("nested/out.html");
        tokio::fs::write(&input, b"lecture one").await.unwrap();

        let outcome = EchoConverter.convert(&input, &output, &params(), ProgressReporter::new()).await.unwrap();
        assert_eq!(outcome.payload, b"lecture one");
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"lecture one");
    }

    #[tokio::test]
    async fn missing_input_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("missing.src");
        let output = dir.path().join("out.html");

        let err = EchoConverter.convert(&input, &output, &params(), ProgressReporter::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InputError);
        assert!(!err.is_transient);
    }
}
