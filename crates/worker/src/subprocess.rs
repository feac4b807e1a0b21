// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SubprocessConverter` — the "direct mode" realization of the converter
//! contract: each kind maps to an external program invoked with the
//! input/output paths as arguments, following the same spawn/capture idiom
//! as the container launcher: run one subprocess invocation, cancellable
//! mid-flight.

use async_trait::async_trait;
use oj_core::{ConvertOutcome, Converter, ConverterError, ErrorKind, JobKind, JobParams, ProgressReporter};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// How long a terminated converter subprocess gets to exit on its own before
/// being force-killed (spec.md's "termination signal, then after 2s a
/// kill", both for cooperative cancellation and for worker-shutdown grace
/// exceeded).
const KILL_ESCALATION: Duration = Duration::from_secs(2);

/// Maps each [`JobKind`] to the argv of the external tool that converts it,
/// e.g. `{Notebook: ["nbconvert", "--to", "slides"]}`. `input_path` and
/// `output_path` are appended as the final two arguments.
pub struct SubprocessConverter {
    commands: HashMap<JobKind, Vec<String>>,
    /// How often to check [`ProgressReporter::report_progress`] while the
    /// subprocess is running; must be well under the 5s cancellation
    /// cadence so cooperative cancellation stays prompt.
    poll_interval: Duration,
}

impl SubprocessConverter {
    pub fn new(commands: HashMap<JobKind, Vec<String>>) -> Self {
        Self { commands, poll_interval: Duration::from_millis(200) }
    }

    fn argv_for(&self, kind: JobKind) -> Result<(&str, &[String]), ConverterError> {
        let argv = self.commands.get(&kind).ok_or_else(|| {
            ConverterError::new(ErrorKind::ToolMissing, format!("no converter command configured for kind {kind}"))
        })?;
        argv.split_first()
            .map(|(program, rest)| (program.as_str(), rest))
            .ok_or_else(|| ConverterError::new(ErrorKind::ToolMissing, format!("empty converter command for kind {kind}")))
    }
}

#[async_trait]
impl Converter for SubprocessConverter {
    async fn convert(
        &self,
        input_path: &Path,
        output_path: &Path,
        params: &JobParams,
        progress: ProgressReporter,
    ) -> Result<ConvertOutcome, ConverterError> {
        let (program, args) = self.argv_for(params.kind())?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .arg(input_path)
            .arg(output_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Last-resort backstop only — normal cancellation sends a
            // termination signal first and escalates to a kill below;
            // `kill_on_drop` only fires if the whole future is dropped
            // without going through that path (e.g. the worker process itself
            // aborting).
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ConverterError::new(ErrorKind::ToolMissing, format!("converter executable not found: {program}"))
            }
            std::io::ErrorKind::PermissionDenied => {
                ConverterError::new(ErrorKind::ToolMissing, format!("permission denied executing {program}"))
            }
            other => ConverterError::new(ErrorKind::Infrastructure, format!("failed to spawn {program}: {other}")),
        })?;

        let pid = child.id();
        // Drain stdout/stderr concurrently with `wait()` so a chatty
        // converter can't deadlock on a full pipe buffer; only stderr ends up
        // in the traceback.
        let mut stdout_pipe = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
        });
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let poll_interval = self.poll_interval;
        let cancel_watch = async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if progress.report_progress() {
                    return;
                }
            }
        };

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel_watch => None,
        };

        let Some(status) = status else {
            // Cancelled: propagate to the subprocess via a termination
            // signal first, escalating to a hard kill only if it hasn't
            // exited within the 2s grace window.
            if let Some(pid) = pid {
                let _ = tokio::process::Command::new("kill").arg("-TERM").arg(pid.to_string()).output().await;
            }
            if tokio::time::timeout(KILL_ESCALATION, child.wait()).await.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(ConverterError::new(ErrorKind::Cancelled, "job cancelled while converting"));
        };

        let status = status.map_err(|e| ConverterError::new(ErrorKind::Infrastructure, format!("converter wait failed: {e}")))?;
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let _ = stdout_task.await;
        let stderr = String::from_utf8_lossy(&stderr_bytes).trim().to_string();

        if !status.success() {
            // No reliable cross-tool way to distinguish "bad input" from
            // "crashed" from exit code alone; exit code 2 is this
            // converter contract's convention for "input rejected",
            // everything else is treated as transient so the Worker
            // Runtime's retry policy gets a chance at it.
            let kind = if status.code() == Some(2) { ErrorKind::InputError } else { ErrorKind::Transient };
            let message = format!("{program} exited with {:?}", status.code());
            return Err(ConverterError::new(kind, message).with_traceback(stderr));
        }

        let payload = tokio::fs::read(output_path).await.map_err(|e| {
            ConverterError::new(ErrorKind::Infrastructure, format!("converter succeeded but output file unreadable: {e}"))
        })?;
        let mut outcome = ConvertOutcome::new(payload);
        if !stderr.is_empty() {
            outcome = outcome.with_metadata(serde_json::json!({"stderr": stderr}));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
