// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker Runtime state machine:
//!
//! ```text
//!   start -> register -> idle <-> busy -> drain -> stopped
//!                        |              |
//!                        +-- signal(term) --+
//! ```
//!
//! A register/poll/dispatch shape, with timeout and signal escalation
//! handled the way a supervised subprocess would, generalized here to a
//! converter-job lifecycle instead of a long-lived session.

use crate::error::{Result, WorkerError};
use oj_core::{
    Clock, ConvertOutcome, Converter, ConverterError, ErrorKind, ExecutionMode, Job, JobError,
    JobKind, OjConfig, ProgressReporter, SystemClock, WorkerEventKind, WorkerId,
};
use oj_storage::ClaimOutcome;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Extra time given to the converter's own termination-then-kill escalation
/// (see `SubprocessConverter`'s `KILL_ESCALATION`) to finish tearing down the
/// subprocess after the shutdown grace period has already been exceeded.
const SHUTDOWN_KILL_ESCALATION: std::time::Duration = std::time::Duration::from_secs(3);

/// The long-running loop. Owns no OS process/container state itself — that
/// belongs to whatever [`crate::WorkerLauncher`] brought this runtime into
/// existence; `WorkerRuntime` only talks to the Queue Service and the
/// converter it was configured with.
pub struct WorkerRuntime<C: Clock = SystemClock> {
    queue: Arc<oj_queue::QueueService<C>>,
    config: OjConfig,
    kind: JobKind,
    mode: ExecutionMode,
    external_handle: String,
    converter: Arc<dyn Converter>,
    workdir: PathBuf,
    /// Global bound on concurrent external subprocess invocations across all
    /// Worker Runtimes in the same process (default 50). Shared by every
    /// `WorkerRuntime` in a given `oj-pool`-managed process.
    subprocess_permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl<C: Clock> WorkerRuntime<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<oj_queue::QueueService<C>>,
        config: OjConfig,
        kind: JobKind,
        mode: ExecutionMode,
        external_handle: impl Into<String>,
        converter: Arc<dyn Converter>,
        workdir: PathBuf,
        subprocess_permits: Arc<Semaphore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            config,
            kind,
            mode,
            external_handle: external_handle.into(),
            converter,
            workdir,
            subprocess_permits,
            shutdown,
        }
    }

    /// Register with the Queue Service, retrying on lock contention with the
    /// config's `lock_retry` policy ("if the store is temporarily
    /// locked, retry with exponential backoff (>=5 attempts) before failing
    /// startup"). Registration failure is a fatal startup error.
    #[instrument(skip(self), fields(kind = %self.kind, mode = %self.mode))]
    async fn register(&self) -> Result<WorkerId> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.queue.register_worker(self.kind, self.mode, self.external_handle.clone()).await {
                Ok(id) => {
                    info!(worker_id = %id, "registered");
                    return Ok(id);
                }
                Err(e) if !self.config.lock_retry.exhausted(attempt) => {
                    let delay = self.config.lock_retry.delay_for(attempt);
                    warn!(attempt, error = %e, ?delay, "register_worker failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(WorkerError::RegisterFailed { attempts: attempt, source: e }),
            }
        }
    }

    /// Run the register -> idle/busy -> stopped loop until the shutdown
    /// token fires or the Queue Service reaps this worker (heartbeat refused).
    pub async fn run(&self) -> Result<()> {
        let worker_id = self.register().await?;

        let result = self.idle_loop(worker_id).await;

        // Drain: best-effort, the current job (if any) has already been
        // completed or cancelled by the time idle_loop returns.
        if let Err(e) = self.queue.stop_worker(worker_id).await {
            warn!(%worker_id, error = %e, "failed to mark worker stopped during shutdown");
        }
        info!(%worker_id, "stopped");
        result
    }

    async fn idle_loop(&self, worker_id: WorkerId) -> Result<()> {
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            if let Err(e) = self.queue.heartbeat(worker_id).await {
                warn!(%worker_id, error = %e, "heartbeat refused, worker was reaped");
                return Err(WorkerError::Reaped);
            }

            match self.queue.claim_next(self.kind, worker_id).await? {
                ClaimOutcome::Claimed(job) => {
                    self.busy(worker_id, job).await?;
                }
                ClaimOutcome::NoJob => {
                    tokio::select! {
                        _ = self.queue.wait_for_work(self.kind, self.config.poll_interval) => {}
                        _ = self.shutdown.cancelled() => return Ok(()),
                    }
                }
                ClaimOutcome::WorkerNotIdle => {
                    // Should not happen from a worker-owned loop that always
                    // transitions back to idle before re-claiming; treat as
                    // transient and back off like an empty queue.
                    warn!(%worker_id, "claim rejected: worker not idle");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Busy state: invoke the converter, heartbeating on a secondary timer
    /// and polling cancellation at least once per 5s while the conversion
    /// runs, then report the outcome.
    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %self.kind))]
    async fn busy(&self, worker_id: WorkerId, job: Job) -> Result<()> {
        self.queue.mark_busy(worker_id).await?;
        self.queue
            .record_event(
                Some(worker_id),
                WorkerEventKind::JobStarted,
                serde_json::json!({"job_id": job.id.get()}),
            )
            .await?;

        let progress = ProgressReporter::new();
        let cancel_watch = self.spawn_cancel_watch(job.id, progress.clone());

        // Bounded-grace shutdown: on receipt of a termination signal, finish
        // the current job within ~5s; past that, mark the job cancelled so
        // the converter's own termination-then-kill escalation (see
        // `SubprocessConverter`) tears down its subprocess, and give that
        // escalation a further bounded window to actually land before giving
        // up on the invocation outright.
        let mut invocation = Box::pin(self.invoke_with_retry(&job, &progress));
        let outcome = tokio::select! {
            outcome = &mut invocation => outcome,
            _ = self.shutdown.cancelled() => {
                match tokio::time::timeout(std::time::Duration::from_secs(5), &mut invocation).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(job_id = %job.id, "shutdown grace period exceeded, terminating converter");
                        progress.mark_cancelled();
                        match tokio::time::timeout(SHUTDOWN_KILL_ESCALATION, &mut invocation).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(JobError::new(
                                ErrorKind::Infrastructure,
                                "worker shut down before converter finished",
                            )
                            .with_details(serde_json::json!({"shutdown_grace_exceeded": true}))),
                        }
                    }
                }
            }
        };
        cancel_watch.abort();

        match outcome {
            Ok(out) => {
                self.queue.complete_success(job.id, out.payload, out.metadata).await?;
            }
            Err(err) => {
                self.queue.complete_failure(job.id, err).await?;
            }
        }

        self.queue
            .record_event(
                Some(worker_id),
                WorkerEventKind::JobFinished,
                serde_json::json!({"job_id": job.id.get()}),
            )
            .await?;
        self.queue.mark_idle(worker_id).await?;
        Ok(())
    }

    /// Background task: every `heartbeat_interval` (used here as the
    /// cancellation-poll cadence too, since both must be at least once per
    /// 5s by spec) calls `is_cancelled` and, if true, marks the
    /// [`ProgressReporter`] so the converter notices on its next check.
    fn spawn_cancel_watch(&self, job_id: oj_core::JobId, progress: ProgressReporter) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let interval = self.config.heartbeat_interval.min(std::time::Duration::from_secs(5));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match queue.is_cancelled(job_id).await {
                    Ok(true) => {
                        progress.mark_cancelled();
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => debug!(%job_id, error = %e, "is_cancelled poll failed"),
                }
            }
        })
    }

    /// Converter invocation with attempt counting, per-attempt timeout
    /// (doubling up to `converter_max_attempts`), and retry restricted to
    /// `transient` errors.
    async fn invoke_with_retry(&self, job: &Job, progress: &ProgressReporter) -> std::result::Result<ConvertOutcome, JobError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let attempt_count = self.queue.increment_attempt(job.id).await.unwrap_or(attempt);

            let _permit = self.subprocess_permits.acquire().await.map_err(|_| {
                JobError::new(ErrorKind::Infrastructure, "subprocess permit semaphore closed")
            })?;

            let timeout = self.config.converter_timeout * 2u32.pow(attempt.saturating_sub(1).min(8));
            let input_path = self.workdir.join(&job.input_path);
            let output_path = self.workdir.join(&job.output_path);

            let result = tokio::time::timeout(
                timeout,
                self.converter.convert(&input_path, &output_path, &job.params, progress.clone()),
            )
            .await;

            let err = match result {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(err)) => err,
                Err(_) => ConverterError::new(
                    ErrorKind::Transient,
                    format!("converter invocation timed out after {timeout:?}"),
                ),
            };

            let retryable = err.is_transient && !err.is_fatal;
            let exhausted = attempt_count >= self.config.converter_max_attempts;

            if !retryable || exhausted {
                let mut job_err = JobError::new(err.kind, err.message);
                job_err.is_transient = err.is_transient;
                job_err.is_fatal = err.is_fatal;
                job_err.traceback = err.traceback;
                job_err.details = serde_json::json!({"attempts": attempt_count, "retry_exhausted": retryable});
                return Err(job_err);
            }

            warn!(job_id = %job.id, attempt = attempt_count, error = %err.message, "converter attempt failed, retrying");
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
