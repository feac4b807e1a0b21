// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::{BackendError, Result};
use oj_core::{
    CacheEntry, Clock, Correlation, JobError, JobId, JobKind, JobParams, JobStatus, SystemClock,
};
use oj_queue::QueueService;
use oj_storage::ResultCache;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What `submit` found for a given `(output_path, fingerprint)` pair before
/// any Worker Runtime ran: either an existing result, served without
/// touching the queue at all, or a freshly enqueued Job to wait on.
#[derive(Debug)]
pub enum SubmitOutcome {
    CacheHit(CacheEntry),
    Queued(JobId),
}

/// Tunables for [`ProcessingBackend::await_all`]'s poll loop.
#[derive(Debug, Clone, Copy)]
pub struct AwaitOptions {
    /// Poll interval used immediately after a status changes.
    pub poll_floor: Duration,
    /// Upper bound the interval backs off to when nothing has changed.
    pub poll_ceiling: Duration,
    /// Fail fast, before polling even once, if a pending job's kind has no
    /// healthy registered worker — skippable so unit tests that submit
    /// directly against an in-process converter (no Pool Manager involved)
    /// don't need to register a worker row just to await a result.
    pub check_healthy_workers: bool,
    /// Client-level deadline (spec.md §5's "client gives up waiting but does
    /// not cancel"). `None` waits until every job reaches a terminal status.
    /// On expiry, `await_all` returns immediately with whatever statuses it
    /// last polled, each still-pending job's [`JobResult::timed_out`] set.
    pub timeout: Option<Duration>,
}

impl Default for AwaitOptions {
    fn default() -> Self {
        Self {
            poll_floor: Duration::from_millis(100),
            poll_ceiling: Duration::from_secs(2),
            check_healthy_workers: true,
            timeout: None,
        }
    }
}

/// Final state of one awaited job.
#[derive(Debug)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub error: Option<JobError>,
    /// `Some` only when `status` is `Completed`.
    pub entry: Option<CacheEntry>,
    /// Echoes back whatever correlation token the caller supplied at
    /// `submit` time, so a caller tracking work by its own token rather than
    /// by `JobId` can still match this result to its request.
    pub correlation: Option<Correlation>,
    /// Set when `await_all`'s `timeout` elapsed before this job reached a
    /// terminal status. `status` still reflects whatever was last polled
    /// (`pending`/`processing`); the job itself is untouched — a timed-out
    /// wait never cancels anything.
    pub timed_out: bool,
}

/// The Processing Backend: the caller-facing surface that sits
/// in front of the Queue Service. `submit` consults the two-tier cache
/// before enqueuing anything; `await_all` polls job status with adaptive
/// backoff; `cancel_for_input`/`shutdown` pass through to the queue and to
/// this backend's own accept-new-work gate respectively.
///
/// The submit/poll/cancel shape here is the same one a client drives
/// against a remote daemon, adapted to an in-process queue instead of a
/// wire client; `await_all`'s sleep-loop polling follows the same pattern
/// a log-follow command would use.
pub struct ProcessingBackend<C: Clock = SystemClock> {
    queue: Arc<QueueService<C>>,
    result_cache: Arc<ResultCache>,
    clock: C,
    heartbeat_threshold: Duration,
    /// Root the relative `output_path` strings recorded on Jobs/Cache
    /// Entries are resolved against. Workers resolve `output_path` the same
    /// way against their own mounted workspace (see `oj-worker`'s
    /// `WorkerRuntime::workdir`) — this is the client-side counterpart used
    /// to materialize a cache hit that never ran a converter at all.
    workspace_dir: PathBuf,
    closed: AtomicBool,
}

impl<C: Clock> ProcessingBackend<C> {
    pub fn new(
        queue: Arc<QueueService<C>>,
        result_cache: Arc<ResultCache>,
        clock: C,
        heartbeat_threshold: Duration,
        workspace_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            queue,
            result_cache,
            clock,
            heartbeat_threshold,
            workspace_dir: workspace_dir.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Write `payload` to `output_path` under the workspace, creating parent
    /// directories first. Used for cache hits, which never invoke a
    /// converter and so have nobody else to write the file.
    async fn write_output(&self, output_path: &str, payload: &[u8]) -> Result<()> {
        let path = self.workspace_dir.join(output_path);
        let bytes = payload.to_vec();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_output_sync(&target, &bytes)).await??;
        Ok(())
    }

    /// Same as [`Self::write_output`] but skips the write entirely if the
    /// file is already there — the completing Worker normally already wrote
    /// it; this only covers the edge case where it hasn't.
    async fn write_output_if_missing(&self, output_path: &str, payload: &[u8]) -> Result<()> {
        let path = self.workspace_dir.join(output_path);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        self.write_output(output_path, payload).await
    }

    async fn cache_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ResultCache) -> oj_storage::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.result_cache.clone();
        let result = tokio::task::spawn_blocking(move || f(&cache)).await?;
        Ok(result?)
    }

    /// Look up `(output_path, fingerprint)` in the in-store `results_cache`
    /// table, then the cross-invocation [`ResultCache`] (spec.md §4.6's "(a)
    /// the in-store `results_cache` ... (b) the auxiliary persistent Result
    /// cache", in that order), and only enqueue a Job if neither has it.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        &self,
        kind: JobKind,
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        fingerprint: impl Into<String>,
        params: JobParams,
        correlation: Option<Correlation>,
        priority: i32,
    ) -> Result<SubmitOutcome> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::ShuttingDown);
        }

        let output_path = output_path.into();
        let fingerprint = fingerprint.into();

        if let Some(entry) = self.queue.cache_lookup(output_path.clone(), fingerprint.clone()).await? {
            self.write_output(&entry.output_path, &entry.payload).await?;
            debug!(output_path, fingerprint, "in-store result cache hit, skipping queue entirely");
            return Ok(SubmitOutcome::CacheHit(entry));
        }

        let now = self.clock.epoch_ms();
        let aux_hit = {
            let output_path = output_path.clone();
            let fingerprint = fingerprint.clone();
            self.cache_blocking(move |cache| cache.get(&output_path, &fingerprint)).await?
        };
        if let Some(entry) = aux_hit {
            let output_path = output_path.clone();
            let fingerprint = fingerprint.clone();
            self.cache_blocking(move |cache| cache.record_hit(&output_path, &fingerprint, now)).await?;
            self.write_output(&entry.output_path, &entry.payload).await?;
            debug!(output_path, fingerprint, "auxiliary result cache hit, skipping queue entirely");
            return Ok(SubmitOutcome::CacheHit(entry));
        }

        let job_id =
            self.queue.enqueue(kind, input_path, output_path, fingerprint, params, correlation, priority).await?;
        Ok(SubmitOutcome::Queued(job_id))
    }

    /// Block until every id in `job_ids` reaches a terminal status,
    /// returning each one's final outcome. Polls with an interval that
    /// backs off multiplicatively from `poll_floor` toward `poll_ceiling`
    /// whenever a tick sees no progress, and resets to `poll_floor` the
    /// moment any job's status changes.
    pub async fn await_all(&self, job_ids: &[JobId], options: AwaitOptions) -> Result<Vec<JobResult>> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }

        if options.check_healthy_workers {
            self.ensure_healthy_workers_for(job_ids).await?;
        }

        let deadline_ms = options.timeout.map(|t| self.clock.epoch_ms().saturating_add(t.as_millis() as u64));
        let mut last_statuses: HashMap<JobId, JobStatus> = HashMap::new();
        let mut interval = options.poll_floor;

        loop {
            let statuses = self.queue.poll_statuses(job_ids.to_vec()).await?;
            let all_terminal = statuses.values().all(|(status, _)| status.is_terminal());

            let progressed = statuses.iter().any(|(id, (status, _))| last_statuses.get(id) != Some(status));
            last_statuses = statuses.iter().map(|(id, (status, _))| (*id, *status)).collect();

            if all_terminal {
                return self.collect_results(job_ids, statuses, false).await;
            }

            if let Some(deadline_ms) = deadline_ms {
                if self.clock.epoch_ms() >= deadline_ms {
                    info!(pending = statuses.values().filter(|(s, _)| !s.is_terminal()).count(), "await_all timed out, giving up without cancelling");
                    return self.collect_results(job_ids, statuses, true).await;
                }
            }

            interval = if progressed { options.poll_floor } else { (interval * 2).min(options.poll_ceiling) };
            tokio::time::sleep(interval).await;
        }
    }

    async fn ensure_healthy_workers_for(&self, job_ids: &[JobId]) -> Result<()> {
        let now = self.clock.epoch_ms();
        let mut kinds_seen: Vec<JobKind> = Vec::new();
        for &id in job_ids {
            let Some(job) = self.queue.get_job(id).await? else { continue };
            if job.is_terminal() || kinds_seen.contains(&job.kind) {
                continue;
            }
            kinds_seen.push(job.kind);

            let workers = self.queue.list_workers(Some(job.kind)).await?;
            let healthy = workers.iter().any(|w| w.is_healthy(now, self.heartbeat_threshold));
            if !healthy {
                return Err(BackendError::NoHealthyWorker { kind: job.kind });
            }
        }
        Ok(())
    }

    async fn collect_results(
        &self,
        job_ids: &[JobId],
        statuses: HashMap<JobId, (JobStatus, Option<JobError>)>,
        timed_out_run: bool,
    ) -> Result<Vec<JobResult>> {
        let mut results = Vec::with_capacity(job_ids.len());
        for &id in job_ids {
            let (status, error) = statuses.get(&id).cloned().unwrap_or((JobStatus::Failed, None));
            let job = self.queue.get_job(id).await?;

            let entry = if status == JobStatus::Completed {
                match &job {
                    Some(job) => {
                        let looked_up =
                            self.queue.cache_lookup(job.output_path.clone(), job.fingerprint.clone()).await?;
                        if let Some(entry) = &looked_up {
                            self.write_output_if_missing(&entry.output_path, &entry.payload).await?;
                        }
                        looked_up
                    }
                    None => None,
                }
            } else {
                None
            };

            let correlation = job.and_then(|job| job.correlation);
            let timed_out = timed_out_run && !status.is_terminal();
            results.push(JobResult { job_id: id, status, error, entry, correlation, timed_out });
        }
        Ok(results)
    }

    pub async fn cancel_for_input(&self, input_path: impl Into<String>) -> Result<Vec<JobId>> {
        Ok(self.queue.cancel_for_input(input_path).await?)
    }

    /// Stop accepting new submissions. In-flight jobs already enqueued are
    /// left to run; callers that also own a Pool Manager/Lifecycle Manager
    /// are responsible for tearing those down separately.
    pub fn shutdown(&self) {
        info!("processing backend shutting down, no further submissions will be accepted");
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Close the submission gate, then wait up to `grace` for `job_ids` to
    /// finish (spec.md §4.6's `shutdown(grace)`). Jobs still non-terminal
    /// when `grace` elapses are reported with [`JobResult::timed_out`] set —
    /// not cancelled; a caller that also wants cancellation should call
    /// `cancel_for_input` itself before or after this returns.
    pub async fn shutdown_after(&self, job_ids: &[JobId], grace: Duration) -> Result<Vec<JobResult>> {
        self.shutdown();
        let options = AwaitOptions { timeout: Some(grace), check_healthy_workers: false, ..AwaitOptions::default() };
        self.await_all(job_ids, options).await
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn write_output_sync(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| BackendError::WriteOutput { path: path.to_path_buf(), source })?;
    }
    std::fs::write(path, payload).map_err(|source| BackendError::WriteOutput { path: path.to_path_buf(), source })
}
