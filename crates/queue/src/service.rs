// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Queue Service — a typed async API wrapping the
//! synchronous Durable Store, so `oj-worker`/`oj-pool`/`oj-backend` never
//! touch `rusqlite` directly. Every call hops to a blocking thread via
//! `tokio::task::spawn_blocking`, mirroring the same claim/dispatch/poll
//! split a dispatcher would use to keep blocking work off the async
//! runtime.

use crate::error::{QueueError, Result};
use oj_core::{
    CacheEntry, Clock, Correlation, ExecutionMode, Job, JobError, JobId, JobKind, JobParams,
    JobStatus, SystemClock, Worker, WorkerEvent, WorkerEventKind, WorkerId, WorkerStatus,
};
use oj_storage::{ClaimOutcome, CompleteOutcome, Store};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Typed async front for [`Store`]. Generic over [`Clock`] so tests can
/// drive it with a [`oj_core::FakeClock`] instead of the wall clock.
pub struct QueueService<C: Clock = SystemClock> {
    store: Arc<Store>,
    clock: C,
    /// One waiter per kind, notified on `enqueue` so an idle Worker blocked
    /// in `wait_for_work` wakes immediately instead of on its next poll
    /// tick — a plain in-process notify, since there is no cross-process
    /// wire protocol in this design.
    notify: HashMap<JobKind, Arc<Notify>>,
}

impl<C: Clock> QueueService<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        let notify = JobKind::all().into_iter().map(|k| (k, Arc::new(Notify::new()))).collect();
        Self { store, clock, notify }
    }

    fn notify_for(&self, kind: JobKind) -> Arc<Notify> {
        self.notify.get(&kind).cloned().unwrap_or_else(|| Arc::new(Notify::new()))
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> oj_storage::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || f(&store)).await?;
        Ok(result?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        kind: JobKind,
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        fingerprint: impl Into<String>,
        params: JobParams,
        correlation: Option<Correlation>,
        priority: i32,
    ) -> Result<JobId> {
        let now = self.clock.epoch_ms();
        let input_path = input_path.into();
        let output_path = output_path.into();
        let fingerprint = fingerprint.into();
        let id = self
            .blocking(move |store| {
                store.enqueue(kind, &input_path, &output_path, &fingerprint, &params, correlation.as_ref(), priority, now)
            })
            .await?;
        self.notify_for(kind).notify_one();
        Ok(id)
    }

    pub async fn claim_next(&self, kind: JobKind, worker_id: WorkerId) -> Result<ClaimOutcome> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.claim_next(kind, worker_id, now)).await
    }

    /// Blocks until `enqueue` wakes this kind's waiter or `timeout` elapses,
    /// whichever comes first — the idle-poll short-circuit a Worker Runtime
    /// uses instead of busy-waiting at the full poll interval.
    pub async fn wait_for_work(&self, kind: JobKind, timeout: Duration) {
        let notify = self.notify_for(kind);
        let _ = tokio::time::timeout(timeout, notify.notified()).await;
    }

    pub async fn complete_success(
        &self,
        job_id: JobId,
        payload: Vec<u8>,
        metadata: serde_json::Value,
    ) -> Result<CompleteOutcome> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.complete_success(job_id, &payload, &metadata, now)).await
    }

    pub async fn complete_failure(&self, job_id: JobId, error: JobError) -> Result<CompleteOutcome> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.complete_failure(job_id, &error, now)).await
    }

    pub async fn cancel_for_input(&self, input_path: impl Into<String>) -> Result<Vec<JobId>> {
        let input_path = input_path.into();
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.cancel_for_input(&input_path, now)).await
    }

    pub async fn is_cancelled(&self, job_id: JobId) -> Result<bool> {
        self.blocking(move |store| store.is_cancelled(job_id)).await
    }

    pub async fn register_worker(&self, kind: JobKind, mode: ExecutionMode, external_handle: impl Into<String>) -> Result<WorkerId> {
        let now = self.clock.epoch_ms();
        let external_handle = external_handle.into();
        self.blocking(move |store| store.register_worker(kind, mode, &external_handle, now)).await
    }

    pub async fn heartbeat(&self, worker_id: WorkerId) -> Result<()> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.heartbeat(worker_id, now)).await
    }

    pub async fn mark_busy(&self, worker_id: WorkerId) -> Result<()> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.mark_busy(worker_id, now)).await
    }

    pub async fn mark_idle(&self, worker_id: WorkerId) -> Result<()> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.mark_idle(worker_id, now)).await
    }

    pub async fn set_worker_status(&self, worker_id: WorkerId, status: WorkerStatus) -> Result<()> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.set_worker_status(worker_id, status, now)).await
    }

    pub async fn stop_worker(&self, worker_id: WorkerId) -> Result<()> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.stop_worker(worker_id, now)).await
    }

    /// Idempotent reap pass; `oj-pool`'s supervision loop calls this on a
    /// timer rather than the Worker Runtime calling it on itself.
    pub async fn reclaim_dead_workers(&self, threshold: Duration) -> Result<Vec<JobId>> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.reclaim_dead_workers(threshold, now)).await
    }

    pub async fn poll_statuses(&self, job_ids: Vec<JobId>) -> Result<HashMap<JobId, (JobStatus, Option<JobError>)>> {
        self.blocking(move |store| store.poll_statuses(&job_ids)).await
    }

    pub async fn cache_lookup(&self, output_path: impl Into<String>, fingerprint: impl Into<String>) -> Result<Option<CacheEntry>> {
        let now = self.clock.epoch_ms();
        let output_path = output_path.into();
        let fingerprint = fingerprint.into();
        self.blocking(move |store| store.cache_lookup(&output_path, &fingerprint, now)).await
    }

    pub async fn get_worker(&self, worker_id: WorkerId) -> Result<Option<Worker>> {
        self.blocking(move |store| store.get_worker(worker_id)).await
    }

    pub async fn list_workers(&self, kind: Option<JobKind>) -> Result<Vec<Worker>> {
        self.blocking(move |store| store.list_workers(kind)).await
    }

    pub async fn record_event(&self, worker_id: Option<WorkerId>, kind: WorkerEventKind, data: serde_json::Value) -> Result<()> {
        let now = self.clock.epoch_ms();
        self.blocking(move |store| store.record_event(worker_id, kind, data, now)).await
    }

    pub async fn list_events(&self, limit: usize) -> Result<Vec<WorkerEvent>> {
        self.blocking(move |store| store.list_events(limit)).await
    }

    pub async fn increment_attempt(&self, job_id: JobId) -> Result<u32> {
        self.blocking(move |store| store.increment_attempt(job_id)).await
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Option<Job>> {
        self.blocking(move |store| store.get_job(job_id)).await
    }
}
