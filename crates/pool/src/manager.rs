// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::{PoolError, Result};
use oj_core::{Clock, ExecutionMode, JobKind, SystemClock, Worker, WorkerId, WorkerStatus};
use oj_worker::{LaunchSpec, WorkerLauncher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, instrument, warn};

/// Tunables for the Pool Manager.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Bound on how many workers may be mid-launch at once, independent of
    /// the per-process subprocess-invocation semaphore.
    pub launch_concurrency: usize,
    /// How long a single worker's launch may take, from spawn to the moment
    /// its registration row appears in the Durable Store (30s).
    pub launch_timeout: Duration,
    /// How often the supervision loop checks heartbeats and external
    /// handles (~5s).
    pub supervise_interval: Duration,
    /// Heartbeat staleness threshold passed through to `reclaim_dead_workers`.
    pub heartbeat_threshold: Duration,
    /// A worker is not auto-restarted once it has failed this many jobs in a
    /// row without completing one, to avoid a crash-restart loop burning
    /// launches forever.
    pub restart_failure_threshold: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            launch_concurrency: 8,
            launch_timeout: Duration::from_secs(30),
            supervise_interval: Duration::from_secs(5),
            heartbeat_threshold: Duration::from_secs(30),
            restart_failure_threshold: 3,
        }
    }
}

/// How many workers of a kind were reused versus freshly launched, reported
/// back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub launched: usize,
    pub failed: usize,
}

struct Managed {
    kind: JobKind,
    mode: ExecutionMode,
    external_handle: String,
}

/// Owns the desired `{kind: (count, mode)}` worker set for one store,
/// launching it through a [`WorkerLauncher`] per mode and supervising it on
/// a timer until `shutdown` is called.
pub struct PoolManager<C: Clock = SystemClock> {
    queue: Arc<oj_queue::QueueService<C>>,
    direct_launcher: Arc<dyn WorkerLauncher>,
    container_launcher: Arc<dyn WorkerLauncher>,
    config: PoolConfig,
    launch_semaphore: Arc<Semaphore>,
    managed: Mutex<HashMap<WorkerId, Managed>>,
}

impl<C: Clock> PoolManager<C> {
    pub fn new(
        queue: Arc<oj_queue::QueueService<C>>,
        direct_launcher: Arc<dyn WorkerLauncher>,
        container_launcher: Arc<dyn WorkerLauncher>,
        config: PoolConfig,
    ) -> Self {
        let launch_semaphore = Arc::new(Semaphore::new(config.launch_concurrency));
        Self { queue, direct_launcher, container_launcher, config, launch_semaphore, managed: Mutex::new(HashMap::new()) }
    }

    fn launcher_for(&self, mode: ExecutionMode) -> Arc<dyn WorkerLauncher> {
        match mode {
            ExecutionMode::Direct => self.direct_launcher.clone(),
            ExecutionMode::Containerized => self.container_launcher.clone(),
        }
    }

    /// The launcher this pool uses for a given execution mode, exposed so
    /// `oj-lifecycle` can run its own `is_alive` checks against
    /// reuse-candidate workers that may predate this `PoolManager` instance
    /// (and so may not appear in its own `managed` set).
    pub fn launcher_for_mode(&self, mode: ExecutionMode) -> Arc<dyn WorkerLauncher> {
        self.launcher_for(mode)
    }

    /// The Queue Service this pool was built with, exposed so
    /// `oj-lifecycle` can query the worker registry directly when deciding
    /// whether to reuse existing workers.
    pub fn queue(&self) -> &Arc<oj_queue::QueueService<C>> {
        &self.queue
    }

    /// Launch the desired `{kind: (count, mode)}` configuration in parallel,
    /// bounded by `launch_concurrency`. One failed launch does not abort the
    /// others; the per-kind [`LaunchReport`] records how many succeeded.
    pub async fn launch_all(
        &self,
        desired: &HashMap<JobKind, (usize, ExecutionMode)>,
        store_dir: &PathBuf,
        workspace_dir: &PathBuf,
        worker_binary_or_image: &str,
    ) -> HashMap<JobKind, LaunchReport> {
        let mut kinds = Vec::new();
        let mut launches = Vec::new();
        for (&kind, &(count, mode)) in desired {
            for _ in 0..count {
                kinds.push(kind);
                launches.push(self.launch_one(kind, mode, store_dir.clone(), workspace_dir.clone(), worker_binary_or_image.to_string()));
            }
        }

        let results = futures::future::join_all(launches).await;
        let mut reports: HashMap<JobKind, LaunchReport> = HashMap::new();
        for (kind, result) in kinds.into_iter().zip(results) {
            let report = reports.entry(kind).or_default();
            match result {
                Ok(_) => report.launched += 1,
                Err(e) => {
                    warn!(%kind, error = %e, "worker launch failed");
                    report.failed += 1;
                }
            }
        }
        reports
    }

    #[instrument(skip(self, store_dir, workspace_dir), fields(%kind, ?mode))]
    async fn launch_one(
        &self,
        kind: JobKind,
        mode: ExecutionMode,
        store_dir: PathBuf,
        workspace_dir: PathBuf,
        worker_binary_or_image: String,
    ) -> Result<WorkerId> {
        let _permit = match self.launch_semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return Err(PoolError::LaunchFailed {
                    kind,
                    source: oj_worker::WorkerError::LaunchFailed("launch concurrency semaphore closed".into()),
                })
            }
        };
        let launcher = self.launcher_for(mode);
        let spec = LaunchSpec { kind, store_dir, workspace_dir, worker_binary_or_image, extra_args: Vec::new() };

        let external_handle = tokio::time::timeout(self.config.launch_timeout, launcher.launch(&spec))
            .await
            .map_err(|_| PoolError::LaunchTimedOut { kind })?
            .map_err(|source| PoolError::LaunchFailed { kind, source })?;

        let worker_id = self.wait_for_registration(kind, &external_handle).await?;
        self.managed.lock().await.insert(worker_id, Managed { kind, mode, external_handle });
        info!(%kind, %worker_id, "worker launched and registered");
        Ok(worker_id)
    }

    /// Poll the Worker registry until a row with this launch's external
    /// handle appears, or the launch timeout elapses ("failure to
    /// observe registration within the launch window fails the attempt").
    async fn wait_for_registration(&self, kind: JobKind, external_handle: &str) -> Result<WorkerId> {
        let deadline = tokio::time::Instant::now() + self.config.launch_timeout;
        loop {
            let workers = self.queue.list_workers(Some(kind)).await?;
            if let Some(w) = workers.iter().find(|w| w.external_handle == external_handle) {
                return Ok(w.id);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PoolError::LaunchTimedOut { kind });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// One supervision pass: reap stale-heartbeat workers, then
    /// check each managed worker's external handle is still alive, marking
    /// it dead (and letting the next reap pass reclaim its jobs) if not.
    /// Crashed workers are replaced up to the desired count unless they have
    /// failed `restart_failure_threshold` jobs in a row.
    pub async fn supervise_once(&self, store_dir: &PathBuf, workspace_dir: &PathBuf, worker_binary_or_image: &str) -> Result<()> {
        self.queue.reclaim_dead_workers(self.config.heartbeat_threshold).await?;

        let dead: Vec<(WorkerId, JobKind, ExecutionMode, String)> = {
            let managed = self.managed.lock().await;
            let mut dead = Vec::new();
            for (&id, m) in managed.iter() {
                let launcher = self.launcher_for(m.mode);
                if !launcher.is_alive(&m.external_handle).await {
                    dead.push((id, m.kind, m.mode, m.external_handle.clone()));
                }
            }
            dead
        };

        for (worker_id, kind, mode, external_handle) in dead {
            warn!(%worker_id, %kind, external_handle, "worker external handle no longer alive");
            self.queue.set_worker_status(worker_id, WorkerStatus::Dead).await?;
            self.managed.lock().await.remove(&worker_id);

            let worker = self.queue.get_worker(worker_id).await?;
            let should_restart = worker.map(|w| w.jobs_failed < self.config.restart_failure_threshold).unwrap_or(true);
            if should_restart {
                if let Err(e) = self
                    .launch_one(kind, mode, store_dir.clone(), workspace_dir.clone(), worker_binary_or_image.to_string())
                    .await
                {
                    warn!(%kind, error = %e, "failed to relaunch crashed worker");
                }
            } else {
                warn!(%kind, %worker_id, "not restarting worker: crash-loop threshold reached");
            }
        }

        Ok(())
    }

    /// Run `supervise_once` on a timer until `shutdown` is called.
    pub async fn run_supervisor(
        self: Arc<Self>,
        store_dir: PathBuf,
        workspace_dir: PathBuf,
        worker_binary_or_image: String,
        shutdown: tokio_util::sync::CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.supervise_interval) => {
                    if let Err(e) = self.supervise_once(&store_dir, &workspace_dir, &worker_binary_or_image).await {
                        warn!(error = %e, "supervision pass failed");
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }
    }

    /// Stop every managed worker in parallel, each with `grace` to exit on
    /// its own (`terminate`) before being force-stopped (`kill`), then mark
    /// every surviving row `stopped` in the Durable Store.
    pub async fn shutdown_all(&self, grace: Duration) -> Result<()> {
        let managed: Vec<(WorkerId, ExecutionMode, String)> =
            self.managed.lock().await.iter().map(|(&id, m)| (id, m.mode, m.external_handle.clone())).collect();
        self.shutdown_subset(&managed.iter().map(|(id, ..)| *id).collect::<Vec<_>>(), grace).await
    }

    /// Stop only the given managed worker ids, leaving any other managed
    /// workers (and all non-managed/persistent ones) running. Grounds
    /// `oj-lifecycle`'s "stop only the workers *this invocation* started"
    /// policy on top of this crate's own launch bookkeeping,
    /// rather than duplicating the terminate/grace/kill sequence there.
    pub async fn shutdown_subset(&self, ids: &[WorkerId], grace: Duration) -> Result<()> {
        let targets: Vec<(WorkerId, ExecutionMode, String)> = {
            let managed = self.managed.lock().await;
            ids.iter().filter_map(|id| managed.get(id).map(|m| (*id, m.mode, m.external_handle.clone()))).collect()
        };

        let mut tasks = Vec::new();
        for (worker_id, mode, external_handle) in targets {
            let launcher = self.launcher_for(mode);
            tasks.push(async move {
                let _ = launcher.terminate(&external_handle).await;
                if tokio::time::timeout(grace, wait_until_dead(&*launcher, &external_handle)).await.is_err() {
                    warn!(%worker_id, external_handle, "worker did not stop within grace period, killing");
                    let _ = launcher.kill(&external_handle).await;
                }
                worker_id
            });
        }

        let worker_ids: Vec<WorkerId> = futures::future::join_all(tasks).await;
        let mut managed = self.managed.lock().await;
        for worker_id in &worker_ids {
            managed.remove(worker_id);
        }
        drop(managed);
        for worker_id in worker_ids {
            self.queue.stop_worker(worker_id).await?;
        }
        Ok(())
    }

    pub async fn list_managed(&self) -> Vec<Worker> {
        let ids: Vec<WorkerId> = self.managed.lock().await.keys().copied().collect();
        let mut workers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(Some(w)) = self.queue.get_worker(id).await {
                workers.push(w);
            }
        }
        workers
    }

    /// Ids of every worker this `PoolManager` has launched and is still
    /// tracking (not necessarily all from one caller's invocation — used by
    /// `oj-lifecycle` to diff "managed set before" against "managed set
    /// after" a `launch_all` call to find just the workers it started).
    pub async fn managed_ids(&self) -> Vec<WorkerId> {
        self.managed.lock().await.keys().copied().collect()
    }
}

async fn wait_until_dead(launcher: &dyn WorkerLauncher, external_handle: &str) {
    while launcher.is_alive(external_handle).await {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
