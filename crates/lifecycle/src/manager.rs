// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::Result;
use oj_core::{Clock, ExecutionMode, JobKind, SystemClock, WorkerId};
use oj_pool::PoolManager;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Knobs a caller passes into [`LifecycleManager::reconcile`].
#[derive(Debug, Clone, Copy)]
pub struct LifecycleFlags {
    /// Launch fresh workers to cover any shortfall after reuse.
    pub auto_start: bool,
    /// Stop, at [`LifecycleManager::shutdown_invocation`], only the workers
    /// this reconcile launched — leaving reused/persistent workers running.
    pub auto_stop: bool,
    /// Consider already-registered healthy workers before launching new
    /// ones. With this `false`, every worker in `desired` is freshly
    /// launched regardless of what is already registered.
    pub reuse_workers: bool,
}

impl Default for LifecycleFlags {
    fn default() -> Self {
        Self { auto_start: true, auto_stop: true, reuse_workers: true }
    }
}

/// How many workers of one kind were reused from the existing registry
/// versus freshly launched to cover the shortfall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindReport {
    pub reused: usize,
    pub started_now: usize,
    pub failed: usize,
}

/// Per-kind outcome of a [`LifecycleManager::reconcile`] call.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport(pub HashMap<JobKind, KindReport>);

impl ReconcileReport {
    pub fn for_kind(&self, kind: JobKind) -> KindReport {
        self.0.get(&kind).copied().unwrap_or_default()
    }
}

/// Reconciles a desired worker configuration against the existing registry
/// and the Pool Manager's launch capability, and remembers which workers it
/// launched so a later, scoped shutdown leaves everything else running.
pub struct LifecycleManager<C: Clock = SystemClock> {
    clock: C,
    pool: Arc<PoolManager<C>>,
    heartbeat_threshold: Duration,
    managed_this_invocation: Mutex<Vec<WorkerId>>,
    auto_stop: Mutex<bool>,
}

impl<C: Clock> LifecycleManager<C> {
    pub fn new(clock: C, pool: Arc<PoolManager<C>>, heartbeat_threshold: Duration) -> Self {
        Self {
            clock,
            pool,
            heartbeat_threshold,
            managed_this_invocation: Mutex::new(Vec::new()),
            auto_stop: Mutex::new(false),
        }
    }

    /// Bring the registered worker population in line with `desired`
    /// (`{kind: (count, mode)}`). For each kind, healthy already-registered
    /// workers of that kind count toward `count` before anything is
    /// launched (when `flags.reuse_workers`); any shortfall is launched
    /// through the Pool Manager in one batched `launch_all` call (when
    /// `flags.auto_start`). `flags.auto_stop` is remembered for
    /// [`shutdown_invocation`](Self::shutdown_invocation).
    pub async fn reconcile(
        &self,
        desired: &HashMap<JobKind, (usize, ExecutionMode)>,
        flags: LifecycleFlags,
        store_dir: &PathBuf,
        workspace_dir: &PathBuf,
        worker_binary_or_image: &str,
    ) -> Result<ReconcileReport> {
        *self.auto_stop.lock().await = flags.auto_stop;

        let mut reports: HashMap<JobKind, KindReport> = HashMap::new();
        let mut to_launch: HashMap<JobKind, (usize, ExecutionMode)> = HashMap::new();
        let now = self.clock.epoch_ms();

        for (&kind, &(count, mode)) in desired {
            let reused = if flags.reuse_workers {
                self.healthy_worker_count(kind, now).await?
            } else {
                0
            };
            let reused = reused.min(count);
            let shortfall = count.saturating_sub(reused);
            reports.insert(kind, KindReport { reused, started_now: 0, failed: 0 });

            if flags.auto_start && shortfall > 0 {
                to_launch.insert(kind, (shortfall, mode));
            }
        }

        if to_launch.is_empty() {
            return Ok(ReconcileReport(reports));
        }

        let before: std::collections::HashSet<WorkerId> = self.pool.managed_ids().await.into_iter().collect();
        let launch_reports = self.pool.launch_all(&to_launch, store_dir, workspace_dir, worker_binary_or_image).await;
        let after = self.pool.managed_ids().await;

        for (kind, report) in launch_reports {
            let entry = reports.entry(kind).or_default();
            entry.started_now = report.launched;
            entry.failed = report.failed;
        }

        let mut newly_managed = self.managed_this_invocation.lock().await;
        newly_managed.extend(after.into_iter().filter(|id| !before.contains(id)));

        info!(kinds = reports.len(), "reconciled worker population");
        Ok(ReconcileReport(reports))
    }

    async fn healthy_worker_count(&self, kind: JobKind, now_ms: u64) -> Result<usize> {
        let workers = self.pool.queue().list_workers(Some(kind)).await?;
        let mut count = 0;
        for worker in workers {
            if !worker.is_healthy(now_ms, self.heartbeat_threshold) {
                continue;
            }
            if self.pool.launcher_for_mode(worker.mode).is_alive(&worker.external_handle).await {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Stop only the workers launched by [`reconcile`](Self::reconcile)
    /// calls so far, if `auto_stop` was set on the most recent one.
    /// Reused and persistent workers are left running. A no-op when
    /// `auto_stop` was `false` or nothing was launched this invocation.
    pub async fn shutdown_invocation(&self, grace: Duration) -> Result<()> {
        if !*self.auto_stop.lock().await {
            return Ok(());
        }
        let ids: Vec<WorkerId> = self.managed_this_invocation.lock().await.drain(..).collect();
        if ids.is_empty() {
            return Ok(());
        }
        self.pool.shutdown_subset(&ids, grace).await?;
        Ok(())
    }
}
