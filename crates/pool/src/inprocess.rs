// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `InProcessLauncher` — a [`oj_worker::WorkerLauncher`] that runs the Worker
//! Runtime as a plain tokio task in the same process instead of spawning a
//! child process or container. This is the topology spec §5 calls out as
//! "relevant when multiple worker kinds run in-process": the global
//! subprocess-invocation semaphore is only meaningful when several Worker
//! Runtimes genuinely share one process's permit pool, which is exactly
//! this launcher's case (and the one the end-to-end test harness uses).

use async_trait::async_trait;
use oj_core::{Clock, Converter, ExecutionMode, JobKind, OjConfig, SystemClock};
use oj_worker::{LaunchSpec, Result as WorkerResult, WorkerError, WorkerLauncher, WorkerRuntime};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Handle {
    task: JoinHandle<()>,
    shutdown: CancellationToken,
}

pub struct InProcessLauncher<C: Clock = SystemClock> {
    queue: Arc<oj_queue::QueueService<C>>,
    config: OjConfig,
    converters: HashMap<JobKind, Arc<dyn Converter>>,
    subprocess_permits: Arc<Semaphore>,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<String, Handle>>,
}

impl<C: Clock> InProcessLauncher<C> {
    pub fn new(
        queue: Arc<oj_queue::QueueService<C>>,
        config: OjConfig,
        converters: HashMap<JobKind, Arc<dyn Converter>>,
    ) -> Self {
        let subprocess_permits = Arc::new(Semaphore::new(config.global_subprocess_permits));
        Self { queue, config, converters, subprocess_permits, next_id: AtomicU64::new(1), tasks: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl<C: Clock> WorkerLauncher for InProcessLauncher<C> {
    async fn launch(&self, spec: &LaunchSpec) -> WorkerResult<String> {
        let converter = self
            .converters
            .get(&spec.kind)
            .cloned()
            .ok_or_else(|| WorkerError::LaunchFailed(format!("no in-process converter registered for kind {}", spec.kind)))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let external_handle = format!("inproc-{id}");
        let shutdown = CancellationToken::new();
        let runtime = WorkerRuntime::new(
            self.queue.clone(),
            self.config.clone(),
            spec.kind,
            ExecutionMode::Direct,
            external_handle.clone(),
            converter,
            spec.workspace_dir.clone(),
            self.subprocess_permits.clone(),
            shutdown.clone(),
        );
        let task = tokio::spawn(async move {
            if let Err(e) = runtime.run().await {
                tracing::warn!(error = %e, "in-process worker runtime exited with an error");
            }
        });
        self.tasks.lock().await.insert(external_handle.clone(), Handle { task, shutdown });
        Ok(external_handle)
    }

    async fn is_alive(&self, external_handle: &str) -> bool {
        match self.tasks.lock().await.get(external_handle) {
            Some(handle) => !handle.task.is_finished(),
            None => false,
        }
    }

    async fn terminate(&self, external_handle: &str) -> WorkerResult<()> {
        let tasks = self.tasks.lock().await;
        let handle = tasks.get(external_handle).ok_or_else(|| WorkerError::HandleNotFound(external_handle.to_string()))?;
        handle.shutdown.cancel();
        Ok(())
    }

    async fn kill(&self, external_handle: &str) -> WorkerResult<()> {
        let mut tasks = self.tasks.lock().await;
        let handle = tasks.remove(external_handle).ok_or_else(|| WorkerError::HandleNotFound(external_handle.to_string()))?;
        handle.shutdown.cancel();
        handle.task.abort();
        Ok(())
    }
}
