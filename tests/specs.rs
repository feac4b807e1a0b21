// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! End-to-end scenarios exercising the whole stack together: Durable Store,
//! Queue Service, Worker Runtime, Pool Manager, Lifecycle Manager, and
//! Processing Backend wired the way `oj`'s own commands wire them, against
//! `EchoConverter`/`FlakyConverter` stand-ins instead of real renderers.

use oj_backend::{AwaitOptions, ProcessingBackend, SubmitOutcome};
use oj_convert::{EchoConverter, FlakyConverter};
use oj_core::{fingerprint, ErrorKind, ExecutionMode, JobKind, OjConfig, RetryPolicy, SystemClock};
use oj_lifecycle::{LifecycleFlags, LifecycleManager};
use oj_pool::{InProcessLauncher, PoolConfig, PoolManager};
use oj_queue::QueueService;
use oj_storage::{ResultCache, Store};
use oj_worker::WorkerLauncher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn notebook_params() -> oj_core::JobParams {
    oj_core::JobParams::Notebook(oj_core::kind::NotebookParams { template: "default".into(), extract_code: false })
}

struct Harness {
    _dir: TempDir,
    config: OjConfig,
    queue: Arc<QueueService<SystemClock>>,
    result_cache: Arc<ResultCache>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = OjConfig {
            store_dir: dir.path().to_path_buf(),
            lock_retry: RetryPolicy { max_attempts: 3, ..RetryPolicy::default() },
            heartbeat_threshold: Duration::from_secs(10),
            poll_interval: Duration::from_millis(20),
            converter_timeout: Duration::from_secs(5),
            ..OjConfig::default()
        };
        let store = Store::open(&config.jobs_db_path(), config.lock_retry).expect("open store");
        let result_cache = ResultCache::open(&config.cache_db_path()).expect("open cache");
        let queue = Arc::new(QueueService::new(Arc::new(store), SystemClock));
        Self { _dir: dir, config, queue, result_cache: Arc::new(result_cache) }
    }

    fn backend(&self, workspace_dir: &std::path::Path) -> ProcessingBackend<SystemClock> {
        ProcessingBackend::new(
            self.queue.clone(),
            self.result_cache.clone(),
            SystemClock,
            self.config.heartbeat_threshold,
            workspace_dir,
        )
    }

    fn pool(&self, converters: HashMap<JobKind, Arc<dyn oj_core::Converter>>) -> Arc<PoolManager<SystemClock>> {
        let launcher: Arc<dyn WorkerLauncher> =
            Arc::new(InProcessLauncher::new(self.queue.clone(), self.config.clone(), converters));
        Arc::new(PoolManager::new(self.queue.clone(), launcher.clone(), launcher, PoolConfig::default()))
    }
}

fn write_input(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
    std::fs::write(dir.path().join(name), bytes).expect("write input");
    name.to_string()
}

/// Scenario 1: a job submitted against a fresh worker pool completes, and a
/// second submission with identical input bytes and params is served from
/// cache without re-running the converter.
#[tokio::test]
async fn happy_path_then_cache_hit_on_second_submit() {
    let h = Harness::new();
    let workspace = tempfile::tempdir().expect("workspace");
    let workspace_path = workspace.path().to_path_buf();
    let input_name = write_input(&workspace, "lec1.src", b"lecture one content");

    let mut converters: HashMap<JobKind, Arc<dyn oj_core::Converter>> = HashMap::new();
    converters.insert(JobKind::Notebook, Arc::new(EchoConverter));
    let pool = h.pool(converters);
    let lifecycle = LifecycleManager::new(SystemClock, pool.clone(), h.config.heartbeat_threshold);

    let mut desired = HashMap::new();
    desired.insert(JobKind::Notebook, (1, ExecutionMode::Direct));
    let report = lifecycle
        .reconcile(&desired, LifecycleFlags::default(), &workspace_path, &workspace_path, "unused")
        .await
        .expect("reconcile");
    assert_eq!(report.for_kind(JobKind::Notebook).started_now, 1);

    let backend = h.backend(&workspace_path);
    let params = notebook_params();
    let salt = params.salt();
    let input_bytes = std::fs::read(workspace.path().join(&input_name)).unwrap();
    let fp = fingerprint(&input_bytes, &salt);

    let outcome = backend
        .submit(JobKind::Notebook, input_name.clone(), "out1.html".to_string(), fp.clone(), params.clone(), None, 0)
        .await
        .expect("submit");
    let job_id = match outcome {
        SubmitOutcome::Queued(id) => id,
        SubmitOutcome::CacheHit(_) => panic!("expected a fresh job, not a cache hit"),
    };

    let results = backend.await_all(&[job_id], AwaitOptions::default()).await.expect("await_all");
    assert_eq!(results.len(), 1);
    let entry = results[0].entry.as_ref().expect("completed job has a cache entry");
    assert_eq!(entry.payload, b"lecture one content");

    let second = backend
        .submit(JobKind::Notebook, input_name, "out1.html".to_string(), fp, params, None, 0)
        .await
        .expect("second submit");
    match second {
        SubmitOutcome::CacheHit(entry) => assert_eq!(entry.payload, b"lecture one content"),
        SubmitOutcome::Queued(_) => panic!("second submit with identical bytes should hit cache"),
    }

    lifecycle.shutdown_invocation(Duration::from_secs(2)).await.expect("shutdown");
}

/// Scenario 2: a worker that stops heartbeating is reclaimed, and its claimed
/// job is returned to pending so a healthy worker can pick it up.
#[tokio::test]
async fn dead_worker_is_reclaimed_and_its_job_requeued() {
    let h = Harness::new();
    let worker_id = h.queue.register_worker(JobKind::Notebook, ExecutionMode::Direct, "stale-worker").await.unwrap();

    let params = notebook_params();
    let job_id = h
        .queue
        .enqueue(JobKind::Notebook, "in.src", "out.html", "fp", params, None, 0)
        .await
        .expect("enqueue");

    match h.queue.claim_next(JobKind::Notebook, worker_id).await.unwrap() {
        oj_storage::ClaimOutcome::Claimed(job) => assert_eq!(job.id, job_id),
        other => panic!("expected claim, got {other:?}"),
    }

    // Never heartbeat again; a zero-duration threshold makes any worker
    // immediately stale without needing to actually wait out a real clock.
    let reclaimed = h.queue.reclaim_dead_workers(Duration::from_secs(0)).await.expect("reclaim");
    assert!(reclaimed.contains(&job_id), "reclaim should report the in-flight job as requeued");

    let job = h.queue.get_job(job_id).await.unwrap().expect("job still exists");
    assert_eq!(job.status, oj_core::JobStatus::Pending);
    assert!(job.worker_id.is_none());
}

/// Scenario 3: cancelling a pending job for an input path stops it from
/// ever being claimed.
#[tokio::test]
async fn cancellation_prevents_a_pending_job_from_being_claimed() {
    let h = Harness::new();
    let params = notebook_params();
    let job_id = h
        .queue
        .enqueue(JobKind::Notebook, "cancel-me.src", "out.html", "fp", params, None, 0)
        .await
        .expect("enqueue");

    let cancelled = h.queue.cancel_for_input("cancel-me.src").await.expect("cancel");
    assert_eq!(cancelled, vec![job_id]);

    let worker_id = h.queue.register_worker(JobKind::Notebook, ExecutionMode::Direct, "w").await.unwrap();
    match h.queue.claim_next(JobKind::Notebook, worker_id).await.unwrap() {
        oj_storage::ClaimOutcome::NoJob => {}
        other => panic!("cancelled job should not be claimable, got {other:?}"),
    }

    let job = h.queue.get_job(job_id).await.unwrap().expect("job exists");
    assert_eq!(job.status, oj_core::JobStatus::Cancelled);
}

/// Scenario 4: the auxiliary result cache serves a hit without touching the
/// queue at all, even with no worker registered for the kind.
#[tokio::test]
async fn auxiliary_cache_hit_needs_no_worker() {
    let h = Harness::new();
    let workspace = tempfile::tempdir().expect("workspace");
    let backend = h.backend(workspace.path());

    let entry = oj_core::CacheEntry {
        output_path: "out.html".into(),
        fingerprint: "precomputed-fp".into(),
        payload: b"already rendered".to_vec(),
        metadata: serde_json::json!({}),
        hit_count: 0,
        last_accessed_ms: 0,
    };
    h.result_cache.put(&entry, 1_000).expect("seed cache");

    let outcome = backend
        .submit(JobKind::Notebook, "whatever.src", "out.html", "precomputed-fp", notebook_params(), None, 0)
        .await
        .expect("submit");
    match outcome {
        SubmitOutcome::CacheHit(e) => assert_eq!(e.payload, b"already rendered"),
        SubmitOutcome::Queued(_) => panic!("expected an auxiliary cache hit"),
    }

    assert_eq!(
        std::fs::read(workspace.path().join("out.html")).expect("cache hit must materialize the output file"),
        b"already rendered",
    );
}

/// Scenario 5: awaiting a job whose kind has no healthy registered worker
/// fails fast instead of polling forever.
#[tokio::test]
async fn await_all_fails_fast_with_no_healthy_worker() {
    let h = Harness::new();
    let workspace = tempfile::tempdir().expect("workspace");
    let backend = h.backend(workspace.path());

    let outcome = backend
        .submit(JobKind::DiagramXml, "in.xml", "out.svg", "fp-no-worker", oj_core::JobParams::DiagramXml(oj_core::kind::DiagramXmlParams { theme: "default".into() }), None, 0)
        .await
        .expect("submit");
    let job_id = match outcome {
        SubmitOutcome::Queued(id) => id,
        SubmitOutcome::CacheHit(_) => panic!("fresh submission should not be a cache hit"),
    };

    let err = backend.await_all(&[job_id], AwaitOptions::default()).await.unwrap_err();
    match err {
        oj_backend::BackendError::NoHealthyWorker { kind } => assert_eq!(kind, JobKind::DiagramXml),
        other => panic!("expected NoHealthyWorker, got {other:?}"),
    }
}

/// Scenario 6: a converter that fails transiently on its first two attempts
/// then succeeds is retried and recorded with the right attempt count; a
/// converter that always fails exhausts the retry budget and surfaces the
/// failure.
#[tokio::test]
async fn bounded_retry_on_transient_failure_then_success() {
    let h = Harness::new();
    let workspace = tempfile::tempdir().expect("workspace");
    let workspace_path = workspace.path().to_path_buf();
    let input_name = write_input(&workspace, "flaky.src", b"retry me");

    let mut converters: HashMap<JobKind, Arc<dyn oj_core::Converter>> = HashMap::new();
    converters.insert(JobKind::Notebook, Arc::new(FlakyConverter::transient_then_success(2)));
    let pool = h.pool(converters);
    let lifecycle = LifecycleManager::new(SystemClock, pool.clone(), h.config.heartbeat_threshold);

    let mut desired = HashMap::new();
    desired.insert(JobKind::Notebook, (1, ExecutionMode::Direct));
    lifecycle
        .reconcile(&desired, LifecycleFlags::default(), &workspace_path, &workspace_path, "unused")
        .await
        .expect("reconcile");

    let backend = h.backend(&workspace_path);
    let params = notebook_params();
    let salt = params.salt();
    let input_bytes = std::fs::read(workspace.path().join(&input_name)).unwrap();
    let fp = fingerprint(&input_bytes, &salt);

    let job_id = match backend
        .submit(JobKind::Notebook, input_name, "flaky-out.html".to_string(), fp, params, None, 0)
        .await
        .expect("submit")
    {
        SubmitOutcome::Queued(id) => id,
        SubmitOutcome::CacheHit(_) => panic!("expected a fresh job"),
    };

    let results = backend.await_all(&[job_id], AwaitOptions::default()).await.expect("await_all");
    let entry = results[0].entry.as_ref().expect("eventually succeeds");
    assert_eq!(entry.payload, b"retry me");

    let job = h.queue.get_job(job_id).await.unwrap().expect("job exists");
    assert_eq!(job.attempt_count, 3, "two failed attempts plus the succeeding one");

    lifecycle.shutdown_invocation(Duration::from_secs(2)).await.expect("shutdown");
}

/// A converter that never succeeds exhausts `converter_max_attempts` and the
/// job surfaces as permanently failed with a non-transient error kind.
#[tokio::test]
async fn always_failing_converter_exhausts_retry_budget() {
    let h = Harness::new();
    let workspace = tempfile::tempdir().expect("workspace");
    let workspace_path = workspace.path().to_path_buf();
    let input_name = write_input(&workspace, "doomed.src", b"never works");

    let mut converters: HashMap<JobKind, Arc<dyn oj_core::Converter>> = HashMap::new();
    converters.insert(JobKind::Notebook, Arc::new(FlakyConverter::always_fails(ErrorKind::Transient)));
    let pool = h.pool(converters);
    let lifecycle = LifecycleManager::new(SystemClock, pool.clone(), h.config.heartbeat_threshold);

    let mut desired = HashMap::new();
    desired.insert(JobKind::Notebook, (1, ExecutionMode::Direct));
    lifecycle
        .reconcile(&desired, LifecycleFlags::default(), &workspace_path, &workspace_path, "unused")
        .await
        .expect("reconcile");

    let backend = h.backend(&workspace_path);
    let params = notebook_params();
    let job_id = match backend
        .submit(JobKind::Notebook, input_name, "doomed-out.html".to_string(), "doomed-fp".to_string(), params, None, 0)
        .await
        .expect("submit")
    {
        SubmitOutcome::Queued(id) => id,
        SubmitOutcome::CacheHit(_) => panic!("expected a fresh job"),
    };

    let results = backend.await_all(&[job_id], AwaitOptions::default()).await.expect("await_all");
    assert_eq!(results[0].status, oj_core::JobStatus::Failed);
    assert!(results[0].error.is_some());

    lifecycle.shutdown_invocation(Duration::from_secs(2)).await.expect("shutdown");
}
