use crate::{LifecycleFlags, LifecycleManager};
use oj_core::test_support::{fake_clock, test_config};
use oj_core::{ConvertOutcome, Converter, ConverterError, ErrorKind, ExecutionMode, FakeClock, JobKind, JobParams, ProgressReporter};
use oj_pool::{InProcessLauncher, PoolConfig, PoolManager};
use oj_storage::test_support::open_test_store;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct NoopConverter;

#[async_trait::async_trait]
impl Converter for NoopConverter {
    async fn convert(
        &self,
        _input: &Path,
        output: &Path,
        _params: &JobParams,
        _progress: ProgressReporter,
    ) -> std::result::Result<ConvertOutcome, ConverterError> {
        tokio::fs::write(output, b"ok").await.map_err(|e| ConverterError::new(ErrorKind::Infrastructure, e.to_string()))?;
        Ok(ConvertOutcome::new(b"ok".to_vec()))
    }
}

fn setup() -> (Arc<oj_queue::QueueService<FakeClock>>, TempDir) {
    let test_store = open_test_store();
    let dir = tempdir().expect("tempdir");
    let queue = Arc::new(oj_queue::QueueService::new(Arc::new(test_store.store), fake_clock()));
    (queue, dir)
}

fn pool(queue: Arc<oj_queue::QueueService<FakeClock>>, dir: &TempDir) -> Arc<PoolManager<FakeClock>> {
    let mut converters: HashMap<JobKind, Arc<dyn Converter>> = HashMap::new();
    converters.insert(JobKind::Notebook, Arc::new(NoopConverter));
    let direct = Arc::new(InProcessLauncher::new(queue.clone(), test_config(dir.path()), converters));
    Arc::new(PoolManager::new(queue, direct.clone(), direct, PoolConfig::default()))
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_launches_the_full_shortfall_with_nothing_registered() {
    let (queue, dir) = setup();
    let pool = pool(queue.clone(), &dir);
    let lifecycle = LifecycleManager::new(fake_clock(), pool.clone(), Duration::from_secs(30));

    let mut desired = HashMap::new();
    desired.insert(JobKind::Notebook, (3, ExecutionMode::Direct));
    let store_dir = dir.path().to_path_buf();

    let report = lifecycle.reconcile(&desired, LifecycleFlags::default(), &store_dir, &store_dir, "unused").await.expect("reconcile");

    let kind_report = report.for_kind(JobKind::Notebook);
    assert_eq!(kind_report.reused, 0);
    assert_eq!(kind_report.started_now, 3);
    assert_eq!(queue.list_workers(Some(JobKind::Notebook)).await.expect("list_workers").len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconcile_reuses_already_healthy_workers_before_launching_more() {
    let (queue, dir) = setup();
    let pool = pool(queue.clone(), &dir);
    let lifecycle = LifecycleManager::new(fake_clock(), pool.clone(), Duration::from_secs(30));

    let mut first = HashMap::new();
    first.insert(JobKind::Notebook, (2, ExecutionMode::Direct));
    let store_dir = dir.path().to_path_buf();
    lifecycle.reconcile(&first, LifecycleFlags::default(), &store_dir, &store_dir, "unused").await.expect("reconcile");

    let mut second = HashMap::new();
    second.insert(JobKind::Notebook, (3, ExecutionMode::Direct));
    let report =
        lifecycle.reconcile(&second, LifecycleFlags::default(), &store_dir, &store_dir, "unused").await.expect("second reconcile");

    let kind_report = report.for_kind(JobKind::Notebook);
    assert_eq!(kind_report.reused, 2);
    assert_eq!(kind_report.started_now, 1);
    assert_eq!(queue.list_workers(Some(JobKind::Notebook)).await.expect("list_workers").len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn reuse_workers_false_always_launches_the_full_count() {
    let (queue, dir) = setup();
    let pool = pool(queue.clone(), &dir);
    let lifecycle = LifecycleManager::new(fake_clock(), pool.clone(), Duration::from_secs(30));

    let mut desired = HashMap::new();
    desired.insert(JobKind::Notebook, (1, ExecutionMode::Direct));
    let store_dir = dir.path().to_path_buf();
    lifecycle.reconcile(&desired, LifecycleFlags::default(), &store_dir, &store_dir, "unused").await.expect("reconcile");

    let flags = LifecycleFlags { reuse_workers: false, ..LifecycleFlags::default() };
    let report = lifecycle.reconcile(&desired, flags, &store_dir, &store_dir, "unused").await.expect("second reconcile");

    assert_eq!(report.for_kind(JobKind::Notebook).reused, 0);
    assert_eq!(report.for_kind(JobKind::Notebook).started_now, 1);
    assert_eq!(queue.list_workers(Some(JobKind::Notebook)).await.expect("list_workers").len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_invocation_stops_only_workers_it_launched() {
    let (queue, dir) = setup();
    let pool = pool(queue.clone(), &dir);
    let lifecycle = LifecycleManager::new(fake_clock(), pool.clone(), Duration::from_secs(30));
    let store_dir = dir.path().to_path_buf();

    let mut persistent = HashMap::new();
    persistent.insert(JobKind::Notebook, (1, ExecutionMode::Direct));
    let persistent_flags = LifecycleFlags { auto_stop: false, ..LifecycleFlags::default() };
    lifecycle.reconcile(&persistent, persistent_flags, &store_dir, &store_dir, "unused").await.expect("persistent reconcile");

    let mut desired = HashMap::new();
    desired.insert(JobKind::Notebook, (3, ExecutionMode::Direct));
    lifecycle.reconcile(&desired, LifecycleFlags::default(), &store_dir, &store_dir, "unused").await.expect("scoped reconcile");

    lifecycle.shutdown_invocation(Duration::from_secs(1)).await.expect("shutdown_invocation");

    let workers = queue.list_workers(Some(JobKind::Notebook)).await.expect("list_workers");
    assert_eq!(workers.len(), 3);
    assert_eq!(workers.iter().filter(|w| w.status == oj_core::WorkerStatus::Stopped).count(), 2);
    assert_eq!(workers.iter().filter(|w| w.status != oj_core::WorkerStatus::Stopped).count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_invocation_is_a_noop_when_auto_stop_is_false() {
    let (queue, dir) = setup();
    let pool = pool(queue.clone(), &dir);
    let lifecycle = LifecycleManager::new(fake_clock(), pool.clone(), Duration::from_secs(30));
    let store_dir = dir.path().to_path_buf();

    let mut desired = HashMap::new();
    desired.insert(JobKind::Notebook, (2, ExecutionMode::Direct));
    let flags = LifecycleFlags { auto_stop: false, ..LifecycleFlags::default() };
    lifecycle.reconcile(&desired, flags, &store_dir, &store_dir, "unused").await.expect("reconcile");

    lifecycle.shutdown_invocation(Duration::from_secs(1)).await.expect("shutdown_invocation");

    let workers = queue.list_workers(Some(JobKind::Notebook)).await.expect("list_workers");
    assert_eq!(workers.len(), 2);
    assert!(workers.iter().all(|w| w.status != oj_core::WorkerStatus::Stopped));

    pool.shutdown_all(Duration::from_secs(1)).await.expect("final cleanup");
}
