use super::*;
use async_trait::async_trait;
use oj_core::test_support::{fake_clock, test_config};
use oj_core::{kind::NotebookParams, Correlation, FakeClock, JobParams, JobStatus};
use oj_storage::test_support::open_test_store;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::tempdir;

struct ScriptedConverter {
    fail_first: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Converter for ScriptedConverter {
    async fn convert(
        &self,
        _input: &Path,
        output: &Path,
        _params: &JobParams,
        _progress: ProgressReporter,
    ) -> std::result::Result<ConvertOutcome, ConverterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(ConverterError::new(ErrorKind::Transient, "flaky failure"));
        }
        tokio::fs::write(output, b"rendered").await.unwrap();
        Ok(ConvertOutcome::new(b"rendered".to_vec()))
    }
}

struct AlwaysInputError;

#[async_trait]
impl Converter for AlwaysInputError {
    async fn convert(
        &self,
        _input: &Path,
        _output: &Path,
        _params: &JobParams,
        _progress: ProgressReporter,
    ) -> std::result::Result<ConvertOutcome, ConverterError> {
        Err(ConverterError::new(ErrorKind::InputError, "bad reference"))
    }
}

fn setup() -> (Arc<oj_queue::QueueService<FakeClock>>, tempfile::TempDir) {
    let test_store = open_test_store();
    let dir = tempdir().unwrap();
    let queue = Arc::new(oj_queue::QueueService::new(Arc::new(test_store.store), fake_clock()));
    (queue, dir)
}

async fn await_terminal(queue: &oj_queue::QueueService<FakeClock>, job_id: oj_core::JobId) -> JobStatus {
    for _ in 0..200 {
        let job = queue.get_job(job_id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            return job.status;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never reached a terminal status");
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_completes_and_populates_cache() {
    let (queue, dir) = setup();
    std::fs::write(dir.path().join("lec1.src"), b"src").unwrap();

    let job_id = queue
        .enqueue(
            JobKind::Notebook,
            "lec1.src",
            "out.html",
            "AB",
            JobParams::Notebook(NotebookParams { template: "default".into(), extract_code: false }),
            Some(Correlation::new("corr-1")),
            0,
        )
        .await
        .unwrap();

    let config = test_config(dir.path());
    let shutdown = CancellationToken::new();
    let runtime = WorkerRuntime::new(
        queue.clone(),
        config,
        JobKind::Notebook,
        ExecutionMode::Direct,
        "pid:1",
        Arc::new(ScriptedConverter { fail_first: 0, calls: AtomicU32::new(0) }),
        dir.path().to_path_buf(),
        Arc::new(tokio::sync::Semaphore::new(4)),
        shutdown.clone(),
    );

    let handle = tokio::spawn(async move { runtime.run().await });
    let status = await_terminal(&queue, job_id).await;
    assert_eq!(status, JobStatus::Completed);

    let entry = queue.cache_lookup("out.html", "AB").await.unwrap();
    assert_eq!(entry.unwrap().payload, b"rendered");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_retries_then_succeeds() {
    let (queue, dir) = setup();
    std::fs::write(dir.path().join("lec1.src"), b"src").unwrap();

    let job_id = queue
        .enqueue(
            JobKind::Notebook,
            "lec1.src",
            "out.html",
            "AB",
            JobParams::Notebook(NotebookParams { template: "default".into(), extract_code: false }),
            None,
            0,
        )
        .await
        .unwrap();

    let config = test_config(dir.path());
    let shutdown = CancellationToken::new();
    let runtime = WorkerRuntime::new(
        queue.clone(),
        config,
        JobKind::Notebook,
        ExecutionMode::Direct,
        "pid:2",
        Arc::new(ScriptedConverter { fail_first: 2, calls: AtomicU32::new(0) }),
        dir.path().to_path_buf(),
        Arc::new(tokio::sync::Semaphore::new(4)),
        shutdown.clone(),
    );

    let handle = tokio::spawn(async move { runtime.run().await });
    let status = await_terminal(&queue, job_id).await;
    assert_eq!(status, JobStatus::Completed);

    let job = queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.attempt_count, 3);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn input_error_fails_without_retry() {
    let (queue, dir) = setup();
    std::fs::write(dir.path().join("lec1.src"), b"src").unwrap();

    let job_id = queue
        .enqueue(
            JobKind::Notebook,
            "lec1.src",
            "out.html",
            "AB",
            JobParams::Notebook(NotebookParams { template: "default".into(), extract_code: false }),
            None,
            0,
        )
        .await
        .unwrap();

    let config = test_config(dir.path());
    let shutdown = CancellationToken::new();
    let runtime = WorkerRuntime::new(
        queue.clone(),
        config,
        JobKind::Notebook,
        ExecutionMode::Direct,
        "pid:3",
        Arc::new(AlwaysInputError),
        dir.path().to_path_buf(),
        Arc::new(tokio::sync::Semaphore::new(4)),
        shutdown.clone(),
    );

    let handle = tokio::spawn(async move { runtime.run().await });
    let status = await_terminal(&queue, job_id).await;
    assert_eq!(status, JobStatus::Failed);

    let job = queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.attempt_count, 1);
    assert_eq!(job.error.unwrap().kind, ErrorKind::InputError);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}
