// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::QueueService;
use oj_core::{ExecutionMode, FakeClock, JobKind, JobStatus, NotebookParams, WorkerEventKind, WorkerStatus};
use oj_storage::ClaimOutcome;
use std::sync::Arc;
use std::time::Duration;

fn service() -> (tempfile::TempDir, QueueService<FakeClock>) {
    let test_store = oj_storage::test_support::open_test_store();
    let clock = FakeClock::new();
    clock.set_epoch_ms(0);
    let svc = QueueService::new(Arc::new(test_store.store), clock);
    (test_store.dir, svc)
}

fn params() -> oj_core::JobParams {
    oj_core::JobParams::Notebook(NotebookParams { template: "default".into(), extract_code: false })
}

#[tokio::test]
async fn enqueue_and_claim_round_trip() {
    let (_dir, svc) = service();
    let worker_id = svc.register_worker(JobKind::Notebook, ExecutionMode::Direct, "pid:1").await.unwrap();
    let job_id = svc.enqueue(JobKind::Notebook, "a.ipynb", "a.html", "fp", params(), None, 0).await.unwrap();

    match svc.claim_next(JobKind::Notebook, worker_id).await.unwrap() {
        ClaimOutcome::Claimed(job) => assert_eq!(job.id, job_id),
        other => panic!("expected Claimed, got {other:?}"),
    }
}

#[tokio::test]
async fn claim_next_rejects_busy_worker() {
    let (_dir, svc) = service();
    let worker_id = svc.register_worker(JobKind::Notebook, ExecutionMode::Direct, "pid:1").await.unwrap();
    svc.set_worker_status(worker_id, WorkerStatus::Busy).await.unwrap();
    svc.enqueue(JobKind::Notebook, "a.ipynb", "a.html", "fp", params(), None, 0).await.unwrap();

    match svc.claim_next(JobKind::Notebook, worker_id).await.unwrap() {
        ClaimOutcome::WorkerNotIdle => {}
        other => panic!("expected WorkerNotIdle, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_for_work_wakes_on_enqueue() {
    let (_dir, svc) = service();
    let svc = Arc::new(svc);
    let waiter = tokio::spawn({
        let svc = svc.clone();
        async move { svc.wait_for_work(JobKind::Notebook, Duration::from_secs(5)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    svc.enqueue(JobKind::Notebook, "a.ipynb", "a.html", "fp", params(), None, 0).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
}

#[tokio::test]
async fn complete_success_is_visible_via_poll_statuses() {
    let (_dir, svc) = service();
    let worker_id = svc.register_worker(JobKind::Notebook, ExecutionMode::Direct, "pid:1").await.unwrap();
    let job_id = svc.enqueue(JobKind::Notebook, "a.ipynb", "a.html", "fp", params(), None, 0).await.unwrap();
    svc.claim_next(JobKind::Notebook, worker_id).await.unwrap();
    svc.complete_success(job_id, b"<html/>".to_vec(), serde_json::json!({})).await.unwrap();

    let statuses = svc.poll_statuses(vec![job_id]).await.unwrap();
    assert_eq!(statuses[&job_id].0, JobStatus::Completed);
}

#[tokio::test]
async fn cancel_for_input_reaches_pending_job() {
    let (_dir, svc) = service();
    let job_id = svc.enqueue(JobKind::Notebook, "a.ipynb", "a.html", "fp", params(), None, 0).await.unwrap();
    let cancelled = svc.cancel_for_input("a.ipynb").await.unwrap();
    assert_eq!(cancelled, vec![job_id]);
    assert!(svc.is_cancelled(job_id).await.unwrap());
}

#[tokio::test]
async fn reclaim_dead_workers_requeues_job() {
    let (_dir, svc) = service();
    let worker_id = svc.register_worker(JobKind::Notebook, ExecutionMode::Direct, "pid:1").await.unwrap();
    let job_id = svc.enqueue(JobKind::Notebook, "a.ipynb", "a.html", "fp", params(), None, 0).await.unwrap();
    svc.claim_next(JobKind::Notebook, worker_id).await.unwrap();

    let reclaimed = svc.reclaim_dead_workers(Duration::from_millis(0)).await.unwrap();
    assert_eq!(reclaimed, vec![job_id]);
    let worker = svc.get_worker(worker_id).await.unwrap().unwrap();
    assert_eq!(worker.status, WorkerStatus::Dead);
}

#[tokio::test]
async fn record_event_is_listed_newest_first() {
    let (_dir, svc) = service();
    let worker_id = svc.register_worker(JobKind::Notebook, ExecutionMode::Direct, "pid:1").await.unwrap();
    svc.record_event(Some(worker_id), WorkerEventKind::JobStarted, serde_json::json!({})).await.unwrap();
    let events = svc.list_events(5).await.unwrap();
    assert!(!events.is_empty());
}
