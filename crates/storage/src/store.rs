// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Durable Store — the four `jobs`/`workers`/`worker_events`/
//! `results_cache` relations behind a synchronous, per-checkout `rusqlite`
//! connection pool, with `BEGIN IMMEDIATE` serializing every writer.
//!
//! Grounded on the pack's `apalis-sql` `SqliteStorage` for the
//! claim-as-single-statement-pair pattern, adapted to rollback-journal mode
//! and per-thread connection ownership per spec.md's explicit constraints
//! (see DESIGN.md).

use crate::error::{Result, StorageError};
use crate::migrations::migrate;
use crate::pool::{open_pool, Pool};
use oj_core::{
    CacheEntry, Correlation, ErrorKind, ExecutionMode, Job, JobError, JobId, JobKind, JobParams,
    JobStatus, RetryPolicy, Worker, WorkerEvent, WorkerEventKind, WorkerId, WorkerStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Outcome of an attempted claim (claim is atomic, rejects
/// claims from non-idle workers).
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Job),
    NoJob,
    WorkerNotIdle,
}

/// Outcome of `complete_*` — completing an already-terminal job is a no-op
/// with a warning event, absorbing the reaper/slow-worker race.
#[derive(Debug, PartialEq, Eq)]
pub enum CompleteOutcome {
    Applied,
    AlreadyTerminal,
}

pub struct Store {
    pool: Pool,
    lock_retry: RetryPolicy,
}

impl Store {
    pub fn open(path: &Path, lock_retry: RetryPolicy) -> Result<Self> {
        let pool = open_pool(path)?;
        {
            let conn = pool.get()?;
            migrate(&conn).map_err(|e| match e {
                StorageError::Migration { version, source } => {
                    tracing::error!(version, error = %source, "jobs store migration failed");
                    StorageError::Migration { version, source }
                }
                other => other,
            })?;
        }
        Ok(Self { pool, lock_retry })
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, retrying on
    /// `SQLITE_BUSY`/`SQLITE_LOCKED` per the configured [`RetryPolicy`]
    /// (50ms, x2, cap 2s, 5 attempts).
    fn write_txn<T>(&self, f: impl Fn(&Transaction) -> rusqlite::Result<T>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut conn = self.pool.get()?;
            let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
                Ok(tx) => tx,
                Err(e) if is_busy(&e) => {
                    if self.lock_retry.exhausted(attempt) {
                        return Err(StorageError::Busy { attempts: attempt });
                    }
                    std::thread::sleep(self.lock_retry.delay_for(attempt));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match f(&tx) {
                Ok(v) => {
                    tx.commit()?;
                    return Ok(v);
                }
                Err(e) if is_busy(&e) => {
                    drop(tx);
                    if self.lock_retry.exhausted(attempt) {
                        return Err(StorageError::Busy { attempts: attempt });
                    }
                    std::thread::sleep(self.lock_retry.delay_for(attempt));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ---- enqueue / claim / complete ----------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &self,
        kind: JobKind,
        input_path: &str,
        output_path: &str,
        fingerprint: &str,
        params: &JobParams,
        correlation: Option<&Correlation>,
        priority: i32,
        now_ms: u64,
    ) -> Result<JobId> {
        let params_json = serde_json::to_string(params)?;
        self.write_txn(|tx| {
            tx.execute(
                "INSERT INTO jobs (kind, input_path, fingerprint, output_path, params, correlation, \
                 status, priority, created_at_ms, attempt_count) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
                params![
                    kind.as_str(),
                    input_path,
                    fingerprint,
                    output_path,
                    params_json,
                    correlation.map(|c| c.as_str()),
                    JobStatus::Pending.as_str(),
                    priority,
                    now_ms as i64,
                ],
            )?;
            Ok(JobId::new(tx.last_insert_rowid()))
        })
    }

    /// Atomically finds the oldest highest-priority pending Job of `kind`,
    /// claims it for `worker_id`. Rejects the claim outright if `worker_id`
    /// is not currently `idle` (prevents a reaped zombie worker from
    /// claiming new work).
    pub fn claim_next(&self, kind: JobKind, worker_id: WorkerId, now_ms: u64) -> Result<ClaimOutcome> {
        self.write_txn(|tx| {
            let worker_status: Option<String> = tx
                .query_row("SELECT status FROM workers WHERE id = ?1", params![worker_id.get()], |r| r.get(0))
                .optional()?;
            let Some(worker_status) = worker_status else {
                return Ok(ClaimOutcome::WorkerNotIdle);
            };
            if worker_status != WorkerStatus::Idle.as_str() {
                return Ok(ClaimOutcome::WorkerNotIdle);
            }

            let job_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM jobs WHERE kind = ?1 AND status = ?2 \
                     ORDER BY priority DESC, id ASC LIMIT 1",
                    params![kind.as_str(), JobStatus::Pending.as_str()],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(job_id) = job_id else {
                return Ok(ClaimOutcome::NoJob);
            };

            tx.execute(
                "UPDATE jobs SET status = ?1, worker_id = ?2, claimed_at_ms = ?3 WHERE id = ?4",
                params![JobStatus::Processing.as_str(), worker_id.get(), now_ms as i64, job_id],
            )?;
            let job = query_job(tx, job_id)?.expect("job just updated must exist");
            Ok(ClaimOutcome::Claimed(job))
        })
    }

    pub fn complete_success(
        &self,
        job_id: JobId,
        payload: &[u8],
        metadata: &serde_json::Value,
        now_ms: u64,
    ) -> Result<CompleteOutcome> {
        let compressed = zstd::encode_all(payload, 0)?;
        let metadata_json = serde_json::to_string(metadata)?;
        self.write_txn(|tx| {
            let Some(job) = query_job(tx, job_id.get())? else {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            };
            if job.status.is_terminal() {
                record_event_tx(
                    tx,
                    None,
                    WorkerEventKind::JobFinished,
                    serde_json::json!({"job_id": job_id.get(), "warning": "complete on terminal job ignored"}),
                    now_ms,
                )?;
                return Ok(CompleteOutcome::AlreadyTerminal);
            }

            tx.execute(
                "UPDATE jobs SET status = ?1, finished_at_ms = ?2 WHERE id = ?3",
                params![JobStatus::Completed.as_str(), now_ms as i64, job_id.get()],
            )?;
            tx.execute(
                "INSERT INTO results_cache (output_path, fingerprint, payload, metadata, hit_count, last_accessed_ms) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5) \
                 ON CONFLICT(output_path, fingerprint) DO UPDATE SET payload = excluded.payload, metadata = excluded.metadata",
                params![job.output_path, job.fingerprint, compressed, metadata_json, now_ms as i64],
            )?;
            if let Some(worker_id) = job.worker_id {
                tx.execute(
                    "UPDATE workers SET jobs_processed = jobs_processed + 1 WHERE id = ?1",
                    params![worker_id.get()],
                )?;
            }
            record_event_tx(
                tx,
                job.worker_id,
                WorkerEventKind::JobFinished,
                serde_json::json!({"job_id": job_id.get(), "outcome": "completed"}),
                now_ms,
            )?;
            Ok(CompleteOutcome::Applied)
        })
    }

    pub fn complete_failure(&self, job_id: JobId, error: &JobError, now_ms: u64) -> Result<CompleteOutcome> {
        let status = if error.kind == ErrorKind::Cancelled { JobStatus::Cancelled } else { JobStatus::Failed };
        let details_json = serde_json::to_string(&error.details)?;
        self.write_txn(|tx| {
            let Some(job) = query_job(tx, job_id.get())? else {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            };
            if job.status.is_terminal() {
                record_event_tx(
                    tx,
                    None,
                    WorkerEventKind::JobFinished,
                    serde_json::json!({"job_id": job_id.get(), "warning": "complete on terminal job ignored"}),
                    now_ms,
                )?;
                return Ok(CompleteOutcome::AlreadyTerminal);
            }

            tx.execute(
                "UPDATE jobs SET status = ?1, finished_at_ms = ?2, error_kind = ?3, error_message = ?4, \
                 error_traceback = ?5, error_is_transient = ?6, error_is_fatal = ?7, error_details = ?8 \
                 WHERE id = ?9",
                params![
                    status.as_str(),
                    now_ms as i64,
                    error.kind.as_str(),
                    error.message,
                    error.traceback,
                    error.is_transient,
                    error.is_fatal,
                    details_json,
                    job_id.get(),
                ],
            )?;
            if let Some(worker_id) = job.worker_id {
                tx.execute(
                    "UPDATE workers SET jobs_failed = jobs_failed + 1 WHERE id = ?1",
                    params![worker_id.get()],
                )?;
            }
            record_event_tx(
                tx,
                job.worker_id,
                WorkerEventKind::JobFinished,
                serde_json::json!({"job_id": job_id.get(), "outcome": status.as_str()}),
                now_ms,
            )?;
            Ok(CompleteOutcome::Applied)
        })
    }

    /// Marks all non-terminal Jobs with `input_path` as `cancelled`.
    /// Non-transitive: a job already `processing` is marked cancelled but
    /// its Worker is not killed — cancellation is cooperative, observed by
    /// the worker on its next check.
    pub fn cancel_for_input(&self, input_path: &str, now_ms: u64) -> Result<Vec<JobId>> {
        self.write_txn(|tx| {
            let ids: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM jobs WHERE input_path = ?1 AND status IN (?2, ?3)",
                )?;
                let rows = stmt.query_map(
                    params![input_path, JobStatus::Pending.as_str(), JobStatus::Processing.as_str()],
                    |r| r.get::<_, i64>(0),
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            for id in &ids {
                tx.execute(
                    "UPDATE jobs SET status = ?1, finished_at_ms = ?2, error_kind = ?3, error_message = ?4, \
                     error_is_transient = 1, error_is_fatal = 0 WHERE id = ?5",
                    params![
                        JobStatus::Cancelled.as_str(),
                        now_ms as i64,
                        ErrorKind::Cancelled.as_str(),
                        "cancelled by client request",
                        id,
                    ],
                )?;
            }
            Ok(ids.into_iter().map(JobId::new).collect())
        })
    }

    /// Cheap read, not paired with a write — callers (workers, mid-run)
    /// poll this without paying for a `BEGIN IMMEDIATE`.
    pub fn is_cancelled(&self, job_id: JobId) -> Result<bool> {
        let conn = self.pool.get()?;
        let status: String = conn.query_row(
            "SELECT status FROM jobs WHERE id = ?1",
            params![job_id.get()],
            |r| r.get(0),
        )?;
        Ok(status == JobStatus::Cancelled.as_str())
    }

    // ---- workers ------------------------------------------------------

    pub fn register_worker(
        &self,
        kind: JobKind,
        mode: ExecutionMode,
        external_handle: &str,
        now_ms: u64,
    ) -> Result<WorkerId> {
        self.write_txn(|tx| {
            tx.execute(
                "INSERT INTO workers (kind, mode, external_handle, status, heartbeat_ms, registered_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    kind.as_str(),
                    mode.as_str(),
                    external_handle,
                    WorkerStatus::Idle.as_str(),
                    now_ms as i64,
                    now_ms as i64,
                ],
            )?;
            let id = WorkerId::new(tx.last_insert_rowid());
            record_event_tx(
                tx,
                Some(id),
                WorkerEventKind::WorkerStarted,
                serde_json::json!({"kind": kind.as_str(), "mode": mode.as_str()}),
                now_ms,
            )?;
            Ok(id)
        })
    }

    /// Refresh heartbeat. Refuses (without touching the row) if the Worker
    /// is already `dead` — the Worker Runtime treats this as an instruction
    /// to exit.
    pub fn heartbeat(&self, worker_id: WorkerId, now_ms: u64) -> Result<()> {
        self.write_txn(|tx| {
            let status: Option<String> = tx
                .query_row("SELECT status FROM workers WHERE id = ?1", params![worker_id.get()], |r| r.get(0))
                .optional()?;
            match status.as_deref() {
                Some(s) if s == WorkerStatus::Dead.as_str() => Err(rusqlite::Error::ExecuteReturnedResults),
                Some(_) => {
                    tx.execute(
                        "UPDATE workers SET heartbeat_ms = ?1 WHERE id = ?2",
                        params![now_ms as i64, worker_id.get()],
                    )?;
                    Ok(())
                }
                None => Err(rusqlite::Error::QueryReturnedNoRows),
            }
        })
        .map_err(|e| match e {
            StorageError::Sqlite(rusqlite::Error::ExecuteReturnedResults) => {
                StorageError::WorkerNotFound(worker_id.get())
            }
            StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows) => {
                StorageError::WorkerNotFound(worker_id.get())
            }
            other => other,
        })
    }

    pub fn mark_busy(&self, worker_id: WorkerId, now_ms: u64) -> Result<()> {
        self.set_worker_status(worker_id, WorkerStatus::Busy, now_ms)
    }

    pub fn mark_idle(&self, worker_id: WorkerId, now_ms: u64) -> Result<()> {
        self.set_worker_status(worker_id, WorkerStatus::Idle, now_ms)
    }

    pub fn set_worker_status(&self, worker_id: WorkerId, status: WorkerStatus, now_ms: u64) -> Result<()> {
        self.write_txn(|tx| {
            tx.execute(
                "UPDATE workers SET status = ?1, heartbeat_ms = ?2 WHERE id = ?3",
                params![status.as_str(), now_ms as i64, worker_id.get()],
            )?;
            Ok(())
        })
    }

    pub fn stop_worker(&self, worker_id: WorkerId, now_ms: u64) -> Result<()> {
        self.write_txn(|tx| {
            tx.execute(
                "UPDATE workers SET status = ?1 WHERE id = ?2",
                params![WorkerStatus::Stopped.as_str(), worker_id.get()],
            )?;
            record_event_tx(tx, Some(worker_id), WorkerEventKind::WorkerStopped, serde_json::Value::Null, now_ms)?;
            Ok(())
        })
    }

    /// Idempotent: scans for heartbeats older than `threshold`, marks those
    /// Workers `dead`, reverts their `processing` Jobs to `pending` with
    /// `worker_id` cleared, and logs a reclaim event per worker. A worker
    /// already `dead` never matches the `idle`/`busy` filter again, so a
    /// second call in a row reclaims nothing further.
    pub fn reclaim_dead_workers(&self, threshold: Duration, now_ms: u64) -> Result<Vec<JobId>> {
        let threshold_ms = threshold.as_millis() as i64;
        self.write_txn(|tx| {
            let stale_workers: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM workers WHERE status IN (?1, ?2) AND (?3 - heartbeat_ms) >= ?4",
                )?;
                let rows = stmt.query_map(
                    params![WorkerStatus::Idle.as_str(), WorkerStatus::Busy.as_str(), now_ms as i64, threshold_ms],
                    |r| r.get::<_, i64>(0),
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut reclaimed = Vec::new();
            for worker_id in stale_workers {
                tx.execute(
                    "UPDATE workers SET status = ?1 WHERE id = ?2",
                    params![WorkerStatus::Dead.as_str(), worker_id],
                )?;

                let job_ids: Vec<i64> = {
                    let mut stmt = tx.prepare(
                        "SELECT id FROM jobs WHERE worker_id = ?1 AND status = ?2",
                    )?;
                    let rows = stmt.query_map(
                        params![worker_id, JobStatus::Processing.as_str()],
                        |r| r.get::<_, i64>(0),
                    )?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                };
                for job_id in &job_ids {
                    tx.execute(
                        "UPDATE jobs SET status = ?1, worker_id = NULL, claimed_at_ms = NULL WHERE id = ?2",
                        params![JobStatus::Pending.as_str(), job_id],
                    )?;
                }
                record_event_tx(
                    tx,
                    Some(WorkerId::new(worker_id)),
                    WorkerEventKind::CleanupReclaimed,
                    serde_json::json!({"reclaimed_job_ids": job_ids}),
                    now_ms,
                )?;
                reclaimed.extend(job_ids.into_iter().map(JobId::new));
            }
            Ok(reclaimed)
        })
    }

    pub fn get_job(&self, job_id: JobId) -> Result<Option<Job>> {
        let conn = self.pool.get()?;
        query_job(&conn, job_id.get()).map_err(Into::into)
    }

    pub fn get_worker(&self, worker_id: WorkerId) -> Result<Option<Worker>> {
        let conn = self.pool.get()?;
        query_worker(&conn, worker_id.get())
    }

    pub fn list_workers(&self, kind: Option<JobKind>) -> Result<Vec<Worker>> {
        let conn = self.pool.get()?;
        let mut stmt = match kind {
            Some(_) => conn.prepare(
                "SELECT id, kind, mode, external_handle, status, heartbeat_ms, jobs_processed, \
                 jobs_failed, busy_ms_total, registered_at_ms FROM workers WHERE kind = ?1",
            )?,
            None => conn.prepare(
                "SELECT id, kind, mode, external_handle, status, heartbeat_ms, jobs_processed, \
                 jobs_failed, busy_ms_total, registered_at_ms FROM workers",
            )?,
        };
        let rows = match kind {
            Some(k) => stmt.query_map(params![k.as_str()], row_to_worker)?,
            None => stmt.query_map([], row_to_worker)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ---- polling / cache -----------------------------------------------

    /// Batched multi-row read — a single statement regardless of how many
    /// ids are in flight (bounds lock time for the Processing
    /// Backend's poll loop).
    pub fn poll_statuses(&self, job_ids: &[JobId]) -> Result<HashMap<JobId, (JobStatus, Option<JobError>)>> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.pool.get()?;
        let placeholders = job_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT id, status, error_kind, error_message, error_traceback, error_is_transient, \
             error_is_fatal, error_details FROM jobs WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids: Vec<i64> = job_ids.iter().map(|j| j.get()).collect();
        let params_dyn: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params_dyn.as_slice(), |row| {
            let id: i64 = row.get(0)?;
            let status: String = row.get(1)?;
            let error = row_to_job_error(row, 2)?;
            Ok((JobId::new(id), (JobStatus::from_str(&status).unwrap_or(JobStatus::Pending), error)))
        })?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>().map_err(Into::into)
    }

    /// Reads and bumps `hit_count`/`last_accessed_ms` in the same
    /// transaction (diagnostics only — never used for eviction).
    pub fn cache_lookup(&self, output_path: &str, fingerprint: &str, now_ms: u64) -> Result<Option<CacheEntry>> {
        let row = self.write_txn(|tx| {
            let row: Option<(Vec<u8>, String, i64)> = tx
                .query_row(
                    "SELECT payload, metadata, hit_count FROM results_cache \
                     WHERE output_path = ?1 AND fingerprint = ?2",
                    params![output_path, fingerprint],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?;
            let Some((compressed, metadata_json, hit_count)) = row else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE results_cache SET hit_count = hit_count + 1, last_accessed_ms = ?1 \
                 WHERE output_path = ?2 AND fingerprint = ?3",
                params![now_ms as i64, output_path, fingerprint],
            )?;
            Ok(Some((compressed, metadata_json, hit_count as u64 + 1)))
        })?;
        let Some((compressed, metadata_json, hit_count)) = row else {
            return Ok(None);
        };
        let payload = zstd::decode_all(compressed.as_slice())?;
        let metadata: serde_json::Value = serde_json::from_str(&metadata_json)?;
        Ok(Some(CacheEntry {
            output_path: output_path.to_string(),
            fingerprint: fingerprint.to_string(),
            payload,
            metadata,
            hit_count,
            last_accessed_ms: now_ms,
        }))
    }

    // ---- events ---------------------------------------------------------

    pub fn record_event(
        &self,
        worker_id: Option<WorkerId>,
        kind: WorkerEventKind,
        data: serde_json::Value,
        now_ms: u64,
    ) -> Result<()> {
        self.write_txn(|tx| record_event_tx(tx, worker_id, kind, data.clone(), now_ms))
    }

    /// `ORDER BY id DESC` — a stable, most-recent-first ordering for
    /// dashboard readers.
    pub fn list_events(&self, limit: usize) -> Result<Vec<WorkerEvent>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, ts_ms, worker_id, kind, data FROM worker_events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let ts_ms: i64 = row.get(1)?;
            let worker_id: Option<i64> = row.get(2)?;
            let kind: String = row.get(3)?;
            let data: String = row.get(4)?;
            Ok(WorkerEvent {
                id,
                ts_ms: ts_ms as u64,
                worker_id: worker_id.map(WorkerId::new),
                kind: WorkerEventKind::from_str(&kind).unwrap_or(WorkerEventKind::CleanupReclaimed),
                data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Bump attempt_count for a Job's current claim (Worker Runtime, once
    /// per converter invocation attempt — spec SUPPLEMENTAL in SPEC_FULL.md).
    pub fn increment_attempt(&self, job_id: JobId) -> Result<u32> {
        self.write_txn(|tx| {
            tx.execute("UPDATE jobs SET attempt_count = attempt_count + 1 WHERE id = ?1", params![job_id.get()])?;
            tx.query_row("SELECT attempt_count FROM jobs WHERE id = ?1", params![job_id.get()], |r| {
                r.get::<_, i64>(0).map(|v| v as u32)
            })
        })
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn record_event_tx(
    tx: &Transaction,
    worker_id: Option<WorkerId>,
    kind: WorkerEventKind,
    data: serde_json::Value,
    now_ms: u64,
) -> rusqlite::Result<()> {
    let data_json = serde_json::to_string(&data).unwrap_or_else(|_| "null".to_string());
    tx.execute(
        "INSERT INTO worker_events (ts_ms, worker_id, kind, data) VALUES (?1, ?2, ?3, ?4)",
        params![now_ms as i64, worker_id.map(|w| w.get()), kind.as_str(), data_json],
    )?;
    Ok(())
}

fn query_job(conn: &Connection, job_id: i64) -> rusqlite::Result<Option<Job>> {
    conn.query_row(
        "SELECT id, kind, input_path, fingerprint, output_path, params, correlation, status, worker_id, \
         priority, error_kind, error_message, error_traceback, error_is_transient, error_is_fatal, \
         error_details, created_at_ms, claimed_at_ms, finished_at_ms, attempt_count \
         FROM jobs WHERE id = ?1",
        params![job_id],
        row_to_job,
    )
    .optional()
}

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(1)?;
    let params_json: String = row.get(5)?;
    let correlation: Option<String> = row.get(6)?;
    let status: String = row.get(7)?;
    let worker_id: Option<i64> = row.get(8)?;
    let error = row_to_job_error(row, 10)?;

    Ok(Job {
        id: JobId::new(id),
        kind: JobKind::from_str(&kind).unwrap_or(JobKind::Notebook),
        input_path: row.get(2)?,
        fingerprint: row.get(3)?,
        output_path: row.get(4)?,
        params: serde_json::from_str(&params_json)
            .map_err(|_| rusqlite::Error::InvalidColumnType(5, "params".into(), rusqlite::types::Type::Text))?,
        correlation: correlation.map(Correlation),
        status: JobStatus::from_str(&status).unwrap_or(JobStatus::Pending),
        worker_id: worker_id.map(WorkerId::new),
        priority: row.get(9)?,
        error,
        created_at_ms: row.get::<_, i64>(16)? as u64,
        claimed_at_ms: row.get::<_, Option<i64>>(17)?.map(|v| v as u64),
        finished_at_ms: row.get::<_, Option<i64>>(18)?.map(|v| v as u64),
        attempt_count: row.get::<_, i64>(19)? as u32,
    })
}

/// Reconstructs `Option<JobError>` from the six `error_*` columns starting
/// at `base` (kind, message, traceback, is_transient, is_fatal, details).
fn row_to_job_error(row: &Row, base: usize) -> rusqlite::Result<Option<JobError>> {
    let kind: Option<String> = row.get(base)?;
    let Some(kind) = kind else {
        return Ok(None);
    };
    let message: String = row.get(base + 1)?;
    let traceback: Option<String> = row.get(base + 2)?;
    let is_transient: bool = row.get(base + 3)?;
    let is_fatal: bool = row.get(base + 4)?;
    let details_json: Option<String> = row.get(base + 5)?;
    let details = details_json
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);
    Ok(Some(JobError {
        kind: ErrorKind::from_str(&kind).unwrap_or(ErrorKind::Infrastructure),
        message,
        traceback,
        is_transient,
        is_fatal,
        details,
    }))
}

fn query_worker(conn: &Connection, worker_id: i64) -> rusqlite::Result<Option<Worker>> {
    conn.query_row(
        "SELECT id, kind, mode, external_handle, status, heartbeat_ms, jobs_processed, jobs_failed, \
         busy_ms_total, registered_at_ms FROM workers WHERE id = ?1",
        params![worker_id],
        row_to_worker,
    )
    .optional()
}

fn row_to_worker(row: &Row) -> rusqlite::Result<Worker> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(1)?;
    let mode: String = row.get(2)?;
    let status: String = row.get(4)?;
    Ok(Worker {
        id: WorkerId::new(id),
        kind: JobKind::from_str(&kind).unwrap_or(JobKind::Notebook),
        mode: ExecutionMode::from_str(&mode).unwrap_or(ExecutionMode::Direct),
        external_handle: row.get(3)?,
        status: WorkerStatus::from_str(&status).unwrap_or(WorkerStatus::Dead),
        heartbeat_ms: row.get::<_, i64>(5)? as u64,
        jobs_processed: row.get::<_, i64>(6)? as u64,
        jobs_failed: row.get::<_, i64>(7)? as u64,
        busy_ms_total: row.get::<_, i64>(8)? as u64,
        registered_at_ms: row.get::<_, i64>(9)? as u64,
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
