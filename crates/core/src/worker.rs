// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker entity — one running converter process, in-process
//! or containerized.

use crate::ids::WorkerId;
use crate::kind::JobKind;
use crate::status::{ExecutionMode, WorkerStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub kind: JobKind,
    pub mode: ExecutionMode,
    /// Container id or OS process id, used for liveness and forced termination.
    pub external_handle: String,
    pub status: WorkerStatus,
    pub heartbeat_ms: u64,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub busy_ms_total: u64,
    pub registered_at_ms: u64,
}

impl Worker {
    /// A Worker whose heartbeat is older than `threshold` is presumed dead.
    /// Exactly `now - threshold` counts as dead;
    /// `now - threshold + 1ms` counts as alive — see the boundary test in
    /// `oj-storage`'s reaper, which owns the authoritative comparison.
    pub fn is_stale(&self, now_ms: u64, threshold: Duration) -> bool {
        let age_ms = now_ms.saturating_sub(self.heartbeat_ms);
        age_ms >= threshold.as_millis() as u64
    }

    pub fn is_healthy(&self, now_ms: u64, threshold: Duration) -> bool {
        matches!(self.status, WorkerStatus::Idle | WorkerStatus::Busy) && !self.is_stale(now_ms, threshold)
    }
}

crate::builder! {
    pub struct WorkerBuilder => Worker {
        into {
            external_handle: String = "pid:1234",
        }
        set {
            id: WorkerId = WorkerId::new(1),
            kind: JobKind = JobKind::Notebook,
            mode: ExecutionMode = ExecutionMode::Direct,
            status: WorkerStatus = WorkerStatus::Idle,
            heartbeat_ms: u64 = 0,
            jobs_processed: u64 = 0,
            jobs_failed: u64 = 0,
            busy_ms_total: u64 = 0,
            registered_at_ms: u64 = 0,
        }
    }
}
