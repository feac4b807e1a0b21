// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker Event entity — an append-only diagnostic log entry.
//! Read-only from the dashboard's point of view; `oj-storage` is
//! the only writer.

use crate::ids::WorkerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEventKind {
    WorkerStarted,
    WorkerStopped,
    WorkerCrashed,
    JobStarted,
    JobFinished,
    CleanupReclaimed,
}

impl WorkerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerEventKind::WorkerStarted => "worker-started",
            WorkerEventKind::WorkerStopped => "worker-stopped",
            WorkerEventKind::WorkerCrashed => "worker-crashed",
            WorkerEventKind::JobStarted => "job-started",
            WorkerEventKind::JobFinished => "job-finished",
            WorkerEventKind::CleanupReclaimed => "cleanup-reclaimed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "worker-started" => Some(WorkerEventKind::WorkerStarted),
            "worker-stopped" => Some(WorkerEventKind::WorkerStopped),
            "worker-crashed" => Some(WorkerEventKind::WorkerCrashed),
            "job-started" => Some(WorkerEventKind::JobStarted),
            "job-finished" => Some(WorkerEventKind::JobFinished),
            "cleanup-reclaimed" => Some(WorkerEventKind::CleanupReclaimed),
            _ => None,
        }
    }
}

crate::simple_display! {
    WorkerEventKind {
        WorkerStarted => "worker-started",
        WorkerStopped => "worker-stopped",
        WorkerCrashed => "worker-crashed",
        JobStarted => "job-started",
        JobFinished => "job-finished",
        CleanupReclaimed => "cleanup-reclaimed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    pub id: i64,
    pub ts_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    pub kind: WorkerEventKind,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for k in [
            WorkerEventKind::WorkerStarted,
            WorkerEventKind::WorkerStopped,
            WorkerEventKind::WorkerCrashed,
            WorkerEventKind::JobStarted,
            WorkerEventKind::JobFinished,
            WorkerEventKind::CleanupReclaimed,
        ] {
            assert_eq!(WorkerEventKind::from_str(k.as_str()), Some(k));
        }
    }
}
