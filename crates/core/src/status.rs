// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed status graphs for Jobs and Workers, and the Worker execution
//! mode. Kept as plain enums ("a small closed graph avoids the
//! need for polymorphism") with explicit string round-trips for storage.

use serde::{Deserialize, Serialize};

/// `pending -> processing -> {completed, failed, cancelled}`. Terminal
/// states never transition (spec invariant: status monotonicity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// `registering -> idle <-> busy -> {stopped, dead}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Registering,
    Idle,
    Busy,
    Stopped,
    Dead,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Stopped | WorkerStatus::Dead)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Registering => "registering",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "registering" => Some(WorkerStatus::Registering),
            "idle" => Some(WorkerStatus::Idle),
            "busy" => Some(WorkerStatus::Busy),
            "stopped" => Some(WorkerStatus::Stopped),
            "dead" => Some(WorkerStatus::Dead),
            _ => None,
        }
    }
}

crate::simple_display! {
    WorkerStatus {
        Registering => "registering",
        Idle => "idle",
        Busy => "busy",
        Stopped => "stopped",
        Dead => "dead",
    }
}

/// In-process child (direct) vs. isolated container (containerized) as the
/// Worker's execution substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Direct,
    Containerized,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Direct => "direct",
            ExecutionMode::Containerized => "containerized",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ExecutionMode::Direct),
            "containerized" => Some(ExecutionMode::Containerized),
            _ => None,
        }
    }
}

crate::simple_display! {
    ExecutionMode {
        Direct => "direct",
        Containerized => "containerized",
    }
}
