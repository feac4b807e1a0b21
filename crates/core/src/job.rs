// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Job entity — one pending/active/finished unit of
//! conversion work.

use crate::error::JobError;
use crate::ids::{Correlation, JobId, WorkerId};
use crate::kind::{JobKind, JobParams};
use crate::status::JobStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// Path naming the source artifact fed to the converter.
    pub input_path: String,
    /// Cryptographic digest over the exact bytes (+ params salt) fed to the converter.
    pub fingerprint: String,
    pub output_path: String,
    pub params: JobParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Correlation>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    /// Higher priority jobs are claimed first; ties broken by insertion order.
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Number of converter invocation attempts made by the Worker Runtime
    /// for this claim, including retries.
    #[serde(default)]
    pub attempt_count: u32,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            input_path: String = "lec1.src",
            fingerprint: String = "AB",
            output_path: String = "out.html",
        }
        set {
            id: JobId = JobId::new(1),
            kind: JobKind = JobKind::Notebook,
            params: JobParams = JobParams::Notebook(crate::kind::NotebookParams {
                template: "default".to_string(),
                extract_code: false,
            }),
            status: JobStatus = JobStatus::Pending,
            priority: i32 = 0,
            created_at_ms: u64 = 0,
            attempt_count: u32 = 0,
        }
        option {
            correlation: Correlation = None,
            worker_id: WorkerId = None,
            error: JobError = None,
            claimed_at_ms: u64 = None,
            finished_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_matches_status() {
        let job = Job::builder().status(JobStatus::Completed).build();
        assert!(job.is_terminal());
        let job = Job::builder().status(JobStatus::Processing).build();
        assert!(!job.is_terminal());
    }
}
