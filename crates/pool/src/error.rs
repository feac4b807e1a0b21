// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use oj_core::JobKind;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("queue error: {0}")]
    Queue(#[from] oj_queue::QueueError),
    #[error("worker error: {0}")]
    Worker(#[from] oj_worker::WorkerError),
    #[error("worker of kind {kind} did not register within the launch timeout")]
    LaunchTimedOut { kind: JobKind },
    #[error("failed to launch worker of kind {kind}: {source}")]
    LaunchFailed { kind: JobKind, #[source] source: oj_worker::WorkerError },
}

pub type Result<T> = std::result::Result<T, PoolError>;
