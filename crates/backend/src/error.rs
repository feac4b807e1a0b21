// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use oj_core::JobKind;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("queue error: {0}")]
    Queue(#[from] oj_queue::QueueError),
    #[error("storage error: {0}")]
    Storage(#[from] oj_storage::StorageError),
    #[error("no healthy worker registered for kind {kind}")]
    NoHealthyWorker { kind: JobKind },
    #[error("backend is shutting down, no new submissions are accepted")]
    ShuttingDown,
    #[error("blocking task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to write cached output to {path}: {source}")]
    WriteOutput { path: std::path::PathBuf, #[source] source: std::io::Error },
}

pub type Result<T> = std::result::Result<T, BackendError>;
