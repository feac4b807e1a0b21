// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local failures for the Queue Service. Never persisted — once a
//! call succeeds, any failure a Job records travels as a [`oj_core::JobError`]
//! through the Durable Store instead.

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Storage(#[from] oj_storage::StorageError),

    #[error("blocking task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, QueueError>;
