// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("queue error: {0}")]
    Queue(#[from] oj_queue::QueueError),
    #[error("pool error: {0}")]
    Pool(#[from] oj_pool::PoolError),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
