// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local failures for the Worker Runtime and the `WorkerLauncher`
//! adapters. Converter failures never appear here — they are trapped and
//! turned into an `oj_core::JobError` before `complete_failure` is called.

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] oj_queue::QueueError),

    /// Registration failed after exhausting the retry budget (/// "registration failure is a fatal startup error").
    #[error("worker registration failed after {attempts} attempts: {source}")]
    RegisterFailed { attempts: u32, #[source] source: oj_queue::QueueError },

    #[error("worker was reaped (heartbeat refused); exiting")]
    Reaped,

    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("worker handle {0} not found")]
    HandleNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
