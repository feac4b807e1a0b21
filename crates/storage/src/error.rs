// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage-layer errors. Corruption is fatal and surfaces as
//! [`StorageError::Corrupt`]; lock contention that survives the
//! retry policy surfaces as [`StorageError::Busy`] (mapped to the
//! `transient` `ErrorKind` one layer up, in `oj-queue`).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("store busy: lock contention exhausted retry budget after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("store corrupt at {path}: {source}")]
    Corrupt { path: PathBuf, #[source] source: rusqlite::Error },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("migration failed at version {version}: {source}")]
    Migration { version: u32, #[source] source: rusqlite::Error },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job {0} not found")]
    JobNotFound(i64),

    #[error("worker {0} not found")]
    WorkerNotFound(i64),
}

pub type Result<T> = std::result::Result<T, StorageError>;
