// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection pool setup. Each pool checkout is a private `rusqlite`
//! connection ("Connection state is per-thread"); `r2d2` owns the
//! pool and hands out exclusive checkouts, and a connection customizer sets
//! the rollback-journal pragmas once per connection.

use crate::error::{Result, StorageError};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;

#[derive(Debug)]
struct RollbackJournalPragmas;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for RollbackJournalPragmas {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        // Rollback-journal mode rather than WAL: the filesystem substrate
        // cannot be assumed to support shared-memory regions across all
        // host environments.
        conn.pragma_update(None, "journal_mode", "DELETE")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(Duration::from_millis(0))?;
        Ok(())
    }
}

/// Open (creating if absent) the sqlite file at `path` behind an `r2d2` pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let manager = SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::builder()
        .connection_customizer(Box::new(RollbackJournalPragmas))
        .build(manager)
        .map_err(StorageError::Pool)?;
    Ok(pool)
}
