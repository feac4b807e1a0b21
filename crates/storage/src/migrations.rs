// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded, ordered, idempotent migrations run once at `Store::open`, as
//! explicit migration functions rather than a migration-framework macro:
//! this store is synchronous end to end, so a macro built around an async
//! pool would pull in a model this design deliberately avoids.

use crate::error::Result;
use rusqlite::Connection;

type Migration = fn(&Connection) -> rusqlite::Result<()>;

const MIGRATIONS: &[Migration] = &[migration_0001_jobs_schema];

/// Run any migrations not yet applied, tracked in a `schema_version` table
/// holding a single row.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;
    let current: u32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as u32;
        if version <= current {
            continue;
        }
        migration(conn).map_err(|source| crate::error::StorageError::Migration { version, source })?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }
    Ok(())
}

const CACHE_MIGRATIONS: &[Migration] = &[migration_0001_cache_schema];

/// Same `schema_version` bookkeeping as [`migrate`], applied to the
/// standalone `*_cache.sqlite3` file so its schema can evolve independently
/// of the jobs store's.
pub fn migrate_cache(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;
    let current: u32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    for (idx, migration) in CACHE_MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as u32;
        if version <= current {
            continue;
        }
        migration(conn).map_err(|source| crate::error::StorageError::Migration { version, source })?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }
    Ok(())
}

fn migration_0001_cache_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cache_entries (
            output_path TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            payload BLOB NOT NULL,
            metadata TEXT NOT NULL,
            hit_count INTEGER NOT NULL DEFAULT 0,
            last_accessed_ms INTEGER NOT NULL,
            PRIMARY KEY (output_path, fingerprint)
        );
        ",
    )
}

fn migration_0001_jobs_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            input_path TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            output_path TEXT NOT NULL,
            params TEXT NOT NULL,
            correlation TEXT,
            status TEXT NOT NULL,
            worker_id INTEGER,
            priority INTEGER NOT NULL DEFAULT 0,
            error_kind TEXT,
            error_message TEXT,
            error_traceback TEXT,
            error_is_transient INTEGER,
            error_is_fatal INTEGER,
            error_details TEXT,
            created_at_ms INTEGER NOT NULL,
            claimed_at_ms INTEGER,
            finished_at_ms INTEGER,
            attempt_count INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (kind, status, priority DESC, id ASC);

        CREATE TABLE IF NOT EXISTS workers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            mode TEXT NOT NULL,
            external_handle TEXT NOT NULL,
            status TEXT NOT NULL,
            heartbeat_ms INTEGER NOT NULL,
            jobs_processed INTEGER NOT NULL DEFAULT 0,
            jobs_failed INTEGER NOT NULL DEFAULT 0,
            busy_ms_total INTEGER NOT NULL DEFAULT 0,
            registered_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS worker_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts_ms INTEGER NOT NULL,
            worker_id INTEGER,
            kind TEXT NOT NULL,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_worker_events_id_desc ON worker_events (id DESC);

        CREATE TABLE IF NOT EXISTS results_cache (
            output_path TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            payload BLOB NOT NULL,
            metadata TEXT NOT NULL,
            hit_count INTEGER NOT NULL DEFAULT 0,
            last_accessed_ms INTEGER NOT NULL,
            PRIMARY KEY (output_path, fingerprint)
        );
        ",
    )
}
