// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The auxiliary, cross-invocation result cache: a second caching tier as
//! a physically separate `*_cache.sqlite3` file, so a caller can wipe or
//! copy the cache independently of the jobs store without touching history.
//!
//! Distinct from the `results_cache` table inside the jobs store itself,
//! which [`crate::Store::cache_lookup`] serves for same-store-lifetime
//! lookups. `ResultCache` is consulted by `oj-backend` on `submit` *before*
//! a Job is even enqueued — a fingerprint hit here skips the queue
//! entirely.

use crate::error::Result;
use crate::migrations::migrate_cache;
use crate::pool::{open_pool, Pool};
use oj_core::CacheEntry;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

pub struct ResultCache {
    pool: Pool,
}

impl ResultCache {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_pool(path)?;
        {
            let conn = pool.get()?;
            migrate_cache(&conn)?;
        }
        Ok(Self { pool })
    }

    pub fn get(&self, output_path: &str, fingerprint: &str) -> Result<Option<CacheEntry>> {
        let conn = self.pool.get()?;
        let row: Option<(Vec<u8>, String, i64, i64)> = conn
            .query_row(
                "SELECT payload, metadata, hit_count, last_accessed_ms FROM cache_entries \
                 WHERE output_path = ?1 AND fingerprint = ?2",
                params![output_path, fingerprint],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((compressed, metadata_json, hit_count, last_accessed_ms)) = row else {
            return Ok(None);
        };
        Ok(Some(CacheEntry {
            output_path: output_path.to_string(),
            fingerprint: fingerprint.to_string(),
            payload: zstd::decode_all(compressed.as_slice())?,
            metadata: serde_json::from_str(&metadata_json)?,
            hit_count: hit_count as u64,
            last_accessed_ms: last_accessed_ms as u64,
        }))
    }

    /// Records a hit and refreshes `last_accessed_ms` without re-reading
    /// the payload — used right after [`ResultCache::get`] returns `Some`.
    pub fn record_hit(&self, output_path: &str, fingerprint: &str, now_ms: u64) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE cache_entries SET hit_count = hit_count + 1, last_accessed_ms = ?1 \
             WHERE output_path = ?2 AND fingerprint = ?3",
            params![now_ms as i64, output_path, fingerprint],
        )?;
        Ok(())
    }

    pub fn put(&self, entry: &CacheEntry, now_ms: u64) -> Result<()> {
        let compressed = zstd::encode_all(entry.payload.as_slice(), 0)?;
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO cache_entries (output_path, fingerprint, payload, metadata, hit_count, last_accessed_ms) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5) \
             ON CONFLICT(output_path, fingerprint) DO UPDATE SET \
             payload = excluded.payload, metadata = excluded.metadata, last_accessed_ms = excluded.last_accessed_ms",
            params![entry.output_path, entry.fingerprint, compressed, metadata_json, now_ms as i64],
        )?;
        Ok(())
    }

    /// Deletes every entry whose `last_accessed_ms` is older than `older_than`
    /// and reclaims the freed disk space, returning the number of rows
    /// removed. Never invoked automatically (open question resolved in
    /// DESIGN.md) — an operator action exposed through `oj-cli`.
    pub fn vacuum_result_cache(&self, older_than: std::time::Duration, now_ms: u64) -> Result<usize> {
        let cutoff_ms = now_ms.saturating_sub(older_than.as_millis() as u64) as i64;
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM cache_entries WHERE last_accessed_ms < ?1", params![cutoff_ms])?;
        conn.execute_batch("VACUUM;")?;
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "cache_store_tests.rs"]
mod tests;
