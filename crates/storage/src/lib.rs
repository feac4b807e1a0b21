// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-storage: the Durable Store — a single embedded SQLite
//! file behind a synchronous `r2d2` connection pool in rollback-journal
//! mode, with `BEGIN IMMEDIATE` serializing writers and exponential backoff
//! on lock contention. [`cache_store::ResultCache`] is the physically
//! separate auxiliary cache file consulted ahead of the queue entirely.

pub mod cache_store;
pub mod error;
mod migrations;
mod pool;
mod store;

pub use cache_store::ResultCache;
pub use error::{Result, StorageError};
pub use store::{ClaimOutcome, CompleteOutcome, Store};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    //! Helpers for tests that need a throwaway, already-migrated [`Store`]
    //! and [`ResultCache`] pair backed by a temp directory.

    use crate::{ResultCache, Store};
    use oj_core::RetryPolicy;
    use tempfile::TempDir;

    pub struct TestStore {
        pub dir: TempDir,
        pub store: Store,
        pub cache: ResultCache,
    }

    pub fn open_test_store() -> TestStore {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(&dir.path().join("oj_jobs.sqlite3"), RetryPolicy::default()).expect("open store");
        let cache = ResultCache::open(&dir.path().join("oj_cache.sqlite3")).expect("open cache");
        TestStore { dir, store, cache }
    }
}
