// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opens the Durable Store + auxiliary `ResultCache` pair and wraps the
//! store in a [`QueueService`] driven by the real [`SystemClock`] — the
//! shared setup every subcommand that touches storage needs.

use oj_core::{OjConfig, SystemClock};
use oj_queue::QueueService;
use oj_storage::{ResultCache, Store};
use std::sync::Arc;

pub struct Context {
    pub config: OjConfig,
    pub queue: Arc<QueueService<SystemClock>>,
    pub result_cache: Arc<ResultCache>,
}

impl Context {
    pub fn open(config: OjConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.store_dir)?;
        let store = Store::open(&config.jobs_db_path(), config.lock_retry)?;
        let result_cache = ResultCache::open(&config.cache_db_path())?;
        let queue = QueueService::new(Arc::new(store), SystemClock);
        Ok(Self { config, queue: Arc::new(queue), result_cache: Arc::new(result_cache) })
    }
}
