// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj vacuum` — operator-triggered compaction of the auxiliary result
//! cache (never run automatically, since it briefly blocks
//! every reader of that file).

use anyhow::Result;
use clap::Args;
use oj_core::{Clock, SystemClock};
use oj_storage::ResultCache;

#[derive(Args)]
pub struct VacuumArgs {
    #[arg(long)]
    pub(crate) store_dir: std::path::PathBuf,
    /// Only remove entries whose last access is older than this many
    /// seconds; defaults to dropping everything (equivalent to `0`).
    #[arg(long, default_value_t = 0)]
    pub(crate) older_than_secs: u64,
}

pub async fn run(args: VacuumArgs) -> Result<()> {
    let config = oj_core::OjConfig { store_dir: args.store_dir.clone(), ..oj_core::OjConfig::default() }.with_env_overrides();
    config.validate()?;
    let cache_path = config.cache_db_path();
    let cache = ResultCache::open(&cache_path)?;
    let older_than = std::time::Duration::from_secs(args.older_than_secs);
    let now_ms = SystemClock.epoch_ms();

    let deleted = tokio::task::spawn_blocking(move || {
        cache.vacuum_result_cache(older_than, now_ms)
    })
    .await??;

    println!("vacuumed {deleted} entr{} from the result cache at {}", if deleted == 1 { "y" } else { "ies" }, cache_path.display());
    Ok(())
}
