// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj cancel` — cooperative cancellation for every still-pending or
//! in-flight job submitted against a given input path.

use crate::context::Context;
use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct CancelArgs {
    #[arg(long)]
    pub(crate) store_dir: std::path::PathBuf,
    #[arg(long)]
    input_path: String,
}

pub async fn run(args: CancelArgs) -> Result<()> {
    let config = oj_core::OjConfig { store_dir: args.store_dir.clone(), ..oj_core::OjConfig::default() }.with_env_overrides();
    config.validate()?;
    let ctx = Context::open(config)?;

    let cancelled = ctx.queue.cancel_for_input(args.input_path.clone()).await?;
    if cancelled.is_empty() {
        println!("no pending or in-flight jobs found for input {}", args.input_path);
    } else {
        println!("marked {} job(s) cancelled: {}", cancelled.len(), cancelled.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "));
    }
    Ok(())
}
