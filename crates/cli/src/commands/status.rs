// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj status` — point-in-time status for one job id or the worker
//! registry, without taking the await loop in `oj submit --wait`.

use crate::context::Context;
use anyhow::{Context as _, Result};
use clap::Args;
use oj_core::{JobId, JobKind};

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long)]
    pub(crate) store_dir: std::path::PathBuf,
    /// Show one job's status instead of the worker registry.
    #[arg(long)]
    job_id: Option<i64>,
    /// Restrict the worker listing to one kind.
    #[arg(long)]
    kind: Option<String>,
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let config = oj_core::OjConfig { store_dir: args.store_dir.clone(), ..oj_core::OjConfig::default() }.with_env_overrides();
    config.validate()?;
    let ctx = Context::open(config)?;

    if let Some(raw_id) = args.job_id {
        let job_id = JobId::new(raw_id);
        let job = ctx.queue.get_job(job_id).await?.with_context(|| format!("no job with id {job_id}"))?;
        println!(
            "job {} kind={} status={:?} worker={:?} attempts={} error={:?}",
            job.id, job.kind.as_str(), job.status, job.worker_id, job.attempt_count, job.error
        );
        return Ok(());
    }

    let kind = args.kind.as_deref().map(|s| JobKind::from_str(s).with_context(|| format!("unknown job kind '{s}'"))).transpose()?;
    let workers = ctx.queue.list_workers(kind).await?;
    if workers.is_empty() {
        println!("no registered workers");
        return Ok(());
    }
    for worker in workers {
        println!(
            "worker {} kind={} mode={:?} status={:?} handle={} processed={} failed={} heartbeat_ms={}",
            worker.id, worker.kind.as_str(), worker.mode, worker.status, worker.external_handle,
            worker.jobs_processed, worker.jobs_failed, worker.heartbeat_ms
        );
    }
    Ok(())
}
