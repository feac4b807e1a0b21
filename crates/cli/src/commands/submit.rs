// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj submit` — enqueue one conversion job (or serve it straight from
//! cache) through the Processing Backend, optionally blocking for the
//! result.

use crate::context::Context;
use crate::params::parse_params;
use anyhow::{Context as _, Result};
use clap::Args;
use oj_backend::{AwaitOptions, ProcessingBackend, SubmitOutcome};
use oj_core::{fingerprint, Correlation, JobKind};

#[derive(Args)]
pub struct SubmitArgs {
    #[arg(long)]
    kind: String,
    #[arg(long)]
    input_path: String,
    #[arg(long)]
    output_path: String,
    /// Raw JSON matching `JobParams`, e.g. `{"kind":"notebook","template":"default","extract_code":false}`.
    #[arg(long)]
    params: String,
    #[arg(long)]
    correlation: Option<String>,
    #[arg(long, default_value_t = 0)]
    priority: i32,
    /// Block until the submitted job reaches a terminal status and print
    /// its outcome instead of returning as soon as it is enqueued.
    #[arg(long)]
    wait: bool,
    /// Give up waiting (without cancelling the job) after this many
    /// seconds. Only meaningful together with `--wait`.
    #[arg(long)]
    wait_timeout_secs: Option<u64>,
    #[arg(long)]
    pub(crate) store_dir: std::path::PathBuf,
    /// Root `output_path` (and a cache-hit's materialized file) is resolved
    /// against — the same directory Worker Runtimes mount as their workdir.
    #[arg(long, default_value = ".")]
    pub(crate) workspace_dir: std::path::PathBuf,
}

pub async fn run(args: SubmitArgs) -> Result<()> {
    let kind = JobKind::from_str(&args.kind).with_context(|| format!("unknown job kind '{}'", args.kind))?;
    let params = parse_params(&args.params)?;

    let config = oj_core::OjConfig { store_dir: args.store_dir.clone(), ..oj_core::OjConfig::default() }.with_env_overrides();
    config.validate()?;
    let ctx = Context::open(config.clone())?;

    let input_bytes = std::fs::read(&args.input_path).with_context(|| format!("reading input file {}", args.input_path))?;
    let salt = params.salt();
    let fp = fingerprint(&input_bytes, &salt);

    let backend = ProcessingBackend::new(
        ctx.queue.clone(),
        ctx.result_cache.clone(),
        oj_core::SystemClock,
        config.heartbeat_threshold,
        args.workspace_dir.clone(),
    );

    let outcome = backend
        .submit(kind, args.input_path.clone(), args.output_path.clone(), fp, params, args.correlation.map(Correlation::new), args.priority)
        .await?;

    let job_id = match outcome {
        SubmitOutcome::CacheHit(entry) => {
            println!("cache hit, {} bytes served without enqueuing", entry.payload.len());
            return Ok(());
        }
        SubmitOutcome::Queued(job_id) => {
            println!("queued job {job_id}");
            job_id
        }
    };

    if !args.wait {
        return Ok(());
    }

    let options = AwaitOptions {
        timeout: args.wait_timeout_secs.map(std::time::Duration::from_secs),
        ..AwaitOptions::default()
    };
    let results = backend.await_all(&[job_id], options).await?;
    let result = results.into_iter().next().expect("await_all returns one result per input id");
    if let Some(correlation) = &result.correlation {
        println!("correlation: {}", correlation.as_str());
    }
    if result.timed_out {
        println!("job {job_id} still {:?} after wait-timeout elapsed, not cancelled", result.status);
        return Ok(());
    }
    match result.entry {
        Some(entry) => println!("job {job_id} completed, {} bytes", entry.payload.len()),
        None => println!("job {job_id} finished as {:?}: {:?}", result.status, result.error),
    }
    Ok(())
}
