// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj worker run` — a single foreground Worker Runtime, the process image
//! [`oj_worker::DirectLauncher`]/[`oj_worker::ContainerLauncher`] spawn.
//! `oj worker start` — bring up and supervise a `{kind: count}` pool in the
//! foreground until interrupted, via the Lifecycle Manager.

use crate::context::Context;
use anyhow::{bail, Context as _, Result};
use clap::{Args, Subcommand};
use oj_core::{ExecutionMode, JobKind};
use oj_lifecycle::{LifecycleFlags, LifecycleManager};
use oj_pool::{ContainerLauncher, DirectLauncher, PoolConfig, PoolManager};
use oj_worker::{SubprocessConverter, WorkerRuntime};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args)]
pub struct WorkerArgs {
    #[command(subcommand)]
    pub command: WorkerCommand,
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Run a single Worker Runtime in the foreground until it is told to
    /// stop. This is what `DirectLauncher`/`ContainerLauncher`
    /// invoke; run it by hand to exercise one worker without a pool.
    Run {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        store_dir: PathBuf,
        #[arg(long)]
        workspace_dir: PathBuf,
        /// External handle recorded on the worker row. Defaults to this
        /// process's own pid (direct mode) so `DirectLauncher`'s
        /// post-spawn pid matches what this process registers itself as.
        #[arg(long)]
        external_handle: Option<String>,
        /// `kind=program[,arg,arg...]`, repeatable — the converter argv for
        /// one kind, e.g. `--converter notebook=nbconvert,--to,slides`.
        #[arg(long = "converter")]
        converters: Vec<String>,
    },
    /// Bring up and supervise a `{kind: count}` worker pool in the
    /// foreground, reusing already-healthy workers before
    /// launching fresh ones, until Ctrl+C, then stop what this invocation
    /// itself launched.
    Start {
        /// `kind=count`, repeatable, e.g. `--pool notebook=2 --pool diagram-text=1`.
        #[arg(long = "pool")]
        pools: Vec<String>,
        #[arg(long)]
        store_dir: PathBuf,
        #[arg(long)]
        workspace_dir: PathBuf,
        /// Path to this `oj` binary (direct mode) or a container image name.
        #[arg(long)]
        worker_binary_or_image: String,
        #[arg(long, value_enum, default_value = "direct")]
        mode: CliExecutionMode,
        #[arg(long)]
        no_reuse: bool,
        #[arg(long)]
        no_auto_stop: bool,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum CliExecutionMode {
    Direct,
    Containerized,
}

impl From<CliExecutionMode> for ExecutionMode {
    fn from(m: CliExecutionMode) -> Self {
        match m {
            CliExecutionMode::Direct => ExecutionMode::Direct,
            CliExecutionMode::Containerized => ExecutionMode::Containerized,
        }
    }
}

fn parse_kind(s: &str) -> Result<JobKind> {
    JobKind::from_str(s).ok_or_else(|| anyhow::anyhow!("unknown job kind '{s}', expected one of: {:?}", JobKind::all().iter().map(JobKind::as_str).collect::<Vec<_>>()))
}


fn parse_converter_spec(spec: &str) -> Result<(JobKind, Vec<String>)> {
    let (kind_str, argv) = spec.split_once('=').with_context(|| format!("malformed --converter '{spec}', expected kind=program[,arg,...]"))?;
    let kind = parse_kind(kind_str)?;
    let argv: Vec<String> = argv.split(',').map(str::to_string).collect();
    if argv.is_empty() || argv[0].is_empty() {
        bail!("--converter '{spec}' has an empty program");
    }
    Ok((kind, argv))
}

fn parse_pool_spec(spec: &str) -> Result<(JobKind, usize)> {
    let (kind_str, count_str) = spec.split_once('=').with_context(|| format!("malformed --pool '{spec}', expected kind=count"))?;
    let kind = parse_kind(kind_str)?;
    let count: usize = count_str.parse().with_context(|| format!("invalid count in --pool '{spec}'"))?;
    Ok((kind, count))
}

pub async fn run(command: WorkerCommand) -> Result<()> {
    match command {
        WorkerCommand::Run { kind, store_dir, workspace_dir, external_handle, converters } => {
            run_one(kind, store_dir, workspace_dir, external_handle, converters).await
        }
        WorkerCommand::Start { pools, store_dir, workspace_dir, worker_binary_or_image, mode, no_reuse, no_auto_stop } => {
            start_pool(pools, store_dir, workspace_dir, worker_binary_or_image, mode.into(), no_reuse, no_auto_stop).await
        }
    }
}

async fn run_one(
    kind: String,
    store_dir: PathBuf,
    workspace_dir: PathBuf,
    external_handle: Option<String>,
    converters: Vec<String>,
) -> Result<()> {
    let kind = parse_kind(&kind)?;
    let config = oj_core::OjConfig { store_dir: store_dir.clone(), ..oj_core::OjConfig::default() }.with_env_overrides();
    config.validate()?;
    let ctx = Context::open(config)?;

    let mut commands = HashMap::new();
    for spec in &converters {
        let (k, argv) = parse_converter_spec(spec)?;
        commands.insert(k, argv);
    }
    let converter: Arc<dyn oj_core::Converter> = Arc::new(SubprocessConverter::new(commands));

    let external_handle = external_handle.unwrap_or_else(|| std::process::id().to_string());
    let subprocess_permits = Arc::new(tokio::sync::Semaphore::new(ctx.config.global_subprocess_permits));
    let shutdown = CancellationToken::new();

    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_on_signal.cancel();
    });

    let runtime = WorkerRuntime::new(
        ctx.queue.clone(),
        ctx.config.clone(),
        kind,
        ExecutionMode::Direct,
        external_handle,
        converter,
        workspace_dir,
        subprocess_permits,
        shutdown,
    );
    runtime.run().await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn start_pool(
    pools: Vec<String>,
    store_dir: PathBuf,
    workspace_dir: PathBuf,
    worker_binary_or_image: String,
    mode: ExecutionMode,
    no_reuse: bool,
    no_auto_stop: bool,
) -> Result<()> {
    let config = oj_core::OjConfig { store_dir: store_dir.clone(), ..oj_core::OjConfig::default() }.with_env_overrides();
    config.validate()?;
    let ctx = Context::open(config)?;

    let mut desired = HashMap::new();
    for spec in &pools {
        let (kind, count) = parse_pool_spec(spec)?;
        desired.insert(kind, (count, mode));
    }
    if desired.is_empty() {
        bail!("at least one --pool kind=count is required");
    }

    let direct: Arc<dyn oj_worker::WorkerLauncher> = Arc::new(DirectLauncher::new());
    let container: Arc<dyn oj_worker::WorkerLauncher> = Arc::new(ContainerLauncher::new());
    let pool = Arc::new(PoolManager::new(ctx.queue.clone(), direct, container, PoolConfig::default()));
    let lifecycle = LifecycleManager::new(oj_core::SystemClock, pool.clone(), ctx.config.heartbeat_threshold);

    let flags = LifecycleFlags { auto_start: true, auto_stop: !no_auto_stop, reuse_workers: !no_reuse };
    let report = lifecycle.reconcile(&desired, flags, &store_dir, &workspace_dir, &worker_binary_or_image).await?;
    for (kind, _) in &desired {
        let kind_report = report.for_kind(*kind);
        info!(%kind, reused = kind_report.reused, started_now = kind_report.started_now, failed = kind_report.failed, "pool reconciled");
    }

    let supervisor_shutdown = CancellationToken::new();
    let supervisor = tokio::spawn(pool.clone().run_supervisor(store_dir.clone(), workspace_dir.clone(), worker_binary_or_image.clone(), supervisor_shutdown.clone()));

    info!("pool running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down pool");

    supervisor_shutdown.cancel();
    let _ = supervisor.await;
    lifecycle.shutdown_invocation(std::time::Duration::from_secs(5)).await?;
    Ok(())
}
