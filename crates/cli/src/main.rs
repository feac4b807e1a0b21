// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `oj` — the command-line front end for the job orchestration core: submit
//! conversion work, run or supervise Worker Runtimes, inspect status, and
//! run operator maintenance commands.

mod commands;
mod context;
mod logging;
mod params;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::worker::WorkerCommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oj", about = "Asynchronous conversion job orchestration", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run or supervise Worker Runtimes.
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },
    /// Submit a conversion job.
    Submit(commands::submit::SubmitArgs),
    /// Query job or worker status.
    Status(commands::status::StatusArgs),
    /// Cooperatively cancel jobs for an input path.
    Cancel(commands::cancel::CancelArgs),
    /// Compact the auxiliary result cache.
    Vacuum(commands::vacuum::VacuumArgs),
}

fn log_dir_for(cli: &Cli) -> PathBuf {
    match &cli.command {
        Command::Worker { command } => match command {
            WorkerCommand::Run { store_dir, .. } => store_dir.clone(),
            WorkerCommand::Start { store_dir, .. } => store_dir.clone(),
        },
        Command::Submit(args) => args.store_dir.clone(),
        Command::Status(args) => args.store_dir.clone(),
        Command::Cancel(args) => args.store_dir.clone(),
        Command::Vacuum(args) => args.store_dir.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(&log_dir_for(&cli))?;

    match cli.command {
        Command::Worker { command } => commands::worker::run(command).await,
        Command::Submit(args) => commands::submit::run(args).await,
        Command::Status(args) => commands::status::run(args).await,
        Command::Cancel(args) => commands::cancel::run(args).await,
        Command::Vacuum(args) => commands::vacuum::run(args).await,
    }
}
