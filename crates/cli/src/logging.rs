// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup for the `oj` binary: an
//! `EnvFilter` read from `OJ_LOG` (default `info`), feeding a non-blocking
//! rolling file appender under `{store_dir}/logs/`. Only this binary crate
//! installs a global subscriber — every library crate just emits `tracing`
//! events.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber and returns the file appender's guard,
/// which must be held for the process lifetime to flush buffered lines.
pub fn init(store_dir: &Path) -> anyhow::Result<WorkerGuard> {
    let log_dir = store_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "oj.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_env("OJ_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(guard)
}
