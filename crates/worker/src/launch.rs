// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `WorkerLauncher` — how the Pool Manager brings a Worker Runtime process
//! into existence: `DirectLauncher` spawns a child process of the host,
//! `ContainerLauncher` runs an isolated container. Both follow the same
//! spawn/capture pattern, with timeout and signal escalation layered on
//! top; `ContainerLauncher` shells out to the `docker` CLI rather than a
//! Kubernetes client, since this system only needs an isolated container,
//! not a cluster scheduler (see DESIGN.md).

use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use oj_core::JobKind;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Parameters for launching one Worker Runtime instance.
pub struct LaunchSpec {
    pub kind: JobKind,
    pub store_dir: PathBuf,
    pub workspace_dir: PathBuf,
    /// Path to the `oj` binary (direct mode) or the image name (containerized
    /// mode); interpretation is up to the `WorkerLauncher` implementation.
    pub worker_binary_or_image: String,
    pub extra_args: Vec<String>,
}

/// Brings one Worker Runtime process into existence and later tears it
/// down. The returned external handle (OS pid or container id) is what the
/// Durable Store records on the Worker row and what the Pool Manager's
/// supervision loop uses for liveness checks ("External handle...
/// used for liveness and forced termination").
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<String>;
    async fn is_alive(&self, external_handle: &str) -> bool;
    /// Graceful stop (SIGTERM / `docker stop`).
    async fn terminate(&self, external_handle: &str) -> Result<()>;
    /// Forced stop (SIGKILL / `docker kill`).
    async fn kill(&self, external_handle: &str) -> Result<()>;
}

/// Launches the Worker Runtime as a plain child process of the host.
#[derive(Default)]
pub struct DirectLauncher {
    children: Mutex<HashMap<String, Child>>,
}

impl DirectLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerLauncher for DirectLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<String> {
        let mut cmd = tokio::process::Command::new(&spec.worker_binary_or_image);
        cmd.arg("worker")
            .arg("run")
            .arg("--kind")
            .arg(spec.kind.as_str())
            .arg("--store-dir")
            .arg(&spec.store_dir)
            .arg("--workspace-dir")
            .arg(&spec.workspace_dir)
            .args(&spec.extra_args)
            .kill_on_drop(false);

        let child = cmd.spawn().map_err(|e| WorkerError::LaunchFailed(format!("spawn failed: {e}")))?;
        let pid = child.id().ok_or_else(|| WorkerError::LaunchFailed("spawned child has no pid".into()))?;
        let handle = pid.to_string();
        self.children.lock().await.insert(handle.clone(), child);
        info!(pid, kind = %spec.kind, "launched direct worker");
        Ok(handle)
    }

    async fn is_alive(&self, external_handle: &str) -> bool {
        let Ok(pid) = external_handle.parse::<u32>() else { return false };
        let mut system = sysinfo::System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sysinfo::Pid::from_u32(pid)]), true);
        system.process(sysinfo::Pid::from_u32(pid)).is_some()
    }

    async fn terminate(&self, external_handle: &str) -> Result<()> {
        if !self.children.lock().await.contains_key(external_handle) {
            return Err(WorkerError::HandleNotFound(external_handle.to_string()));
        }
        // Shell out to `kill` rather than raising a raw signal ourselves —
        // this workspace forbids `unsafe_code`, so there is no libc::kill
        // FFI call available to send SIGTERM directly.
        let _ = tokio::process::Command::new("kill").arg("-TERM").arg(external_handle).output().await;
        Ok(())
    }

    async fn kill(&self, external_handle: &str) -> Result<()> {
        let mut children = self.children.lock().await;
        if let Some(child) = children.get_mut(external_handle) {
            child.start_kill().map_err(WorkerError::Io)?;
            children.remove(external_handle);
            Ok(())
        } else {
            Err(WorkerError::HandleNotFound(external_handle.to_string()))
        }
    }
}

/// Launches the Worker Runtime in an isolated container via the `docker`
/// CLI, mounting the store directory and workspace directory read-write
/// and identically pathed on host and container, so that paths recorded
/// by one are resolvable by the other.
pub struct ContainerLauncher {
    runtime: Arc<str>,
}

impl Default for ContainerLauncher {
    fn default() -> Self {
        Self { runtime: Arc::from("docker") }
    }
}

impl ContainerLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(runtime: impl Into<Arc<str>>) -> Self {
        Self { runtime: runtime.into() }
    }

    async fn run(&self, args: &[&str]) -> std::result::Result<String, String> {
        let output = tokio::process::Command::new(&*self.runtime)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to exec {}: {e}", self.runtime))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("{} {} failed: {}", self.runtime, args.first().unwrap_or(&""), stderr.trim()))
        }
    }
}

#[async_trait]
impl WorkerLauncher for ContainerLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<String> {
        let store_mount = format!("{0}:{0}", spec.store_dir.display());
        let workspace_mount = format!("{0}:{0}", spec.workspace_dir.display());
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--rm".into(),
            "-v".into(),
            store_mount,
            "-v".into(),
            workspace_mount,
            spec.worker_binary_or_image.clone(),
            "worker".into(),
            "run".into(),
            "--kind".into(),
            spec.kind.as_str().into(),
            "--store-dir".into(),
            spec.store_dir.display().to_string(),
            "--workspace-dir".into(),
            spec.workspace_dir.display().to_string(),
        ];
        args.extend(spec.extra_args.iter().cloned());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let container_id = self.run(&arg_refs).await.map_err(WorkerError::LaunchFailed)?;
        info!(container_id, kind = %spec.kind, "launched containerized worker");
        Ok(container_id)
    }

    async fn is_alive(&self, external_handle: &str) -> bool {
        matches!(
            self.run(&["inspect", "-f", "{{.State.Running}}", external_handle]).await.as_deref(),
            Ok("true")
        )
    }

    async fn terminate(&self, external_handle: &str) -> Result<()> {
        self.run(&["stop", "-t", "5", external_handle]).await.map(|_| ()).map_err(WorkerError::LaunchFailed)
    }

    async fn kill(&self, external_handle: &str) -> Result<()> {
        if let Err(e) = self.run(&["kill", external_handle]).await {
            warn!(external_handle, error = %e, "docker kill failed (container may already be gone)");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
