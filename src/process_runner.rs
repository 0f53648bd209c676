//! OS process plumbing: signal helpers and the CPU/memory sampling loop for
//! process-backed tasks.
//!
//! The sampler is a detached Tokio task spawned alongside the process run
//! loop. It self-terminates when the process exits or the task leaves
//! Running — both are expected races, not failures.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::TaskRegistry;

/// Sampling cadence for per-process CPU/memory metrics.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Forcibly terminate a process.
#[cfg(unix)]
pub fn kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub fn kill(_pid: u32) {
    // Non-Unix platforms rely on the owning run loop's Child::kill.
}

/// Ask a process to shut down gracefully (SIGTERM). Returns true when the
/// request could be delivered.
#[cfg(unix)]
pub fn request_close(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
pub fn request_close(_pid: u32) -> bool {
    false
}

/// Sample CPU and memory for `pid` every [`SAMPLE_INTERVAL`] until the
/// process exits, the task leaves Running, or the task is cancelled.
///
/// CPU% is sysinfo's accumulated-processor-time delta over the sampling
/// window, normalized by core count and clamped to `[0, 100]`. Memory is the
/// resident set in bytes.
pub async fn sample_metrics(
    registry: Arc<TaskRegistry>,
    task_id: String,
    pid: u32,
    cancel: CancellationToken,
) {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as f64;

    let mut ticker = interval(SAMPLE_INTERVAL);
    // The first refresh only primes sysinfo's CPU counters; usable deltas
    // start with the second tick.
    ticker.tick().await;
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => return,
        }

        if sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true) == 0 {
            debug!(task_id = %task_id, "process exited, metrics sampling stopped");
            return;
        }
        let process = match sys.process(pid) {
            Some(process) => process,
            None => return,
        };
        let cpu_pct = ((process.cpu_usage() as f64) / cores).clamp(0.0, 100.0);
        let memory_bytes = process.memory();

        let still_running = registry.update_if_running(&task_id, |task| {
            task.cpu_usage_pct = Some((cpu_pct * 100.0).round() / 100.0);
            task.memory_bytes = Some(memory_bytes);
            task.os_process_id = Some(pid.as_u32());
        });
        if !still_running {
            debug!(task_id = %task_id, "task left Running, metrics sampling stopped");
            return;
        }
    }
}
