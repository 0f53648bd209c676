//! Scheduler run loops.
//!
//! Interval mode launches an executable N times, fire-and-forget, pausing
//! between launches. Delayed mode waits, launches a single visible instance,
//! lets it run for a bounded window, then closes it gracefully.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{Result, TaskError};
use crate::process_runner;
use crate::registry::TaskControl;

use super::{resolve_executable, TaskExecutor};

/// Grace period between SIGTERM and SIGKILL when closing a delayed launch.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub(super) async fn run_interval(
    exec: &TaskExecutor,
    task_id: &str,
    executable_path: &str,
    arguments: &str,
    working_directory: Option<&Path>,
    interval_seconds: u64,
    execution_count: u32,
    control: &Arc<TaskControl>,
) -> Result<()> {
    let path = resolve_executable(executable_path)?;
    exec.registry.update(task_id, |task| {
        task.max_value = Some(execution_count as i32);
        task.message = Some(format!(
            "scheduling {} launches of {}",
            execution_count,
            path.display()
        ));
    });

    let name = exec.task_name(task_id);
    let mut launched = 0u32;
    let mut failed = 0u32;
    let mut permission_denied = false;

    for iteration in 1..=execution_count {
        control.checkpoint().await?;

        match launch_detached(&path, arguments, working_directory) {
            Ok(pid) => {
                launched += 1;
                info!(task_id = %task_id, pid, iteration, "scheduled launch succeeded");
                exec.registry.update(task_id, |task| {
                    task.set_progress(iteration as i32);
                    task.message =
                        Some(format!("launched {iteration} of {execution_count} (pid {pid})"));
                });
                exec.notifier.notify(
                    &name,
                    &format!("launched {} ({iteration}/{execution_count})", path.display()),
                );
            }
            Err(err) => {
                failed += 1;
                if matches!(err, TaskError::Permission(_)) {
                    permission_denied = true;
                }
                warn!(task_id = %task_id, iteration, error = %err, "scheduled launch failed");
                exec.registry.update(task_id, |task| {
                    task.set_progress(iteration as i32);
                    task.message =
                        Some(format!("launch {iteration} of {execution_count} failed"));
                    task.error_message = Some(err.to_string());
                });
            }
        }

        if iteration < execution_count && interval_seconds > 0 {
            control.sleep(Duration::from_secs(interval_seconds)).await?;
        }
    }

    exec.registry.update(task_id, |task| {
        task.message = Some(format!(
            "scheduler finished: launched {launched}, failed {failed}"
        ));
    });

    if permission_denied {
        return Err(TaskError::Permission(format!(
            "scheduler could not launch {}",
            path.display()
        )));
    }
    Ok(())
}

pub(super) async fn run_delayed(
    exec: &TaskExecutor,
    task_id: &str,
    executable_path: &str,
    arguments: &str,
    working_directory: Option<&Path>,
    delay_before_start: u64,
    run_duration: u64,
    control: &Arc<TaskControl>,
) -> Result<()> {
    let path = resolve_executable(executable_path)?;
    let name = exec.task_name(task_id);

    // Countdown phase maps onto the first half of the progress bar.
    if delay_before_start > 0 {
        let steps = delay_before_start.min(100).max(1);
        let step = Duration::from_secs(delay_before_start) / steps as u32;
        for done in 0..steps {
            let remaining = delay_before_start - delay_before_start * done / steps;
            exec.registry.update(task_id, |task| {
                task.set_progress((50 * done / steps) as i32);
                task.message = Some(format!("starting in {remaining}s"));
            });
            control.sleep(step).await?;
        }
    }
    control.checkpoint().await?;

    let mut command = Command::new(&path);
    command
        .args(arguments.split_whitespace())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(dir) = working_directory.filter(|dir| dir.is_dir()) {
        command.current_dir(dir);
    }
    let mut child = command
        .spawn()
        .map_err(|err| TaskError::from_launch(&path, err))?;
    let pid = child.id().unwrap_or(0);
    control.register_pid(pid);
    info!(task_id = %task_id, pid, "delayed launch started");
    exec.registry.update(task_id, |task| {
        task.os_process_id = Some(pid);
        task.set_progress(60);
        task.message = Some(format!("application started (pid {pid})"));
    });
    exec.notifier
        .notify(&name, &format!("application started (pid {pid})"));

    // Run window: advance 60 → 95, bail out early if the process exits on
    // its own.
    let steps = run_duration.min(40).max(1);
    let step = Duration::from_secs(run_duration.max(1)) / steps as u32;
    for done in 0..steps {
        if let Err(err) = control.sleep(step).await {
            let _ = child.start_kill();
            control.clear_pid();
            return Err(err);
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                control.clear_pid();
                exec.registry.update(task_id, |task| {
                    task.set_progress(100);
                    task.message = Some(format!("application exited on its own ({status})"));
                });
                return Ok(());
            }
            Ok(None) => {}
            Err(err) => {
                control.clear_pid();
                return Err(TaskError::Process(err.to_string()));
            }
        }
        exec.registry.update(task_id, |task| {
            task.set_progress((60 + 35 * (done + 1) / steps) as i32);
            task.message = Some(format!("running, {}s elapsed", step.as_secs() * (done + 1)));
        });
    }

    exec.registry.update(task_id, |task| {
        task.set_progress(95);
        task.message = Some("closing application".into());
    });

    // Graceful close, then force after the grace period.
    if !process_runner::request_close(pid) {
        let _ = child.start_kill();
    }
    tokio::select! {
        _ = child.wait() => {}
        _ = tokio::time::sleep(CLOSE_GRACE) => {
            let _ = child.kill().await;
        }
    }
    control.clear_pid();

    exec.registry.update(task_id, |task| {
        task.set_progress(100);
        task.message = Some(format!("application closed after {run_duration}s"));
    });
    exec.notifier
        .notify(&name, &format!("application closed after {run_duration}s"));
    Ok(())
}

/// Launch without holding onto the child: stdio detached, exit status reaped
/// in the background so the child never zombies.
fn launch_detached(path: &Path, arguments: &str, working_directory: Option<&Path>) -> Result<u32> {
    let mut command = Command::new(path);
    command
        .args(arguments.split_whitespace())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = working_directory.filter(|dir| dir.is_dir()) {
        command.current_dir(dir);
    }
    let mut child = command
        .spawn()
        .map_err(|err| TaskError::from_launch(path, err))?;
    let pid = child.id().unwrap_or(0);
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(pid)
}
