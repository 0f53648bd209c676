//! Process run loop: resolve, launch with captured output, await exit or
//! cancellation.
//!
//! Killing the process on stop is the registry's job (it must happen before
//! the cancellation token fires, so the process cannot outlive the task
//! record); this loop only registers the pid and unwinds.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::info;

use crate::error::{Result, TaskError};
use crate::process_runner;
use crate::registry::TaskControl;

use super::{truncate_output, TaskExecutor};

/// Captured stdout/stderr excerpts are bounded to this many characters.
const OUTPUT_EXCERPT_CHARS: usize = 200;

pub(super) async fn run(
    exec: &TaskExecutor,
    task_id: &str,
    executable_path: &str,
    arguments: &str,
    working_directory: Option<&Path>,
    control: &Arc<TaskControl>,
) -> Result<()> {
    let path = resolve_executable(executable_path)?;
    exec.registry.update(task_id, |task| {
        task.message = Some(format!("launching {}", path.display()));
    });

    let mut command = Command::new(&path);
    command
        .args(arguments.split_whitespace())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = working_directory.filter(|dir| dir.is_dir()) {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|err| TaskError::from_launch(&path, err))?;
    let pid = child.id().unwrap_or(0);
    control.register_pid(pid);
    exec.registry.update(task_id, |task| {
        task.os_process_id = Some(pid);
        task.message = Some(format!("process started (pid {pid})"));
    });
    info!(task_id = %task_id, pid, "process launched");

    // Detached metrics sampler; stops on its own when the process exits or
    // the task leaves Running.
    tokio::spawn(process_runner::sample_metrics(
        Arc::clone(&exec.registry),
        task_id.to_string(),
        pid,
        control.cancel.clone(),
    ));

    let stdout_reader = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_reader = tokio::spawn(read_stream(child.stderr.take()));

    let status = tokio::select! {
        status = child.wait() => status.map_err(|err| TaskError::Process(err.to_string()))?,
        _ = control.cancel.cancelled() => {
            // stop() already killed by pid; this covers the non-Unix path.
            let _ = child.kill().await;
            control.clear_pid();
            return Err(TaskError::Cancelled);
        }
    };
    control.clear_pid();

    let stdout = stdout_reader.await.unwrap_or_default();
    let stderr = stderr_reader.await.unwrap_or_default();

    if status.success() {
        let name = exec.task_name(task_id);
        exec.registry.update(task_id, |task| {
            let mut message = format!("process exited successfully (pid {pid})");
            if !stdout.trim().is_empty() {
                message.push_str(&format!(
                    "\noutput: {}",
                    truncate_output(&stdout, OUTPUT_EXCERPT_CHARS)
                ));
            }
            task.message = Some(message);
        });
        exec.notifier
            .notify(&name, &format!("process completed (pid {pid})"));
        Ok(())
    } else {
        let code = status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "terminated by signal".to_string());
        let mut error = format!("process exited with code {code}");
        if !stderr.trim().is_empty() {
            error.push_str(&format!(
                "\nstderr: {}",
                truncate_output(&stderr, OUTPUT_EXCERPT_CHARS)
            ));
        }
        let name = exec.task_name(task_id);
        exec.notifier
            .notify(&name, &format!("process failed with exit code {code}"));
        Err(TaskError::Process(error))
    }
}

async fn read_stream<R: tokio::io::AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = String::new();
    let _ = reader.read_to_string(&mut buf).await;
    buf
}

/// Resolve an executable path the way an operator expects: the given path
/// first, then `PATH`, then relative to the working directory of the daemon.
/// First match wins.
pub fn resolve_executable(raw: &str) -> Result<PathBuf> {
    let cleaned = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if cleaned.is_empty() {
        return Err(TaskError::Validation(
            "parameter 'executablePath' is required".into(),
        ));
    }

    let direct = Path::new(cleaned);
    if direct.is_file() {
        return Ok(direct
            .canonicalize()
            .unwrap_or_else(|_| direct.to_path_buf()));
    }

    if let Some(found) = search_path(cleaned) {
        return Ok(found);
    }

    if direct.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            let relative = cwd.join(cleaned);
            if relative.is_file() {
                return Ok(relative.canonicalize().unwrap_or(relative));
            }
        }
    }

    Err(TaskError::NotFound(format!(
        "executable not found: {cleaned}"
    )))
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path_env = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_env) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
