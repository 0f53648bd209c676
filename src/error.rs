//! Error taxonomy for task execution.
//!
//! Run loops return `TaskError`; the executor maps the variant onto the final
//! task status. `Cancelled` is the cooperative unwind path and always yields
//! status `Cancelled`, never `Failed`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    /// Bad or missing task parameters. Detected at create time where
    /// possible, so the task is rejected before it ever starts running.
    #[error("invalid parameters: {0}")]
    Validation(String),

    /// Missing executable or unknown task id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Process launch refused by the OS. Carries an elevation hint so the
    /// operator knows administrator/root privileges are required.
    #[error("permission denied: {0} (administrator privileges required)")]
    Permission(String),

    /// Cooperative cancellation observed at a suspension point.
    #[error("task cancelled")]
    Cancelled,

    /// Message broker unreachable or a publish/subscribe operation failed.
    #[error("queue transport error: {0}")]
    Transport(String),

    /// Process could not be launched for a non-permission reason.
    #[error("failed to launch process: {0}")]
    Launch(String),

    /// Launched process misbehaved (non-zero exit, wait failure).
    #[error("{0}")]
    Process(String),
}

impl TaskError {
    /// Map a process-launch I/O error, distinguishing the permission case.
    pub fn from_launch(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                TaskError::Permission(format!("{}: {err}", path.display()))
            }
            std::io::ErrorKind::NotFound => {
                TaskError::NotFound(format!("executable not found: {}", path.display()))
            }
            _ => TaskError::Launch(format!("{}: {err}", path.display())),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
