//! Task executor — per-type run loops and the lifecycle driver that wraps
//! them.
//!
//! `create()` validates parameters, persists a Pending record, and hands the
//! run loop to an independent Tokio task; the caller gets the task id back
//! immediately. The driver owns the Pending→Running claim and the single
//! terminal transition, so run loop bodies only ever report progress and
//! return `Ok`/`Err`.

mod alarm;
mod process;
mod queue;
mod scheduler;

pub use process::resolve_executable;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use crate::error::{Result, TaskError};
use crate::events::EventBroadcaster;
use crate::model::{TaskKind, TaskRecord, TaskSpec, TaskStatus};
use crate::notifications::NotificationStore;
use crate::notify::DesktopNotifier;
use crate::queue_gateway::QueueGateway;
use crate::registry::{TaskControl, TaskRegistry};

#[derive(Clone)]
pub struct TaskExecutor {
    pub registry: Arc<TaskRegistry>,
    pub events: EventBroadcaster,
    pub queue: Arc<dyn QueueGateway>,
    pub notifier: Arc<dyn DesktopNotifier>,
    pub notifications: Arc<NotificationStore>,
}

impl TaskExecutor {
    pub fn new(
        registry: Arc<TaskRegistry>,
        events: EventBroadcaster,
        queue: Arc<dyn QueueGateway>,
        notifier: Arc<dyn DesktopNotifier>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        Self {
            registry,
            events,
            queue,
            notifier,
            notifications,
        }
    }

    /// Create and start a task. Parameter validation happens here, before
    /// the task exists — a bad request never produces a Pending record.
    /// Returns the freshly allocated (Pending) task snapshot.
    pub fn create(
        &self,
        name: &str,
        task_type: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<TaskRecord> {
        let kind = TaskKind::parse(task_type)?;
        let spec = TaskSpec::parse(kind, parameters)?;
        let (task, control) = self.registry.insert_pending(name, kind, spec.suspendable());
        info!(task_id = %task.id, task_type, "task created");

        let executor = self.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            executor.drive(task_id, spec, control).await;
        });
        Ok(task)
    }

    /// Lifecycle driver: claim the task, run the type-specific body, settle
    /// the terminal state exactly once, release the control handle.
    async fn drive(self, task_id: String, spec: TaskSpec, control: Arc<TaskControl>) {
        if self
            .registry
            .try_transition(&task_id, TaskStatus::Running)
            .is_none()
        {
            // Claimed away before start (e.g. deleted); nothing to run.
            self.registry.remove_control(&task_id);
            return;
        }

        let result = self.run_body(&task_id, spec, &control).await;

        match result {
            Ok(()) if !control.cancel.is_cancelled() => {
                self.registry.update(&task_id, |task| {
                    // A pause that raced the final step cannot outlive the body.
                    if task.status == TaskStatus::Paused {
                        task.transition(TaskStatus::Running);
                    }
                    if task.transition(TaskStatus::Completed) {
                        if let Some(max) = task.max_value {
                            task.progress = max;
                        }
                    }
                });
                info!(task_id = %task_id, "task completed");
            }
            Ok(()) | Err(TaskError::Cancelled) => {
                // stop() usually settles the record itself; this covers a
                // cancellation observed before stop() finished publishing.
                self.registry.update(&task_id, |task| {
                    if task.transition(TaskStatus::Cancelled) {
                        task.message.get_or_insert_with(|| "task cancelled".into());
                    }
                });
                info!(task_id = %task_id, "task cancelled");
            }
            Err(err) => {
                self.registry.update(&task_id, |task| {
                    // Pause cannot outlive a failing body.
                    if task.status == TaskStatus::Paused {
                        task.transition(TaskStatus::Running);
                    }
                    if task.transition(TaskStatus::Failed) {
                        task.error_message.get_or_insert_with(|| err.to_string());
                    }
                });
                error!(task_id = %task_id, error = %err, "task failed");
            }
        }

        self.registry.remove_control(&task_id);
    }

    async fn run_body(
        &self,
        task_id: &str,
        spec: TaskSpec,
        control: &Arc<TaskControl>,
    ) -> Result<()> {
        match spec {
            TaskSpec::Alarm {
                alarm_time,
                message,
            } => alarm::run(self, task_id, alarm_time, &message, control).await,
            TaskSpec::IntervalScheduler {
                executable_path,
                arguments,
                working_directory,
                interval_seconds,
                execution_count,
            } => {
                scheduler::run_interval(
                    self,
                    task_id,
                    &executable_path,
                    &arguments,
                    working_directory.as_deref(),
                    interval_seconds,
                    execution_count,
                    control,
                )
                .await
            }
            TaskSpec::DelayedScheduler {
                executable_path,
                arguments,
                working_directory,
                delay_before_start,
                run_duration,
            } => {
                scheduler::run_delayed(
                    self,
                    task_id,
                    &executable_path,
                    &arguments,
                    working_directory.as_deref(),
                    delay_before_start,
                    run_duration,
                    control,
                )
                .await
            }
            TaskSpec::Process {
                executable_path,
                arguments,
                working_directory,
            } => {
                process::run(
                    self,
                    task_id,
                    &executable_path,
                    &arguments,
                    working_directory.as_deref(),
                    control,
                )
                .await
            }
            TaskSpec::QueuePublish {
                queue_name,
                message,
                execution_count,
                interval_seconds,
            } => {
                queue::run_publish(
                    self,
                    task_id,
                    &queue_name,
                    &message,
                    execution_count,
                    interval_seconds,
                    control,
                )
                .await
            }
            TaskSpec::QueueConsume { queue_name } => {
                queue::run_consume(self, task_id, &queue_name, control).await
            }
        }
    }

    /// Name of a task, for notifications and events.
    fn task_name(&self, task_id: &str) -> String {
        self.registry
            .get(task_id)
            .map(|task| task.name)
            .unwrap_or_default()
    }
}

/// Trim captured process output to a bounded, single-purpose excerpt.
pub(crate) fn truncate_output(raw: &str, max_chars: usize) -> String {
    raw.trim().chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_output_bounds_and_trims() {
        assert_eq!(truncate_output("  hello  ", 200), "hello");
        let long = "x".repeat(500);
        assert_eq!(truncate_output(&long, 200).len(), 200);
    }
}
