//! Data model: tasks, typed task parameters, and notifications.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Generate a new task/notification id (UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Valid status transitions. Terminal states absorb; everything else
    /// moves along the lifecycle edges only.
    pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Pending, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }
}

// ─── Kind ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Alarm,
    Scheduler,
    Process,
    QueuePublish,
    QueueConsume,
}

impl TaskKind {
    /// Parse the wire form. "reminder" is a historical alias for "alarm".
    pub fn parse(s: &str) -> Result<Self, TaskError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alarm" | "reminder" => Ok(TaskKind::Alarm),
            "scheduler" => Ok(TaskKind::Scheduler),
            "process" => Ok(TaskKind::Process),
            "queue_publish" => Ok(TaskKind::QueuePublish),
            "queue_consume" => Ok(TaskKind::QueueConsume),
            other => Err(TaskError::Validation(format!(
                "task type '{other}' is not supported"
            ))),
        }
    }
}

// ─── Task record ─────────────────────────────────────────────────────────────

/// The authoritative task representation, pushed to observers on every
/// mutation. Serialized camelCase to match the public API payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: i32,
    pub max_value: Option<i32>,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub cpu_usage_pct: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub os_process_id: Option<u32>,
}

impl TaskRecord {
    pub fn new(name: &str, kind: TaskKind) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            kind,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            max_value: None,
            message: None,
            error_message: None,
            cpu_usage_pct: None,
            memory_bytes: None,
            os_process_id: None,
        }
    }

    /// Apply a status transition if the edge is legal. Records `started_at`
    /// on first entry to Running and `completed_at` exactly once, on first
    /// entry to a terminal status.
    pub fn transition(&mut self, to: TaskStatus) -> bool {
        if !TaskStatus::can_transition(self.status, to) {
            return false;
        }
        self.status = to;
        if to == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if to.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Advance progress. Monotonic non-decreasing within a run and bounded
    /// by `max_value` when one is set; regressions are ignored.
    pub fn set_progress(&mut self, progress: i32) {
        let bounded = match self.max_value {
            Some(max) => progress.min(max),
            None => progress,
        };
        if bounded > self.progress {
            self.progress = bounded;
        }
    }
}

// ─── Typed parameters ────────────────────────────────────────────────────────

/// Validated, typed task parameters parsed from the string map at create
/// time. Parse failures reject the create call before the task can run.
#[derive(Debug, Clone)]
pub enum TaskSpec {
    Alarm {
        alarm_time: DateTime<Utc>,
        message: String,
    },
    IntervalScheduler {
        executable_path: String,
        arguments: String,
        working_directory: Option<PathBuf>,
        interval_seconds: u64,
        execution_count: u32,
    },
    DelayedScheduler {
        executable_path: String,
        arguments: String,
        working_directory: Option<PathBuf>,
        delay_before_start: u64,
        run_duration: u64,
    },
    Process {
        executable_path: String,
        arguments: String,
        working_directory: Option<PathBuf>,
    },
    QueuePublish {
        queue_name: String,
        message: String,
        execution_count: u32,
        interval_seconds: u64,
    },
    QueueConsume {
        queue_name: String,
    },
}

impl TaskSpec {
    pub fn parse(kind: TaskKind, params: &HashMap<String, String>) -> Result<Self, TaskError> {
        match kind {
            TaskKind::Alarm => Self::parse_alarm(params),
            TaskKind::Scheduler => Self::parse_scheduler(params),
            TaskKind::Process => Ok(TaskSpec::Process {
                executable_path: required(params, "executablePath")?,
                arguments: optional(params, "arguments"),
                working_directory: working_dir(params),
            }),
            TaskKind::QueuePublish => Ok(TaskSpec::QueuePublish {
                queue_name: required(params, "queueName")?,
                message: required(params, "message")?,
                execution_count: parse_num(params, "executionCount", 1).max(1),
                interval_seconds: parse_num(params, "intervalSeconds", 0),
            }),
            TaskKind::QueueConsume => Ok(TaskSpec::QueueConsume {
                queue_name: required(params, "queueName")?,
            }),
        }
    }

    fn parse_alarm(params: &HashMap<String, String>) -> Result<Self, TaskError> {
        let raw = params
            .get("alarmTime")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                TaskError::Validation(
                    "alarmTime parameter is required and must be a valid datetime".into(),
                )
            })?;
        let alarm_time = parse_datetime(raw).ok_or_else(|| {
            TaskError::Validation(format!("alarmTime '{raw}' is not a valid datetime"))
        })?;
        if alarm_time <= Utc::now() {
            return Err(TaskError::Validation(
                "alarm time must be in the future".into(),
            ));
        }
        let message = params
            .get("message")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("time's up")
            .to_string();
        Ok(TaskSpec::Alarm {
            alarm_time,
            message,
        })
    }

    fn parse_scheduler(params: &HashMap<String, String>) -> Result<Self, TaskError> {
        let executable_path = required(params, "executablePath")?;
        let arguments = optional(params, "arguments");
        let working_directory = working_dir(params);
        let mode = params
            .get("scheduleMode")
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "interval".into());
        match mode.as_str() {
            "delayed" => Ok(TaskSpec::DelayedScheduler {
                executable_path,
                arguments,
                working_directory,
                delay_before_start: parse_num(params, "delayBeforeStart", 0),
                run_duration: parse_num(params, "runDuration", 60),
            }),
            "interval" => Ok(TaskSpec::IntervalScheduler {
                executable_path,
                arguments,
                working_directory,
                interval_seconds: parse_num(params, "intervalSeconds", 60),
                execution_count: parse_num(params, "executionCount", 10).max(1),
            }),
            other => Err(TaskError::Validation(format!(
                "scheduleMode '{other}' is not supported (expected 'interval' or 'delayed')"
            ))),
        }
    }

    /// Only alarms and interval schedulers can be parked and resumed.
    pub fn suspendable(&self) -> bool {
        matches!(
            self,
            TaskSpec::Alarm { .. } | TaskSpec::IntervalScheduler { .. }
        )
    }
}

fn required(params: &HashMap<String, String>, key: &str) -> Result<String, TaskError> {
    params
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TaskError::Validation(format!("parameter '{key}' is required")))
}

fn optional(params: &HashMap<String, String>, key: &str) -> String {
    params.get(key).map(|s| s.trim().to_string()).unwrap_or_default()
}

fn working_dir(params: &HashMap<String, String>) -> Option<PathBuf> {
    params
        .get("workingDirectory")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn parse_num<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str, default: T) -> T {
    params
        .get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Accept RFC 3339 or a bare `YYYY-MM-DDTHH:MM:SS` (treated as UTC).
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub source: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Task creation request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn terminal_states_absorb() {
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            for to in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Paused,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!TaskStatus::can_transition(terminal, to));
            }
        }
    }

    #[test]
    fn completed_at_is_set_exactly_once() {
        let mut task = TaskRecord::new("t", TaskKind::Alarm);
        assert!(task.transition(TaskStatus::Running));
        assert!(task.transition(TaskStatus::Cancelled));
        let first = task.completed_at;
        assert!(first.is_some());
        assert!(!task.transition(TaskStatus::Completed));
        assert_eq!(task.completed_at, first);
    }

    #[test]
    fn started_at_survives_pause_resume() {
        let mut task = TaskRecord::new("t", TaskKind::Alarm);
        task.transition(TaskStatus::Running);
        let started = task.started_at;
        task.transition(TaskStatus::Paused);
        task.transition(TaskStatus::Running);
        assert_eq!(task.started_at, started);
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let mut task = TaskRecord::new("t", TaskKind::Scheduler);
        task.max_value = Some(10);
        task.set_progress(4);
        task.set_progress(2);
        assert_eq!(task.progress, 4);
        task.set_progress(99);
        assert_eq!(task.progress, 10);
    }

    #[test]
    fn alarm_in_the_past_is_rejected() {
        let past = (Utc::now() - Duration::minutes(5)).to_rfc3339();
        let err = TaskSpec::parse(TaskKind::Alarm, &params(&[("alarmTime", &past)]))
            .expect_err("past alarm must be rejected");
        assert!(matches!(err, TaskError::Validation(_)));
    }

    #[test]
    fn alarm_message_defaults() {
        let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let spec = TaskSpec::parse(TaskKind::Alarm, &params(&[("alarmTime", &future)])).unwrap();
        match spec {
            TaskSpec::Alarm { message, .. } => assert_eq!(message, "time's up"),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn naive_alarm_time_is_treated_as_utc() {
        let future = (Utc::now() + Duration::hours(2)).format("%Y-%m-%dT%H:%M:%S");
        let spec = TaskSpec::parse(
            TaskKind::Alarm,
            &params(&[("alarmTime", &future.to_string())]),
        );
        assert!(spec.is_ok());
    }

    #[test]
    fn scheduler_defaults_to_interval_mode() {
        let spec =
            TaskSpec::parse(TaskKind::Scheduler, &params(&[("executablePath", "tool")])).unwrap();
        match spec {
            TaskSpec::IntervalScheduler {
                interval_seconds,
                execution_count,
                ..
            } => {
                assert_eq!(interval_seconds, 60);
                assert_eq!(execution_count, 10);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn scheduler_requires_executable_path() {
        let err = TaskSpec::parse(TaskKind::Scheduler, &params(&[])).unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }

    #[test]
    fn reminder_is_an_alarm_alias() {
        assert_eq!(TaskKind::parse("reminder").unwrap(), TaskKind::Alarm);
        assert!(TaskKind::parse("frobnicate").is_err());
    }

    #[test]
    fn suspendable_kinds() {
        let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let alarm = TaskSpec::parse(TaskKind::Alarm, &params(&[("alarmTime", &future)])).unwrap();
        assert!(alarm.suspendable());

        let process =
            TaskSpec::parse(TaskKind::Process, &params(&[("executablePath", "tool")])).unwrap();
        assert!(!process.suspendable());

        let delayed = TaskSpec::parse(
            TaskKind::Scheduler,
            &params(&[("executablePath", "tool"), ("scheduleMode", "delayed")]),
        )
        .unwrap();
        assert!(!delayed.suspendable());
    }
}
