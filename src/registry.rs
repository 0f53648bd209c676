//! Task registry — concurrent keyed store of task records plus per-task
//! control handles (cancellation token, pause gate, owned OS pid).
//!
//! All external mutation requests (stop/pause/resume/delete) go through the
//! registry, which checks and sets status under the per-key map guard; a
//! task's fields are otherwise mutated only by its own run loop through
//! [`TaskRegistry::update`]. That routing is what guarantees a single writer
//! per task id.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Result, TaskError};
use crate::events::EventBroadcaster;
use crate::model::{TaskKind, TaskRecord, TaskStatus};
use crate::notify::DesktopNotifier;
use crate::process_runner;

// ─── Pause gate ──────────────────────────────────────────────────────────────

/// Resumable parking spot for suspendable run loops. While paused the loop
/// waits here without spinning, staying responsive to resume and stop.
pub struct PauseGate {
    paused: AtomicBool,
    resumed: Notify,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            resumed: Notify::new(),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Park until resumed or cancelled. Returns `Err(Cancelled)` when the
    /// stop signal wins.
    pub async fn wait_if_paused(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            // Register for the wakeup before re-checking the flag, so a
            // resume between the check and the wait is not lost.
            let resumed = self.resumed.notified();
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            if !self.paused.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::select! {
                _ = resumed => {}
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            }
        }
    }
}

// ─── Control handle ──────────────────────────────────────────────────────────

/// Per-task control handle: one per active task, owned by the registry and
/// removed when the run loop exits.
pub struct TaskControl {
    pub cancel: CancellationToken,
    pub pause: PauseGate,
    pub suspendable: bool,
    /// Pid of the OS process the task currently owns; 0 when none. Written
    /// by the run loop, read by `stop()` for the pre-cancel kill.
    os_pid: AtomicU32,
}

impl TaskControl {
    fn new(suspendable: bool) -> Arc<Self> {
        Arc::new(Self {
            cancel: CancellationToken::new(),
            pause: PauseGate::new(),
            suspendable,
            os_pid: AtomicU32::new(0),
        })
    }

    pub fn register_pid(&self, pid: u32) {
        self.os_pid.store(pid, Ordering::SeqCst);
    }

    pub fn clear_pid(&self) {
        self.os_pid.store(0, Ordering::SeqCst);
    }

    pub fn pid(&self) -> Option<u32> {
        match self.os_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Natural suspension point: honors pause, then cancellation.
    pub async fn checkpoint(&self) -> Result<()> {
        self.pause.wait_if_paused(&self.cancel).await?;
        if self.cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        Ok(())
    }

    /// Cancellable sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(TaskError::Cancelled),
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

pub struct TaskRegistry {
    tasks: DashMap<String, TaskRecord>,
    controls: DashMap<String, Arc<TaskControl>>,
    events: EventBroadcaster,
    notifier: Arc<dyn DesktopNotifier>,
}

impl TaskRegistry {
    pub fn new(events: EventBroadcaster, notifier: Arc<dyn DesktopNotifier>) -> Self {
        Self {
            tasks: DashMap::new(),
            controls: DashMap::new(),
            events,
            notifier,
        }
    }

    /// Allocate a Pending task and its control handle, and announce it.
    /// The caller (the executor) spawns the run loop.
    pub fn insert_pending(
        &self,
        name: &str,
        kind: TaskKind,
        suspendable: bool,
    ) -> (TaskRecord, Arc<TaskControl>) {
        let task = TaskRecord::new(name, kind);
        let control = TaskControl::new(suspendable);
        self.tasks.insert(task.id.clone(), task.clone());
        self.controls.insert(task.id.clone(), Arc::clone(&control));
        self.events.task_updated(&task);
        (task, control)
    }

    /// Snapshot read.
    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Vec<TaskRecord> {
        let mut all: Vec<TaskRecord> = self
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub fn control(&self, id: &str) -> Option<Arc<TaskControl>> {
        self.controls.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove_control(&self, id: &str) {
        self.controls.remove(id);
    }

    /// Mutate a task under its map guard and push the fresh snapshot to all
    /// observers. Returns the snapshot, or `None` for an unknown id.
    pub fn update<F>(&self, id: &str, mutate: F) -> Option<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let snapshot = {
            let mut entry = self.tasks.get_mut(id)?;
            mutate(entry.value_mut());
            entry.value().clone()
        };
        self.events.task_updated(&snapshot);
        Some(snapshot)
    }

    /// Like [`update`](Self::update), but only while the task is Running.
    /// Used by the metrics sampler, which must stop silently once the task
    /// leaves Running.
    pub fn update_if_running<F>(&self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        let snapshot = {
            let mut entry = match self.tasks.get_mut(id) {
                Some(entry) => entry,
                None => return false,
            };
            if entry.status != TaskStatus::Running {
                return false;
            }
            mutate(entry.value_mut());
            entry.value().clone()
        };
        self.events.task_updated(&snapshot);
        true
    }

    /// Apply a status transition if legal; publishes and returns the
    /// snapshot on success.
    pub fn try_transition(&self, id: &str, to: TaskStatus) -> Option<TaskRecord> {
        let snapshot = {
            let mut entry = self.tasks.get_mut(id)?;
            if !entry.transition(to) {
                return None;
            }
            entry.value().clone()
        };
        self.events.task_updated(&snapshot);
        Some(snapshot)
    }

    /// Stop a Running or Paused task: kill any owned OS process, mark the
    /// record Cancelled, then trigger the cancellation token so the run
    /// loop unwinds at its next suspension point. Returns false for unknown
    /// ids, Pending tasks, and tasks already in a terminal state.
    pub fn stop(&self, id: &str) -> bool {
        let control = match self.control(id) {
            Some(control) => control,
            None => return false,
        };
        let snapshot = {
            let mut entry = match self.tasks.get_mut(id) {
                Some(entry) => entry,
                None => return false,
            };
            if !matches!(entry.status, TaskStatus::Running | TaskStatus::Paused) {
                return false;
            }
            // Kill the process before the token fires so it cannot outlive
            // the task record.
            if let Some(pid) = control.pid() {
                process_runner::kill(pid);
                control.clear_pid();
                self.notifier
                    .notify(&entry.name, &format!("process stopped (pid {pid})"));
            }
            entry.transition(TaskStatus::Cancelled);
            entry.message = Some("stopped by user".to_string());
            entry.value().clone()
        };
        control.cancel.cancel();
        self.events.task_updated(&snapshot);
        info!(task_id = id, "task stopped");
        true
    }

    /// Running → Paused, suspendable task kinds only.
    pub fn pause(&self, id: &str) -> bool {
        let control = match self.control(id) {
            Some(control) if control.suspendable => control,
            _ => return false,
        };
        let snapshot = {
            let mut entry = match self.tasks.get_mut(id) {
                Some(entry) => entry,
                None => return false,
            };
            if !entry.transition(TaskStatus::Paused) {
                return false;
            }
            control.pause.pause();
            entry.value().clone()
        };
        self.events.task_updated(&snapshot);
        true
    }

    /// Paused → Running.
    pub fn resume(&self, id: &str) -> bool {
        let control = match self.control(id) {
            Some(control) => control,
            None => return false,
        };
        let snapshot = {
            let mut entry = match self.tasks.get_mut(id) {
                Some(entry) => entry,
                None => return false,
            };
            if !entry.transition(TaskStatus::Running) {
                return false;
            }
            control.pause.resume();
            entry.value().clone()
        };
        self.events.task_updated(&snapshot);
        true
    }

    /// Remove a task and its handle. Active tasks cannot be deleted.
    pub fn delete(&self, id: &str) -> bool {
        {
            let entry = match self.tasks.get(id) {
                Some(entry) => entry,
                None => return false,
            };
            if matches!(entry.status, TaskStatus::Running | TaskStatus::Paused) {
                return false;
            }
        }
        self.tasks.remove(id);
        self.controls.remove(id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;

    fn registry() -> TaskRegistry {
        TaskRegistry::new(EventBroadcaster::new(256), Arc::new(LogNotifier))
    }

    #[tokio::test]
    async fn insert_pending_allocates_record_and_control() {
        let registry = registry();
        let (task, control) = registry.insert_pending("demo", TaskKind::Alarm, true);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(control.suspendable);
        assert!(registry.get(&task.id).is_some());
        assert!(registry.control(&task.id).is_some());
    }

    #[tokio::test]
    async fn stop_rejects_pending_and_terminal_tasks() {
        let registry = registry();
        let (task, _) = registry.insert_pending("demo", TaskKind::Alarm, true);
        assert!(!registry.stop(&task.id), "pending tasks cannot be stopped");

        registry.try_transition(&task.id, TaskStatus::Running);
        assert!(registry.stop(&task.id));
        assert!(!registry.stop(&task.id), "already cancelled");
        let task = registry.get(&task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.message.as_deref(), Some("stopped by user"));
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn stop_triggers_the_cancellation_token() {
        let registry = registry();
        let (task, control) = registry.insert_pending("demo", TaskKind::Alarm, true);
        registry.try_transition(&task.id, TaskStatus::Running);
        assert!(!control.cancel.is_cancelled());
        registry.stop(&task.id);
        assert!(control.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn delete_rejects_active_tasks() {
        let registry = registry();
        let (task, _) = registry.insert_pending("demo", TaskKind::Alarm, true);
        registry.try_transition(&task.id, TaskStatus::Running);
        assert!(!registry.delete(&task.id));
        registry.pause(&task.id);
        assert!(!registry.delete(&task.id), "paused tasks cannot be deleted");
        registry.stop(&task.id);
        assert!(registry.delete(&task.id));
        assert!(registry.get(&task.id).is_none());
        assert!(!registry.delete(&task.id));
    }

    #[tokio::test]
    async fn pause_is_rejected_for_non_suspendable_kinds() {
        let registry = registry();
        let (task, _) = registry.insert_pending("proc", TaskKind::Process, false);
        registry.try_transition(&task.id, TaskStatus::Running);
        assert!(!registry.pause(&task.id));
    }

    #[tokio::test]
    async fn pause_resume_round_trip() {
        let registry = registry();
        let (task, control) = registry.insert_pending("demo", TaskKind::Alarm, true);
        registry.try_transition(&task.id, TaskStatus::Running);

        assert!(registry.pause(&task.id));
        assert!(control.pause.is_paused());
        assert!(!registry.pause(&task.id), "already paused");

        assert!(registry.resume(&task.id));
        assert!(!control.pause.is_paused());
        assert_eq!(registry.get(&task.id).unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn stop_unparks_a_paused_loop() {
        let registry = registry();
        let (task, control) = registry.insert_pending("demo", TaskKind::Alarm, true);
        registry.try_transition(&task.id, TaskStatus::Running);
        registry.pause(&task.id);

        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.checkpoint().await })
        };
        tokio::task::yield_now().await;
        registry.stop(&task.id);
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(TaskError::Cancelled)));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let registry = registry();
        let (a, _) = registry.insert_pending("a", TaskKind::Alarm, true);
        let (b, _) = registry.insert_pending("b", TaskKind::Process, false);
        let list = registry.list();
        assert_eq!(list.len(), 2);
        if a.created_at != b.created_at {
            assert_eq!(list[0].id, b.id);
        }
    }

    #[tokio::test]
    async fn update_publishes_a_snapshot() {
        let events = EventBroadcaster::new(64);
        let registry = TaskRegistry::new(events.clone(), Arc::new(LogNotifier));
        let (task, _) = registry.insert_pending("demo", TaskKind::Alarm, true);
        let mut rx = events.subscribe();

        registry.update(&task.id, |t| t.message = Some("hello".into()));
        let raw = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["event"], "TaskUpdated");
        assert_eq!(value["payload"]["message"], "hello");
    }
}
