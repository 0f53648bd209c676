//! Push-event fan-out to all connected observers.
//!
//! Thin wrapper over [`tokio::sync::broadcast`]: `broadcast()` never blocks
//! and never fails from the publisher's point of view; a slow observer lags
//! and skips old events instead of applying backpressure, and no observers
//! at all is fine.

use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::model::{Notification, TaskRecord};

pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Broadcasts named JSON events (`{"event": ..., "payload": ...}`) to all
/// subscribed observers.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send a named event to all connected observers.
    pub fn broadcast(&self, event: &str, payload: Value) {
        let envelope = json!({ "event": event, "payload": payload });
        // Ignore errors — no subscribers is fine
        let _ = self.tx.send(envelope.to_string());
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    // ─── Typed helpers ───────────────────────────────────────────────────────

    pub fn task_updated(&self, task: &TaskRecord) {
        self.broadcast(
            "TaskUpdated",
            serde_json::to_value(task).unwrap_or_default(),
        );
    }

    pub fn alarm_triggered(&self, task_id: &str, task_name: &str, message: &str) {
        self.broadcast(
            "AlarmTriggered",
            json!({
                "taskId": task_id,
                "taskName": task_name,
                "message": message,
                "firedAt": chrono::Utc::now(),
            }),
        );
    }

    pub fn notification_received(&self, notification: &Notification) {
        self.broadcast(
            "NotificationReceived",
            serde_json::to_value(notification).unwrap_or_default(),
        );
    }

    pub fn notification_updated(&self, notification: &Notification) {
        self.broadcast(
            "NotificationUpdated",
            serde_json::to_value(notification).unwrap_or_default(),
        );
    }

    pub fn notification_count(&self, unread: usize) {
        self.broadcast("NotificationCountUpdated", json!(unread));
    }
}
