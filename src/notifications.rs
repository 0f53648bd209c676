//! Notification store — keyed store with read/unread tracking.
//!
//! Notifications are created by queue-consume handling (and the REST
//! surface), mutated only by mark-read operations, and pushed to observers
//! through the event broadcaster.

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::info;

use crate::events::EventBroadcaster;
use crate::model::{new_id, Notification};

pub struct NotificationStore {
    notifications: DashMap<String, Notification>,
    events: EventBroadcaster,
}

impl NotificationStore {
    pub fn new(events: EventBroadcaster) -> Self {
        Self {
            notifications: DashMap::new(),
            events,
        }
    }

    /// Create a notification. Always succeeds; publishes
    /// `NotificationReceived` to all observers.
    pub fn create(
        &self,
        title: &str,
        message: &str,
        source: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) -> Notification {
        let notification = Notification {
            id: new_id(),
            title: title.to_string(),
            message: message.to_string(),
            created_at: chrono::Utc::now(),
            is_read: false,
            source: source.map(str::to_string),
            metadata,
        };
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        self.events.notification_received(&notification);
        info!(title, message, "notification created");
        notification
    }

    /// All notifications, newest first.
    pub fn list_all(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self
            .notifications
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub fn list_unread(&self) -> Vec<Notification> {
        let mut unread: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| !entry.value().is_read)
            .map(|entry| entry.value().clone())
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread
    }

    pub fn unread_count(&self) -> usize {
        self.notifications
            .iter()
            .filter(|entry| !entry.value().is_read)
            .count()
    }

    /// Mark one notification read. Safe to call repeatedly; returns false
    /// only for an unknown id.
    pub fn mark_read(&self, id: &str) -> bool {
        match self.notifications.get_mut(id) {
            Some(mut entry) => {
                entry.is_read = true;
                let snapshot = entry.clone();
                drop(entry);
                self.events.notification_updated(&snapshot);
                true
            }
            None => false,
        }
    }

    /// Mark everything read. Publishes a count update only when something
    /// actually changed.
    pub fn mark_all_read(&self) -> bool {
        let mut changed = false;
        for mut entry in self.notifications.iter_mut() {
            if !entry.is_read {
                entry.is_read = true;
                changed = true;
            }
        }
        if changed {
            self.events.notification_count(self.unread_count());
        }
        changed
    }

    pub fn delete(&self, id: &str) -> bool {
        self.notifications.remove(id).is_some()
    }

    pub fn delete_all(&self) {
        self.notifications.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> NotificationStore {
        NotificationStore::new(EventBroadcaster::new(64))
    }

    #[test]
    fn created_notifications_start_unread() {
        let store = store();
        let n = store.create("hi", "body", Some("queue"), None);
        assert!(!n.is_read);
        assert_eq!(store.unread_count(), 1);
        assert_eq!(store.list_unread().len(), 1);
    }

    #[test]
    fn listing_is_newest_first() {
        let store = store();
        let first = store.create("a", "1", None, None);
        let second = store.create("b", "2", None, None);
        let all = store.list_all();
        assert_eq!(all.len(), 2);
        // created_at ties are possible at this resolution; accept either
        // order when equal, newest strictly first otherwise.
        if first.created_at != second.created_at {
            assert_eq!(all[0].id, second.id);
        }
    }

    #[test]
    fn mark_read_is_idempotent() {
        let store = store();
        let n = store.create("t", "m", None, None);
        assert!(store.mark_read(&n.id));
        assert!(store.mark_read(&n.id));
        assert_eq!(store.unread_count(), 0);
        assert!(!store.mark_read("no-such-id"));
    }

    #[tokio::test]
    async fn mark_all_read_publishes_count_only_on_change() {
        let events = EventBroadcaster::new(64);
        let store = NotificationStore::new(events.clone());
        let mut rx = events.subscribe();

        store.create("a", "1", None, None);
        let _ = rx.recv().await.unwrap(); // NotificationReceived

        assert!(store.mark_all_read());
        let raw = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["event"], "NotificationCountUpdated");
        assert_eq!(value["payload"], 0);

        // Nothing left unread: no event, returns false.
        assert!(!store.mark_all_read());
    }

    #[test]
    fn delete_and_delete_all() {
        let store = store();
        let n = store.create("t", "m", None, None);
        assert!(store.delete(&n.id));
        assert!(!store.delete(&n.id));
        store.create("x", "y", None, None);
        store.delete_all();
        assert!(store.list_all().is_empty());
    }
}
