//! Integration tests for the notification store and the queue-consumer path
//! that feeds it.

use std::collections::HashMap;
use std::time::Duration;

use taskd::config::DaemonConfig;
use taskd::AppContext;

fn ctx() -> AppContext {
    AppContext::new(DaemonConfig::default())
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met before deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn consumed_messages_become_unread_notifications() {
    let ctx = ctx();

    let headers = HashMap::from([("title".to_string(), "deploy finished".to_string())]);
    ctx.queue
        .publish("jobs", "build 42 is live", Some(headers))
        .await
        .unwrap();
    ctx.queue.publish("jobs", "plain message", None).await.unwrap();

    let params = HashMap::from([("queueName".to_string(), "jobs".to_string())]);
    ctx.executor.create("consumer", "queue_consume", &params).unwrap();

    let store = ctx.notifications.clone();
    wait_for(move || store.unread_count() == 2).await;

    let unread = ctx.notifications.list_unread();
    assert_eq!(unread.len(), 2);

    let titled = unread
        .iter()
        .find(|n| n.title == "deploy finished")
        .expect("title header should become the notification title");
    assert_eq!(titled.message, "build 42 is live");
    assert_eq!(titled.source.as_deref(), Some("queue"));
    let metadata = titled.metadata.as_ref().unwrap();
    assert_eq!(metadata["queue"], "jobs");

    let untitled = unread.iter().find(|n| n.message == "plain message").unwrap();
    assert_eq!(untitled.title, "queue message");
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let ctx = ctx();
    let n = ctx.notifications.create("hello", "world", None, None);
    assert_eq!(ctx.notifications.unread_count(), 1);

    assert!(ctx.notifications.mark_read(&n.id));
    assert_eq!(ctx.notifications.unread_count(), 0);
    // Marking again still reports success, count stays at zero.
    assert!(ctx.notifications.mark_read(&n.id));
    assert_eq!(ctx.notifications.unread_count(), 0);

    assert!(!ctx.notifications.mark_read("missing"));
}

#[tokio::test]
async fn mark_all_read_broadcasts_a_zero_count() {
    let ctx = ctx();
    ctx.notifications.create("one", "first", None, None);
    ctx.notifications.create("two", "second", None, None);

    let mut rx = ctx.events.subscribe();
    assert!(ctx.notifications.mark_all_read());
    assert_eq!(ctx.notifications.unread_count(), 0);

    let mut saw_zero_count = false;
    while let Ok(envelope) = rx.try_recv() {
        let parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        if parsed["event"] == "NotificationCountUpdated" {
            assert_eq!(parsed["payload"], 0);
            saw_zero_count = true;
        }
    }
    assert!(saw_zero_count);

    // Nothing left unread, so a second pass changes nothing.
    assert!(!ctx.notifications.mark_all_read());
}

#[tokio::test]
async fn notifications_sort_newest_first() {
    let ctx = ctx();
    let first = ctx.notifications.create("first", "a", None, None);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = ctx.notifications.create("second", "b", None, None);

    let all = ctx.notifications.list_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);
    assert_eq!(all[1].id, first.id);
}

#[tokio::test]
async fn delete_removes_single_and_all() {
    let ctx = ctx();
    let keep = ctx.notifications.create("keep", "a", None, None);
    let drop = ctx.notifications.create("drop", "b", None, None);

    assert!(ctx.notifications.delete(&drop.id));
    assert!(!ctx.notifications.delete(&drop.id));
    assert_eq!(ctx.notifications.list_all().len(), 1);
    assert_eq!(ctx.notifications.list_all()[0].id, keep.id);

    ctx.notifications.delete_all();
    assert!(ctx.notifications.list_all().is_empty());
    assert_eq!(ctx.notifications.unread_count(), 0);
}
