//! Integration tests for the task registry lifecycle: create, pause, resume,
//! stop, delete, and the TaskUpdated event stream.

use std::collections::HashMap;
use std::time::Duration;

use taskd::config::DaemonConfig;
use taskd::model::TaskStatus;
use taskd::AppContext;

fn ctx() -> AppContext {
    AppContext::new(DaemonConfig::default())
}

fn alarm_params(seconds_ahead: i64) -> HashMap<String, String> {
    let when = chrono::Utc::now() + chrono::Duration::seconds(seconds_ahead);
    HashMap::from([("alarmTime".to_string(), when.to_rfc3339())])
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
async fn created_task_is_listed_and_fetchable() {
    let ctx = ctx();
    let task = ctx
        .executor
        .create("wakeup", "alarm", &alarm_params(3600))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let registry = ctx.registry.clone();
    let id = task.id.clone();
    wait_for(move || {
        registry
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;

    let listed = ctx.registry.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, task.id);
    assert!(listed[0].started_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_a_running_alarm() {
    let ctx = ctx();
    let task = ctx
        .executor
        .create("wakeup", "alarm", &alarm_params(3600))
        .unwrap();

    let registry = ctx.registry.clone();
    let id = task.id.clone();
    wait_for({
        let registry = registry.clone();
        let id = id.clone();
        move || {
            registry
                .get(&id)
                .is_some_and(|t| t.status == TaskStatus::Running)
        }
    })
    .await;

    assert!(ctx.registry.stop(&task.id));
    let stopped = ctx.registry.get(&task.id).unwrap();
    assert_eq!(stopped.status, TaskStatus::Cancelled);
    assert_eq!(stopped.message.as_deref(), Some("stopped by user"));
    assert!(stopped.completed_at.is_some());

    // The run loop unwinds and releases its control handle.
    wait_for(move || registry.control(&id).is_none()).await;

    // A second stop is a no-op.
    assert!(!ctx.registry.stop(&task.id));
}

#[tokio::test(start_paused = true)]
async fn alarm_can_be_paused_and_resumed() {
    let ctx = ctx();
    let task = ctx
        .executor
        .create("wakeup", "alarm", &alarm_params(3600))
        .unwrap();

    let registry = ctx.registry.clone();
    let id = task.id.clone();
    wait_for(move || {
        registry
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;

    assert!(ctx.registry.pause(&task.id));
    assert_eq!(
        ctx.registry.get(&task.id).unwrap().status,
        TaskStatus::Paused
    );
    // Pausing twice changes nothing.
    assert!(!ctx.registry.pause(&task.id));

    assert!(ctx.registry.resume(&task.id));
    assert_eq!(
        ctx.registry.get(&task.id).unwrap().status,
        TaskStatus::Running
    );
}

#[tokio::test(start_paused = true)]
async fn queue_consumer_cannot_be_paused() {
    let ctx = ctx();
    let params = HashMap::from([("queueName".to_string(), "jobs".to_string())]);
    let task = ctx
        .executor
        .create("consumer", "queue_consume", &params)
        .unwrap();

    let registry = ctx.registry.clone();
    let id = task.id.clone();
    wait_for(move || {
        registry
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;

    assert!(!ctx.registry.pause(&task.id));
    assert!(ctx.registry.stop(&task.id));
}

#[tokio::test(start_paused = true)]
async fn delete_refuses_active_tasks() {
    let ctx = ctx();
    let task = ctx
        .executor
        .create("wakeup", "alarm", &alarm_params(3600))
        .unwrap();

    let registry = ctx.registry.clone();
    let id = task.id.clone();
    wait_for(move || {
        registry
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;

    assert!(!ctx.registry.delete(&task.id));
    assert!(ctx.registry.stop(&task.id));
    assert!(ctx.registry.delete(&task.id));
    assert!(ctx.registry.get(&task.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn lifecycle_changes_are_broadcast() {
    let ctx = ctx();
    let mut rx = ctx.events.subscribe();

    let task = ctx
        .executor
        .create("wakeup", "alarm", &alarm_params(3600))
        .unwrap();

    let registry = ctx.registry.clone();
    let id = task.id.clone();
    wait_for(move || {
        registry
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;

    let mut saw_pending = false;
    let mut saw_running = false;
    while let Ok(envelope) = rx.try_recv() {
        let parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        if parsed["event"] == "TaskUpdated" {
            match parsed["payload"]["status"].as_str() {
                Some("pending") => saw_pending = true,
                Some("running") => saw_running = true,
                _ => {}
            }
        }
    }
    assert!(saw_pending, "creation should broadcast a Pending snapshot");
    assert!(saw_running, "the Running transition should broadcast");
}

#[tokio::test]
async fn unknown_ids_are_rejected_everywhere() {
    let ctx = ctx();
    assert!(ctx.registry.get("nope").is_none());
    assert!(!ctx.registry.stop("nope"));
    assert!(!ctx.registry.pause("nope"));
    assert!(!ctx.registry.resume("nope"));
    assert!(!ctx.registry.delete("nope"));
}
