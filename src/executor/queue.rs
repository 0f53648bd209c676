//! Queue run loops: repeated publishes and the long-lived consumer.
//!
//! The consumer survives broker outages: when the subscription drops it
//! backs off and resubscribes rather than failing the task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::Result;
use crate::registry::TaskControl;

use super::TaskExecutor;

/// Wait between resubscribe attempts after the broker drops us.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// Default title when a delivery carries no `title` header.
const DEFAULT_TITLE: &str = "queue message";

pub(super) async fn run_publish(
    exec: &TaskExecutor,
    task_id: &str,
    queue_name: &str,
    message: &str,
    execution_count: u32,
    interval_seconds: u64,
    control: &Arc<TaskControl>,
) -> Result<()> {
    if execution_count > 1 {
        exec.registry.update(task_id, |task| {
            task.max_value = Some(execution_count as i32);
        });
    }

    let mut sent = 0u32;
    let mut failed = 0u32;

    for iteration in 1..=execution_count {
        control.checkpoint().await?;

        let headers = HashMap::from([("source".to_string(), "taskd".to_string())]);
        match exec.queue.publish(queue_name, message, Some(headers)).await {
            Ok(true) => {
                sent += 1;
                exec.registry.update(task_id, |task| {
                    task.set_progress(iteration as i32);
                    task.message =
                        Some(format!("published {iteration} of {execution_count} to '{queue_name}'"));
                });
            }
            Ok(false) => {
                failed += 1;
                exec.registry.update(task_id, |task| {
                    task.set_progress(iteration as i32);
                    task.error_message = Some(format!("broker refused publish to '{queue_name}'"));
                });
            }
            Err(err) => {
                // Transport hiccups are recorded but do not abort the run.
                failed += 1;
                warn!(task_id = %task_id, queue = queue_name, error = %err, "publish failed");
                exec.registry.update(task_id, |task| {
                    task.set_progress(iteration as i32);
                    task.error_message = Some(err.to_string());
                });
            }
        }

        if iteration < execution_count && interval_seconds > 0 {
            control.sleep(Duration::from_secs(interval_seconds)).await?;
        }
    }

    exec.registry.update(task_id, |task| {
        task.message = Some(format!("publish finished: sent {sent}, failed {failed}"));
    });
    Ok(())
}

pub(super) async fn run_consume(
    exec: &TaskExecutor,
    task_id: &str,
    queue_name: &str,
    control: &Arc<TaskControl>,
) -> Result<()> {
    loop {
        control.checkpoint().await?;

        match exec.queue.subscribe(queue_name).await {
            Ok(mut rx) => {
                info!(task_id = %task_id, queue = queue_name, "consumer subscribed");
                exec.registry.update(task_id, |task| {
                    task.message = Some(format!("consuming from '{queue_name}'"));
                });

                loop {
                    tokio::select! {
                        _ = control.cancel.cancelled() => return Ok(()),
                        delivery = rx.recv() => match delivery {
                            Some(delivery) => handle_delivery(exec, queue_name, delivery),
                            None => break,
                        },
                    }
                }
                warn!(task_id = %task_id, queue = queue_name, "subscription lost, reconnecting");
            }
            Err(err) => {
                warn!(task_id = %task_id, queue = queue_name, error = %err, "subscribe failed");
                exec.registry.update(task_id, |task| {
                    task.message = Some(format!("waiting to reconnect to '{queue_name}'"));
                });
            }
        }

        control.sleep(RECONNECT_BACKOFF).await?;
    }
}

fn handle_delivery(exec: &TaskExecutor, queue_name: &str, delivery: crate::queue_gateway::Delivery) {
    let title = delivery
        .headers
        .get("title")
        .cloned()
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let mut metadata = Map::new();
    metadata.insert("queue".into(), Value::String(queue_name.to_string()));
    for (key, value) in &delivery.headers {
        metadata.insert(key.clone(), Value::String(value.clone()));
    }
    exec.notifications
        .create(&title, &delivery.body, Some("queue"), Some(metadata));
    delivery.ack();
}
