//! Alarm run loop: countdown in one-second cancellable steps, then fire.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::registry::TaskControl;

use super::TaskExecutor;

pub(super) async fn run(
    exec: &TaskExecutor,
    task_id: &str,
    alarm_time: DateTime<Utc>,
    message: &str,
    control: &Arc<TaskControl>,
) -> Result<()> {
    let total_seconds = (alarm_time - Utc::now()).num_seconds().max(1);
    exec.registry.update(task_id, |task| {
        task.message = Some(format!(
            "alarm set for {}, {} remaining",
            alarm_time.format("%H:%M:%S"),
            format_hms(total_seconds)
        ));
    });

    for elapsed in 0..total_seconds {
        control.checkpoint().await?;

        let progress = ((elapsed as f64 / total_seconds as f64) * 100.0) as i32;
        let remaining = total_seconds - elapsed;
        exec.registry.update(task_id, |task| {
            task.set_progress(progress);
            task.message = Some(format!(
                "alarm at {}, {} remaining",
                alarm_time.format("%H:%M:%S"),
                format_hms(remaining)
            ));
        });

        control.sleep(Duration::from_secs(1)).await?;
    }

    // Time's up.
    exec.registry.update(task_id, |task| {
        task.set_progress(100);
        task.message = Some(message.to_string());
    });
    let name = exec.task_name(task_id);
    exec.events.alarm_triggered(task_id, &name, message);
    exec.notifier.notify(&name, message);
    Ok(())
}

fn format_hms(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
