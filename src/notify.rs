//! Desktop notification boundary.
//!
//! The core only invokes an abstract notify capability; the platform toast
//! chain (and its fallbacks) lives outside the crate.

use tracing::info;

pub trait DesktopNotifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Default notifier: a structured log line. Stands in wherever no platform
/// integration is wired up.
#[derive(Default)]
pub struct LogNotifier;

impl DesktopNotifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!(title, message, "desktop notification");
    }
}
