pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod model;
pub mod notifications;
pub mod notify;
pub mod process_runner;
pub mod queue_gateway;
pub mod registry;
pub mod rest;

use std::sync::Arc;

use config::DaemonConfig;
use events::EventBroadcaster;
use executor::TaskExecutor;
use notifications::NotificationStore;
use notify::{DesktopNotifier, LogNotifier};
use queue_gateway::{MemoryBroker, QueueGateway};
use registry::TaskRegistry;

/// Shared application state passed to every REST handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub events: EventBroadcaster,
    pub registry: Arc<TaskRegistry>,
    pub executor: TaskExecutor,
    pub notifications: Arc<NotificationStore>,
    pub queue: Arc<dyn QueueGateway>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppContext {
    /// Wire the daemon together: one broadcaster, one registry, one broker,
    /// one notification store, all shared by the executor and the REST layer.
    pub fn new(config: DaemonConfig) -> Self {
        let events = EventBroadcaster::new(config.server.event_buffer);
        let notifier: Arc<dyn DesktopNotifier> = Arc::new(LogNotifier);
        let registry = Arc::new(TaskRegistry::new(events.clone(), Arc::clone(&notifier)));
        let notifications = Arc::new(NotificationStore::new(events.clone()));
        let queue: Arc<dyn QueueGateway> = Arc::new(MemoryBroker::new());
        let executor = TaskExecutor::new(
            Arc::clone(&registry),
            events.clone(),
            Arc::clone(&queue),
            notifier,
            Arc::clone(&notifications),
        );
        Self {
            config: Arc::new(config),
            events,
            registry,
            executor,
            notifications,
            queue,
            started_at: chrono::Utc::now(),
        }
    }
}
