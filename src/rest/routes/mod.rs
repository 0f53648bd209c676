pub mod health;
pub mod notifications;
pub mod queue;
pub mod tasks;
