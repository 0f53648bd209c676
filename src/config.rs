use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::error;

const DEFAULT_PORT: u16 = 4500;
const DEFAULT_EVENT_BUFFER: usize = 1024;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── ServerConfig ─────────────────────────────────────────────────────────────

/// REST/SSE server configuration (`[server]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    pub bind_address: String,
    /// TCP port (default: 4500).
    pub port: u16,
    /// Capacity of the event broadcast channel. Slow SSE subscribers that
    /// fall more than this many events behind are lagged, not blocked.
    /// Default: 1024.
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

// ─── QueueConfig ──────────────────────────────────────────────────────────────

/// Broker and autostart-consumer configuration (`[queue]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue the autostart consumer subscribes to. Default: "test_queue".
    pub consume_queue: String,
    /// Start a queue_consume task at boot. Default: true.
    pub auto_consume: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            consume_queue: "test_queue".to_string(),
            auto_consume: true,
        }
    }
}

// ─── LogConfig ────────────────────────────────────────────────────────────────

/// Logging configuration (`[log]` in config.toml). CLI flags override these.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "taskd=debug". Default: "info".
    pub level: Option<String>,
    /// Output format: "pretty" (default, human-readable) | "json".
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

// ─── DaemonConfig ─────────────────────────────────────────────────────────────

/// Top-level daemon configuration, loaded from a TOML file when one exists.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub log: LogConfig,
}

impl DaemonConfig {
    /// Load configuration from `path`. A missing file yields defaults; a
    /// file that fails to parse is logged and also yields defaults, so the
    /// daemon always comes up.
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str::<DaemonConfig>(&contents) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(path = %path.display(), err = %e, "failed to parse config file — using defaults");
                Self::default()
            }
        }
    }
}
