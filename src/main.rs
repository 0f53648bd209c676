use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

use taskd::config::DaemonConfig;
use taskd::AppContext;

#[derive(Parser)]
#[command(
    name = "taskd",
    about = "taskd — background task manager daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to a TOML config file
    #[arg(long, env = "TASKD_CONFIG")]
    config: Option<PathBuf>,

    /// REST API port
    #[arg(long, env = "TASKD_PORT")]
    port: Option<u16>,

    /// Bind address for the REST API (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TASKD_BIND")]
    bind_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TASKD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log output format: "pretty" (default) or "json"
    #[arg(long, env = "TASKD_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (default when no subcommand given).
    ///
    /// Runs taskd in the foreground until Ctrl-C.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path),
        None => DaemonConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind_address.clone() {
        config.server.bind_address = bind;
    }

    // Init once, before any tracing calls. CLI flags win over the config file.
    let log_level = args
        .log
        .clone()
        .or_else(|| config.log.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let log_format = args
        .log_format
        .clone()
        .or_else(|| config.log.format.clone())
        .unwrap_or_else(|| "pretty".to_string());
    let log_file = args
        .log_file
        .clone()
        .or_else(|| config.log.file.as_ref().map(PathBuf::from));
    let _file_guard = setup_logging(&log_level, log_file.as_deref(), &log_format);

    match args.command {
        None | Some(Command::Serve) => run_serve(config).await,
    }
}

async fn run_serve(config: DaemonConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "taskd starting");
    let ctx = AppContext::new(config);

    if ctx.config.queue.auto_consume {
        start_autostart_consumer(&ctx);
    }

    taskd::rest::start_rest_server(ctx).await?;
    info!("taskd stopped");
    Ok(())
}

/// Boot-time consumer on the configured queue, mirroring a user-created
/// queue_consume task. Failure to start is logged, never fatal.
fn start_autostart_consumer(ctx: &AppContext) {
    let queue = ctx.config.queue.consume_queue.clone();
    let parameters = HashMap::from([("queueName".to_string(), queue.clone())]);
    match ctx
        .executor
        .create("queue consumer", "queue_consume", &parameters)
    {
        Ok(task) => info!(task_id = %task.id, queue = %queue, "autostart consumer running"),
        Err(e) => warn!(queue = %queue, error = %e, "autostart consumer failed to start"),
    }
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("taskd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
