//! Tracing setup: compact console output plus a daily rolling log file

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file prefix, e.g. `mcplink.2026-01-22.log`
pub const LOG_PREFIX: &str = "mcplink";

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str =
    "info,mcplink_core=debug,mcplink_gateway=debug,mcplink_storage=debug,mcplink_daemon=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize tracing with console and file logging.
///
/// Falls back to console-only logging if the log directory is unusable.
/// The returned guard must live for the whole program; dropping it stops
/// file logging.
pub fn init_tracing(logs_dir: &Path) -> Option<WorkerGuard> {
    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    if let Err(e) = std::fs::create_dir_all(logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
    }

    let file_appender = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(logs_dir)
    {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: File logging disabled: {}", e);
            tracing_subscriber::registry()
                .with(env_filter())
                .with(console_layer)
                .init();
            return None;
        }
    };
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .with(file_layer)
        .init();

    Some(guard)
}
