use std::time::Duration;

use mcplink_daemon::{logging, App, DaemonConfig};
use tracing::{error, info};

/// Interval of the operator status line
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::from_env();

    // Keep the guard alive for the entire program - dropping it stops file logging
    let _log_guard = logging::init_tracing(&config.log_dir);

    info!("Starting McpLink v{}", env!("CARGO_PKG_VERSION"));
    info!("Logs directory: {}", config.log_dir.display());

    let mut app = App::build(config).map_err(|e| {
        error!("Failed to initialize: {:#}", e);
        e
    })?;
    app.start().await?;

    let mut status_tick = tokio::time::interval(STATUS_INTERVAL);
    status_tick.tick().await;

    loop {
        tokio::select! {
            _ = status_tick.tick() => {
                info!("[Status] {}", app.status_line().await);
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    app.shutdown().await;
    Ok(())
}
