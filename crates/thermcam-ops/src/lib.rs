//! Operational helpers: logging, snapshot storage, process signals.

use std::path::PathBuf;

use thermcam_types::{config::OpsConfig, Result, ThermcamError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = log_filter(&config.log_level)?;
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
    Ok(())
}

fn log_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))
}

pub fn ensure_snapshot_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| ops_error(format!("failed to create snapshot dir {path}: {err}")))?;
    info!("Snapshot directory ready at {:?}", dir);
    Ok(dir)
}

/// Cancels `shutdown` on Ctrl-C. The task also ends if the token is
/// cancelled elsewhere first.
pub fn cancel_on_ctrl_c(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Interrupt received, shutting down"),
                    Err(err) => warn!("Cannot listen for Ctrl-C ({}), shutting down", err),
                }
                shutdown.cancel();
            }
        }
    })
}

pub fn ops_error(message: impl Into<String>) -> ThermcamError {
    ThermcamError::Ops(message.into())
}
