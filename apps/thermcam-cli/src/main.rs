use anyhow::{Context, Result};
use clap::Parser;
use thermcam_acquisition::AcquisitionLoop;
use thermcam_network::{StreamServer, StreamSources};
use thermcam_ops::{cancel_on_ctrl_c, ensure_snapshot_dir, init_tracing};
use thermcam_sensor::{SensorSource, SimulatedSensor};
use thermcam_store::{health_channel, FrameStore};
use thermcam_types::config::ThermcamConfig;
use thermcam_vision::FrameProcessor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "thermcam", about = "Thermal camera capture and MJPEG streaming server")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "THERMCAM_CONFIG", default_value = "configs/thermcam.toml")]
    config: String,
    /// Address to bind the HTTP server to.
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Tracing filter directive, e.g. `debug` or `info,hyper=warn`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args);
    init_tracing(&config.ops)?;
    info!(
        "Starting thermcam: {}x{} sensor, {} Hz, serving {}:{}",
        config.sensor.width,
        config.sensor.height,
        config.acquisition.frame_rate_hz,
        config.server.bind_addr,
        config.server.port
    );

    let snapshot_dir = ensure_snapshot_dir(&config.ops.snapshot_dir)?;
    let sensor = SimulatedSensor::new(config.sensor.clone());
    let (width, height) = sensor.dimensions();
    let processor = FrameProcessor::new(config.processing.clone(), width, height);
    let store = FrameStore::new();
    let (reporter, health) = health_channel();
    let shutdown = CancellationToken::new();

    let server = StreamServer::bind(
        config.server.clone(),
        StreamSources {
            store: store.clone(),
            health,
            snapshot_dir,
            unit: config.processing.unit,
        },
    )
    .await?;
    let acquisition = AcquisitionLoop::new(
        &config.acquisition,
        config.sensor.poll_timeout(),
        sensor,
        processor,
        store,
        reporter,
    );

    let signals = cancel_on_ctrl_c(shutdown.clone());
    let acquisition = tokio::spawn(acquisition.run(shutdown.clone()));
    let server = tokio::spawn(server.run(shutdown.clone()));

    let acquired = acquisition.await.context("acquisition task panicked")?;
    // The loop only returns early when the token is cancelled.
    shutdown.cancel();
    server
        .await
        .context("server task panicked")?
        .context("stream server failed")?;
    signals.abort();

    if let Err(err) = acquired {
        error!("Shutting down after fatal error: {}", err);
        return Err(err.into());
    }
    info!("thermcam stopped");
    Ok(())
}

fn load_config(args: &Args) -> ThermcamConfig {
    let mut config = match ThermcamConfig::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                args.config
            );
            ThermcamConfig::default()
        }
    };
    if let Some(bind) = &args.bind {
        config.server.bind_addr = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = &args.log_level {
        config.ops.log_level = level.clone();
    }
    if let Err(err) = config.validate() {
        eprintln!(
            "Invalid config in '{}': {err}. Falling back to internal defaults.",
            args.config
        );
        return ThermcamConfig::default();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["thermcam", "--config", "/nonexistent/thermcam.toml"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(&args(&[]));
        assert_eq!(config.server.port, ThermcamConfig::default().server.port);
    }

    #[test]
    fn flags_override_loaded_values() {
        let config = load_config(&args(&[
            "--bind",
            "127.0.0.1",
            "--port",
            "9090",
            "--log-level",
            "debug",
        ]));
        assert_eq!(config.server.bind_addr, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.ops.log_level, "debug");
    }

    #[test]
    fn invalid_override_falls_back_to_defaults() {
        let config = load_config(&args(&["--port", "0"]));
        assert_eq!(config.server.port, ThermcamConfig::default().server.port);
    }
}
