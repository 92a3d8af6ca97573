use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{frame::TemperatureUnit, Result, ThermcamError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedSensorConfig {
    pub ambient_c: f32,
    pub hotspot_c: f32,
    pub noise_c: f32,
    /// Probability in [0, 1] that a poll fails with an I/O error.
    pub failure_rate: f32,
    pub dead_pixels: usize,
    pub seed: u64,
}

impl Default for SimulatedSensorConfig {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            hotspot_c: 34.0,
            noise_c: 0.3,
            failure_rate: 0.0,
            dead_pixels: 0,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub width: usize,
    pub height: usize,
    pub poll_timeout_ms: u64,
    pub simulated: SimulatedSensorConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 24,
            poll_timeout_ms: 500,
            simulated: SimulatedSensorConfig::default(),
        }
    }
}

impl SensorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub frame_rate_hz: f32,
    /// Consecutive failures before the loop is considered degraded.
    pub failure_threshold: u32,
    pub max_backoff_ms: u64,
    /// Weight given to the previous auto range, 0.0 disables smoothing.
    pub auto_range_smoothing: f32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 8.0,
            failure_threshold: 5,
            max_backoff_ms: 5_000,
            auto_range_smoothing: 0.0,
        }
    }
}

impl AcquisitionConfig {
    pub fn period(&self) -> Duration {
        Duration::from_nanos((1e9 / self.frame_rate_hz as f64).round() as u64)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColormapKind {
    #[default]
    Jet,
    Bwr,
    Seismic,
    Coolwarm,
    Gnuplot2,
    Brg,
    Grayscale,
}

/// How temperatures are stretched over the colormap.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RangeMode {
    #[default]
    Auto,
    Fixed {
        min: f32,
        max: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorbarConfig {
    pub width: u32,
    pub margin: u32,
    pub tick_step_c: f32,
}

impl Default for ColorbarConfig {
    fn default() -> Self {
        Self {
            width: 30,
            margin: 10,
            tick_step_c: 5.0,
        }
    }
}

/// Edge-preserving smoothing applied to the coloured image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralConfig {
    /// Neighbourhood diameter in output pixels.
    pub diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

impl Default for BilateralConfig {
    fn default() -> Self {
        Self {
            diameter: 15,
            sigma_color: 80.0,
            sigma_space: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub interpolation: Interpolation,
    pub interpolation_factor: u32,
    pub colormap: ColormapKind,
    pub range: RangeMode,
    pub plausible_min_c: f32,
    pub plausible_max_c: f32,
    pub max_dead_pixels: usize,
    pub mirror_horizontal: bool,
    pub colorbar: Option<ColorbarConfig>,
    pub filter: Option<BilateralConfig>,
    pub unit: TemperatureUnit,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bilinear,
            interpolation_factor: 20,
            colormap: ColormapKind::Jet,
            range: RangeMode::Auto,
            plausible_min_c: -40.0,
            plausible_max_c: 300.0,
            max_dead_pixels: 16,
            mirror_horizontal: true,
            colorbar: None,
            filter: None,
            unit: TemperatureUnit::Celsius,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub max_clients: usize,
    pub listen_backlog: u32,
    pub default_client_fps: f32,
    pub max_client_fps: f32,
    pub write_timeout_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8000,
            max_clients: 8,
            listen_backlog: 32,
            default_client_fps: 8.0,
            max_client_fps: 30.0,
            write_timeout_ms: 2_000,
            jpeg_quality: 85,
        }
    }
}

impl ServerConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    pub snapshot_dir: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            snapshot_dir: "snapshots".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermcamConfig {
    pub sensor: SensorConfig,
    pub acquisition: AcquisitionConfig,
    pub processing: ProcessingConfig,
    pub server: ServerConfig,
    pub ops: OpsConfig,
}

impl ThermcamConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            ThermcamError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            ThermcamError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.sensor.width == 0 || self.sensor.height == 0 {
            return Err(config_error("sensor dimensions must be greater than zero"));
        }
        if self.sensor.poll_timeout_ms == 0 {
            return Err(config_error("sensor.poll_timeout_ms must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.sensor.simulated.failure_rate) {
            return Err(config_error(
                "sensor.simulated.failure_rate must be between 0.0 and 1.0",
            ));
        }
        if !(self.acquisition.frame_rate_hz > 0.0 && self.acquisition.frame_rate_hz <= 64.0) {
            return Err(config_error(
                "acquisition.frame_rate_hz must be in (0, 64]",
            ));
        }
        if self.acquisition.failure_threshold == 0 {
            return Err(config_error(
                "acquisition.failure_threshold must be greater than zero",
            ));
        }
        if self.acquisition.max_backoff() <= self.acquisition.period() {
            return Err(config_error(
                "acquisition.max_backoff_ms must exceed the polling period",
            ));
        }
        if !(0.0..1.0).contains(&self.acquisition.auto_range_smoothing) {
            return Err(config_error(
                "acquisition.auto_range_smoothing must be in [0.0, 1.0)",
            ));
        }
        if !(1..=64).contains(&self.processing.interpolation_factor) {
            return Err(config_error(
                "processing.interpolation_factor must be between 1 and 64",
            ));
        }
        if self.processing.plausible_min_c >= self.processing.plausible_max_c {
            return Err(config_error(
                "processing.plausible_min_c must be below plausible_max_c",
            ));
        }
        if let RangeMode::Fixed { min, max } = self.processing.range {
            if !(min < max) {
                return Err(config_error("processing.range fixed min must be below max"));
            }
        }
        if let Some(colorbar) = &self.processing.colorbar {
            if colorbar.width == 0 || colorbar.tick_step_c <= 0.0 {
                return Err(config_error(
                    "processing.colorbar width and tick_step_c must be positive",
                ));
            }
        }
        if let Some(filter) = &self.processing.filter {
            if !(1..=63).contains(&filter.diameter)
                || filter.sigma_color <= 0.0
                || filter.sigma_space <= 0.0
            {
                return Err(config_error(
                    "processing.filter needs a diameter in 1..=63 and positive sigmas",
                ));
            }
        }
        if self.server.port == 0 {
            return Err(config_error("server.port must be a valid port (>0)"));
        }
        if self.server.max_clients == 0 {
            return Err(config_error("server.max_clients must be greater than zero"));
        }
        if !(self.server.default_client_fps > 0.0
            && self.server.default_client_fps <= self.server.max_client_fps)
        {
            return Err(config_error(
                "server.default_client_fps must be in (0, max_client_fps]",
            ));
        }
        if self.server.write_timeout_ms == 0 {
            return Err(config_error(
                "server.write_timeout_ms must be greater than zero",
            ));
        }
        if !(1..=100).contains(&self.server.jpeg_quality) {
            return Err(config_error("server.jpeg_quality must be between 1 and 100"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> ThermcamError {
    ThermcamError::Configuration(message.into())
}
