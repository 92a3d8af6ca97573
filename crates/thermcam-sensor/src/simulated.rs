use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use thermcam_types::{config::SensorConfig, frame::RawFrame, Result};
use tracing::{debug, info};

use crate::{sensor_io_error, SensorSource, DEAD_PIXEL_SENTINEL};

/// Synthetic scene: a warm spot drifting over an ambient background.
pub struct SimulatedSensor {
    config: SensorConfig,
    rng: StdRng,
    dead_cells: Vec<usize>,
    sequence: u64,
}

impl SimulatedSensor {
    pub fn new(config: SensorConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.simulated.seed);
        let cells = config.width * config.height;
        let dead_cells = (0..config.simulated.dead_pixels.min(cells))
            .map(|_| rng.gen_range(0..cells))
            .collect();
        info!(
            "Simulated {}x{} sensor ready (failure rate {:.2})",
            config.width, config.height, config.simulated.failure_rate
        );
        Self {
            config,
            rng,
            dead_cells,
            sequence: 0,
        }
    }

    fn render(&mut self) -> Vec<f32> {
        let sim = &self.config.simulated;
        let (w, h) = (self.config.width as f32, self.config.height as f32);
        let phase = self.sequence as f32 * 0.05;
        let cx = w / 2.0 + (w / 3.0) * phase.sin();
        let cy = h / 2.0 + (h / 3.0) * (phase * 0.7).cos();
        let radius = (w.min(h) / 5.0).max(1.0);

        let mut temperatures = Vec::with_capacity(self.config.width * self.config.height);
        for y in 0..self.config.height {
            for x in 0..self.config.width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let falloff = (-(dx * dx + dy * dy) / (2.0 * radius * radius)).exp();
                let noise = if sim.noise_c > 0.0 {
                    self.rng.gen_range(-sim.noise_c..sim.noise_c)
                } else {
                    0.0
                };
                temperatures.push(sim.ambient_c + (sim.hotspot_c - sim.ambient_c) * falloff + noise);
            }
        }
        for &cell in &self.dead_cells {
            temperatures[cell] = DEAD_PIXEL_SENTINEL;
        }
        temperatures
    }
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    fn dimensions(&self) -> (usize, usize) {
        (self.config.width, self.config.height)
    }

    async fn poll(&mut self) -> Result<RawFrame> {
        if self.rng.gen::<f32>() < self.config.simulated.failure_rate {
            debug!("Simulated sensor injecting bus failure");
            return Err(sensor_io_error("simulated bus error"));
        }
        self.sequence += 1;
        let temperatures = self.render();
        RawFrame::new(
            self.config.width,
            self.config.height,
            temperatures,
            self.sequence,
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermcam_types::config::SimulatedSensorConfig;

    fn config(simulated: SimulatedSensorConfig) -> SensorConfig {
        SensorConfig {
            simulated,
            ..SensorConfig::default()
        }
    }

    #[tokio::test]
    async fn produces_sequenced_frames_near_ambient() {
        let mut sensor = SimulatedSensor::new(config(SimulatedSensorConfig::default()));
        let first = sensor.poll().await.expect("first frame");
        let second = sensor.poll().await.expect("second frame");
        assert_eq!((first.width(), first.height()), (32, 24));
        assert_eq!(second.sequence(), first.sequence() + 1);
        let max = first.temperatures().iter().cloned().fold(f32::MIN, f32::max);
        let min = first.temperatures().iter().cloned().fold(f32::MAX, f32::min);
        assert!(min > 21.0 && max < 35.0, "min {min} max {max}");
        assert!(max - min > 5.0);
    }

    #[tokio::test]
    async fn same_seed_same_scene() {
        let mut a = SimulatedSensor::new(config(SimulatedSensorConfig::default()));
        let mut b = SimulatedSensor::new(config(SimulatedSensorConfig::default()));
        let fa = a.poll().await.expect("frame a");
        let fb = b.poll().await.expect("frame b");
        assert_eq!(fa.temperatures(), fb.temperatures());
    }

    #[tokio::test]
    async fn injects_failures_and_dead_pixels() {
        let mut failing = SimulatedSensor::new(config(SimulatedSensorConfig {
            failure_rate: 1.0,
            ..SimulatedSensorConfig::default()
        }));
        assert!(failing.poll().await.is_err());

        let mut dead = SimulatedSensor::new(config(SimulatedSensorConfig {
            dead_pixels: 3,
            ..SimulatedSensorConfig::default()
        }));
        let frame = dead.poll().await.expect("frame");
        let dead_count = frame
            .temperatures()
            .iter()
            .filter(|t| **t == DEAD_PIXEL_SENTINEL)
            .count();
        assert!((1..=3).contains(&dead_count));
    }
}
