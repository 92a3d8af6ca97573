//! Thermal sensor abstraction layer.

mod scripted;
mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use thermcam_types::{frame::RawFrame, Result, SensorFailure, ThermcamError};
use tokio::time::timeout;

pub use scripted::{ScriptStep, ScriptedSensor};
pub use simulated::SimulatedSensor;

/// Value reported by the sensor for a cell it could not read.
pub const DEAD_PIXEL_SENTINEL: f32 = -273.15;

/// A device that yields one temperature frame per poll.
///
/// Recoverable failures are reported as [`ThermcamError::Sensor`]; a device
/// that is gone for good reports [`ThermcamError::CapabilityLost`].
#[async_trait]
pub trait SensorSource: Send {
    /// Grid size as (width, height); fixed for the lifetime of the device.
    fn dimensions(&self) -> (usize, usize);
    async fn poll(&mut self) -> Result<RawFrame>;
}

/// Polls the sensor, turning an overrun of `limit` into a timeout failure.
pub async fn poll_with_timeout<S>(sensor: &mut S, limit: Duration) -> Result<RawFrame>
where
    S: SensorSource + ?Sized,
{
    match timeout(limit, sensor.poll()).await {
        Ok(outcome) => outcome.map_err(normalize_error),
        Err(_) => Err(SensorFailure::Timeout(limit).into()),
    }
}

/// Anything a driver reports that is neither a known failure nor fatal counts as I/O.
fn normalize_error(err: ThermcamError) -> ThermcamError {
    match err {
        ThermcamError::Sensor(_) | ThermcamError::CapabilityLost(_) => err,
        other => sensor_io_error(other.to_string()),
    }
}

pub fn sensor_io_error(message: impl Into<String>) -> ThermcamError {
    ThermcamError::Sensor(SensorFailure::Io(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hung_sensor_becomes_timeout() {
        let mut sensor = ScriptedSensor::new(4, 3, vec![ScriptStep::Hang]);
        let err = poll_with_timeout(&mut sensor, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ThermcamError::Sensor(SensorFailure::Timeout(limit)) if limit == Duration::from_millis(50)
        ));
    }

    #[tokio::test]
    async fn foreign_errors_are_reported_as_io() {
        let mut sensor = ScriptedSensor::new(
            4,
            3,
            vec![ScriptStep::Error(ThermcamError::Network("bus reset".into()))],
        );
        let err = poll_with_timeout(&mut sensor, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ThermcamError::Sensor(SensorFailure::Io(_))));
    }

    #[tokio::test]
    async fn capability_loss_passes_through() {
        let mut sensor =
            ScriptedSensor::new(4, 3, vec![ScriptStep::Lost("device vanished".into())]);
        let err = poll_with_timeout(&mut sensor, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
