use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use thermcam_types::{frame::RawFrame, Result, SensorFailure, ThermcamError};
use tracing::debug;

use crate::SensorSource;

/// Outcome of one poll of a [`ScriptedSensor`].
#[derive(Debug)]
pub enum ScriptStep {
    /// A frame with every cell at the given temperature.
    Frame(f32),
    /// A frame with explicit row-major readings.
    Readings(Vec<f32>),
    Fail(SensorFailure),
    Error(ThermcamError),
    /// Never completes.
    Hang,
    Lost(String),
}

/// Sensor that replays a fixed list of outcomes, then keeps returning
/// uniform frames at the last temperature it produced.
pub struct ScriptedSensor {
    width: usize,
    height: usize,
    steps: VecDeque<ScriptStep>,
    last_fill: f32,
    sequence: u64,
    polls: Arc<AtomicUsize>,
}

impl ScriptedSensor {
    pub fn new(width: usize, height: usize, steps: Vec<ScriptStep>) -> Self {
        Self {
            width,
            height,
            steps: steps.into(),
            last_fill: 20.0,
            sequence: 0,
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of polls started, readable after the sensor is moved.
    pub fn poll_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.polls)
    }

    fn frame(&mut self, temperatures: Vec<f32>) -> Result<RawFrame> {
        self.sequence += 1;
        RawFrame::new(
            self.width,
            self.height,
            temperatures,
            self.sequence,
            Utc::now(),
        )
    }
}

#[async_trait]
impl SensorSource for ScriptedSensor {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    async fn poll(&mut self) -> Result<RawFrame> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .pop_front()
            .unwrap_or(ScriptStep::Frame(self.last_fill));
        debug!("Scripted sensor step {:?}", step);
        match step {
            ScriptStep::Frame(fill) => {
                self.last_fill = fill;
                self.frame(vec![fill; self.width * self.height])
            }
            ScriptStep::Readings(readings) => self.frame(readings),
            ScriptStep::Fail(failure) => Err(failure.into()),
            ScriptStep::Error(err) => Err(err),
            ScriptStep::Hang => std::future::pending().await,
            ScriptStep::Lost(reason) => Err(ThermcamError::CapabilityLost(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_steps_then_repeats_last_fill() {
        let mut sensor = ScriptedSensor::new(
            2,
            2,
            vec![
                ScriptStep::Frame(30.0),
                ScriptStep::Fail(SensorFailure::Io("nack".into())),
            ],
        );
        let first = sensor.poll().await.expect("first frame");
        assert_eq!(first.sequence(), 1);
        assert!(sensor.poll().await.is_err());
        let repeated = sensor.poll().await.expect("fallback frame");
        assert_eq!(repeated.sequence(), 2);
        assert!(repeated.temperatures().iter().all(|t| *t == 30.0));
        assert_eq!(sensor.poll_counter().load(Ordering::SeqCst), 3);
    }
}
