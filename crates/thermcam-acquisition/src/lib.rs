//! Acquisition loop driving sensor polling, processing and publication.

mod backoff;
mod smoothing;

use std::time::Duration;

use chrono::Utc;
use thermcam_sensor::{poll_with_timeout, SensorSource};
use thermcam_store::{FrameStore, HealthReporter};
use thermcam_types::{
    config::{AcquisitionConfig, RangeMode},
    frame::{ProcessedFrame, RawFrame},
    health::AcquisitionState,
    ProcessingError, Result, SensorFailure, ThermcamError,
};
use thermcam_vision::FrameProcessor;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use backoff::Backoff;
pub use smoothing::RangeSmoother;

/// Result of a single poll-process-publish cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published { sequence: u64 },
    Dropped(ProcessingError),
    Failed(SensorFailure),
    Fatal(String),
}

/// Owns the sensor and is the only writer of the frame store and health.
pub struct AcquisitionLoop<S: SensorSource> {
    sensor: S,
    processor: FrameProcessor,
    store: FrameStore,
    health: HealthReporter,
    backoff: Backoff,
    smoother: Option<RangeSmoother>,
    poll_timeout: Duration,
    consecutive_failures: u32,
    state: AcquisitionState,
}

impl<S: SensorSource> AcquisitionLoop<S> {
    pub fn new(
        config: &AcquisitionConfig,
        poll_timeout: Duration,
        sensor: S,
        processor: FrameProcessor,
        store: FrameStore,
        health: HealthReporter,
    ) -> Self {
        let smoother = (config.auto_range_smoothing > 0.0
            && processor.config().range == RangeMode::Auto)
            .then(|| RangeSmoother::new(config.auto_range_smoothing));
        Self {
            sensor,
            processor,
            store,
            health,
            backoff: Backoff::new(
                config.period(),
                config.max_backoff(),
                config.failure_threshold,
            ),
            smoother,
            poll_timeout,
            consecutive_failures: 0,
            state: AcquisitionState::Idle,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next poll given the current failure streak.
    pub fn next_delay(&self) -> Duration {
        self.backoff.delay_after(self.consecutive_failures)
    }

    /// Runs one cycle. Failures leave the frame store untouched.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.state == AcquisitionState::Idle {
            self.set_state(AcquisitionState::Polling);
        }
        match poll_with_timeout(&mut self.sensor, self.poll_timeout).await {
            Ok(raw) => match self.render(&raw) {
                Ok(frame) => {
                    let sequence = frame.sequence();
                    if self.store.publish(frame) {
                        self.record_success(sequence);
                        TickOutcome::Published { sequence }
                    } else {
                        let failure = SensorFailure::InvalidData(format!(
                            "sequence {sequence} is not newer than the published frame"
                        ));
                        self.record_failure(&failure.to_string(), false);
                        TickOutcome::Failed(failure)
                    }
                }
                Err(err) => {
                    debug!("Dropping frame {}: {}", raw.sequence(), err);
                    self.record_failure(&err.to_string(), true);
                    TickOutcome::Dropped(err)
                }
            },
            Err(ThermcamError::CapabilityLost(reason)) => {
                self.set_state(AcquisitionState::Stopped);
                self.health
                    .update(|health| health.last_error = Some(reason.clone()));
                TickOutcome::Fatal(reason)
            }
            Err(ThermcamError::Sensor(failure)) => {
                self.record_failure(&failure.to_string(), false);
                TickOutcome::Failed(failure)
            }
            Err(other) => {
                let failure = SensorFailure::Io(other.to_string());
                self.record_failure(&failure.to_string(), false);
                TickOutcome::Failed(failure)
            }
        }
    }

    /// Polls until `shutdown` fires or the sensor is lost. Losing the sensor
    /// cancels `shutdown` so the rest of the process winds down too.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Acquisition loop starting: period {:?}, poll timeout {:?}",
            self.backoff.base(),
            self.poll_timeout
        );
        self.set_state(AcquisitionState::Polling);
        while !shutdown.is_cancelled() {
            let started = Instant::now();
            if let TickOutcome::Fatal(reason) = self.tick().await {
                error!("Sensor capability lost: {}", reason);
                shutdown.cancel();
                return Err(ThermcamError::CapabilityLost(reason));
            }
            let wake = if self.backoff.is_degraded(self.consecutive_failures) {
                Instant::now() + self.next_delay()
            } else {
                started + self.next_delay()
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep_until(wake) => {}
            }
        }
        self.set_state(AcquisitionState::Stopped);
        info!("Acquisition loop stopped");
        Ok(())
    }

    fn render(&mut self, raw: &RawFrame) -> Result<ProcessedFrame, ProcessingError> {
        match self.smoother.as_mut() {
            Some(smoother) => {
                let (min, max) = self.processor.measure(raw)?;
                let (min, max) = smoother.update(min, max);
                self.processor
                    .process_with_range(raw, RangeMode::Fixed { min, max })
            }
            None => self.processor.process(raw),
        }
    }

    fn record_success(&mut self, sequence: u64) {
        if self.state == AcquisitionState::Degraded {
            info!(
                "Sensor recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.set_state(AcquisitionState::Polling);
        self.health.update(|health| {
            health.consecutive_failures = 0;
            health.frames_published += 1;
            health.last_success = Some(Utc::now());
            health.last_sequence = Some(sequence);
        });
    }

    fn record_failure(&mut self, reason: &str, dropped: bool) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let consecutive = self.consecutive_failures;
        debug!("Poll failed ({} in a row): {}", consecutive, reason);
        if self.backoff.is_degraded(consecutive) && self.state != AcquisitionState::Degraded {
            warn!(
                "Sensor degraded after {} consecutive failures, backing off to {:?}",
                consecutive,
                self.next_delay()
            );
            self.set_state(AcquisitionState::Degraded);
        }
        self.health.update(|health| {
            health.consecutive_failures = consecutive;
            health.total_failures += 1;
            if dropped {
                health.frames_dropped += 1;
            }
            health.last_error = Some(reason.to_string());
        });
    }

    fn set_state(&mut self, state: AcquisitionState) {
        if self.state != state {
            self.state = state;
            self.health.update(|health| health.state = state);
        }
    }
}
