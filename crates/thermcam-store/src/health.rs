use thermcam_types::health::SensorHealth;
use tokio::sync::watch;

/// Creates the writer/reader pair for sensor health.
pub fn health_channel() -> (HealthReporter, HealthHandle) {
    let (tx, rx) = watch::channel(SensorHealth::default());
    (HealthReporter { tx }, HealthHandle { rx })
}

/// Write side, owned by the acquisition loop.
pub struct HealthReporter {
    tx: watch::Sender<SensorHealth>,
}

impl HealthReporter {
    pub fn update(&self, apply: impl FnOnce(&mut SensorHealth)) {
        self.tx.send_modify(apply);
    }
}

/// Read-only view for status reporting.
#[derive(Clone)]
pub struct HealthHandle {
    rx: watch::Receiver<SensorHealth>,
}

impl HealthHandle {
    pub fn snapshot(&self) -> SensorHealth {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermcam_types::health::AcquisitionState;

    #[test]
    fn handle_sees_reporter_updates() {
        let (reporter, handle) = health_channel();
        assert_eq!(handle.snapshot(), SensorHealth::default());
        reporter.update(|health| {
            health.state = AcquisitionState::Degraded;
            health.consecutive_failures = 6;
        });
        let seen = handle.snapshot();
        assert_eq!(seen.state, AcquisitionState::Degraded);
        assert_eq!(seen.consecutive_failures, 6);
        assert_eq!(handle.clone().snapshot(), seen);
    }
}
