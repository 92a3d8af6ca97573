use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse state of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    #[default]
    Idle,
    Polling,
    Degraded,
    Stopped,
}

/// Sensor health as last reported by the acquisition loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorHealth {
    pub state: AcquisitionState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_sequence: Option<u64>,
}
