use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = ThermcamError> = std::result::Result<T, E>;

/// Recoverable sensor poll failures. The acquisition loop retries all of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorFailure {
    #[error("sensor poll exceeded {0:?}")]
    Timeout(Duration),
    #[error("sensor I/O error: {0}")]
    Io(String),
    #[error("sensor returned invalid data: {0}")]
    InvalidData(String),
}

/// Reasons a raw frame is dropped by the processing stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    #[error("reading {value:.2}°C at ({x}, {y}) outside plausible range [{min}, {max}]")]
    OutOfRange {
        x: usize,
        y: usize,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("{count} dead pixels exceeds limit of {limit}")]
    DeadPixels { count: usize, limit: usize },
    #[error("frame is {actual_width}x{actual_height}, processor expects {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },
}

/// Failures that end a single streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("write to client failed: {0}")]
    WriteFailed(String),
    #[error("client disconnected")]
    Disconnected,
    #[error("client write timed out after {0:?}")]
    Timeout(Duration),
}

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum ThermcamError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Sensor(#[from] SensorFailure),
    #[error("sensor capability lost: {0}")]
    CapabilityLost(String),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("connection limit of {limit} reached")]
    CapacityExceeded { limit: usize },
    #[error("imaging error: {0}")]
    Imaging(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ThermcamError {
    /// Only a lost sensor capability should bring the process down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ThermcamError::CapabilityLost(_))
    }
}
