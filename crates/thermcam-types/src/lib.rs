//! Shared domain types for the thermcam project.

pub mod config;
pub mod frame;
pub mod health;

mod errors;

pub use errors::{ClientError, ProcessingError, Result, SensorFailure, ThermcamError};
