//! Error types for the UKF engine.

use crate::measurement::SensorType;
use thiserror::Error;

/// Errors surfaced by the estimation engine.
///
/// Numerical failures (`NotPositiveDefinite`, `SingularInnovation`) mean the
/// filter diverged or was misconfigured. Retrying with the same input
/// reproduces them, so the engine never retries on its own.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UkfError {
    /// Cholesky factorisation of the augmented covariance failed
    #[error("Augmented covariance is not positive definite")]
    NotPositiveDefinite,

    /// Innovation covariance could not be inverted
    #[error("Innovation covariance is singular ({sensor} update)")]
    SingularInnovation { sensor: SensorType },

    /// Payload length does not match the sensor type
    #[error("Malformed {sensor} measurement: expected {expected} values, found {found}")]
    MalformedMeasurement {
        sensor: SensorType,
        expected: usize,
        found: usize,
    },

    /// Payload contains NaN or infinity
    #[error("Non-finite value in {sensor} measurement")]
    NonFiniteMeasurement { sensor: SensorType },

    /// Measurement is older than the last processed one
    #[error("Out-of-order measurement: last timestamp {last_us}us, got {got_us}us")]
    OutOfOrder { last_us: i64, got_us: i64 },

    /// Gap between the two timestamps does not fit in an i64
    #[error("Timestamp gap overflows: last timestamp {last_us}us, got {got_us}us")]
    TimestampOverflow { last_us: i64, got_us: i64 },

    /// Sensor tag could not be parsed
    #[error("Unknown sensor type: {0}")]
    UnknownSensor(String),

    /// Radar update requested without a preceding prediction
    #[error("No predicted sigma points available; call predict first")]
    MissingPrediction,

    /// Prediction step requested with a negative or non-finite interval
    #[error("Invalid time step: {0}s")]
    InvalidTimeStep(f64),

    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl UkfError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for failures that indicate a diverged or misconfigured filter.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::NotPositiveDefinite | Self::SingularInnovation { .. }
        )
    }
}
