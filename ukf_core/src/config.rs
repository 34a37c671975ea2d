//! Engine configuration: noise parameters, priors and sensor switches.
//!
//! Everything here is fixed at construction. Partial JSON documents are
//! accepted; missing fields fall back to [`UkfConfig::default`].

use crate::error::UkfError;
use crate::measurement::SensorType;
use crate::state::{StateCovariance, StateVector, PY, TURN_RATE};
use nalgebra::{Matrix2, Matrix3};
use serde::{Deserialize, Serialize};

/// Process noise standard deviations driving the CTRV model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessNoise {
    /// Longitudinal acceleration noise (m/s²)
    pub std_a: f64,

    /// Yaw acceleration noise (rad/s²)
    pub std_yawdd: f64,
}

impl Default for ProcessNoise {
    fn default() -> Self {
        Self {
            std_a: 0.5,
            std_yawdd: 2.0,
        }
    }
}

/// Laser measurement noise standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserNoise {
    /// Position x noise (m)
    pub std_px: f64,

    /// Position y noise (m)
    pub std_py: f64,
}

impl Default for LaserNoise {
    fn default() -> Self {
        Self {
            std_px: 0.15,
            std_py: 0.15,
        }
    }
}

impl LaserNoise {
    /// Measurement noise covariance R.
    pub fn covariance(&self) -> Matrix2<f64> {
        Matrix2::from_diagonal(&nalgebra::Vector2::new(
            self.std_px * self.std_px,
            self.std_py * self.std_py,
        ))
    }
}

/// Radar measurement noise standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarNoise {
    /// Range noise (m)
    pub std_range: f64,

    /// Bearing noise (rad)
    pub std_bearing: f64,

    /// Range-rate noise (m/s)
    pub std_range_rate: f64,
}

impl Default for RadarNoise {
    fn default() -> Self {
        Self {
            std_range: 0.3,
            std_bearing: 0.03,
            std_range_rate: 0.3,
        }
    }
}

impl RadarNoise {
    /// Measurement noise covariance R.
    pub fn covariance(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&nalgebra::Vector3::new(
            self.std_range * self.std_range,
            self.std_bearing * self.std_bearing,
            self.std_range_rate * self.std_range_rate,
        ))
    }
}

/// Configuration for [`UnscentedKalmanFilter`](crate::UnscentedKalmanFilter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UkfConfig {
    /// Process noise (CTRV accelerations)
    pub process_noise: ProcessNoise,

    /// Laser measurement noise
    pub laser_noise: LaserNoise,

    /// Radar measurement noise
    pub radar_noise: RadarNoise,

    /// Prior mean; position is overwritten by the first measurement
    pub initial_mean: StateVector,

    /// Prior covariance
    pub initial_covariance: StateCovariance,

    /// When false, laser measurements only serve to initialize
    pub use_laser: bool,

    /// When false, radar measurements only serve to initialize
    pub use_radar: bool,
}

impl Default for UkfConfig {
    fn default() -> Self {
        Self {
            process_noise: ProcessNoise::default(),
            laser_noise: LaserNoise::default(),
            radar_noise: RadarNoise::default(),
            initial_mean: StateVector::new(1.0, 1.0, 9.0, 0.0, 0.0),
            initial_covariance: default_initial_covariance(),
            use_laser: true,
            use_radar: true,
        }
    }
}

/// Prior covariance: 0.5 on the diagonal, with `py` and the turn rate
/// coupled at 0.5.
fn default_initial_covariance() -> StateCovariance {
    let mut p = StateCovariance::identity() * 0.5;
    p[(PY, TURN_RATE)] = 0.5;
    p[(TURN_RATE, PY)] = 0.5;
    p
}

impl UkfConfig {
    /// Parses a (possibly partial) JSON configuration and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, UkfError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| UkfError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Whether updates from `sensor` are applied.
    pub fn sensor_enabled(&self, sensor: SensorType) -> bool {
        match sensor {
            SensorType::Laser => self.use_laser,
            SensorType::Radar => self.use_radar,
        }
    }

    /// Rejects noise parameters and priors the filter cannot work with.
    pub fn validate(&self) -> Result<(), UkfError> {
        let std_devs = [
            ("process_noise.std_a", self.process_noise.std_a),
            ("process_noise.std_yawdd", self.process_noise.std_yawdd),
            ("laser_noise.std_px", self.laser_noise.std_px),
            ("laser_noise.std_py", self.laser_noise.std_py),
            ("radar_noise.std_range", self.radar_noise.std_range),
            ("radar_noise.std_bearing", self.radar_noise.std_bearing),
            ("radar_noise.std_range_rate", self.radar_noise.std_range_rate),
        ];
        for (name, value) in std_devs {
            if !value.is_finite() || value <= 0.0 {
                return Err(UkfError::config(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }

        if self.initial_mean.iter().any(|v| !v.is_finite()) {
            return Err(UkfError::config("initial_mean contains non-finite values"));
        }

        let p = &self.initial_covariance;
        if p.iter().any(|v| !v.is_finite()) {
            return Err(UkfError::config("initial_covariance contains non-finite values"));
        }
        if (p - p.transpose()).amax() > 1e-9 {
            return Err(UkfError::config("initial_covariance is not symmetric"));
        }
        if p.cholesky().is_none() {
            return Err(UkfError::config("initial_covariance is not positive definite"));
        }

        Ok(())
    }
}
