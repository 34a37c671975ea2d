//! Filter state record and the fixed dimensions of the CTRV model.
//!
//! State layout: `[px, py, speed, heading, turn_rate]`. The augmented state
//! appends the longitudinal and yaw acceleration noise terms.

use nalgebra::{Matrix5, SMatrix, SVector, Vector5};
use serde::{Deserialize, Serialize};

/// State dimension
pub const N_X: usize = 5;

/// Augmented state dimension (state + two noise terms)
pub const N_AUG: usize = 7;

/// Number of sigma points
pub const N_SIGMA: usize = 2 * N_AUG + 1;

/// Sigma point spreading parameter
pub const LAMBDA: f64 = 3.0 - N_AUG as f64;

pub const PX: usize = 0;
pub const PY: usize = 1;
pub const SPEED: usize = 2;
pub const HEADING: usize = 3;
pub const TURN_RATE: usize = 4;

pub type StateVector = Vector5<f64>;
pub type StateCovariance = Matrix5<f64>;
pub type SigmaPoints = SMatrix<f64, N_X, N_SIGMA>;
pub type SigmaWeights = SVector<f64, N_SIGMA>;
pub type AugStateVector = SVector<f64, N_AUG>;
pub type AugCovariance = SMatrix<f64, N_AUG, N_AUG>;
pub type AugSigmaPoints = SMatrix<f64, N_AUG, N_SIGMA>;

/// Sigma point weights: `λ/(λ+n_aug)` for the centre point and
/// `0.5/(λ+n_aug)` for the others.
pub fn sigma_weights() -> SigmaWeights {
    let denom = LAMBDA + N_AUG as f64;
    let mut weights = SigmaWeights::from_element(0.5 / denom);
    weights[0] = LAMBDA / denom;
    weights
}

/// The mutable belief carried between measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// State mean `[px, py, speed, heading, turn_rate]`
    pub mean: StateVector,

    /// State covariance, same ordering as `mean`
    pub covariance: StateCovariance,

    /// Sigma points from the last prediction, consumed by the next update.
    /// Stored as propagated; headings are not re-wrapped.
    pub predicted_sigma_points: Option<SigmaPoints>,

    /// Timestamp of the last processed measurement (microseconds)
    pub last_timestamp_us: i64,

    /// False until the first measurement has been consumed
    pub initialized: bool,

    /// Sigma point weights, fixed for the filter's lifetime
    pub weights: SigmaWeights,

    /// Most recent laser NIS
    pub nis_laser: f64,

    /// Most recent radar NIS
    pub nis_radar: f64,
}

impl FilterState {
    /// Creates an uninitialized state holding the given priors.
    pub fn new(mean: StateVector, covariance: StateCovariance) -> Self {
        Self {
            mean,
            covariance,
            predicted_sigma_points: None,
            last_timestamp_us: 0,
            initialized: false,
            weights: sigma_weights(),
            nis_laser: 0.0,
            nis_radar: 0.0,
        }
    }

    /// Velocity components derived from speed and heading.
    pub fn velocity(&self) -> (f64, f64) {
        let speed = self.mean[SPEED];
        let heading = self.mean[HEADING];
        (speed * heading.cos(), speed * heading.sin())
    }
}
