//! The "UPDATE" Step - Measurement Fusion
//!
//! Two observation models fold a measurement into the predicted belief:
//! - **Laser** observes `[px, py]` directly, so the classic linear Kalman
//!   update applies.
//! - **Radar** observes `[range, bearing, range_rate]`, a nonlinear function
//!   of the state. The predicted sigma points are mapped into measurement
//!   space and recombined (unscented transform).
//!
//! Both return the Normalized Innovation Squared (NIS) of the update.

use crate::angle::normalize_angle;
use crate::error::UkfError;
use crate::measurement::SensorType;
use crate::predict::symmetrize;
use crate::state::{
    FilterState, SigmaPoints, SigmaWeights, StateCovariance, StateVector, HEADING, N_SIGMA,
    N_X, PX, PY, SPEED,
};
use nalgebra::{Matrix2, Matrix3, SMatrix, Vector2, Vector3};

/// Smallest range used as a divisor in the radar model.
pub const RANGE_FLOOR: f64 = 1e-3;

/// Index of the bearing component in a radar measurement
const BEARING: usize = 1;

type LaserMatrix = SMatrix<f64, 2, N_X>;
type RadarSigmaPoints = SMatrix<f64, 3, N_SIGMA>;
type CrossCovariance = SMatrix<f64, N_X, 3>;

/// Measurement matrix H selecting `[px, py]`.
pub fn laser_measurement_matrix() -> LaserMatrix {
    let mut h = LaserMatrix::zeros();
    h[(0, PX)] = 1.0;
    h[(1, PY)] = 1.0;
    h
}

/// Linear Kalman update with a laser position measurement.
///
/// On error `state` is left untouched.
///
/// # Arguments
/// * `state` - Predicted filter state
/// * `z` - Measured `[px, py]`
/// * `r` - Laser measurement noise covariance
pub fn update_linear(
    state: &mut FilterState,
    z: &Vector2<f64>,
    r: &Matrix2<f64>,
) -> Result<f64, UkfError> {
    let h = laser_measurement_matrix();
    let p = &state.covariance;

    let y = z - h * state.mean;
    let s = h * p * h.transpose() + r;
    let s_inv = s
        .try_inverse()
        .ok_or(UkfError::SingularInnovation { sensor: SensorType::Laser })?;
    let k = p * h.transpose() * s_inv;

    let mut mean = state.mean + k * y;
    mean[HEADING] = normalize_angle(mean[HEADING]);
    let covariance = (StateCovariance::identity() - k * h) * p;
    let nis = (y.transpose() * s_inv * y)[(0, 0)];

    state.mean = mean;
    state.covariance = symmetrize(&covariance);
    state.predicted_sigma_points = None;
    state.nis_laser = nis;
    Ok(nis)
}

/// Maps a state into radar measurement space.
///
/// The range is floored at [`RANGE_FLOOR`] before dividing. At the exact
/// origin the bearing is defined as 0.
pub fn radar_projection(x: &StateVector) -> Vector3<f64> {
    let p_x = x[PX];
    let p_y = x[PY];
    let v = x[SPEED];
    let yaw = x[HEADING];

    let v1 = yaw.cos() * v;
    let v2 = yaw.sin() * v;

    let range = (p_x * p_x + p_y * p_y).sqrt().max(RANGE_FLOOR);
    let bearing = if p_x == 0.0 && p_y == 0.0 {
        0.0
    } else {
        p_y.atan2(p_x)
    };
    let range_rate = (p_x * v1 + p_y * v2) / range;

    Vector3::new(range, bearing, range_rate)
}

/// Unscented Kalman update with a radar measurement.
///
/// Consumes the sigma points of the preceding [`predict`](crate::predict::predict).
/// On error `state` is left untouched.
///
/// # Arguments
/// * `state` - Predicted filter state
/// * `z` - Measured `[range, bearing, range_rate]`
/// * `r` - Radar measurement noise covariance
pub fn update_nonlinear(
    state: &mut FilterState,
    z: &Vector3<f64>,
    r: &Matrix3<f64>,
) -> Result<f64, UkfError> {
    let x_sig_pred = state
        .predicted_sigma_points
        .as_ref()
        .ok_or(UkfError::MissingPrediction)?;
    let (z_pred, s, tc) = radar_moments(x_sig_pred, &state.mean, &state.weights, r);

    // S may be indefinite for a wide belief around the sensor; only a
    // singular S is fatal.
    let s_inv = s
        .try_inverse()
        .ok_or(UkfError::SingularInnovation { sensor: SensorType::Radar })?;
    let k = tc * s_inv;

    let mut residual = z - z_pred;
    residual[BEARING] = normalize_angle(residual[BEARING]);

    let mut mean = state.mean + k * residual;
    mean[HEADING] = normalize_angle(mean[HEADING]);
    let covariance = state.covariance - k * s * k.transpose();
    let nis = (residual.transpose() * s_inv * residual)[(0, 0)];

    state.mean = mean;
    state.covariance = symmetrize(&covariance);
    state.predicted_sigma_points = None;
    state.nis_radar = nis;
    Ok(nis)
}

/// Predicted radar measurement, innovation covariance S and state/measurement
/// cross-covariance from the predicted sigma points.
pub(crate) fn radar_moments(
    x_sig_pred: &SigmaPoints,
    mean: &StateVector,
    weights: &SigmaWeights,
    r: &Matrix3<f64>,
) -> (Vector3<f64>, Matrix3<f64>, CrossCovariance) {
    let mut z_sig = RadarSigmaPoints::zeros();
    for i in 0..N_SIGMA {
        let point: StateVector = x_sig_pred.column(i).into_owned();
        z_sig.set_column(i, &radar_projection(&point));
    }

    let z_pred: Vector3<f64> = z_sig * weights;

    let mut s = *r;
    let mut tc = CrossCovariance::zeros();
    for i in 0..N_SIGMA {
        let mut z_diff: Vector3<f64> = z_sig.column(i) - z_pred;
        z_diff[BEARING] = normalize_angle(z_diff[BEARING]);

        let mut x_diff: StateVector = x_sig_pred.column(i) - mean;
        x_diff[HEADING] = normalize_angle(x_diff[HEADING]);

        s += weights[i] * z_diff * z_diff.transpose();
        tc += weights[i] * x_diff * z_diff.transpose();
    }

    (z_pred, s, tc)
}
