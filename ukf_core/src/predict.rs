//! The "PREDICT" Step - Augmented Sigma-Point Propagation
//!
//! Carries the belief forward by Δt through the Constant Turn Rate and
//! Velocity (CTRV) motion model:
//! 1. Augment the state with the two acceleration noise terms
//! 2. Draw 2·n_aug+1 sigma points from the Cholesky factor
//! 3. Push every sigma point through the nonlinear dynamics
//! 4. Recombine into a predicted mean and covariance

use crate::angle::normalize_angle;
use crate::config::ProcessNoise;
use crate::error::UkfError;
use crate::state::{
    AugCovariance, AugSigmaPoints, AugStateVector, FilterState, SigmaPoints, SigmaWeights,
    StateCovariance, StateVector, HEADING, LAMBDA, N_AUG, N_SIGMA, N_X,
};
use tracing::trace;

/// Below this turn rate magnitude the straight-line limit is used.
pub const TURN_RATE_EPSILON: f64 = 1e-3;

/// Advances `state` by `dt` seconds.
///
/// `dt == 0` is legal and regenerates the sigma points around the current
/// belief. On error `state` is left untouched.
///
/// # Arguments
/// * `state` - Filter state to advance in place
/// * `noise` - Process noise standard deviations
/// * `dt` - Elapsed time in seconds (≥ 0)
pub fn predict(state: &mut FilterState, noise: &ProcessNoise, dt: f64) -> Result<(), UkfError> {
    if !dt.is_finite() || dt < 0.0 {
        return Err(UkfError::InvalidTimeStep(dt));
    }

    let x_sig_aug = augmented_sigma_points(&state.mean, &state.covariance, noise)?;

    let mut x_sig_pred = SigmaPoints::zeros();
    for i in 0..N_SIGMA {
        let point: AugStateVector = x_sig_aug.column(i).into_owned();
        x_sig_pred.set_column(i, &ctrv_transition(&point, dt));
    }

    let (mean, covariance) = mean_and_covariance(&x_sig_pred, &state.weights);
    trace!(dt, trace = covariance.trace(), "predicted state");

    state.mean = mean;
    state.covariance = covariance;
    state.predicted_sigma_points = Some(x_sig_pred);
    Ok(())
}

/// Builds the augmented sigma points around `mean`.
///
/// The augmented covariance is `P` in the upper-left block with the two
/// acceleration variances on the remaining diagonal.
pub fn augmented_sigma_points(
    mean: &StateVector,
    covariance: &StateCovariance,
    noise: &ProcessNoise,
) -> Result<AugSigmaPoints, UkfError> {
    let mut x_aug = AugStateVector::zeros();
    x_aug.fixed_rows_mut::<N_X>(0).copy_from(mean);

    let mut p_aug = AugCovariance::zeros();
    p_aug.fixed_view_mut::<N_X, N_X>(0, 0).copy_from(covariance);
    p_aug[(N_X, N_X)] = noise.std_a * noise.std_a;
    p_aug[(N_X + 1, N_X + 1)] = noise.std_yawdd * noise.std_yawdd;

    let l = p_aug.cholesky().ok_or(UkfError::NotPositiveDefinite)?.l();
    let spread = (LAMBDA + N_AUG as f64).sqrt();

    let mut x_sig_aug = AugSigmaPoints::zeros();
    x_sig_aug.set_column(0, &x_aug);
    for i in 0..N_AUG {
        let offset: AugStateVector = l.column(i) * spread;
        x_sig_aug.set_column(i + 1, &(x_aug + offset));
        x_sig_aug.set_column(i + 1 + N_AUG, &(x_aug - offset));
    }

    Ok(x_sig_aug)
}

/// Propagates one augmented sigma point through the CTRV model.
///
/// Input layout: `[px, py, v, yaw, yaw_rate, nu_a, nu_yawdd]`.
pub fn ctrv_transition(point: &AugStateVector, dt: f64) -> StateVector {
    let p_x = point[0];
    let p_y = point[1];
    let v = point[2];
    let yaw = point[3];
    let yawd = point[4];
    let nu_a = point[5];
    let nu_yawdd = point[6];

    let (mut px_p, mut py_p) = if yawd.abs() > TURN_RATE_EPSILON {
        (
            p_x + v / yawd * ((yaw + yawd * dt).sin() - yaw.sin()),
            p_y + v / yawd * (yaw.cos() - (yaw + yawd * dt).cos()),
        )
    } else {
        (p_x + v * dt * yaw.cos(), p_y + v * dt * yaw.sin())
    };

    let half_dt2 = 0.5 * dt * dt;
    px_p += half_dt2 * nu_a * yaw.cos();
    py_p += half_dt2 * nu_a * yaw.sin();
    let v_p = v + nu_a * dt;
    let yaw_p = yaw + yawd * dt + half_dt2 * nu_yawdd;
    let yawd_p = yawd + nu_yawdd * dt;

    StateVector::new(px_p, py_p, v_p, yaw_p, yawd_p)
}

/// Weighted mean and covariance of predicted sigma points.
///
/// The heading of every deviation is wrapped before its outer product. The
/// returned mean heading is wrapped and the covariance re-symmetrised.
pub fn mean_and_covariance(
    sigma_points: &SigmaPoints,
    weights: &SigmaWeights,
) -> (StateVector, StateCovariance) {
    let mut mean: StateVector = sigma_points * weights;

    let mut covariance = StateCovariance::zeros();
    for i in 0..N_SIGMA {
        let mut x_diff: StateVector = sigma_points.column(i) - mean;
        x_diff[HEADING] = normalize_angle(x_diff[HEADING]);
        covariance += weights[i] * x_diff * x_diff.transpose();
    }

    mean[HEADING] = normalize_angle(mean[HEADING]);
    (mean, symmetrize(&covariance))
}

/// `(P + Pᵀ) / 2`
pub(crate) fn symmetrize(p: &StateCovariance) -> StateCovariance {
    (p + p.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PX, PY, SPEED, TURN_RATE};
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn state_with(mean: StateVector, covariance: StateCovariance) -> FilterState {
        let mut state = FilterState::new(mean, covariance);
        state.initialized = true;
        state
    }

    #[test]
    fn test_straight_line_transition() {
        let point = AugStateVector::from_column_slice(&[1.0, 2.0, 10.0, 0.0, 0.0, 0.0, 0.0]);
        let next = ctrv_transition(&point, 0.5);
        assert_relative_eq!(next[PX], 6.0, epsilon = 1e-12);
        assert_relative_eq!(next[PY], 2.0, epsilon = 1e-12);
        assert_relative_eq!(next[SPEED], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quarter_turn_transition() {
        // v = π/2 m/s, yaw rate π/2 rad/s: one second traces a quarter circle of radius 1
        let point =
            AugStateVector::from_column_slice(&[0.0, 0.0, PI / 2.0, 0.0, PI / 2.0, 0.0, 0.0]);
        let next = ctrv_transition(&point, 1.0);
        assert_relative_eq!(next[PX], 1.0, epsilon = 1e-12);
        assert_relative_eq!(next[PY], 1.0, epsilon = 1e-12);
        assert_relative_eq!(next[HEADING], PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(next[TURN_RATE], PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_arc_branch_is_continuous_with_straight_line() {
        let straight = AugStateVector::from_column_slice(&[0.0, 0.0, 5.0, 0.3, 0.0, 0.0, 0.0]);
        let tiny = AugStateVector::from_column_slice(&[0.0, 0.0, 5.0, 0.3, 2e-3, 0.0, 0.0]);
        let a = ctrv_transition(&straight, 0.1);
        let b = ctrv_transition(&tiny, 0.1);
        assert_relative_eq!(a[PX], b[PX], epsilon = 1e-4);
        assert_relative_eq!(a[PY], b[PY], epsilon = 1e-4);
        assert!(b.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_noise_terms_enter_second_order() {
        let point = AugStateVector::from_column_slice(&[0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 4.0]);
        let next = ctrv_transition(&point, 0.5);
        assert_relative_eq!(next[PX], 0.25, epsilon = 1e-12);
        assert_relative_eq!(next[SPEED], 1.0, epsilon = 1e-12);
        assert_relative_eq!(next[HEADING], 0.5, epsilon = 1e-12);
        assert_relative_eq!(next[TURN_RATE], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sigma_point_layout() {
        let mean = StateVector::new(1.0, 2.0, 3.0, 0.1, 0.2);
        let cov = StateCovariance::identity() * 0.25;
        let noise = ProcessNoise::default();
        let sig = augmented_sigma_points(&mean, &cov, &noise).unwrap();

        let spread = 3.0_f64.sqrt();
        assert_relative_eq!(sig[(0, 0)], 1.0);
        assert_relative_eq!(sig[(0, 1)], 1.0 + spread * 0.5, epsilon = 1e-12);
        assert_relative_eq!(sig[(0, 1 + N_AUG)], 1.0 - spread * 0.5, epsilon = 1e-12);
        assert_relative_eq!(sig[(5, 6)], spread * noise.std_a, epsilon = 1e-12);
        assert_relative_eq!(sig[(6, 14)], -spread * noise.std_yawdd, epsilon = 1e-12);
    }

    #[test]
    fn test_non_positive_definite_covariance_fails() {
        let mut state = state_with(StateVector::zeros(), StateCovariance::identity());
        state.covariance[(2, 2)] = -1.0;
        let before = state.clone();

        let result = predict(&mut state, &ProcessNoise::default(), 0.1);
        assert_eq!(result, Err(UkfError::NotPositiveDefinite));
        assert_eq!(state, before);
    }

    #[test]
    fn test_negative_dt_rejected() {
        let mut state = state_with(StateVector::zeros(), StateCovariance::identity());
        let result = predict(&mut state, &ProcessNoise::default(), -0.1);
        assert_eq!(result, Err(UkfError::InvalidTimeStep(-0.1)));
    }

    #[test]
    fn test_predict_zero_is_noop() {
        let mean = StateVector::new(5.7, -1.2, 3.1, 0.4, -0.05);
        let mut cov = StateCovariance::identity() * 0.3;
        cov[(0, 2)] = 0.05;
        cov[(2, 0)] = 0.05;
        let mut state = state_with(mean, cov);

        predict(&mut state, &ProcessNoise::default(), 0.0).unwrap();

        assert_relative_eq!(state.mean, mean, epsilon = 1e-12);
        assert_relative_eq!(state.covariance, cov, epsilon = 1e-12);
        assert!(state.predicted_sigma_points.is_some());
    }

    #[test]
    fn test_predict_reference_values() {
        let mean = StateVector::new(1.2, 0.9, 9.0, 0.0, 0.0);
        let mut state = state_with(mean, StateCovariance::identity() * 0.5);

        predict(&mut state, &ProcessNoise::default(), 0.1).unwrap();

        let expected_mean = StateVector::new(1.9010063589952328, 0.9, 9.0, 0.0, 0.0);
        assert_relative_eq!(state.mean, expected_mean, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(0, 0)], 0.5833117582410813, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(1, 1)], 0.7399472451119716, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(0, 2)], 0.050125, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(1, 3)], 0.34788954273149725, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(1, 4)], 0.02247188905873375, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(3, 3)], 0.5051, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(3, 4)], 0.052, epsilon = 1e-9);
        assert_relative_eq!(state.covariance[(4, 4)], 0.54, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_wraps_across_pi() {
        let mean = StateVector::new(0.0, 0.0, 1.0, PI - 0.01, 1.0);
        let mut state = state_with(mean, StateCovariance::identity() * 0.01);

        predict(&mut state, &ProcessNoise::default(), 0.1).unwrap();

        // raw heading mean is π + 0.09
        assert_relative_eq!(state.mean[HEADING], -PI + 0.09, epsilon = 1e-6);
        assert!(state.covariance[(HEADING, HEADING)] < 0.1);
    }

    prop_compose! {
        fn valid_state()(
            px in -50.0..50.0f64,
            py in -50.0..50.0f64,
            v in -20.0..20.0f64,
            yaw in -3.0..3.0f64,
            yawd in -1.0..1.0f64,
            diag in prop::array::uniform5(0.01..1.0f64),
            corr in -0.9..0.9f64,
        ) -> FilterState {
            let mut cov = StateCovariance::from_diagonal(&StateVector::from_column_slice(&diag));
            let c = corr * (diag[0] * diag[2]).sqrt();
            cov[(0, 2)] = c;
            cov[(2, 0)] = c;
            state_with(StateVector::new(px, py, v, yaw, yawd), cov)
        }
    }

    proptest! {
        #[test]
        fn prop_predicted_covariance_stays_psd(mut state in valid_state(), dt in 0.0..1.0f64) {
            predict(&mut state, &ProcessNoise::default(), dt).unwrap();

            let p = state.covariance;
            prop_assert!((p - p.transpose()).amax() < 1e-12);
            let eigen = p.symmetric_eigen();
            prop_assert!(eigen.eigenvalues.iter().all(|&l| l > -1e-9));
        }

        #[test]
        fn prop_heading_stays_wrapped(mut state in valid_state(), dt in 0.0..5.0f64) {
            predict(&mut state, &ProcessNoise::default(), dt).unwrap();
            let heading = state.mean[HEADING];
            prop_assert!(heading > -PI && heading <= PI);
        }

        #[test]
        fn prop_predict_zero_is_noop(state in valid_state()) {
            let mut predicted = state.clone();
            predict(&mut predicted, &ProcessNoise::default(), 0.0).unwrap();
            prop_assert!((predicted.mean - state.mean).amax() < 1e-9);
            prop_assert!((predicted.covariance - state.covariance).amax() < 1e-9);
        }
    }
}
