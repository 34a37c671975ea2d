//! The Estimation Engine - Unscented Kalman Filter facade
//!
//! Owns the configuration, the filter state and the NIS monitor, and runs
//! one full cycle per measurement:
//!
//! ```text
//! validate ──► initialize (first call) ──► predict(Δt) ──► update (laser|radar) ──► NIS
//! ```
//!
//! Each cycle works on a copy of the state that is committed only when every
//! step succeeded, so a failed call never leaves a half-updated belief.

use crate::config::UkfConfig;
use crate::consistency::NisMonitor;
use crate::error::UkfError;
use crate::measurement::{Measurement, Observation, SensorType};
use crate::predict::predict;
use crate::state::{FilterState, StateCovariance, StateVector, PX, PY};
use crate::update::{update_linear, update_nonlinear};
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Microseconds per second
const US_PER_SEC: f64 = 1_000_000.0;

/// What [`UnscentedKalmanFilter::process_measurement`] did with a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProcessOutcome {
    /// First measurement: position seeded, no predict/update
    Initialized { sensor: SensorType },

    /// Predicted and updated
    Updated {
        sensor: SensorType,
        nis: f64,
        /// NIS above the sensor's 95% χ² threshold
        nis_exceeded: bool,
    },

    /// Sensor disabled; state untouched
    Skipped { sensor: SensorType },
}

/// Unscented Kalman Filter tracking one CTRV target.
///
/// One instance per tracked object. Calls must be serialized by the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnscentedKalmanFilter {
    config: UkfConfig,
    state: FilterState,
    monitor: NisMonitor,
    laser_r: Matrix2<f64>,
    radar_r: Matrix3<f64>,
}

impl UnscentedKalmanFilter {
    /// Creates a filter from a validated configuration.
    pub fn new(config: UkfConfig) -> Result<Self, UkfError> {
        config.validate()?;
        let state = FilterState::new(config.initial_mean, config.initial_covariance);
        Ok(Self {
            laser_r: config.laser_noise.covariance(),
            radar_r: config.radar_noise.covariance(),
            state,
            monitor: NisMonitor::new(),
            config,
        })
    }

    /// Creates a filter with the default tuning.
    pub fn with_defaults() -> Self {
        let config = UkfConfig::default();
        Self {
            laser_r: config.laser_noise.covariance(),
            radar_r: config.radar_noise.covariance(),
            state: FilterState::new(config.initial_mean, config.initial_covariance),
            monitor: NisMonitor::new(),
            config,
        }
    }

    /// Runs one estimation cycle for `measurement`.
    ///
    /// The first call seeds the state. Later calls predict by the time since
    /// the previous measurement and then apply the matching update. Invalid
    /// measurements and numerical failures are returned as errors with the
    /// state unchanged.
    pub fn process_measurement(
        &mut self,
        measurement: &Measurement,
    ) -> Result<ProcessOutcome, UkfError> {
        let observation = measurement.observation()?;
        let sensor = measurement.sensor;

        if !self.state.initialized {
            self.initialize(&observation, measurement.timestamp_us);
            return Ok(ProcessOutcome::Initialized { sensor });
        }

        let last_us = self.state.last_timestamp_us;
        if measurement.timestamp_us < last_us {
            return Err(UkfError::OutOfOrder {
                last_us,
                got_us: measurement.timestamp_us,
            });
        }

        if !self.config.sensor_enabled(sensor) {
            debug!(%sensor, t = measurement.timestamp_us, "sensor disabled, measurement skipped");
            return Ok(ProcessOutcome::Skipped { sensor });
        }

        let gap_us = measurement
            .timestamp_us
            .checked_sub(last_us)
            .ok_or(UkfError::TimestampOverflow {
                last_us,
                got_us: measurement.timestamp_us,
            })?;
        let dt = gap_us as f64 / US_PER_SEC;

        let mut working = self.state.clone();
        predict(&mut working, &self.config.process_noise, dt)?;
        let nis = self.apply_update(&mut working, &observation)?;
        working.last_timestamp_us = measurement.timestamp_us;
        self.state = working;

        let nis_exceeded = self.monitor.record(sensor, nis);
        debug!(%sensor, dt, nis, "measurement fused");
        Ok(ProcessOutcome::Updated {
            sensor,
            nis,
            nis_exceeded,
        })
    }

    /// Advances the belief by `dt` seconds without a measurement.
    pub fn predict(&mut self, dt: f64) -> Result<(), UkfError> {
        let mut working = self.state.clone();
        predict(&mut working, &self.config.process_noise, dt)?;
        self.state = working;
        Ok(())
    }

    /// Fuses a laser position into the current (predicted) belief.
    pub fn update_laser(&mut self, z: &Vector2<f64>) -> Result<f64, UkfError> {
        let mut working = self.state.clone();
        let nis = update_linear(&mut working, z, &self.laser_r)?;
        self.state = working;
        self.monitor.record(SensorType::Laser, nis);
        Ok(nis)
    }

    /// Fuses a radar reading; requires a preceding [`predict`](Self::predict).
    pub fn update_radar(&mut self, z: &Vector3<f64>) -> Result<f64, UkfError> {
        let mut working = self.state.clone();
        let nis = update_nonlinear(&mut working, z, &self.radar_r)?;
        self.state = working;
        self.monitor.record(SensorType::Radar, nis);
        Ok(nis)
    }

    /// Current state mean `[px, py, speed, heading, turn_rate]`.
    pub fn mean(&self) -> &StateVector {
        &self.state.mean
    }

    /// Current state covariance.
    pub fn covariance(&self) -> &StateCovariance {
        &self.state.covariance
    }

    /// Most recent laser NIS.
    pub fn nis_laser(&self) -> f64 {
        self.state.nis_laser
    }

    /// Most recent radar NIS.
    pub fn nis_radar(&self) -> f64 {
        self.state.nis_radar
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn consistency(&self) -> &NisMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &UkfConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    // ========== Private Helper Methods ==========

    /// Seeds the position from the first measurement.
    ///
    /// Speed, heading, turn rate and the covariance keep their priors.
    fn initialize(&mut self, observation: &Observation, timestamp_us: i64) {
        let (px, py) = match observation {
            Observation::Laser(z) => (z[0], z[1]),
            Observation::Radar(z) => {
                let (range, bearing) = (z[0], z[1]);
                (range * bearing.cos(), range * bearing.sin())
            }
        };

        self.state.mean[PX] = px;
        self.state.mean[PY] = py;
        self.state.initialized = true;
        self.state.last_timestamp_us = timestamp_us;
        debug!(px, py, t = timestamp_us, "filter initialized");
    }

    fn apply_update(
        &self,
        working: &mut FilterState,
        observation: &Observation,
    ) -> Result<f64, UkfError> {
        let result = match observation {
            Observation::Laser(z) => update_linear(working, z, &self.laser_r),
            Observation::Radar(z) => update_nonlinear(working, z, &self.radar_r),
        };
        if let Err(e) = &result {
            warn!(error = %e, "update failed, state left unchanged");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HEADING, SPEED, TURN_RATE};
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    #[test]
    fn test_first_laser_initializes_exactly() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        let prior_cov = *ukf.covariance();

        let outcome = ukf.process_measurement(&Measurement::laser(1.2, 0.9, 0)).unwrap();

        assert_eq!(outcome, ProcessOutcome::Initialized { sensor: SensorType::Laser });
        assert!(ukf.is_initialized());
        assert_eq!(*ukf.mean(), StateVector::new(1.2, 0.9, 9.0, 0.0, 0.0));
        assert_eq!(*ukf.covariance(), prior_cov);
        assert!(ukf.state().predicted_sigma_points.is_none());
        assert_eq!(ukf.state().last_timestamp_us, 0);
    }

    #[test]
    fn test_first_radar_initializes_from_polar() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::radar(2.0, PI / 6.0, 5.0, 42)).unwrap();

        assert_relative_eq!(ukf.mean()[PX], 3.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(ukf.mean()[PY], 1.0, epsilon = 1e-12);
        assert_eq!(ukf.mean()[SPEED], 9.0);
        assert_eq!(ukf.state().last_timestamp_us, 42);
    }

    #[test]
    fn test_second_laser_predicts_then_updates() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::laser(1.2, 0.9, 0)).unwrap();

        let outcome = ukf
            .process_measurement(&Measurement::laser(1.3, 1.0, 100_000))
            .unwrap();

        let expected = StateVector::new(
            1.322321526271881,
            0.9972132462025645,
            8.950272599805421,
            0.0492808975185284,
            0.0647111342616775,
        );
        assert_relative_eq!(*ukf.mean(), expected, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(0, 0)], 0.021664344380720055, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(0, 2)], 0.0018616550185069003, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(1, 1)], 0.02187298039557695, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(1, 4)], 0.014560005208877423, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(2, 2)], 0.498352646319882, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(3, 4)], -0.20547883621015367, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(4, 4)], 0.20190251439168044, epsilon = 1e-6);
        assert_relative_eq!(ukf.nis_laser(), 0.6086246494054749, epsilon = 1e-6);
        assert!(matches!(
            outcome,
            ProcessOutcome::Updated { sensor: SensorType::Laser, nis_exceeded: false, .. }
        ));
        assert_eq!(ukf.state().last_timestamp_us, 100_000);
    }

    #[test]
    fn test_radar_after_laser_reference_values() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::laser(1.2, 0.9, 0)).unwrap();
        ukf.process_measurement(&Measurement::laser(1.3, 1.0, 100_000)).unwrap();

        ukf.process_measurement(&Measurement::radar(2.0, 0.7, 8.5, 150_000)).unwrap();

        let expected = StateVector::new(
            1.613014551936356,
            1.327102246581345,
            8.892790673646815,
            0.5902518713221647,
            -0.21968527031944646,
        );
        assert_relative_eq!(*ukf.mean(), expected, epsilon = 1e-6);
        assert_relative_eq!(ukf.nis_radar(), 1.6805834497949803, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(0, 1)], 0.00628716879766774, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(2, 3)], -0.04856807000965544, epsilon = 1e-6);
        assert_relative_eq!(ukf.covariance()[(3, 3)], 0.04417050809116635, epsilon = 1e-6);
        assert_eq!(ukf.consistency().radar.updates, 1);
        assert_eq!(ukf.consistency().laser.updates, 1);
    }

    #[test]
    fn test_radar_at_origin_is_finite() {
        let config = UkfConfig {
            initial_mean: StateVector::zeros(),
            ..Default::default()
        };
        let mut ukf = UnscentedKalmanFilter::new(config).unwrap();
        ukf.process_measurement(&Measurement::radar(0.0, 0.0, 0.0, 0)).unwrap();
        ukf.process_measurement(&Measurement::radar(0.0, 0.0, 0.0, 50_000)).unwrap();

        assert!(ukf.mean().iter().all(|v| v.is_finite()));
        assert!(ukf.covariance().iter().all(|v| v.is_finite()));
        assert!(ukf.nis_radar().is_finite());
    }

    #[test]
    fn test_malformed_measurement_leaves_state_untouched() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        let bad = Measurement {
            sensor: SensorType::Radar,
            values: vec![1.0, 2.0],
            timestamp_us: 0,
        };

        assert!(matches!(
            ukf.process_measurement(&bad),
            Err(UkfError::MalformedMeasurement { expected: 3, found: 2, .. })
        ));
        assert!(!ukf.is_initialized());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::laser(1.0, 1.0, 1_000)).unwrap();
        let before = ukf.state().clone();

        let result = ukf.process_measurement(&Measurement::laser(1.1, 1.0, 500));

        assert_eq!(result, Err(UkfError::OutOfOrder { last_us: 1_000, got_us: 500 }));
        assert_eq!(*ukf.state(), before);
    }

    #[test]
    fn test_timestamp_gap_overflow_is_rejected() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::laser(1.0, 1.0, -5_000_000_000_000_000_000))
            .unwrap();
        let before = ukf.state().clone();

        let result =
            ukf.process_measurement(&Measurement::laser(1.1, 1.0, 5_000_000_000_000_000_000));

        assert_eq!(
            result,
            Err(UkfError::TimestampOverflow {
                last_us: -5_000_000_000_000_000_000,
                got_us: 5_000_000_000_000_000_000,
            })
        );
        assert!(!result.unwrap_err().is_numerical());
        assert_eq!(*ukf.state(), before);
    }

    #[test]
    fn test_same_timestamp_is_zero_dt() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::laser(1.0, 1.0, 1_000)).unwrap();
        let outcome = ukf.process_measurement(&Measurement::laser(1.0, 1.0, 1_000)).unwrap();

        assert!(matches!(outcome, ProcessOutcome::Updated { .. }));
        assert_relative_eq!(ukf.mean()[PX], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disabled_sensor_initializes_but_skips_updates() {
        let config = UkfConfig {
            use_radar: false,
            ..Default::default()
        };
        let mut ukf = UnscentedKalmanFilter::new(config).unwrap();

        let first = ukf.process_measurement(&Measurement::radar(1.0, 0.0, 0.0, 0)).unwrap();
        assert_eq!(first, ProcessOutcome::Initialized { sensor: SensorType::Radar });

        let before = ukf.state().clone();
        let second = ukf
            .process_measurement(&Measurement::radar(1.5, 0.1, 0.0, 100_000))
            .unwrap();
        assert_eq!(second, ProcessOutcome::Skipped { sensor: SensorType::Radar });
        assert_eq!(*ukf.state(), before);

        let third = ukf.process_measurement(&Measurement::laser(1.9, 0.1, 200_000)).unwrap();
        assert!(matches!(third, ProcessOutcome::Updated { sensor: SensorType::Laser, .. }));
    }

    #[test]
    fn test_numerical_failure_leaves_state_untouched() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::laser(1.0, 1.0, 0)).unwrap();
        ukf.state.covariance[(2, 2)] = -5.0;
        let before = ukf.state().clone();

        let result = ukf.process_measurement(&Measurement::laser(1.1, 1.0, 100_000));

        assert_eq!(result, Err(UkfError::NotPositiveDefinite));
        assert!(result.unwrap_err().is_numerical());
        assert_eq!(*ukf.state(), before);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = UkfConfig::default();
        config.laser_noise.std_px = -1.0;
        assert!(UnscentedKalmanFilter::new(config).is_err());
    }

    #[test]
    fn test_direct_phase_access() {
        let mut ukf = UnscentedKalmanFilter::with_defaults();
        ukf.process_measurement(&Measurement::laser(1.2, 0.9, 0)).unwrap();

        assert_eq!(ukf.update_radar(&Vector3::new(1.5, 0.6, 9.0)), Err(UkfError::MissingPrediction));

        ukf.predict(0.1).unwrap();
        let nis = ukf.update_radar(&Vector3::new(2.2, 0.4, 9.0)).unwrap();
        assert_eq!(nis, ukf.nis_radar());
        assert_eq!(ukf.consistency().radar.updates, 1);
    }

    proptest! {
        #[test]
        fn prop_heading_wrapped_after_every_cycle(
            steps in prop::collection::vec(
                (any::<bool>(), -20.0..20.0f64, -20.0..20.0f64, -5.0..5.0f64, 1_000i64..200_000),
                1..30,
            )
        ) {
            let mut ukf = UnscentedKalmanFilter::with_defaults();
            ukf.process_measurement(&Measurement::laser(1.0, 1.0, 0)).unwrap();

            let mut t = 0;
            for (is_laser, a, b, c, step) in steps {
                t += step;
                let m = if is_laser {
                    Measurement::laser(a, b, t)
                } else {
                    let range = (a * a + b * b).sqrt();
                    Measurement::radar(range, b.atan2(a), c, t)
                };
                if ukf.process_measurement(&m).is_err() {
                    break;
                }
                let heading = ukf.mean()[HEADING];
                prop_assert!(heading > -PI && heading <= PI);
                prop_assert!(ukf.mean()[TURN_RATE].is_finite());
            }
        }
    }
}
