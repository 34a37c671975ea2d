//! UKF Core - Laser/Radar Fusion with an Unscented Kalman Filter
//!
//! Estimates `[px, py, speed, heading, turn_rate]` of a single target moving
//! under the Constant Turn Rate and Velocity (CTRV) model from two kinds of
//! asynchronous measurements:
//! 1. **Laser**: Cartesian position, fused with a linear Kalman update
//! 2. **Radar**: range / bearing / range-rate, fused with an unscented update
//!
//! The Normalized Innovation Squared of every update is tracked as a tuning
//! diagnostic.
//!
//! # Example
//!
//! ```
//! use ukf_core::{Measurement, UnscentedKalmanFilter};
//!
//! let mut ukf = UnscentedKalmanFilter::with_defaults();
//! ukf.process_measurement(&Measurement::laser(1.2, 0.9, 0)).unwrap();
//! ukf.process_measurement(&Measurement::radar(1.6, 0.65, 8.9, 100_000)).unwrap();
//!
//! let heading = ukf.mean()[3];
//! assert!(heading.abs() <= std::f64::consts::PI);
//! ```

pub mod angle;
pub mod config;
pub mod consistency;
pub mod error;
pub mod filter;
pub mod measurement;
pub mod predict;
pub mod state;
pub mod update;

// Re-export key types for convenience
pub use config::{LaserNoise, ProcessNoise, RadarNoise, UkfConfig};
pub use consistency::{NisMonitor, NisStats};
pub use error::UkfError;
pub use filter::{ProcessOutcome, UnscentedKalmanFilter};
pub use measurement::{Measurement, Observation, SensorType};
pub use state::{FilterState, StateCovariance, StateVector};
