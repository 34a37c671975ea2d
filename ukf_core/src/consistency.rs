//! Consistency Monitor - NIS bookkeeping
//!
//! The Normalized Innovation Squared of a well-tuned filter follows a χ²
//! distribution with as many degrees of freedom as the measurement has
//! components. Counting how often it exceeds the 95% quantile tells whether
//! the noise parameters are over- or under-confident. Nothing here feeds
//! back into the estimate.

use crate::measurement::SensorType;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// χ² 95% quantile for 2 DOF (laser)
pub const CHI2_95_2DOF: f64 = 5.991;

/// χ² 95% quantile for 3 DOF (radar)
pub const CHI2_95_3DOF: f64 = 7.815;

/// χ² 95% quantile for the measurement dimension of `sensor`.
pub fn nis_threshold(sensor: SensorType) -> f64 {
    match sensor {
        SensorType::Laser => CHI2_95_2DOF,
        SensorType::Radar => CHI2_95_3DOF,
    }
}

/// Running NIS statistics for one sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NisStats {
    /// Most recent NIS
    pub last: f64,

    /// Number of updates seen
    pub updates: u64,

    /// Number of updates whose NIS exceeded the 95% threshold
    pub exceedances: u64,

    /// Sum of all NIS values (for the mean)
    pub sum: f64,
}

impl NisStats {
    /// Fraction of updates above the threshold, `None` before the first update.
    pub fn exceedance_ratio(&self) -> Option<f64> {
        (self.updates > 0).then(|| self.exceedances as f64 / self.updates as f64)
    }

    /// Mean NIS, `None` before the first update.
    ///
    /// Should approach the degrees of freedom for a consistent filter.
    pub fn mean(&self) -> Option<f64> {
        (self.updates > 0).then(|| self.sum / self.updates as f64)
    }
}

/// Per-sensor NIS statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NisMonitor {
    pub laser: NisStats,
    pub radar: NisStats,
}

impl NisMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one NIS value and returns true if it exceeded the threshold.
    pub fn record(&mut self, sensor: SensorType, nis: f64) -> bool {
        let threshold = nis_threshold(sensor);
        let stats = self.stats_mut(sensor);

        let exceeded = nis > threshold;
        stats.last = nis;
        stats.updates += 1;
        stats.sum += nis;
        if exceeded {
            stats.exceedances += 1;
            debug!(%sensor, nis, threshold, "NIS above 95% threshold");
        }
        exceeded
    }

    pub fn stats(&self, sensor: SensorType) -> &NisStats {
        match sensor {
            SensorType::Laser => &self.laser,
            SensorType::Radar => &self.radar,
        }
    }

    fn stats_mut(&mut self, sensor: SensorType) -> &mut NisStats {
        match sensor {
            SensorType::Laser => &mut self.laser,
            SensorType::Radar => &mut self.radar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_monitor() {
        let monitor = NisMonitor::new();
        assert_eq!(monitor.stats(SensorType::Laser).exceedance_ratio(), None);
        assert_eq!(monitor.stats(SensorType::Radar).mean(), None);
    }

    #[test]
    fn test_thresholds_per_sensor() {
        let mut monitor = NisMonitor::new();

        // 6.5 is above the 2 DOF quantile but below the 3 DOF one
        assert!(monitor.record(SensorType::Laser, 6.5));
        assert!(!monitor.record(SensorType::Radar, 6.5));
        assert!(!monitor.record(SensorType::Laser, 1.0));

        let laser = monitor.stats(SensorType::Laser);
        assert_eq!(laser.updates, 2);
        assert_eq!(laser.exceedances, 1);
        assert_eq!(laser.last, 1.0);
        assert_relative_eq!(laser.exceedance_ratio().unwrap(), 0.5);
        assert_relative_eq!(laser.mean().unwrap(), 3.75);
        assert_eq!(monitor.stats(SensorType::Radar).exceedances, 0);
    }
}
