//! Timestamped sensor measurements and their validation.
//!
//! Measurements arrive as an untyped payload (`values`) tagged with the
//! sensor that produced them. [`Measurement::observation`] checks the payload
//! before the engine touches any state and hands back a fixed-size vector.

use crate::error::UkfError;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payload length of a laser measurement: [px, py]
pub const LASER_DIM: usize = 2;

/// Payload length of a radar measurement: [range, bearing, range_rate]
pub const RADAR_DIM: usize = 3;

/// The sensor that produced a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// Cartesian position sensor (linear observation model)
    Laser,
    /// Range / bearing / range-rate sensor (nonlinear observation model)
    Radar,
}

impl SensorType {
    /// Number of values the sensor reports.
    pub fn dimension(self) -> usize {
        match self {
            SensorType::Laser => LASER_DIM,
            SensorType::Radar => RADAR_DIM,
        }
    }

    /// Single-letter tag used in measurement logs.
    pub fn tag(self) -> &'static str {
        match self {
            SensorType::Laser => "L",
            SensorType::Radar => "R",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::Laser => write!(f, "laser"),
            SensorType::Radar => write!(f, "radar"),
        }
    }
}

impl FromStr for SensorType {
    type Err = UkfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "laser" | "lidar" => Ok(SensorType::Laser),
            "r" | "radar" => Ok(SensorType::Radar),
            other => Err(UkfError::UnknownSensor(other.to_string())),
        }
    }
}

/// A raw measurement as delivered by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Which sensor produced the reading
    pub sensor: SensorType,

    /// Raw payload (2 values for laser, 3 for radar)
    pub values: Vec<f64>,

    /// Capture time in microseconds
    pub timestamp_us: i64,
}

/// A validated measurement payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// [px, py] in meters
    Laser(Vector2<f64>),
    /// [range (m), bearing (rad), range_rate (m/s)]
    Radar(Vector3<f64>),
}

impl Measurement {
    /// Creates a laser measurement.
    pub fn laser(px: f64, py: f64, timestamp_us: i64) -> Self {
        Self {
            sensor: SensorType::Laser,
            values: vec![px, py],
            timestamp_us,
        }
    }

    /// Creates a radar measurement.
    pub fn radar(range: f64, bearing: f64, range_rate: f64, timestamp_us: i64) -> Self {
        Self {
            sensor: SensorType::Radar,
            values: vec![range, bearing, range_rate],
            timestamp_us,
        }
    }

    /// Validates the payload and converts it to a typed observation.
    pub fn observation(&self) -> Result<Observation, UkfError> {
        let expected = self.sensor.dimension();
        if self.values.len() != expected {
            return Err(UkfError::MalformedMeasurement {
                sensor: self.sensor,
                expected,
                found: self.values.len(),
            });
        }
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(UkfError::NonFiniteMeasurement { sensor: self.sensor });
        }

        Ok(match self.sensor {
            SensorType::Laser => Observation::Laser(Vector2::from_column_slice(&self.values)),
            SensorType::Radar => Observation::Radar(Vector3::from_column_slice(&self.values)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sensor_tags() {
        assert_eq!("L".parse::<SensorType>().unwrap(), SensorType::Laser);
        assert_eq!("radar".parse::<SensorType>().unwrap(), SensorType::Radar);
        assert_eq!(
            "X".parse::<SensorType>(),
            Err(UkfError::UnknownSensor("x".to_string()))
        );
    }

    #[test]
    fn test_observation_ok() {
        let m = Measurement::radar(2.0, 0.5, -1.0, 10);
        match m.observation().unwrap() {
            Observation::Radar(z) => assert_eq!(z, Vector3::new(2.0, 0.5, -1.0)),
            other => panic!("unexpected observation {:?}", other),
        }
    }

    #[test]
    fn test_wrong_payload_size_rejected() {
        let m = Measurement {
            sensor: SensorType::Laser,
            values: vec![1.0, 2.0, 3.0],
            timestamp_us: 0,
        };
        assert_eq!(
            m.observation(),
            Err(UkfError::MalformedMeasurement {
                sensor: SensorType::Laser,
                expected: 2,
                found: 3,
            })
        );
    }

    #[test]
    fn test_nan_payload_rejected() {
        let m = Measurement::laser(f64::NAN, 0.0, 0);
        assert_eq!(
            m.observation(),
            Err(UkfError::NonFiniteMeasurement { sensor: SensorType::Laser })
        );
    }
}
