//! Synthetic target trajectories for the simulation harness.

use std::str::FromStr;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: constant speed, zero turn rate
    Straight,

    /// SIM-002: constant speed, constant turn rate
    Circle,

    /// SIM-003: turn rate oscillating left/right
    Slalom,

    /// SIM-004: speed ramping up while turning
    Accelerating,

    /// SIM-005: target passing right over the sensor origin
    Flyover,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Straight,
            ScenarioId::Circle,
            ScenarioId::Slalom,
            ScenarioId::Accelerating,
            ScenarioId::Flyover,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Straight => "straight",
            ScenarioId::Circle => "circle",
            ScenarioId::Slalom => "slalom",
            ScenarioId::Accelerating => "accelerating",
            ScenarioId::Flyover => "flyover",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Straight => "5 m/s along a straight line at 30° heading",
            ScenarioId::Circle => "5 m/s on a circle of radius ~16.7 m",
            ScenarioId::Slalom => "5 m/s with turn rate 0.5·sin(0.5·t) rad/s",
            ScenarioId::Accelerating => "speed 2 → 8 m/s at 0.5 m/s² while turning at 0.1 rad/s",
            ScenarioId::Flyover => "4 m/s straight through the sensor at the origin",
        }
    }

    /// Initial ground truth `[px, py, speed, heading, turn_rate]`.
    pub fn initial_state(&self) -> [f64; 5] {
        match self {
            ScenarioId::Straight => [1.0, 1.0, 5.0, std::f64::consts::FRAC_PI_6, 0.0],
            ScenarioId::Circle => [10.0, 0.0, 5.0, std::f64::consts::FRAC_PI_2, 0.3],
            ScenarioId::Slalom => [2.0, -3.0, 5.0, 0.0, 0.0],
            ScenarioId::Accelerating => [5.0, 5.0, 2.0, 0.0, 0.1],
            ScenarioId::Flyover => [-10.0, -10.0, 4.0, std::f64::consts::FRAC_PI_4, 0.0],
        }
    }

    /// Commanded turn rate at time `t` (seconds).
    pub fn turn_rate(&self, t: f64) -> f64 {
        match self {
            ScenarioId::Slalom => 0.5 * (0.5 * t).sin(),
            _ => self.initial_state()[4],
        }
    }

    /// Commanded longitudinal acceleration at time `t` (seconds).
    pub fn acceleration(&self, t: f64) -> f64 {
        match self {
            ScenarioId::Accelerating if t < 12.0 => 0.5,
            _ => 0.0,
        }
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioId::all()
            .into_iter()
            .find(|id| id.name() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown scenario: {}", s))
    }
}
