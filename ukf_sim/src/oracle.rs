//! Ground truth oracle for simulation.
//!
//! The Oracle moves a single target along a scenario trajectory and
//! generates noisy laser and radar readings of it:
//! - Exact CTRV kinematics with scenario-commanded turn rate / acceleration
//! - Gaussian sensor noise from a seeded RNG (same seed = same readings)

use crate::ingest::{GroundTruth, Sample};
use crate::scenarios::ScenarioId;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use ukf_core::{LaserNoise, Measurement, RadarNoise, SensorType};

/// Integration sub-step for the ground truth (seconds)
const PHYSICS_STEP: f64 = 0.001;

/// The simulated target's true kinematic state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetState {
    pub px: f64,
    pub py: f64,
    pub speed: f64,
    pub heading: f64,
    pub turn_rate: f64,
}

impl TargetState {
    fn from_array(s: [f64; 5]) -> Self {
        Self {
            px: s[0],
            py: s[1],
            speed: s[2],
            heading: s[3],
            turn_rate: s[4],
        }
    }

    /// Ground truth record `[px, py, vx, vy]`.
    pub fn ground_truth(&self) -> GroundTruth {
        GroundTruth {
            px: self.px,
            py: self.py,
            vx: self.speed * self.heading.cos(),
            vy: self.speed * self.heading.sin(),
        }
    }
}

/// The Oracle - maintains ground truth and generates sensor readings.
pub struct Oracle {
    /// Trajectory being flown
    scenario: ScenarioId,

    /// RNG for sensor noise
    rng: ChaCha8Rng,

    /// True target state
    target: TargetState,

    /// Current simulation time (microseconds)
    time_us: i64,

    laser_noise: LaserNoise,
    radar_noise: RadarNoise,
}

impl Oracle {
    /// Creates a new Oracle with the given seed.
    pub fn new(scenario: ScenarioId, seed: u64) -> Self {
        Self {
            scenario,
            rng: ChaCha8Rng::seed_from_u64(seed),
            target: TargetState::from_array(scenario.initial_state()),
            time_us: 0,
            laser_noise: LaserNoise::default(),
            radar_noise: RadarNoise::default(),
        }
    }

    /// Sets the sensor noise used for generated readings.
    pub fn with_noise(mut self, laser: LaserNoise, radar: RadarNoise) -> Self {
        self.laser_noise = laser;
        self.radar_noise = radar;
        self
    }

    /// Current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time_us as f64 / 1e6
    }

    pub fn target(&self) -> &TargetState {
        &self.target
    }

    /// Advances the target by `dt_us` microseconds.
    pub fn step(&mut self, dt_us: i64) {
        let end_us = self.time_us + dt_us;
        let mut t = self.time();
        let end = end_us as f64 / 1e6;

        while t < end {
            let h = PHYSICS_STEP.min(end - t);
            let s = &mut self.target;
            s.turn_rate = self.scenario.turn_rate(t);
            let a = self.scenario.acceleration(t);

            s.px += s.speed * s.heading.cos() * h;
            s.py += s.speed * s.heading.sin() * h;
            s.heading += s.turn_rate * h;
            s.speed += a * h;
            t += h;
        }
        self.time_us = end_us;
    }

    /// Noisy laser reading of the current target position.
    pub fn laser_reading(&mut self) -> Measurement {
        let nx = gaussian(&mut self.rng, self.laser_noise.std_px);
        let ny = gaussian(&mut self.rng, self.laser_noise.std_py);
        Measurement::laser(self.target.px + nx, self.target.py + ny, self.time_us)
    }

    /// Noisy radar reading of the current target state.
    pub fn radar_reading(&mut self) -> Measurement {
        let s = self.target;
        let range = (s.px * s.px + s.py * s.py).sqrt();
        let bearing = s.py.atan2(s.px);
        let range_rate = if range > 1e-6 {
            (s.px * s.speed * s.heading.cos() + s.py * s.speed * s.heading.sin()) / range
        } else {
            0.0
        };

        Measurement::radar(
            (range + gaussian(&mut self.rng, self.radar_noise.std_range)).abs(),
            bearing + gaussian(&mut self.rng, self.radar_noise.std_bearing),
            range_rate + gaussian(&mut self.rng, self.radar_noise.std_range_rate),
            self.time_us,
        )
    }

    /// Generates `duration_secs` of alternating laser/radar samples at `rate_hz`.
    ///
    /// The first sample is taken at t = 0 before any motion.
    pub fn generate(&mut self, duration_secs: f64, rate_hz: f64) -> Vec<Sample> {
        let period_us = (1e6 / rate_hz).round() as i64;
        let count = (duration_secs * rate_hz).floor() as usize + 1;

        (0..count)
            .map(|i| {
                if i > 0 {
                    self.step(period_us);
                }
                let sensor = if i % 2 == 0 { SensorType::Laser } else { SensorType::Radar };
                let measurement = match sensor {
                    SensorType::Laser => self.laser_reading(),
                    SensorType::Radar => self.radar_reading(),
                };
                Sample {
                    measurement,
                    ground_truth: Some(self.target.ground_truth()),
                }
            })
            .collect()
    }
}

fn gaussian(rng: &mut ChaCha8Rng, std_dev: f64) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}
