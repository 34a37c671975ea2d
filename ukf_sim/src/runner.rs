//! Scenario runner - feeds measurement streams through the filter and
//! scores the estimate against ground truth.

use crate::error::SimError;
use crate::exporter::{RunExport, RunFrame};
use crate::ingest::{GroundTruth, Sample};
use crate::oracle::Oracle;
use crate::scenarios::ScenarioId;

use nalgebra::Vector4;
use serde::Serialize;
use tracing::{debug, info, warn};
use ukf_core::{
    NisMonitor, NisStats, ProcessOutcome, SensorType, UkfConfig, UnscentedKalmanFilter,
};

/// What the runner does when the filter reports a numerical failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RecoveryPolicy {
    /// Stop the run and report the failure
    #[default]
    Abort,

    /// Drop the diverged filter and reinitialize from the next sample
    Reinitialize,
}

/// Accumulates squared errors of `[px, py, vx, vy]`.
#[derive(Debug, Clone, Default)]
pub struct RmseAccumulator {
    sum_sq: Vector4<f64>,
    count: usize,
}

impl RmseAccumulator {
    pub fn add(&mut self, estimate: &Vector4<f64>, truth: &GroundTruth) {
        let err = estimate - truth.as_vector();
        self.sum_sq += err.component_mul(&err);
        self.count += 1;
    }

    /// Root mean squared error, `None` without any ground truth.
    pub fn rmse(&self) -> Option<[f64; 4]> {
        if self.count == 0 {
            return None;
        }
        let mean = self.sum_sq / self.count as f64;
        Some([mean[0].sqrt(), mean[1].sqrt(), mean[2].sqrt(), mean[3].sqrt()])
    }
}

/// Outcome of replaying one measurement stream.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Samples offered to the filter
    pub samples: usize,

    /// Samples that produced a predict + update
    pub updates: usize,

    /// Samples ignored because their sensor is disabled
    pub skipped: usize,

    /// Samples rejected as malformed or out of order
    pub rejected: usize,

    /// Numerical failures recovered by reinitializing the filter
    pub recoveries: usize,

    /// RMSE of [px, py, vx, vy]
    pub rmse: Option<[f64; 4]>,

    pub laser_nis: NisStats,
    pub radar_nis: NisStats,

    /// Final `[px, py, speed, heading, turn_rate]`
    pub final_estimate: [f64; 5],
}

impl RunSummary {
    /// True when every RMSE component is at or below the limit.
    pub fn within(&self, max_rmse: &[f64; 4]) -> bool {
        match self.rmse {
            Some(rmse) => rmse.iter().zip(max_rmse).all(|(e, max)| e <= max),
            None => true,
        }
    }
}

/// Replays `samples` through a fresh filter built from `config`.
///
/// Malformed and out-of-order samples are logged and skipped. A numerical
/// failure either aborts the run or discards the filter, depending on
/// `recovery`. NIS statistics span the whole run, across reinitializations.
pub fn run_samples(
    config: &UkfConfig,
    samples: &[Sample],
    recovery: RecoveryPolicy,
    mut export: Option<&mut RunExport>,
) -> Result<RunSummary, SimError> {
    let mut ukf = UnscentedKalmanFilter::new(config.clone())?;
    let mut monitor = NisMonitor::new();
    let mut rmse = RmseAccumulator::default();
    let (mut updates, mut skipped, mut rejected, mut recoveries) = (0, 0, 0, 0);
    let t0 = samples.first().map(|s| s.measurement.timestamp_us).unwrap_or(0);

    for (index, sample) in samples.iter().enumerate() {
        let nis = match ukf.process_measurement(&sample.measurement) {
            Ok(ProcessOutcome::Updated { sensor, nis, .. }) => {
                updates += 1;
                monitor.record(sensor, nis);
                Some(nis)
            }
            Ok(ProcessOutcome::Skipped { .. }) => {
                skipped += 1;
                None
            }
            Ok(ProcessOutcome::Initialized { sensor }) => {
                debug!(%sensor, index, "filter initialized");
                None
            }
            Err(e) if e.is_numerical() => match recovery {
                RecoveryPolicy::Abort => return Err(SimError::Filter { index, source: e }),
                RecoveryPolicy::Reinitialize => {
                    warn!(index, error = %e, "filter diverged, reinitializing");
                    ukf = UnscentedKalmanFilter::new(config.clone())?;
                    recoveries += 1;
                    continue;
                }
            },
            Err(e) => {
                warn!(index, error = %e, "sample rejected");
                rejected += 1;
                continue;
            }
        };

        let x = ukf.mean();
        let estimate = Vector4::new(x[0], x[1], x[2] * x[3].cos(), x[2] * x[3].sin());
        if let Some(truth) = &sample.ground_truth {
            rmse.add(&estimate, truth);
        }

        if let Some(export) = export.as_deref_mut() {
            export.add_frame(RunFrame {
                time_sec: (sample.measurement.timestamp_us - t0) as f64 / 1e6,
                sensor: sample.measurement.sensor,
                measurement: sample.measurement.values.clone(),
                estimate: [x[0], x[1], x[2], x[3], x[4]],
                covariance_trace: ukf.covariance().trace(),
                ground_truth: sample.ground_truth,
                nis,
            });
        }
    }

    let x = ukf.mean();
    Ok(RunSummary {
        samples: samples.len(),
        updates,
        skipped,
        rejected,
        recoveries,
        rmse: rmse.rmse(),
        laser_nis: *monitor.stats(SensorType::Laser),
        radar_nis: *monitor.stats(SensorType::Radar),
        final_estimate: [x[0], x[1], x[2], x[3], x[4]],
    })
}

/// Rejects simulated durations and measurement rates that cannot produce a
/// meaningful measurement stream.
pub fn validate_timing(duration_secs: f64, rate_hz: f64) -> Result<(), SimError> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(SimError::Config(format!(
            "duration must be positive and finite, got {}",
            duration_secs
        )));
    }
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return Err(SimError::Config(format!(
            "measurement rate must be positive and finite, got {}",
            rate_hz
        )));
    }
    Ok(())
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the RMSE stayed within limits and the filter never failed
    pub passed: bool,

    /// Run statistics (absent when the filter failed)
    pub summary: Option<RunSummary>,

    /// Failure message if any
    pub failure_reason: Option<String>,
}

/// Runs synthetic scenarios.
pub struct ScenarioRunner {
    /// Noise seed
    seed: u64,

    /// Filter configuration
    config: UkfConfig,

    /// Simulated duration in seconds
    duration_secs: f64,

    /// Combined measurement rate (laser and radar alternate)
    rate_hz: f64,

    /// Pass threshold for RMSE of [px, py, vx, vy]
    max_rmse: [f64; 4],

    /// Handling of numerical failures
    recovery: RecoveryPolicy,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: UkfConfig::default(),
            duration_secs: 20.0,
            rate_hz: 20.0,
            max_rmse: [0.5, 0.5, 2.0, 2.0],
            recovery: RecoveryPolicy::Reinitialize,
        }
    }

    /// Sets the filter configuration.
    pub fn with_config(mut self, config: UkfConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Sets the measurement rate.
    pub fn with_rate(mut self, hz: f64) -> Self {
        self.rate_hz = hz;
        self
    }

    /// Sets the RMSE pass threshold.
    pub fn with_max_rmse(mut self, max_rmse: [f64; 4]) -> Self {
        self.max_rmse = max_rmse;
        self
    }

    /// Sets the numerical failure handling.
    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    /// Generates the scenario's measurements (noise matches the filter's tuning).
    pub fn samples(&self, scenario: ScenarioId) -> Vec<Sample> {
        Oracle::new(scenario, self.seed)
            .with_noise(self.config.laser_noise, self.config.radar_noise)
            .generate(self.duration_secs, self.rate_hz)
    }

    /// Runs a scenario, optionally recording frames into `export`.
    pub fn run(&self, scenario: ScenarioId, export: Option<&mut RunExport>) -> ScenarioResult {
        info!(scenario = scenario.name(), seed = self.seed, "{}", scenario.description());
        if let Err(e) = validate_timing(self.duration_secs, self.rate_hz) {
            return ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                summary: None,
                failure_reason: Some(e.to_string()),
            };
        }
        let samples = self.samples(scenario);

        match run_samples(&self.config, &samples, self.recovery, export) {
            Ok(summary) => {
                let passed = summary.within(&self.max_rmse);
                let failure_reason = (!passed).then(|| {
                    format!(
                        "RMSE {:?} exceeds threshold {:?}",
                        summary.rmse.unwrap_or_default(),
                        self.max_rmse
                    )
                });
                ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed,
                    summary: Some(summary),
                    failure_reason,
                }
            }
            Err(e) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                summary: None,
                failure_reason: Some(e.to_string()),
            },
        }
    }
}
