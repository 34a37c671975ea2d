//! JSON exporter for run inspection.
//!
//! Writes one frame per processed measurement with the estimate, the ground
//! truth (when known) and the NIS of the update.

use crate::ingest::GroundTruth;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use ukf_core::SensorType;

/// A single processed measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFrame {
    /// Measurement time in seconds (relative to the first measurement)
    pub time_sec: f64,

    /// Sensor that produced the measurement
    pub sensor: SensorType,

    /// Raw measurement values
    pub measurement: Vec<f64>,

    /// Estimate after processing `[px, py, speed, heading, turn_rate]`
    pub estimate: [f64; 5],

    /// Covariance trace after processing
    pub covariance_trace: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<GroundTruth>,

    /// NIS of the update (absent for initialization / skipped samples)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nis: Option<f64>,
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Data source (scenario name or input file)
    pub source: String,

    /// Seed used (synthetic runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<RunFrame>,

    /// Final results
    pub passed: bool,

    /// RMSE of [px, py, vx, vy] if ground truth was available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse: Option<[f64; 4]>,
}

impl RunExport {
    /// Creates a new export container.
    pub fn new(source: &str, seed: Option<u64>) -> Self {
        Self {
            source: source.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            rmse: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: RunFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, rmse: Option<[f64; 4]>) {
        self.passed = passed;
        self.rmse = rmse;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
