//! Measurement log ingestion.
//!
//! One measurement per line, whitespace separated:
//!
//! ```text
//! L  px  py           timestamp_us  [gt_px gt_py gt_vx gt_vy]
//! R  rho phi rho_dot  timestamp_us  [gt_px gt_py gt_vx gt_vy]
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The ground-truth
//! columns are optional but must be complete when present.

use nalgebra::Vector4;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use ukf_core::{Measurement, SensorType};

/// Number of ground-truth columns: [px, py, vx, vy]
const GROUND_TRUTH_COLUMNS: usize = 4;

/// True kinematic state accompanying a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub px: f64,
    pub py: f64,
    pub vx: f64,
    pub vy: f64,
}

impl GroundTruth {
    /// As `[px, py, vx, vy]`.
    pub fn as_vector(&self) -> Vector4<f64> {
        Vector4::new(self.px, self.py, self.vx, self.vy)
    }
}

/// A measurement with optional ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub measurement: Measurement,
    pub ground_truth: Option<GroundTruth>,
}

/// Errors raised while reading a measurement log.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Line {line}: unknown sensor tag '{tag}'")]
    UnknownSensor { line: usize, tag: String },

    #[error("Line {line}: expected {expected} columns after the sensor tag, found {found}")]
    ColumnCount {
        line: usize,
        expected: String,
        found: usize,
    },

    #[error("Line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses one non-empty, non-comment line.
///
/// `line_no` is only used for error messages.
pub fn parse_line(line: &str, line_no: usize) -> Result<Sample, IngestError> {
    let mut fields = line.split_whitespace();
    let tag = fields.next().unwrap_or_default();
    let sensor: SensorType = tag.parse().map_err(|_| IngestError::UnknownSensor {
        line: line_no,
        tag: tag.to_string(),
    })?;

    let rest: Vec<&str> = fields.collect();
    let dim = sensor.dimension();
    let without_truth = dim + 1;
    let with_truth = without_truth + GROUND_TRUTH_COLUMNS;
    if rest.len() != without_truth && rest.len() != with_truth {
        return Err(IngestError::ColumnCount {
            line: line_no,
            expected: format!("{} or {}", without_truth, with_truth),
            found: rest.len(),
        });
    }

    let values = rest[..dim]
        .iter()
        .map(|v| parse_number::<f64>(v, line_no))
        .collect::<Result<Vec<_>, _>>()?;
    let timestamp_us = parse_number::<i64>(rest[dim], line_no)?;

    let ground_truth = if rest.len() == with_truth {
        let gt = rest[without_truth..]
            .iter()
            .map(|v| parse_number::<f64>(v, line_no))
            .collect::<Result<Vec<_>, _>>()?;
        Some(GroundTruth {
            px: gt[0],
            py: gt[1],
            vx: gt[2],
            vy: gt[3],
        })
    } else {
        None
    };

    Ok(Sample {
        measurement: Measurement {
            sensor,
            values,
            timestamp_us,
        },
        ground_truth,
    })
}

/// Parses a whole log, skipping blank lines and `#` comments.
pub fn parse_str(input: &str) -> Result<Vec<Sample>, IngestError> {
    input
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| parse_line(line, line_no))
        .collect()
}

/// Reads and parses a log file.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Sample>, IngestError> {
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Formats a sample back into the log line format.
pub fn format_sample(sample: &Sample) -> String {
    let m = &sample.measurement;
    let mut fields: Vec<String> = vec![m.sensor.tag().to_string()];
    fields.extend(m.values.iter().map(|v| v.to_string()));
    fields.push(m.timestamp_us.to_string());
    if let Some(gt) = &sample.ground_truth {
        fields.extend([gt.px, gt.py, gt.vx, gt.vy].iter().map(|v| v.to_string()));
    }
    fields.join("\t")
}

fn parse_number<T: std::str::FromStr>(value: &str, line: usize) -> Result<T, IngestError> {
    value.parse().map_err(|_| IngestError::InvalidNumber {
        line,
        value: value.to_string(),
    })
}
