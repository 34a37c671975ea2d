//! Measurement replay and synthetic-scenario harness for the UKF engine.
//!
//! Drives [`ukf_core::UnscentedKalmanFilter`] from either a recorded
//! measurement log or a deterministic ground-truth simulator, and scores the
//! estimate against the truth.
//!
//! # Architecture
//!
//! ```text
//!   measurement log ──► ingest ──┐
//!                                ├──► runner ──► RunSummary / RunExport
//!   scenarios ──► oracle ────────┘      │
//!                                       ▼
//!                              UnscentedKalmanFilter
//! ```
//!
//! # Usage
//!
//! ```
//! use ukf_sim::{ScenarioId, ScenarioRunner};
//!
//! let runner = ScenarioRunner::new(42).with_duration(2.0);
//! let result = runner.run(ScenarioId::Straight, None);
//! assert!(result.summary.is_some());
//! ```

pub mod error;
pub mod exporter;
pub mod ingest;
pub mod oracle;
pub mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{RunExport, RunFrame};
pub use ingest::{GroundTruth, IngestError, Sample};
pub use oracle::{Oracle, TargetState};
pub use runner::{
    run_samples, validate_timing, RecoveryPolicy, RmseAccumulator, RunSummary, ScenarioResult,
    ScenarioRunner,
};
pub use scenarios::ScenarioId;
