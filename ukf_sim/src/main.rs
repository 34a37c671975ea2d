//! UKF fusion simulator CLI
//!
//! Replays a recorded LASER/RADAR log or runs synthetic scenarios and
//! reports the estimation error.

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use ukf_core::UkfConfig;
use ukf_sim::ingest;
use ukf_sim::{
    run_samples, validate_timing, RecoveryPolicy, RunExport, RunSummary, ScenarioId,
    ScenarioResult, ScenarioRunner, SimError,
};

/// UKF sensor fusion simulator
#[derive(Parser, Debug)]
#[command(name = "ukf-sim")]
#[command(about = "Run the LASER/RADAR unscented Kalman filter on logs or synthetic scenarios", long_about = None)]
struct Args {
    /// Measurement log to replay instead of synthetic scenarios
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Master seed for the synthetic measurement noise
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (straight, circle, slalom, accelerating, flyover, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "20")]
    duration: f64,

    /// Combined measurement rate in Hz (laser and radar alternate)
    #[arg(long, default_value = "20")]
    rate_hz: f64,

    /// JSON filter configuration (partial files fall back to defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore laser measurements after initialization
    #[arg(long)]
    no_laser: bool,

    /// Ignore radar measurements after initialization
    #[arg(long)]
    no_radar: bool,

    /// RMSE pass threshold as px,py,vx,vy
    #[arg(long, value_delimiter = ',', num_args = 4, default_values_t = [0.5, 0.5, 2.0, 2.0])]
    max_rmse: Vec<f64>,

    /// Stop at the first numerical failure instead of reinitializing
    #[arg(long)]
    abort_on_failure: bool,

    /// Export per-measurement frames to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn max_rmse(&self) -> [f64; 4] {
        let mut out = [0.5, 0.5, 2.0, 2.0];
        for (slot, value) in out.iter_mut().zip(&self.max_rmse) {
            *slot = *value;
        }
        out
    }

    fn recovery(&self) -> RecoveryPolicy {
        if self.abort_on_failure {
            RecoveryPolicy::Abort
        } else {
            RecoveryPolicy::Reinitialize
        }
    }
}

/// Loads the filter configuration and applies the sensor switches.
fn load_config(args: &Args) -> Result<UkfConfig, SimError> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            UkfConfig::from_json_str(&json).map_err(|e| SimError::Config(e.to_string()))?
        }
        None => UkfConfig::default(),
    };
    if args.no_laser {
        config.use_laser = false;
    }
    if args.no_radar {
        config.use_radar = false;
    }
    Ok(config)
}

fn log_summary(summary: &RunSummary) {
    if let Some(rmse) = summary.rmse {
        info!(
            "  RMSE px={:.3} py={:.3} vx={:.3} vy={:.3}",
            rmse[0], rmse[1], rmse[2], rmse[3]
        );
    }
    for (name, stats) in [("laser", &summary.laser_nis), ("radar", &summary.radar_nis)] {
        if let (Some(mean), Some(ratio)) = (stats.mean(), stats.exceedance_ratio()) {
            info!(
                "  {} NIS mean={:.2} above 95% bound: {:.1}% of {} updates",
                name,
                mean,
                ratio * 100.0,
                stats.updates
            );
        }
    }
    if summary.recoveries > 0 {
        info!("  filter reinitialized {} time(s)", summary.recoveries);
    }
}

/// Replays a measurement log. Returns whether the run passed.
fn replay(args: &Args, config: &UkfConfig, path: &Path) -> Result<bool, SimError> {
    let samples = ingest::read_file(path)?;
    let source = path.display().to_string();
    info!("Replaying {} samples from {}", samples.len(), source);

    let mut export = args.export.as_ref().map(|_| RunExport::new(&source, None));
    let summary = match run_samples(config, &samples, args.recovery(), export.as_mut()) {
        Ok(summary) => summary,
        Err(e @ SimError::Filter { .. }) => {
            error!("✗ {} FAILED: {}", source, e);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    let passed = summary.within(&args.max_rmse());

    if let (Some(export), Some(export_path)) = (export.as_mut(), &args.export) {
        export.finalize(passed, summary.rmse);
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        log_summary(&summary);
        if passed {
            info!("✓ {} PASSED", source);
        } else {
            error!("✗ {} FAILED: RMSE {:?} exceeds threshold", source, summary.rmse);
        }
    }

    Ok(passed)
}

/// Runs synthetic scenarios. Returns whether every run passed.
fn simulate(args: &Args, config: &UkfConfig) -> Result<bool, SimError> {
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(SimError::Config)?]
    };

    validate_timing(args.duration, args.rate_hz)?;

    let mut all_results: Vec<ScenarioResult> = Vec::new();

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        return Err(SimError::Config(
            "--export only supports a single scenario and seed".to_string(),
        ));
    }

    for seed_offset in 0..args.seeds {
        let seed = args.seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed)
            .with_config(config.clone())
            .with_duration(args.duration)
            .with_rate(args.rate_hz)
            .with_max_rmse(args.max_rmse())
            .with_recovery(args.recovery());

        for scenario in &scenarios {
            let mut export = args
                .export
                .as_ref()
                .map(|_| RunExport::new(scenario.name(), Some(seed)));
            let result = runner.run(*scenario, export.as_mut());

            if let (Some(export), Some(export_path)) = (export.as_mut(), &args.export) {
                export.finalize(result.passed, result.summary.as_ref().and_then(|s| s.rmse));
                export.write_to_file(export_path)?;
                info!("Exported {} frames to {}", export.frames.len(), export_path);
            }

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
                if let Some(summary) = &result.summary {
                    log_summary(summary);
                }
            }

            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "summary": r.summary,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    Ok(failed_count == 0)
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the --verbose level
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let outcome = load_config(&args).and_then(|config| match &args.input {
        Some(path) => replay(&args, &config, path),
        None => simulate(&args, &config),
    });

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    }
}
