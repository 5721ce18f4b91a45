//! AlgoLab Simulator CLI
//!
//! Run the sorting race and capacity engines headlessly, with pass/fail
//! scenarios, seed sweeps and frame export.

use algolab_core::capacity::Scenario;
use algolab_core::RaceConfig;
use algolab_env::{audio, AudioRoute, AudioSink, TokioContext, TracingSink};
use algolab_sim::{ScenarioId, ScenarioResult, ScenarioRunner, SimContext, SimError};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// AlgoLab headless simulator
#[derive(Parser, Debug)]
#[command(name = "algolab-sim")]
#[command(about = "Run the AlgoRace and SystemScaler engines headlessly", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (bubble_vs_quick, launch_day, ..., all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Frame cap per run
    #[arg(short, long, default_value = "20000")]
    frames: u64,

    /// Frame jitter standard deviation in milliseconds
    #[arg(long, default_value = "0")]
    jitter: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export every 10th frame of a single run to this JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Drive with the real clock instead of the virtual one
    #[arg(long)]
    realtime: bool,

    /// Run one race from an AlgoRace props JSON file
    #[arg(long, conflicts_with = "scaler_props")]
    race_props: Option<PathBuf>,

    /// Run a capacity session from a SystemScaler props JSON file
    #[arg(long)]
    scaler_props: Option<PathBuf>,
}

/// What a single invocation runs.
enum Job {
    Named(ScenarioId),
    RaceProps(RaceConfig),
    ScalerProps(Scenario),
}

impl Job {
    fn name(&self) -> &str {
        match self {
            Job::Named(id) => id.name(),
            Job::RaceProps(_) => "race_props",
            Job::ScalerProps(_) => "scaler_props",
        }
    }
}

fn load_jobs(args: &Args) -> Result<Vec<Job>, SimError> {
    if let Some(path) = &args.race_props {
        let json = std::fs::read_to_string(path)?;
        return Ok(vec![Job::RaceProps(RaceConfig::from_props_json(&json)?)]);
    }
    if let Some(path) = &args.scaler_props {
        let json = std::fs::read_to_string(path)?;
        return Ok(vec![Job::ScalerProps(Scenario::from_props_json(&json)?)]);
    }
    if args.scenario == "all" {
        return Ok(ScenarioId::all().into_iter().map(Job::Named).collect());
    }
    args.scenario
        .parse()
        .map(|id| vec![Job::Named(id)])
        .map_err(SimError::Assertion)
}

async fn run_job(runner: &ScenarioRunner, job: &Job, seed: u64, realtime: bool) -> ScenarioResult {
    if realtime {
        let ctx = TokioContext::shared();
        match job {
            Job::Named(id) => runner.run_in(ctx, *id).await,
            Job::RaceProps(config) => runner.run_race_props(ctx, config.clone()).await,
            Job::ScalerProps(scenario) => runner.run_scaler_props(ctx, scenario.clone()).await,
        }
    } else {
        let ctx = SimContext::shared(seed);
        match job {
            Job::Named(id) => runner.run_in(ctx, *id).await,
            Job::RaceProps(config) => runner.run_race_props(ctx, config.clone()).await,
            Job::ScalerProps(scenario) => runner.run_scaler_props(ctx, scenario.clone()).await,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging: RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("AlgoLab Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let jobs = match load_jobs(&args) {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("{}", e);
            let names: Vec<_> = ScenarioId::all().iter().map(|id| id.name()).collect();
            error!("Available scenarios: {}, all", names.join(", "));
            std::process::exit(1);
        }
    };

    if args.export.is_some() && (jobs.len() > 1 || args.seeds > 1) {
        error!("--export only supports a single scenario and seed");
        std::process::exit(1);
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if args.realtime {
        audio::install_factory(Box::new(|| {
            Some(Arc::new(TracingSink) as Arc<dyn AudioSink>)
        }));
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let mut runner = ScenarioRunner::new(seed)
            .with_max_frames(args.frames)
            .with_jitter(args.jitter);
        if args.export.is_some() {
            runner = runner.with_recording(10);
        }
        if args.realtime {
            runner = runner.with_audio(AudioRoute::Global);
        }

        for job in &jobs {
            let result = run_job(&runner, job, seed, args.realtime).await;

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", job.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        job.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    audio::teardown();

    if let Some(path) = &args.export {
        if let Some(export) = all_results.first().and_then(|r| r.export.as_ref()) {
            match export.write_to_file(path) {
                Ok(()) => info!("Exported {} frames to {}", export.frames.len(), path.display()),
                Err(e) => {
                    error!("Failed to write export: {}", e);
                    failed_count += 1;
                }
            }
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total.saturating_sub(failed_count);

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario,
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.total_frames,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} runs passed!", total);
        } else {
            error!("❌ {}/{} runs failed!", failed_count, total);

            // List failed seeds
            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario,
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
