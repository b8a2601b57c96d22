//! ADAS Simulator CLI
//!
//! Run deterministic closed-loop driving scenarios against the ADAS core.

use adas_sim::{
    load_pipeline_config, ScenarioId, ScenarioResult, ScenarioRunner, SimConfig, SimError,
};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// ADAS Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "adas-sim")]
#[command(about = "Run deterministic driving scenarios for the ADAS core", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (follow_lead, cut_in, cut_out, gps_dropout, imu_spike, curved_road, stationary_obstacle, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulation duration in seconds (clamped per scenario)
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Control loop rate in Hz
    #[arg(long, default_value = "20")]
    tick_rate: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frame-by-frame data of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Pipeline configuration JSON (missing fields use defaults)
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    }
}

/// Returns `Ok(true)` when every run passed.
fn run(args: &Args) -> Result<bool, SimError> {
    if !args.json {
        info!("ADAS Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios = ScenarioId::parse_selection(&args.scenario)?;

    let mut config = SimConfig {
        tick_rate_hz: args.tick_rate,
        duration_secs: args.duration,
        ..Default::default()
    };
    if let Some(path) = &args.config {
        config.pipeline = load_pipeline_config(path)?;
        info!("Loaded pipeline configuration from {}", path);
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            return Err(SimError::Usage(
                "--export only supports a single scenario, not 'all'".to_string(),
            ));
        }
        let scenario = scenarios[0];
        let runner = ScenarioRunner::new(base_seed).with_config(config);
        let (result, export) = runner.run_with_export(scenario);
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        report(&result, args.json);
        return Ok(result.passed);
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result, false);
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(result_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed_count == 0)
}

fn result_json(r: &ScenarioResult) -> serde_json::Value {
    serde_json::json!({
        "scenario": r.scenario.name(),
        "seed": r.seed,
        "passed": r.passed,
        "ticks": r.total_ticks,
        "time_secs": r.final_time_secs,
        "failure_reason": r.failure_reason,
        "metrics": r.metrics,
    })
}

fn report(result: &ScenarioResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(&result_json(result)) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
    } else if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
