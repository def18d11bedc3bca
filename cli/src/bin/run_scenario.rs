//! Runs one or more scenarios against the engine and reports on each.
//!
//! ```bash
//! run-scenario --project ../game --test lag
//! run-scenario --project ../game --test custom --clients 2 --loss 0.05 --lag 120
//! run-scenario --project ../game --test all
//! run-scenario --project ../game --scenario-file nightly.json
//! ```
//!
//! The last line printed for every finished run is `REPORT_JSON:<path>`.
//! Ctrl-C stops the engine processes cleanly and still writes reports.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use snapshot_harness::orchestrator::DEFAULT_COOLDOWN;
use snapshot_harness::{
    find_engine_executable, BehaviorMode, HarnessError, NetworkConditions, Orchestrator,
    OrchestratorConfig, ScenarioConfig, ShutdownFlag,
};

#[derive(Parser)]
#[command(name = "run-scenario", version, about = "Network testing framework")]
struct Opt {
    /// Engine executable (default: $GODOT_PATH, then godot4/godot on PATH)
    #[arg(long)]
    engine: Option<PathBuf>,
    /// Game project directory
    #[arg(long, default_value = ".")]
    project: PathBuf,
    /// Preset name, `all`, or `custom`
    #[arg(long, default_value = "basic")]
    test: String,
    /// Load the scenario from a JSON file instead of --test
    #[arg(long)]
    scenario_file: Option<PathBuf>,
    /// Number of clients (custom)
    #[arg(long, default_value_t = 1)]
    clients: u32,
    /// Test duration in seconds (custom)
    #[arg(long, default_value_t = 30)]
    duration: u64,
    /// Client behavior (custom)
    #[arg(long, default_value = "random_walk")]
    mode: BehaviorMode,
    /// Simulated lag in ms (custom)
    #[arg(long, default_value_t = 0)]
    lag: u32,
    /// Packet loss rate 0.0-1.0 (custom)
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Jitter in ms (custom)
    #[arg(long, default_value_t = 0)]
    jitter: u32,
    /// Bandwidth limit in KB/s, 0 for none (custom)
    #[arg(long, default_value_t = 0.0)]
    bw: f64,
    /// Packet duplication rate 0.0-1.0 (custom)
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,
    /// Override the engine's interpolation delay, seconds
    #[arg(long)]
    interp_delay: Option<f64>,
    /// Override the engine's jitter buffer, milliseconds
    #[arg(long)]
    jitter_buf: Option<f64>,
    /// Parent directory for run logs
    #[arg(long, default_value = "test_logs")]
    log_dir: PathBuf,
    /// Parent directory for reports
    #[arg(long, default_value = "test_reports")]
    report_dir: PathBuf,
    /// List the preset scenarios and exit
    #[arg(long)]
    list: bool,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Opt {
    fn custom_scenario(&self) -> ScenarioConfig {
        ScenarioConfig::new("custom_test")
            .with_clients(self.clients)
            .with_duration_secs(self.duration)
            .with_behavior(self.mode)
            .with_network(
                NetworkConditions::perfect()
                    .with_lag_ms(self.lag)
                    .with_packet_loss(self.loss)
                    .with_jitter_ms(self.jitter)
                    .with_bandwidth_kbps(self.bw)
                    .with_duplicate_rate(self.duplicate),
            )
    }

    fn scenarios(&self) -> Result<Vec<ScenarioConfig>, HarnessError> {
        let mut scenarios = if let Some(path) = &self.scenario_file {
            let json = fs::read_to_string(path)
                .map_err(|e| HarnessError::Io { context: format!("reading {}: {}", path.display(), e) })?;
            vec![ScenarioConfig::from_json(&json)?]
        } else {
            match self.test.as_str() {
                "all" => ScenarioConfig::all_presets(),
                "custom" => vec![self.custom_scenario()],
                name => vec![ScenarioConfig::preset(name).ok_or_else(|| HarnessError::InvalidConfig {
                    info: format!(
                        "unknown test '{}' (expected one of: {}, all, custom)",
                        name,
                        ScenarioConfig::preset_names().join(", ")
                    ),
                })?],
            }
        };

        for scenario in &mut scenarios {
            if let Some(delay) = self.interp_delay {
                scenario.interp_delay = Some(delay);
            }
            if let Some(buffer) = self.jitter_buf {
                scenario.jitter_buffer = Some(buffer);
            }
            scenario.validate()?;
        }
        Ok(scenarios)
    }
}

fn list_presets() {
    println!("Available scenarios:");
    for key in ScenarioConfig::preset_names() {
        if let Some(s) = ScenarioConfig::preset(key) {
            let net = &s.network;
            println!(
                "  {:<13} {} client(s), {}s, {} | loss {}%, lag {}ms, jitter {}ms, dup {}%",
                key,
                s.num_clients,
                s.duration_secs,
                s.behavior,
                net.packet_loss * 100.0,
                net.lag_ms,
                net.jitter_ms,
                net.duplicate_rate * 100.0
            );
        }
    }
    println!("  {:<13} every preset above, 5s apart", "all");
    println!("  {:<13} built from --clients/--duration/--mode/--lag/--loss/...", "custom");
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let opt = Opt::parse();
    snapshot_harness_cli::init_tracing(opt.verbose)?;

    if opt.list {
        list_presets();
        return Ok(ExitCode::SUCCESS);
    }

    let scenarios = match opt.scenarios() {
        Ok(scenarios) => scenarios,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        },
    };

    let Some(engine) = opt.engine.clone().or_else(find_engine_executable) else {
        eprintln!("Error: {}", HarnessError::EngineNotFound);
        return Ok(ExitCode::FAILURE);
    };
    tracing::info!(engine = %engine.display(), "using engine");

    let config = OrchestratorConfig::new(engine, &opt.project)
        .with_log_root(&opt.log_dir)
        .with_report_root(&opt.report_dir);

    let shutdown = ShutdownFlag::new();
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted, stopping engine processes");
        handler_flag.request();
    })?;

    let orchestrator = Orchestrator::new(config)?.with_shutdown_flag(shutdown);
    let mut failed = false;
    for outcome in orchestrator.run_all(&scenarios, DEFAULT_COOLDOWN) {
        match outcome {
            Ok(run) => {
                println!();
                println!("Test {} finished ({})", run.test_id, run.stop_reason);
                println!("Logs: {}", run.log_dir.display());
                match &run.paths {
                    Ok(paths) => {
                        println!("Markdown report: {}", paths.markdown.display());
                        println!("Debug summary: {}", paths.advisory.display());
                        println!("REPORT_JSON:{}", paths.json.display());
                    },
                    Err(e) => {
                        eprintln!("Error: reports not written: {}", e);
                        println!(
                            "Summary: {} critical, warnings: {}",
                            run.report.critical_issues().count(),
                            run.report.summary.has_warnings
                        );
                        failed = true;
                    },
                }
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                failed = true;
            },
        }
    }

    println!();
    println!("All tests completed!");
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
