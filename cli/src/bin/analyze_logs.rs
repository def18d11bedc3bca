//! Analyzes a directory of engine logs and writes the three reports.
//!
//! ```bash
//! analyze-logs test_logs/basic_single_client_20250101_120000 --output test_reports
//! ```
//!
//! Exits with 1 when the directory is missing or holds no logs. Detected
//! issues never change the exit code.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use snapshot_harness::{AnalysisConfig, HarnessError, LogAnalyzer, ReportWriter, Thresholds};

#[derive(Parser)]
#[command(name = "analyze-logs", version, about = "Analyze engine test logs")]
struct Opt {
    /// Directory containing log files
    log_dir: PathBuf,
    /// Output directory for reports
    #[arg(short, long, default_value = "test_reports")]
    output: PathBuf,
    /// Glob matched against file names in LOG_DIR
    #[arg(long, default_value = "*.log")]
    pattern: String,
    /// Interpolation warnings tolerated per file
    #[arg(long, default_value_t = 10)]
    interp_warning_limit: u64,
    /// Tolerated baseline mismatches per received snapshot
    #[arg(long, default_value_t = 0.10)]
    mismatch_ratio: f64,
    /// Buffer underruns tolerated per file
    #[arg(long, default_value_t = 0)]
    underrun_limit: u64,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let opt = Opt::parse();
    snapshot_harness_cli::init_tracing(opt.verbose)?;

    let config = AnalysisConfig::new()
        .with_file_pattern(opt.pattern)
        .with_thresholds(
            Thresholds::new()
                .with_interpolation_warning_limit(opt.interp_warning_limit)
                .with_mismatch_ratio_limit(opt.mismatch_ratio)
                .with_buffer_underrun_limit(opt.underrun_limit),
        );
    config.validate()?;

    let report = match LogAnalyzer::new(config).analyze_dir(&opt.log_dir) {
        Ok(report) => report,
        Err(e @ (HarnessError::LogDirMissing { .. } | HarnessError::NoLogFiles { .. })) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        },
        Err(e) => return Err(e.into()),
    };

    let paths = ReportWriter::new(&opt.output).write_all(&report)?;

    let s = &report.summary;
    println!();
    println!("Analyzed {} log file(s)", s.files_analyzed);
    println!("  Errors: {}  Warnings: {}", s.total_errors, s.total_warnings);
    println!(
        "  Snapshots sent/received: {}/{}",
        s.total_snapshots_sent, s.total_snapshots_received
    );
    println!("  Player disappearances: {}", s.total_player_disappearances);
    if s.has_critical_issues {
        println!("  Critical issues detected, see the reports");
    }
    println!();
    println!("JSON report:     {}", paths.json.display());
    println!("Markdown report: {}", paths.markdown.display());
    println!("Debug summary:   {}", paths.advisory.display());

    Ok(ExitCode::SUCCESS)
}
