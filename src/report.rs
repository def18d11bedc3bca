//! Cross-file aggregation and report emission.
//!
//! A [`Report`] is built once from finalized [`AnalysisResult`]s and never
//! mutated afterwards. Three documents are derived from it, each a pure
//! function of the report:
//!
//! - [`to_json`]: the machine-readable form; field names are the contract with
//!   downstream tooling and [`from_json`] reads it back losslessly.
//! - [`markdown::render`]: the narrative document.
//! - [`advisory::render`]: the narrative plus fix suggestions and follow-up
//!   investigation prompts.
//!
//! [`ReportWriter`] puts all three on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detect::Issue;
use crate::error::HarnessError;
use crate::metrics::AnalysisResult;
use crate::scenario::ScenarioConfig;

pub mod advisory;
pub mod markdown;

/// File name of the structured report.
pub const JSON_REPORT_FILE: &str = "analysis_report.json";
/// File name of the narrative report.
pub const MARKDOWN_REPORT_FILE: &str = "analysis_report.md";
/// File name of the advisory document.
pub const ADVISORY_REPORT_FILE: &str = "debug_summary.md";

/// Sums over every analyzed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Files in the report, readable or not.
    pub files_analyzed: u64,
    /// Files that could not be read.
    pub files_failed: u64,
    /// Sum of `total_lines`.
    pub total_lines: u64,
    /// Sum of `entries`.
    pub total_entries: u64,
    /// Sum of `errors`.
    pub total_errors: u64,
    /// Sum of `warnings`.
    pub total_warnings: u64,
    /// Sum of `snapshots_sent`.
    pub total_snapshots_sent: u64,
    /// Sum of `snapshots_received`.
    pub total_snapshots_received: u64,
    /// Sum of `packet_loss_events`.
    pub total_packet_loss_events: u64,
    /// Sum of `baseline_mismatches`.
    pub total_baseline_mismatches: u64,
    /// Sum of `player_disappearances`.
    pub total_player_disappearances: u64,
    /// Sum of `interpolation_warnings`.
    pub total_interpolation_warnings: u64,
    /// Sum of `chunk_changes`.
    pub total_chunk_changes: u64,
    /// Sum of `buffer_underruns`.
    pub total_buffer_underruns: u64,
    /// Any file has a critical issue.
    pub has_critical_issues: bool,
    /// Any file has a warning.
    pub has_warnings: bool,
}

impl Summary {
    /// Sums the given results. Each result is counted exactly once.
    #[must_use]
    pub fn from_results(files: &[AnalysisResult]) -> Self {
        let mut summary = Self::default();
        for file in files {
            summary.files_analyzed += 1;
            if file.is_unreadable() {
                summary.files_failed += 1;
            }
            summary.total_lines += file.total_lines;
            summary.total_entries += file.entries;
            summary.total_errors += file.errors;
            summary.total_warnings += file.warnings;
            summary.total_snapshots_sent += file.snapshots_sent;
            summary.total_snapshots_received += file.snapshots_received;
            summary.total_packet_loss_events += file.packet_loss_events;
            summary.total_baseline_mismatches += file.baseline_mismatches;
            summary.total_player_disappearances += file.player_disappearances;
            summary.total_interpolation_warnings += file.interpolation_warnings;
            summary.total_chunk_changes += file.chunk_changes;
            summary.total_buffer_underruns += file.buffer_underruns;
            summary.has_critical_issues |= !file.critical_issues.is_empty();
            summary.has_warnings |= !file.warnings_list.is_empty();
        }
        summary
    }
}

/// Participant settings of the run that produced the logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of client processes.
    pub num_clients: u32,
    /// Length of the run window in seconds.
    pub duration_secs: u64,
    /// Client behavior mode.
    pub test_mode: String,
}

/// Network conditions of the run, in report units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Simulated packet loss, percent.
    pub packet_loss_percent: f64,
    /// Base one-way latency, milliseconds.
    pub lag_base_ms: u32,
    /// Latency variation, milliseconds.
    pub jitter_ms: u32,
    /// Bandwidth cap in KB/s, `0` for none.
    pub bandwidth_cap_kbps: f64,
    /// Simulated duplication, percent.
    pub duplicate_percent: f64,
    /// Jitter buffer override in milliseconds; `None` means the engine default.
    pub jitter_buffer_ms: Option<f64>,
    /// Interpolation delay override in seconds; `None` means the engine default.
    pub interpolation_delay_s: Option<f64>,
}

impl NetworkProfile {
    /// Converts a scenario's conditions to report units.
    #[must_use]
    pub fn from_scenario(scenario: &ScenarioConfig) -> Self {
        let net = &scenario.network;
        Self {
            packet_loss_percent: net.packet_loss * 100.0,
            lag_base_ms: net.lag_ms,
            jitter_ms: net.jitter_ms,
            bandwidth_cap_kbps: net.bandwidth_kbps,
            duplicate_percent: net.duplicate_rate * 100.0,
            jitter_buffer_ms: scenario.jitter_buffer,
            interpolation_delay_s: scenario.interp_delay,
        }
    }
}

/// How one engine process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// `server` or `client_<i>`.
    pub role: String,
    /// OS process id.
    pub pid: u32,
    /// Exit code, `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// The process ignored the termination request and was killed.
    pub forced_kill: bool,
    /// The process was already gone before shutdown began.
    pub exited_early: bool,
}

impl ProcessOutcome {
    /// Returns `true` if the process exited on its own with a non-zero code,
    /// or was gone before the run ended.
    #[must_use]
    pub fn is_abnormal(&self) -> bool {
        self.exited_early || matches!(self.exit_code, Some(code) if code != 0)
    }
}

/// The orchestrated run behind a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Scenario name.
    pub test_name: String,
    /// RFC 3339 start time of the run.
    pub timestamp: String,
    /// Participant settings.
    pub config: RunConfig,
    /// Network conditions.
    pub network_profile: NetworkProfile,
    /// Role label to absolute log path.
    pub log_files: BTreeMap<String, String>,
    /// One entry per started process, in start order.
    pub processes: Vec<ProcessOutcome>,
}

impl RunContext {
    /// Builds the context for `scenario`. Logs and processes are filled in by the caller.
    #[must_use]
    pub fn from_scenario(scenario: &ScenarioConfig, timestamp: impl Into<String>) -> Self {
        Self {
            test_name: scenario.name.clone(),
            timestamp: timestamp.into(),
            config: RunConfig {
                num_clients: scenario.num_clients,
                duration_secs: scenario.duration_secs,
                test_mode: scenario.behavior.as_str().to_owned(),
            },
            network_profile: NetworkProfile::from_scenario(scenario),
            log_files: BTreeMap::new(),
            processes: Vec::new(),
        }
    }
}

/// Per-file results plus their sums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Per-file results in discovery order.
    pub files: Vec<AnalysisResult>,
    /// Cross-file sums.
    pub summary: Summary,
    /// The run that produced the logs, when the report came from an orchestrated run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunContext>,
}

impl Report {
    /// Aggregates finalized results.
    #[must_use]
    pub fn new(files: Vec<AnalysisResult>) -> Self {
        let summary = Summary::from_results(&files);
        Self {
            files,
            summary,
            run: None,
        }
    }

    /// Aggregates finalized results from an orchestrated run.
    #[must_use]
    pub fn with_run(files: Vec<AnalysisResult>, run: RunContext) -> Self {
        Self {
            run: Some(run),
            ..Self::new(files)
        }
    }

    /// Every critical issue with the file it came from, in file then rule order.
    pub fn critical_issues(&self) -> impl Iterator<Item = (&AnalysisResult, &Issue)> {
        self.files
            .iter()
            .flat_map(|f| f.critical_issues.iter().map(move |i| (f, i)))
    }

    /// Every warning with the file it came from, in file then rule order.
    pub fn warnings(&self) -> impl Iterator<Item = (&AnalysisResult, &Issue)> {
        self.files
            .iter()
            .flat_map(|f| f.warnings_list.iter().map(move |i| (f, i)))
    }
}

/// Serializes the report as pretty-printed JSON.
pub fn to_json(report: &Report) -> Result<String, HarnessError> {
    serde_json::to_string_pretty(report).map_err(|e| HarnessError::Serialization {
        context: format!("encoding report: {}", e),
    })
}

/// Reads a report produced by [`to_json`].
pub fn from_json(json: &str) -> Result<Report, HarnessError> {
    serde_json::from_str(json).map_err(|e| HarnessError::Serialization {
        context: format!("decoding report: {}", e),
    })
}

/// Where [`ReportWriter::write_all`] put each document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// The structured report.
    pub json: PathBuf,
    /// The narrative report.
    pub markdown: PathBuf,
    /// The advisory document.
    pub advisory: PathBuf,
}

/// Writes the three report documents into one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    out_dir: PathBuf,
}

impl ReportWriter {
    /// Targets `out_dir`, which is created on write if missing.
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// The output directory.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Renders and writes all documents.
    ///
    /// Fails if the directory cannot be created or a file cannot be written.
    /// The report itself is untouched and can be written elsewhere.
    pub fn write_all(&self, report: &Report) -> Result<ReportPaths, HarnessError> {
        fs::create_dir_all(&self.out_dir).map_err(|e| {
            HarnessError::io(
                format!("creating report directory {}", self.out_dir.display()),
                &e,
            )
        })?;

        let paths = ReportPaths {
            json: self.out_dir.join(JSON_REPORT_FILE),
            markdown: self.out_dir.join(MARKDOWN_REPORT_FILE),
            advisory: self.out_dir.join(ADVISORY_REPORT_FILE),
        };

        write_document(&paths.json, &to_json(report)?)?;
        tracing::info!(path = %paths.json.display(), "JSON report written");
        write_document(&paths.markdown, &markdown::render(report))?;
        tracing::info!(path = %paths.markdown.display(), "markdown report written");
        write_document(&paths.advisory, &advisory::render(report))?;
        tracing::info!(path = %paths.advisory.display(), "debug summary written");

        Ok(paths)
    }
}

fn write_document(path: &Path, contents: &str) -> Result<(), HarnessError> {
    fs::write(path, contents).map_err(|e| HarnessError::io(format!("writing {}", path.display()), &e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::detect::IssueKind;

    pub(crate) fn sample_files() -> Vec<AnalysisResult> {
        let server = AnalysisResult {
            total_lines: 120,
            entries: 100,
            info: 100,
            snapshots_sent: 100,
            chunk_changes: 4,
            start_time: 1.0,
            end_time: 31.0,
            duration: 30.0,
            ..AnalysisResult::new("test_logs/basic/server.log")
        };
        let client = AnalysisResult {
            total_lines: 90,
            entries: 80,
            errors: 3,
            warnings: 12,
            snapshots_received: 60,
            player_disappearances: 3,
            interpolation_warnings: 12,
            critical_issues: vec![Issue::critical(
                IssueKind::PlayerDisappearance,
                "Player disappearance detected 3 times!",
            )],
            warnings_list: vec![Issue::warning(
                IssueKind::InterpolationStall,
                "High interpolation warnings (12).",
            )],
            ..AnalysisResult::new("test_logs/basic/client_0.log")
        };
        let missing = AnalysisResult::unreadable("test_logs/basic/client_1.log", "log file not found");
        vec![server, client, missing]
    }

    #[test]
    fn summary_sums_each_file_once() {
        let report = Report::new(sample_files());
        let s = &report.summary;
        assert_eq!(s.files_analyzed, 3);
        assert_eq!(s.files_failed, 1);
        assert_eq!(s.total_lines, 210);
        assert_eq!(s.total_entries, 180);
        assert_eq!(s.total_errors, 3);
        assert_eq!(s.total_snapshots_sent, 100);
        assert_eq!(s.total_snapshots_received, 60);
        assert_eq!(s.total_player_disappearances, 3);
        assert_eq!(s.total_chunk_changes, 4);
        assert!(s.has_critical_issues);
        assert!(s.has_warnings);
    }

    #[test]
    fn empty_report_has_no_flags() {
        let report = Report::new(Vec::new());
        assert_eq!(report.summary, Summary::default());
        assert_eq!(report.critical_issues().count(), 0);
    }

    #[test]
    fn issue_iterators_keep_file_order() {
        let report = Report::new(sample_files());
        let critical: Vec<_> = report
            .critical_issues()
            .map(|(f, i)| (f.display_name(), i.kind))
            .collect();
        assert_eq!(critical, vec![("client_0.log", IssueKind::PlayerDisappearance)]);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn json_round_trip_preserves_everything() {
        let report = Report::new(sample_files());
        let json = to_json(&report).unwrap();
        assert!(json.contains("\"total_player_disappearances\": 3"));
        assert!(json.contains("\"error\": \"log file not found\""));
        assert!(!json.contains("\"run\""));
        assert_eq!(from_json(&json).unwrap(), report);
    }

    #[test]
    fn run_context_round_trips_with_default_overrides() {
        let scenario = ScenarioConfig::preset("lag").unwrap();
        let mut run = RunContext::from_scenario(&scenario, "2025-01-01T12:00:00+00:00");
        run.log_files
            .insert("server".to_owned(), "/tmp/lag/server.log".to_owned());
        run.processes.push(ProcessOutcome {
            role: "server".to_owned(),
            pid: 4242,
            exit_code: Some(0),
            forced_kill: false,
            exited_early: false,
        });
        let report = Report::with_run(sample_files(), run);
        let json = to_json(&report).unwrap();
        assert!(json.contains("\"jitter_buffer_ms\": null"));
        assert_eq!(from_json(&json).unwrap(), report);
    }

    #[test]
    fn abnormal_process_outcomes() {
        let mut outcome = ProcessOutcome {
            role: "client_0".to_owned(),
            pid: 1,
            exit_code: Some(0),
            forced_kill: false,
            exited_early: false,
        };
        assert!(!outcome.is_abnormal());
        outcome.exit_code = Some(3);
        assert!(outcome.is_abnormal());
        outcome.exit_code = None;
        outcome.forced_kill = true;
        assert!(!outcome.is_abnormal());
        outcome.exited_early = true;
        assert!(outcome.is_abnormal());
    }

    #[test]
    fn garbage_json_is_a_serialization_error() {
        assert!(matches!(
            from_json("{ not json"),
            Err(HarnessError::Serialization { .. })
        ));
    }
}
