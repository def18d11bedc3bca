//! File-level analysis: one sequential pass per log file.
//!
//! [`LogAnalyzer`] streams a file line by line, folds structured records into
//! an [`AnalysisResult`], finalizes timing, and runs the detector. Files are
//! processed one after another; nothing is shared between passes.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::detect::{detect_issues, Thresholds};
use crate::error::HarnessError;
use crate::metrics::{AnalysisResult, DEFAULT_MAX_ERROR_SAMPLES};
use crate::record::parse_line;
use crate::report::{Report, RunContext};

/// Default glob for log discovery.
pub const DEFAULT_FILE_PATTERN: &str = "*.log";

/// Settings for a batch of file analyses.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "AnalysisConfig has no effect unless passed to LogAnalyzer::new()"]
pub struct AnalysisConfig {
    /// Detector limits.
    pub thresholds: Thresholds,
    /// Raw `ERROR` lines kept per file.
    ///
    /// Default: 20
    pub max_error_samples: usize,
    /// Glob matched against file names inside the log directory.
    ///
    /// Default: `*.log`
    pub file_pattern: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            max_error_samples: DEFAULT_MAX_ERROR_SAMPLES,
            file_pattern: DEFAULT_FILE_PATTERN.to_owned(),
        }
    }
}

impl AnalysisConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the detector thresholds.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Sets how many raw error lines are kept per file.
    pub fn with_max_error_samples(mut self, samples: usize) -> Self {
        self.max_error_samples = samples;
        self
    }

    /// Sets the discovery glob.
    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Validates thresholds and the glob.
    pub fn validate(&self) -> Result<(), HarnessError> {
        self.thresholds.validate()?;
        glob::Pattern::new(&self.file_pattern).map_err(|e| {
            HarnessError::invalid_config(format!(
                "invalid file pattern '{}': {}",
                self.file_pattern, e
            ))
        })?;
        Ok(())
    }
}

/// Parses and analyzes log files.
#[derive(Debug, Clone, Default)]
pub struct LogAnalyzer {
    config: AnalysisConfig,
}

impl LogAnalyzer {
    /// Creates an analyzer with the given settings.
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Returns the analyzer's settings.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyzes one file.
    ///
    /// Never fails: a file that cannot be opened or read becomes a result
    /// whose `error` field says why, with zero counters and no issues.
    #[must_use]
    pub fn analyze_file(&self, path: &Path) -> AnalysisResult {
        let name = path.display().to_string();
        tracing::info!(file = %name, "parsing log");

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(file = %name, "log file not found");
                return AnalysisResult::unreadable(name, "log file not found");
            },
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "log file unreadable");
                return AnalysisResult::unreadable(name, e.to_string());
            },
        };

        self.analyze_reader(name, BufReader::new(file))
    }

    /// Analyzes any line source. `name` doubles as the detector's role hint.
    ///
    /// Invalid UTF-8 is decoded lossily per line.
    #[must_use]
    pub fn analyze_reader(&self, name: impl Into<String>, mut reader: impl BufRead) -> AnalysisResult {
        let mut result = AnalysisResult::new(name);
        let mut span: Option<(f64, f64)> = None;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {},
                Err(e) => {
                    tracing::warn!(file = %result.filename, error = %e, "read aborted mid-file");
                    result.error = Some(e.to_string());
                    break;
                },
            }

            result.count_line();
            let line = String::from_utf8_lossy(&buf);
            if let Some(entry) = parse_line(&line) {
                result.record(&entry, self.config.max_error_samples);
                span = Some(match span {
                    None => (entry.timestamp, entry.timestamp),
                    Some((first, _)) => (first, entry.timestamp),
                });
            }
        }

        result.finalize(span);

        // A partial read still produced counters worth reporting; only a file
        // that was never opened skips detection.
        let issues = detect_issues(&result, &result.filename, &self.config.thresholds);
        result.set_issues(issues.critical, issues.warnings);

        tracing::info!(
            file = %result.filename,
            "parsed {} structured log entries from {} total lines",
            result.entries,
            result.total_lines
        );
        result
    }

    /// Lists the files in `dir` matching the configured pattern, sorted by path.
    pub fn discover_logs(&self, dir: &Path) -> Result<Vec<PathBuf>, HarnessError> {
        discover_logs(dir, &self.config.file_pattern)
    }

    /// Analyzes every matching file in `dir` and aggregates a report.
    pub fn analyze_dir(&self, dir: &Path) -> Result<Report, HarnessError> {
        let files = self.analyze_paths(&self.discover_logs(dir)?);
        Ok(Report::new(files))
    }

    /// Like [`analyze_dir`](Self::analyze_dir), attaching the run that produced the logs.
    pub fn analyze_run(&self, dir: &Path, run: RunContext) -> Result<Report, HarnessError> {
        let files = self.analyze_paths(&self.discover_logs(dir)?);
        Ok(Report::with_run(files, run))
    }

    /// Analyzes the given files in order.
    #[must_use]
    pub fn analyze_paths(&self, paths: &[PathBuf]) -> Vec<AnalysisResult> {
        paths.iter().map(|p| self.analyze_file(p)).collect()
    }
}

/// Lists the files in `dir` whose names match `pattern`, sorted by path.
///
/// The search is not recursive.
pub fn discover_logs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, HarnessError> {
    if !dir.is_dir() {
        return Err(HarnessError::LogDirMissing {
            dir: dir.display().to_string(),
        });
    }

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full = format!("{}/{}", escaped, pattern);
    let entries = glob::glob(&full).map_err(|e| {
        HarnessError::invalid_config(format!("invalid file pattern '{}': {}", pattern, e))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                None
            },
        })
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(HarnessError::NoLogFiles {
            dir: dir.display().to_string(),
            pattern: pattern.to_owned(),
        });
    }

    tracing::debug!(dir = %dir.display(), count = paths.len(), "found log files");
    Ok(paths)
}
