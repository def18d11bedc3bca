//! Per-file metrics accumulation.
//!
//! An [`AnalysisResult`] is created at the start of one file's pass, folded
//! over every structured [`LogRecord`] in file order, finalized once, and then
//! handed read-only to the report stage. Counters only ever increase during a
//! pass.
//!
//! # Classification rules
//!
//! | Counter | Rule |
//! |---------|------|
//! | `errors` / `warnings` / `info` / `debug` | level is `ERROR` / `WARN` / `INFO` / `DEBUG` |
//! | `snapshots_sent` | category `SERVER_SNAPSHOT` |
//! | `snapshots_received` | category `CLIENT_SNAPSHOT` |
//! | `packet_loss_events` | message contains "packet loss" |
//! | `baseline_mismatches` | category `CLIENT_DELTA`, message contains "mismatch" |
//! | `player_disappearances` | category `CLIENT_ERROR`, message contains "missing" |
//! | `interpolation_warnings` | category `INTERPOLATOR`, level `WARN` |
//! | `chunk_changes` | category `SERVER_CHUNK`, message contains "changed chunk" |
//! | `buffer_underruns` | message contains "buffer underrun" or "stutter" |
//!
//! Message matches are case-insensitive. Rules are independent: one record
//! may bump several counters.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::detect::Issue;
use crate::record::{LogLevel, LogRecord};

/// Default number of raw `ERROR` lines kept per file.
pub const DEFAULT_MAX_ERROR_SAMPLES: usize = 20;

#[allow(clippy::expect_used)]
static DELAY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Delay:\s*(\d+(?:\.\d+)?)\s*ms").expect("delay pattern is a valid constant regex")
});

#[allow(clippy::expect_used)]
static BYTES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*bytes").expect("bytes pattern is a valid constant regex")
});

/// Running statistics over extracted scalar samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Number of samples seen.
    pub count: u64,
    /// Sum of all samples.
    pub sum: f64,
    /// Smallest sample, `0.0` while empty.
    pub min: f64,
    /// Largest sample, `0.0` while empty.
    pub max: f64,
}

impl SampleStats {
    /// Adds one sample.
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    /// Arithmetic mean, or `None` when no sample was seen.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Returns `true` if no sample was seen.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Metrics for one log file.
///
/// Field names are the JSON report's field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Path of the log file as it was discovered.
    pub filename: String,
    /// Every line read, structured or not.
    pub total_lines: u64,
    /// Lines that parsed as structured records.
    pub entries: u64,

    /// `ERROR` records.
    pub errors: u64,
    /// `WARN` records.
    pub warnings: u64,
    /// `INFO` records.
    pub info: u64,
    /// `DEBUG` records.
    pub debug: u64,

    // Networking
    /// `SERVER_SNAPSHOT` records.
    pub snapshots_sent: u64,
    /// `CLIENT_SNAPSHOT` records.
    pub snapshots_received: u64,
    /// Records mentioning packet loss.
    pub packet_loss_events: u64,
    /// Deltas whose baseline the client no longer had.
    pub baseline_mismatches: u64,
    /// Snapshots missing the local player entity.
    pub player_disappearances: u64,
    /// `WARN` records from the interpolator.
    pub interpolation_warnings: u64,
    /// Records mentioning a buffer underrun or stutter.
    pub buffer_underruns: u64,

    // Chunk system
    /// Entities moving between chunks.
    pub chunk_changes: u64,

    /// Client-side delay measurements in milliseconds.
    pub delay_ms: SampleStats,
    /// Server-side snapshot payload sizes in bytes.
    pub snapshot_bytes: SampleStats,

    /// Timestamp of the first structured entry, `0.0` if there was none.
    pub start_time: f64,
    /// Timestamp of the last structured entry, `0.0` if there was none.
    pub end_time: f64,
    /// `end_time - start_time`.
    pub duration: f64,

    /// Raw text of the first few `ERROR` records.
    pub error_samples: Vec<String>,

    /// Critical issues, in detection order.
    pub critical_issues: Vec<Issue>,
    /// Warnings, in detection order.
    pub warnings_list: Vec<Issue>,

    /// Set when the file could not be read at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Creates an empty result for `filename`.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Creates the result recorded for a file that could not be read.
    #[must_use]
    pub fn unreadable(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(filename)
        }
    }

    /// Counts one line of input, structured or not.
    pub fn count_line(&mut self) {
        self.total_lines += 1;
    }

    /// Folds one structured record into the counters.
    ///
    /// `max_error_samples` bounds how many raw `ERROR` lines are retained.
    pub fn record(&mut self, entry: &LogRecord, max_error_samples: usize) {
        self.entries += 1;

        match entry.level {
            LogLevel::Error => {
                self.errors += 1;
                if self.error_samples.len() < max_error_samples {
                    self.error_samples.push(entry.raw.clone());
                }
            },
            LogLevel::Warn => self.warnings += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Debug => self.debug += 1,
            LogLevel::Other(_) => {},
        }

        let message = entry.message.to_lowercase();
        let category = entry.category.as_str();

        if category == "SERVER_SNAPSHOT" {
            self.snapshots_sent += 1;
            if let Some(bytes) = snapshot_size(entry) {
                self.snapshot_bytes.push(bytes);
            }
        }
        if category == "CLIENT_SNAPSHOT" {
            self.snapshots_received += 1;
        }
        if message.contains("packet loss") {
            self.packet_loss_events += 1;
        }
        if category == "CLIENT_DELTA" && message.contains("mismatch") {
            self.baseline_mismatches += 1;
        }
        if category == "CLIENT_ERROR" && message.contains("missing") {
            self.player_disappearances += 1;
        }
        if category == "INTERPOLATOR" && entry.level == LogLevel::Warn {
            self.interpolation_warnings += 1;
        }
        if category == "SERVER_CHUNK" && message.contains("changed chunk") {
            self.chunk_changes += 1;
        }
        if message.contains("buffer underrun") || message.contains("stutter") {
            self.buffer_underruns += 1;
        }
        if let Some(delay) = delay_sample(entry) {
            self.delay_ms.push(delay);
        }
    }

    /// Sets the timing fields from the first and last structured timestamps.
    ///
    /// Pass `None` when the file had no structured entries; timing stays zero.
    pub fn finalize(&mut self, span: Option<(f64, f64)>) {
        if let Some((first, last)) = span {
            self.start_time = first;
            self.end_time = last;
            self.duration = last - first;
        }
    }

    /// Installs the detector's output.
    pub fn set_issues(&mut self, critical: Vec<Issue>, warnings: Vec<Issue>) {
        self.critical_issues = critical;
        self.warnings_list = warnings;
    }

    /// Baseline mismatches per received snapshot, or `None` when nothing was received.
    #[must_use]
    pub fn mismatch_ratio(&self) -> Option<f64> {
        (self.snapshots_received > 0)
            .then(|| self.baseline_mismatches as f64 / self.snapshots_received as f64)
    }

    /// The file name without its directory, for headings.
    #[must_use]
    pub fn display_name(&self) -> &str {
        std::path::Path::new(&self.filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.filename)
    }

    /// Returns `true` if the file could not be read.
    #[must_use]
    pub const fn is_unreadable(&self) -> bool {
        self.error.is_some()
    }
}

fn delay_sample(entry: &LogRecord) -> Option<f64> {
    let from_meta = entry
        .meta("delay_ms")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|d| d.is_finite());
    if from_meta.is_some() {
        return from_meta;
    }
    DELAY_PATTERN
        .captures(&entry.message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|d| d.is_finite())
}

fn snapshot_size(entry: &LogRecord) -> Option<f64> {
    let from_meta = entry
        .meta("bytes")
        .or_else(|| entry.meta("size"))
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(bytes) = from_meta {
        return Some(bytes as f64);
    }
    BYTES_PATTERN
        .captures(&entry.message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|bytes| bytes as f64)
}
