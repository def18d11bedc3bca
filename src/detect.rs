//! Threshold rules that turn finalized metrics into issues.
//!
//! Every issue carries a symbolic [`IssueKind`] assigned at detection time.
//! Downstream consumers (the advisory renderer, tests, dashboards) key off
//! the kind, never off the rendered message text.
//!
//! # Rules
//!
//! Rules are evaluated in this order, independently of each other. The order
//! is part of the output contract because reports render the lists verbatim.
//!
//! | # | Condition | Severity | Kind |
//! |---|-----------|----------|------|
//! | 1 | `player_disappearances > 0` | critical | [`IssueKind::PlayerDisappearance`] |
//! | 2 | `interpolation_warnings > limit` (10) | warning | [`IssueKind::InterpolationStall`] |
//! | 3 | `snapshots_received > 0` and mismatch ratio `> limit` (0.10) | warning | [`IssueKind::BaselineMismatchRate`] |
//! | 4 | `snapshots_sent == 0` and file name mentions `server` | critical | [`IssueKind::ServerSentNothing`] |
//! | 5 | `snapshots_received == 0` and file name mentions `client` | critical | [`IssueKind::ClientReceivedNothing`] |
//! | 6 | `buffer_underruns > limit` (0) | warning | [`IssueKind::BufferUnderrun`] |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::metrics::AnalysisResult;

/// How urgent an issue is.
///
/// Severities are ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Worth a look; the run may still be healthy.
    Warning,
    /// The networking layer is very likely broken.
    Critical,
}

impl IssueSeverity {
    /// Returns a string representation suitable for logging/report labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of anomaly was detected.
///
/// Each kind maps to one suspected subsystem in the game under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum IssueKind {
    /// The local player entity went missing from received snapshots.
    ///
    /// Points at delta compression or interest management.
    PlayerDisappearance,
    /// The interpolation buffer kept starving.
    InterpolationStall,
    /// Too many deltas referenced a baseline the client no longer had.
    BaselineMismatchRate,
    /// A server log shows no snapshot ever being sent.
    ServerSentNothing,
    /// A client log shows no snapshot ever being received.
    ClientReceivedNothing,
    /// Playback stalled waiting for snapshots.
    BufferUnderrun,
}

impl IssueKind {
    /// Returns a string representation suitable for logging/report labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerDisappearance => "player_disappearance",
            Self::InterpolationStall => "interpolation_stall",
            Self::BaselineMismatchRate => "baseline_mismatch_rate",
            Self::ServerSentNothing => "server_sent_nothing",
            Self::ClientReceivedNothing => "client_received_nothing",
            Self::BufferUnderrun => "buffer_underrun",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Symbolic category.
    pub kind: IssueKind,
    /// Urgency.
    pub severity: IssueSeverity,
    /// Human-readable description, rendered verbatim in reports.
    pub message: String,
}

impl Issue {
    /// Creates a critical issue.
    #[must_use]
    pub fn critical(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: IssueSeverity::Critical,
            message: message.into(),
        }
    }

    /// Creates a warning.
    #[must_use]
    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Limits used by the detector. All comparisons are strictly greater-than.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "Thresholds have no effect unless passed to the analyzer"]
pub struct Thresholds {
    /// Interpolation warnings tolerated per file.
    ///
    /// Default: 10
    pub interpolation_warning_limit: u64,
    /// Tolerated baseline mismatches per received snapshot.
    ///
    /// Default: 0.10
    pub mismatch_ratio_limit: f64,
    /// Buffer underruns tolerated per file.
    ///
    /// Default: 0
    pub buffer_underrun_limit: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            interpolation_warning_limit: 10,
            mismatch_ratio_limit: 0.10,
            buffer_underrun_limit: 0,
        }
    }
}

impl Thresholds {
    /// Creates thresholds with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for runs with deliberately hostile network profiles, where
    /// starvation and mismatches are expected in moderation.
    pub fn lenient() -> Self {
        Self {
            interpolation_warning_limit: 50,
            mismatch_ratio_limit: 0.25,
            buffer_underrun_limit: 10,
        }
    }

    /// Sets the interpolation warning limit.
    pub fn with_interpolation_warning_limit(mut self, limit: u64) -> Self {
        self.interpolation_warning_limit = limit;
        self
    }

    /// Sets the mismatch ratio limit.
    pub fn with_mismatch_ratio_limit(mut self, ratio: f64) -> Self {
        self.mismatch_ratio_limit = ratio;
        self
    }

    /// Sets the buffer underrun limit.
    pub fn with_buffer_underrun_limit(mut self, limit: u64) -> Self {
        self.buffer_underrun_limit = limit;
        self
    }

    /// Checks that the mismatch ratio is a finite, non-negative fraction.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if !self.mismatch_ratio_limit.is_finite() || !(0.0..=1.0).contains(&self.mismatch_ratio_limit)
        {
            return Err(HarnessError::invalid_config(format!(
                "mismatch ratio limit must be within [0, 1], got {}",
                self.mismatch_ratio_limit
            )));
        }
        Ok(())
    }
}

/// Detector output: both lists in rule order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedIssues {
    /// Critical issues.
    pub critical: Vec<Issue>,
    /// Warnings.
    pub warnings: Vec<Issue>,
}

impl DetectedIssues {
    fn push(&mut self, issue: Issue) {
        match issue.severity {
            IssueSeverity::Critical => self.critical.push(issue),
            IssueSeverity::Warning => self.warnings.push(issue),
        }
    }

    /// Returns `true` if nothing was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.critical.is_empty() && self.warnings.is_empty()
    }
}

/// Applies every rule to a finalized result.
///
/// `role_hint` is the log file's path; its final component decides whether
/// the server/client silence rules apply, so run directories such as
/// `multi_client_test_<ts>/` do not leak a role into `server.log`. A file
/// name mentioning both words is held to both rules.
#[must_use]
pub fn detect_issues(
    result: &AnalysisResult,
    role_hint: &str,
    thresholds: &Thresholds,
) -> DetectedIssues {
    let mut issues = DetectedIssues::default();
    let hint = Path::new(role_hint)
        .file_name()
        .map_or_else(|| role_hint.to_lowercase(), |name| name.to_string_lossy().to_lowercase());

    if result.player_disappearances > 0 {
        issues.push(Issue::critical(
            IssueKind::PlayerDisappearance,
            format!(
                "Player disappearance detected {} times! This indicates delta compression bugs or interest management issues.",
                result.player_disappearances
            ),
        ));
    }

    if result.interpolation_warnings > thresholds.interpolation_warning_limit {
        issues.push(Issue::warning(
            IssueKind::InterpolationStall,
            format!(
                "High interpolation warnings ({}). Client may be struggling to keep buffer filled; consider tuning the interpolation buffer.",
                result.interpolation_warnings
            ),
        ));
    }

    if let Some(ratio) = result.mismatch_ratio() {
        if ratio > thresholds.mismatch_ratio_limit {
            issues.push(Issue::warning(
                IssueKind::BaselineMismatchRate,
                format!(
                    "High baseline mismatch rate ({:.1}%). This is expected for UDP but seems unusually high.",
                    ratio * 100.0
                ),
            ));
        }
    }

    if result.snapshots_sent == 0 && hint.contains("server") {
        issues.push(Issue::critical(
            IssueKind::ServerSentNothing,
            "Server sent 0 snapshots! Server may not be running correctly.",
        ));
    }

    if result.snapshots_received == 0 && hint.contains("client") {
        issues.push(Issue::critical(
            IssueKind::ClientReceivedNothing,
            "Client received 0 snapshots! Client may not be connected.",
        ));
    }

    if result.buffer_underruns > thresholds.buffer_underrun_limit {
        issues.push(Issue::warning(
            IssueKind::BufferUnderrun,
            format!(
                "Buffer underruns detected {} times. Playback stuttered while waiting for snapshots.",
                result.buffer_underruns
            ),
        ));
    }

    for issue in &issues.critical {
        tracing::error!(kind = issue.kind.as_str(), file = role_hint, "{}", issue.message);
    }
    for issue in &issues.warnings {
        tracing::warn!(kind = issue.kind.as_str(), file = role_hint, "{}", issue.message);
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(issues: &[Issue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn disappearance_is_critical_and_cites_count() {
        let result = AnalysisResult {
            player_disappearances: 5,
            snapshots_received: 40,
            ..AnalysisResult::new("client_0.log")
        };
        let issues = detect_issues(&result, "client_0.log", &Thresholds::default());
        assert_eq!(kinds(&issues.critical), vec![IssueKind::PlayerDisappearance]);
        assert!(issues.critical[0].message.contains('5'));
        assert!(issues.warnings.is_empty());
    }

    #[test]
    fn interpolation_limit_is_strict() {
        let mut result = AnalysisResult {
            interpolation_warnings: 10,
            snapshots_received: 1,
            ..AnalysisResult::new("c.log")
        };
        assert!(detect_issues(&result, "c.log", &Thresholds::default()).is_empty());
        result.interpolation_warnings = 11;
        let issues = detect_issues(&result, "c.log", &Thresholds::default());
        assert_eq!(kinds(&issues.warnings), vec![IssueKind::InterpolationStall]);
        assert!(issues.warnings[0].message.contains("11"));
    }

    #[test]
    fn mismatch_ratio_is_strictly_greater_than_ten_percent() {
        let mut result = AnalysisResult {
            snapshots_received: 100,
            baseline_mismatches: 10,
            ..AnalysisResult::new("c.log")
        };
        assert!(detect_issues(&result, "c.log", &Thresholds::default()).is_empty());

        result.baseline_mismatches = 11;
        let issues = detect_issues(&result, "c.log", &Thresholds::default());
        assert_eq!(kinds(&issues.warnings), vec![IssueKind::BaselineMismatchRate]);
        assert!(issues.warnings[0].message.contains("11.0%"));
    }

    #[test]
    fn mismatch_check_skipped_without_received_snapshots() {
        let result = AnalysisResult {
            baseline_mismatches: 50,
            ..AnalysisResult::new("other.log")
        };
        assert!(detect_issues(&result, "other.log", &Thresholds::default()).is_empty());
    }

    #[test]
    fn silence_rules_follow_the_file_role() {
        let empty = AnalysisResult::new("x");

        let server = detect_issues(&empty, "logs/server.log", &Thresholds::default());
        assert_eq!(kinds(&server.critical), vec![IssueKind::ServerSentNothing]);

        let client = detect_issues(&empty, "logs/client_0.log", &Thresholds::default());
        assert_eq!(kinds(&client.critical), vec![IssueKind::ClientReceivedNothing]);

        let neither = detect_issues(&empty, "logs/relay.log", &Thresholds::default());
        assert!(neither.is_empty());
    }

    #[test]
    fn silence_rules_do_not_cross_roles() {
        let sent_only = AnalysisResult {
            snapshots_sent: 30,
            ..AnalysisResult::new("x")
        };
        assert!(detect_issues(&sent_only, "SERVER.log", &Thresholds::default()).is_empty());

        let received_only = AnalysisResult {
            snapshots_received: 30,
            ..AnalysisResult::new("x")
        };
        assert!(detect_issues(&received_only, "Client_1.log", &Thresholds::default()).is_empty());
    }

    #[test]
    fn run_directory_name_does_not_assign_a_role() {
        let healthy_server = AnalysisResult {
            snapshots_sent: 5,
            ..AnalysisResult::new("x")
        };
        let issues = detect_issues(
            &healthy_server,
            "test_logs/multi_client_test_20250101_120000/server.log",
            &Thresholds::default(),
        );
        assert!(issues.is_empty());

        let healthy_client = AnalysisResult {
            snapshots_received: 5,
            ..AnalysisResult::new("x")
        };
        let issues = detect_issues(
            &healthy_client,
            "runs/server_smoke/client_0.log",
            &Thresholds::default(),
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn rule_order_is_stable() {
        let result = AnalysisResult {
            player_disappearances: 1,
            interpolation_warnings: 20,
            snapshots_received: 10,
            baseline_mismatches: 5,
            buffer_underruns: 2,
            ..AnalysisResult::new("x")
        };
        let issues = detect_issues(&result, "run/server_and_client.log", &Thresholds::default());
        assert_eq!(
            kinds(&issues.critical),
            vec![IssueKind::PlayerDisappearance, IssueKind::ServerSentNothing]
        );
        assert_eq!(
            kinds(&issues.warnings),
            vec![
                IssueKind::InterpolationStall,
                IssueKind::BaselineMismatchRate,
                IssueKind::BufferUnderrun
            ]
        );
    }

    #[test]
    fn custom_thresholds_apply() {
        let result = AnalysisResult {
            interpolation_warnings: 20,
            buffer_underruns: 3,
            snapshots_received: 1,
            ..AnalysisResult::new("x")
        };
        let issues = detect_issues(&result, "c.log", &Thresholds::lenient());
        assert!(issues.is_empty());
    }

    #[test]
    fn validate_rejects_out_of_range_ratio() {
        assert!(Thresholds::default().validate().is_ok());
        assert!(Thresholds::default()
            .with_mismatch_ratio_limit(1.5)
            .validate()
            .is_err());
        assert!(Thresholds::default()
            .with_mismatch_ratio_limit(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_string(&Issue::critical(IssueKind::ServerSentNothing, "m"))
            .unwrap_or_default();
        assert!(json.contains(r#""kind":"server_sent_nothing""#));
        assert!(json.contains(r#""severity":"critical""#));
    }
}
