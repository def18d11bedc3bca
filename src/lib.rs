//! # Snapshot Harness
//!
//! Test orchestration and log analysis for a multiplayer game's snapshot
//! networking layer.
//!
//! The harness launches the game engine as one authoritative server and N
//! clients under simulated network conditions, lets them run for a fixed
//! time, stops them, and scans their logs for anomalies: players vanishing
//! from snapshots, starving interpolation buffers, deltas against unknown
//! baselines. The networking code under test lives in the game project;
//! this crate only launches, waits and parses text.
//!
//! The pipeline, leaf first:
//!
//! - [`record`]: one log line to a [`LogRecord`], or nothing
//! - [`metrics`]: fold records into a per-file [`AnalysisResult`]
//! - [`detect`]: threshold rules that turn a finished result into [`Issue`]s
//! - [`analyzer`]: one pass per file, discovery of a run's logs
//! - [`report`]: cross-file [`Report`] and its JSON, Markdown and advisory forms
//! - [`scenario`] and [`orchestrator`]: what to launch and how
//!
//! # Example
//!
//! ```
//! use snapshot_harness::prelude::*;
//! use std::io::Cursor;
//!
//! let log = "\
//! [0.50] [INFO] [CLIENT_SNAPSHOT] Received snapshot 1
//! [0.55] [ERROR] [CLIENT_ERROR] Player entity missing from snapshot
//! ";
//! let result = LogAnalyzer::default().analyze_reader("client_0.log", Cursor::new(log));
//! assert_eq!(result.player_disappearances, 1);
//! assert_eq!(result.critical_issues[0].kind, IssueKind::PlayerDisappearance);
//!
//! let report = Report::new(vec![result]);
//! assert!(report.summary.has_critical_issues);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use analyzer::{AnalysisConfig, LogAnalyzer};
pub use detect::{detect_issues, DetectedIssues, Issue, IssueKind, IssueSeverity, Thresholds};
pub use error::HarnessError;
pub use metrics::{AnalysisResult, SampleStats};
pub use orchestrator::{
    find_engine_executable, EngineCommand, EngineProcess, Orchestrator, OrchestratorConfig, Role,
    RunOutcome, ShutdownFlag, StopReason,
};
pub use record::{parse_line, LogLevel, LogRecord};
pub use report::{ProcessOutcome, Report, ReportPaths, ReportWriter, RunContext, Summary};
pub use scenario::{BehaviorMode, NetworkConditions, ScenarioConfig};

pub mod analyzer;
pub mod detect;
#[doc(hidden)]
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod prelude;
pub mod record;
pub mod report;
pub mod scenario;

/// A specialized `Result` type for harness operations.
pub type HarnessResult<T, E = HarnessError> = std::result::Result<T, E>;
