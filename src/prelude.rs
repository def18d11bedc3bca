//! Convenient re-exports for common usage.
//!
//! ```rust
//! use snapshot_harness::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Analysis**: [`LogAnalyzer`], [`AnalysisConfig`], [`AnalysisResult`], [`Thresholds`]
//! - **Issues**: [`Issue`], [`IssueKind`], [`IssueSeverity`]
//! - **Reports**: [`Report`], [`ReportWriter`], [`RunContext`]
//! - **Scenarios**: [`ScenarioConfig`], [`NetworkConditions`], [`BehaviorMode`]
//! - **Orchestration**: [`Orchestrator`], [`OrchestratorConfig`], [`Role`], [`ShutdownFlag`]
//! - **Error handling**: [`HarnessError`], [`HarnessResult`]

pub use crate::analyzer::{AnalysisConfig, LogAnalyzer};
pub use crate::detect::{Issue, IssueKind, IssueSeverity, Thresholds};
pub use crate::error::HarnessError;
pub use crate::metrics::AnalysisResult;
pub use crate::orchestrator::{Orchestrator, OrchestratorConfig, Role, ShutdownFlag};
pub use crate::report::{Report, ReportWriter, RunContext};
pub use crate::scenario::{BehaviorMode, NetworkConditions, ScenarioConfig};
pub use crate::HarnessResult;
