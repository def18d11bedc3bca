//! Narrative report.
//!
//! Sections always appear in this order; the two issue sections are omitted
//! when empty:
//!
//! 1. `## Overall Summary`
//! 2. `## Critical Issues Detected`
//! 3. `## Warnings`
//! 4. `## Per-File Analysis`

use std::fmt::{self, Write};

use super::Report;
use crate::metrics::AnalysisResult;

/// Renders the narrative document.
#[must_use]
pub fn render(report: &Report) -> String {
    MarkdownReport(report).to_string()
}

/// [`Display`](fmt::Display) adapter producing the narrative document.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownReport<'a>(pub &'a Report);

impl fmt::Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Log Analysis Report")?;
        writeln!(f)?;
        write_body(f, self.0)
    }
}

/// Writes every section below the title. Shared with the advisory document.
pub(crate) fn write_body(out: &mut impl Write, report: &Report) -> fmt::Result {
    write_summary(out, report)?;
    write_issue_section(out, report, IssueSection::Critical)?;
    write_issue_section(out, report, IssueSection::Warnings)?;
    write_per_file(out, report)
}

fn write_summary(out: &mut impl Write, report: &Report) -> fmt::Result {
    let s = &report.summary;
    writeln!(out, "## Overall Summary")?;
    writeln!(out)?;
    writeln!(out, "- **Files Analyzed:** {}", s.files_analyzed)?;
    if s.files_failed > 0 {
        writeln!(out, "- **Unreadable Files:** {}", s.files_failed)?;
    }
    writeln!(out, "- **Total Errors:** {}", s.total_errors)?;
    writeln!(out, "- **Total Warnings:** {}", s.total_warnings)?;
    writeln!(out, "- **Total Snapshots Sent:** {}", s.total_snapshots_sent)?;
    writeln!(out, "- **Total Snapshots Received:** {}", s.total_snapshots_received)?;
    writeln!(out, "- **Player Disappearances:** {}", s.total_player_disappearances)?;
    writeln!(out, "- **Interpolation Warnings:** {}", s.total_interpolation_warnings)?;
    writeln!(out, "- **Baseline Mismatches:** {}", s.total_baseline_mismatches)?;
    writeln!(out, "- **Buffer Underruns:** {}", s.total_buffer_underruns)?;
    writeln!(out)
}

#[derive(Clone, Copy)]
enum IssueSection {
    Critical,
    Warnings,
}

fn write_issue_section(out: &mut impl Write, report: &Report, section: IssueSection) -> fmt::Result {
    let (present, heading, marker) = match section {
        IssueSection::Critical => (
            report.summary.has_critical_issues,
            "## Critical Issues Detected",
            "❌",
        ),
        IssueSection::Warnings => (report.summary.has_warnings, "## Warnings", "⚠️"),
    };
    if !present {
        return Ok(());
    }

    writeln!(out, "{}", heading)?;
    writeln!(out)?;
    for file in &report.files {
        let issues = match section {
            IssueSection::Critical => &file.critical_issues,
            IssueSection::Warnings => &file.warnings_list,
        };
        if issues.is_empty() {
            continue;
        }
        writeln!(out, "### {}", file.display_name())?;
        writeln!(out)?;
        for issue in issues {
            writeln!(out, "- {} {}", marker, issue)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_per_file(out: &mut impl Write, report: &Report) -> fmt::Result {
    writeln!(out, "## Per-File Analysis")?;
    writeln!(out)?;
    for file in &report.files {
        write_file(out, file)?;
    }
    Ok(())
}

fn write_file(out: &mut impl Write, file: &AnalysisResult) -> fmt::Result {
    writeln!(out, "### {}", file.display_name())?;
    writeln!(out)?;
    if let Some(error) = &file.error {
        writeln!(out, "- **Error:** {}", error)?;
        return writeln!(out);
    }

    writeln!(out, "- **Duration:** {:.1}s", file.duration)?;
    writeln!(out, "- **Total Lines:** {}", file.total_lines)?;
    writeln!(out, "- **Structured Entries:** {}", file.entries)?;
    writeln!(out, "- **Errors:** {}", file.errors)?;
    writeln!(out, "- **Warnings:** {}", file.warnings)?;
    writeln!(out, "- **Snapshots Sent:** {}", file.snapshots_sent)?;
    writeln!(out, "- **Snapshots Received:** {}", file.snapshots_received)?;
    writeln!(out, "- **Packet Loss Events:** {}", file.packet_loss_events)?;
    writeln!(out, "- **Baseline Mismatches:** {}", file.baseline_mismatches)?;
    writeln!(out, "- **Player Disappearances:** {}", file.player_disappearances)?;
    writeln!(out, "- **Interpolation Warnings:** {}", file.interpolation_warnings)?;
    writeln!(out, "- **Buffer Underruns:** {}", file.buffer_underruns)?;
    writeln!(out, "- **Chunk Changes:** {}", file.chunk_changes)?;
    if let Some(mean) = file.delay_ms.mean() {
        writeln!(
            out,
            "- **Network Delay:** avg {:.1}ms (min {:.1}, max {:.1})",
            mean, file.delay_ms.min, file.delay_ms.max
        )?;
    }
    if let Some(mean) = file.snapshot_bytes.mean() {
        writeln!(out, "- **Avg Snapshot Size:** {:.1} bytes", mean)?;
    }
    if !file.error_samples.is_empty() {
        writeln!(out)?;
        writeln!(out, "First errors:")?;
        writeln!(out)?;
        writeln!(out, "```")?;
        for sample in &file.error_samples {
            writeln!(out, "{}", sample)?;
        }
        writeln!(out, "```")?;
    }
    writeln!(out)
}
