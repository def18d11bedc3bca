//! Advisory document: the narrative report plus canned fix suggestions and
//! follow-up prompts for whoever (or whatever) investigates next.
//!
//! Suggestions are chosen by [`IssueKind`], never by message text.

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use super::{markdown, Report, RunContext};
use crate::detect::IssueKind;

/// Total interpolation warnings above which buffer tuning is recommended.
pub const INTERPOLATION_RECOMMENDATION_LIMIT: u64 = 50;

/// Renders the advisory document.
#[must_use]
pub fn render(report: &Report) -> String {
    AdvisoryReport(report).to_string()
}

/// [`Display`](fmt::Display) adapter producing the advisory document.
#[derive(Debug, Clone, Copy)]
pub struct AdvisoryReport<'a>(pub &'a Report);

impl fmt::Display for AdvisoryReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "# Network Testing Debug Summary")?;
        writeln!(f)?;
        writeln!(
            f,
            "This report summarizes test results for the snapshot interpolation system."
        )?;
        writeln!(f)?;

        write_quick_status(f, report)?;
        if let Some(run) = &report.run {
            write_test_context(f, run)?;
        }
        markdown::write_body(f, report)?;
        write_fix_suggestions(f, report)?;
        write_recommendations(f, report)?;
        write_prompts(f, report)
    }
}

fn write_quick_status(out: &mut impl Write, report: &Report) -> fmt::Result {
    writeln!(out, "## Quick Status")?;
    writeln!(out)?;
    let summary = &report.summary;
    if summary.has_critical_issues || summary.has_warnings {
        writeln!(out, "⚠️ **Issues detected.** See details below.")?;
    } else {
        writeln!(out, "✅ **All tests passed!** No critical issues detected.")?;
    }
    writeln!(out)
}

fn write_test_context(out: &mut impl Write, run: &RunContext) -> fmt::Result {
    let net = &run.network_profile;
    writeln!(out, "## Test Context")?;
    writeln!(out)?;
    writeln!(out, "- **Test:** {}", run.test_name)?;
    writeln!(out, "- **Started:** {}", run.timestamp)?;
    writeln!(out, "- **Clients:** {}", run.config.num_clients)?;
    writeln!(out, "- **Duration:** {}s", run.config.duration_secs)?;
    writeln!(out, "- **Behavior:** {}", run.config.test_mode)?;
    writeln!(out)?;
    writeln!(out, "### Network Profile")?;
    writeln!(out)?;
    writeln!(out, "- **Packet Loss:** {:.1}%", net.packet_loss_percent)?;
    writeln!(out, "- **Lag:** {}ms", net.lag_base_ms)?;
    writeln!(out, "- **Jitter:** {}ms", net.jitter_ms)?;
    if net.bandwidth_cap_kbps > 0.0 {
        writeln!(out, "- **Bandwidth Limit:** {} KB/s", net.bandwidth_cap_kbps)?;
    } else {
        writeln!(out, "- **Bandwidth Limit:** none")?;
    }
    writeln!(out, "- **Duplication Rate:** {:.1}%", net.duplicate_percent)?;
    match net.jitter_buffer_ms {
        Some(ms) => writeln!(out, "- **Jitter Buffer:** {}ms", ms)?,
        None => writeln!(out, "- **Jitter Buffer:** default")?,
    }
    match net.interpolation_delay_s {
        Some(s) => writeln!(out, "- **Interpolation Delay:** {}s", s)?,
        None => writeln!(out, "- **Interpolation Delay:** default")?,
    }
    writeln!(out)?;

    if !run.log_files.is_empty() {
        writeln!(out, "### Log Files")?;
        writeln!(out)?;
        for (role, path) in &run.log_files {
            writeln!(out, "- {}: `{}`", role, path)?;
        }
        writeln!(out)?;
    }

    if !run.processes.is_empty() {
        writeln!(out, "### Processes")?;
        writeln!(out)?;
        for p in &run.processes {
            let exit = match p.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_owned(),
            };
            write!(out, "- {} (pid {}): {}", p.role, p.pid, exit)?;
            if p.exited_early {
                write!(out, ", exited before the run ended")?;
            }
            if p.forced_kill {
                write!(out, ", killed after the grace period")?;
            }
            writeln!(out)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_fix_suggestions(out: &mut impl Write, report: &Report) -> fmt::Result {
    // Kind -> affected files, in first-seen order of kinds.
    let mut order: Vec<IssueKind> = Vec::new();
    let mut affected: BTreeMap<IssueKind, Vec<&str>> = BTreeMap::new();
    for (file, issue) in report.critical_issues().chain(report.warnings()) {
        let files = affected.entry(issue.kind).or_insert_with(|| {
            order.push(issue.kind);
            Vec::new()
        });
        let name = file.display_name();
        if !files.contains(&name) {
            files.push(name);
        }
    }
    if order.is_empty() {
        return Ok(());
    }

    writeln!(out, "## Fix Suggestions")?;
    writeln!(out)?;
    for kind in order {
        writeln!(out, "### {}", suggestion_title(kind))?;
        writeln!(out)?;
        if let Some(files) = affected.get(&kind) {
            writeln!(out, "Seen in: {}", files.join(", "))?;
            writeln!(out)?;
        }
        writeln!(out, "{}", suggestion(kind))?;
    }
    Ok(())
}

fn suggestion_title(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::PlayerDisappearance => "Player disappearance",
        IssueKind::InterpolationStall => "Interpolation stalls",
        IssueKind::BaselineMismatchRate => "Baseline mismatches",
        IssueKind::ServerSentNothing => "Server sent no snapshots",
        IssueKind::ClientReceivedNothing => "Client received no snapshots",
        IssueKind::BufferUnderrun => "Buffer underruns",
    }
}

fn suggestion(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::PlayerDisappearance => {
            "**Likely Cause:** Delta compression deserialization bug or interest management issue.

**Files to Check:**
- `scripts/entity_snapshot.gd` - Delta compression logic
- `scripts/server_world.gd` - Interest management

**What to Look For:**
- Ensure deserialization reads the \"changed\" bit only for entities that exist in the baseline
- Verify the player entity is always included in its own snapshot
- Check that the interest area calculation includes the player's own position
"
        },
        IssueKind::InterpolationStall => {
            "**Likely Cause:** Network delay too high or client falling behind the server.

**Solutions:**
- Increase `INTERPOLATION_DELAY` in `scripts/network_config.gd` (or rerun with `--interp-delay`)
- Check that the client receives snapshots at the expected rate
- Verify the server tick rate matches the configuration
"
        },
        IssueKind::BaselineMismatchRate => {
            "**Likely Cause:** Out-of-order packet delivery (normal for UDP).

**Expected Behavior:** Occasional mismatches are normal. High rates (>10%) indicate network issues.

**Solutions:**
- If the rate is very high, check network quality
- Consider sequence buffering for out-of-order packets
- Check how many baselines the client keeps cached
"
        },
        IssueKind::ServerSentNothing => {
            "**Likely Cause:** The server never reached its snapshot loop.

**What to Look For:**
- Startup errors or script parse errors near the top of `server.log`
- Port binding failures (another server still running?)
- Whether any client completed the connection handshake
"
        },
        IssueKind::ClientReceivedNothing => {
            "**Likely Cause:** The client never connected, or the server dropped it.

**What to Look For:**
- Connection errors in the client log
- Whether the server was alive when the client started (warm-up long enough?)
- Extreme packet loss or bandwidth caps in the network profile
"
        },
        IssueKind::BufferUnderrun => {
            "**Likely Cause:** Snapshots arrive later than the playback buffer can absorb.

**Solutions:**
- Raise the jitter buffer (`--jitter-buf`, `NET_CFG_JITTER_BUF`)
- Compare underrun timing with the configured jitter; periodic stutters point at the simulation, bursts at the server
"
        },
    }
}

fn write_recommendations(out: &mut impl Write, report: &Report) -> fmt::Result {
    let s = &report.summary;
    let mut recommendations: Vec<&str> = Vec::new();

    if s.total_player_disappearances > 0 {
        recommendations.push(
            "**Fix delta compression:** Player disappearances indicate a critical bug in snapshot encoding or interest management.",
        );
    }
    if s.total_interpolation_warnings > INTERPOLATION_RECOMMENDATION_LIMIT {
        recommendations.push(
            "**Tune interpolation buffer:** High interpolation warnings suggest buffer tuning is needed. Consider increasing `INTERPOLATION_DELAY` in `network_config.gd`.",
        );
    }
    if s.total_buffer_underruns > 0 {
        recommendations.push(
            "**Smooth snapshot delivery:** Buffer underruns mean playback stalled. Try a larger jitter buffer and check server tick stability.",
        );
    }

    writeln!(out, "## Recommendations")?;
    writeln!(out)?;
    if recommendations.is_empty() {
        writeln!(out, "✅ No recommendations - system is working as expected!")?;
    } else {
        for (i, text) in recommendations.iter().enumerate() {
            writeln!(out, "{}. {}", i + 1, text)?;
        }
    }
    writeln!(out)
}

fn write_prompts(out: &mut impl Write, report: &Report) -> fmt::Result {
    writeln!(out, "## Suggested Investigation Prompts")?;
    writeln!(out)?;

    if report.summary.has_critical_issues {
        writeln!(out, "### For Critical Issues")?;
        writeln!(out)?;
        writeln!(out, "```")?;
        writeln!(out, "Please analyze the critical issues in these test logs. Focus on:")?;
        writeln!(out)?;
        writeln!(out, "1. Read the log files listed in the report")?;
        writeln!(out, "2. Identify patterns in player disappearance errors")?;
        writeln!(out, "3. Check the delta compression logic in scripts/entity_snapshot.gd")?;
        writeln!(out, "4. Verify the interest management in scripts/server_world.gd")?;
        writeln!(out)?;
        writeln!(out, "Explain what is going wrong and suggest fixes.")?;
        writeln!(out, "```")?;
        writeln!(out)?;
    }

    writeln!(out, "### For Performance Analysis")?;
    writeln!(out)?;
    writeln!(out, "```")?;
    writeln!(out, "Please analyze the network performance in these test logs:")?;
    writeln!(out)?;
    writeln!(out, "1. Calculate average snapshot sizes and compression ratios")?;
    writeln!(out, "2. Identify bandwidth usage patterns")?;
    writeln!(out, "3. Check whether tick rates match the configuration")?;
    writeln!(out, "4. Verify the interpolation buffer is maintained correctly")?;
    writeln!(out)?;
    writeln!(out, "Produce a performance report with optimization suggestions.")?;
    writeln!(out, "```")?;
    writeln!(out)?;

    if let Some(run) = &report.run {
        let net = &run.network_profile;
        writeln!(out, "### For This Run")?;
        writeln!(out)?;
        writeln!(out, "```")?;
        writeln!(
            out,
            "I ran the network test '{}' with this profile:",
            run.test_name
        )?;
        writeln!(out)?;
        writeln!(out, "- packet loss: {:.1}%", net.packet_loss_percent)?;
        writeln!(out, "- lag: {}ms, jitter: {}ms", net.lag_base_ms, net.jitter_ms)?;
        writeln!(out, "- bandwidth cap: {} KB/s", net.bandwidth_cap_kbps)?;
        writeln!(out, "- duplication: {:.1}%", net.duplicate_percent)?;
        writeln!(out)?;
        writeln!(out, "Cross-reference with these raw logs if needed:")?;
        for (role, path) in &run.log_files {
            writeln!(out, "- {}: {}", role, path)?;
        }
        writeln!(out)?;
        writeln!(out, "Focus on:")?;
        writeln!(out, "1. Correlation between lag/loss and player_disappearances")?;
        writeln!(out, "2. Patterns in buffer_underruns (do they happen periodically?)")?;
        writeln!(out, "3. Baseline mismatches indicating state desync")?;
        writeln!(out)?;
        writeln!(out, "If you find bugs, propose a patch for the relevant script.")?;
        writeln!(out, "```")?;
        writeln!(out)?;
    }
    Ok(())
}
