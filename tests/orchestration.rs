//! Multi-process orchestration tests.
//!
//! These tests launch the `fake_engine` binary as server and clients,
//! exercising the full start / monitor / stop / analyze cycle against real
//! child processes.
//!
//! # Requirements
//!
//! The `fake_engine` binary must be built before running these tests:
//! ```bash
//! cargo build -p fake-engine
//! ```
//!
//! Tests skip with a diagnostic when it is missing.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;
use snapshot_harness::{
    BehaviorMode, HarnessError, NetworkConditions, Orchestrator, OrchestratorConfig,
    ScenarioConfig, StopReason,
};

const FAKE_ENGINE_NAME: &str = if cfg!(windows) { "fake_engine.exe" } else { "fake_engine" };

/// Finds the fake engine in the shared workspace target directory.
fn find_fake_engine() -> Option<PathBuf> {
    // Test executables live in target/<profile>/deps/, binaries one level up.
    let test_exe = std::env::current_exe().ok()?;
    let target_dir = test_exe.parent().and_then(|p| p.parent())?;
    let engine = target_dir.join(FAKE_ENGINE_NAME);
    engine.exists().then_some(engine)
}

macro_rules! skip_if_no_fake_engine {
    () => {
        match find_fake_engine() {
            Some(engine) => engine,
            None => {
                eprintln!("SKIP: {} not found, build it with: cargo build -p fake-engine", FAKE_ENGINE_NAME);
                return;
            },
        }
    };
}

/// Short timings so a run takes a couple of seconds.
fn fast_config(engine: PathBuf, root: &Path) -> OrchestratorConfig {
    OrchestratorConfig::new(engine, root)
        .with_log_root(root.join("logs"))
        .with_report_root(root.join("reports"))
        .with_startup_delays(Duration::from_millis(300), Duration::from_millis(100))
        .with_poll_interval(Duration::from_millis(100))
        .with_progress_interval(Duration::from_millis(500))
        .with_shutdown_grace(Duration::from_secs(3))
        .with_extra_arg("--tick-ms")
        .with_extra_arg("20")
}

#[test]
#[serial]
fn test_short_run_writes_logs_and_reports() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(fast_config(engine, root.path())).unwrap();

    let scenario = ScenarioConfig::new("orchestrated_basic")
        .with_clients(2)
        .with_duration_secs(2)
        .with_behavior(BehaviorMode::StressTest)
        .with_network(NetworkConditions::lossy(0.05));
    let outcome = orchestrator.run(&scenario).unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert!(outcome.test_id.starts_with("orchestrated_basic_"));
    for name in ["server.log", "client_0.log", "client_1.log"] {
        assert!(outcome.log_dir.join(name).exists(), "{name} missing");
    }
    let paths = outcome.paths.as_ref().unwrap();
    assert!(paths.json.exists());
    assert!(paths.markdown.exists());
    assert!(paths.advisory.exists());

    let report = &outcome.report;
    assert_eq!(report.files.len(), 3);
    assert!(report.summary.total_snapshots_sent > 0);
    assert!(report.summary.total_snapshots_received > 0);
    assert!(!report.summary.has_critical_issues);
    // The banner lines are counted but not parsed.
    assert!(report.summary.total_lines > report.summary.total_entries);

    let run = report.run.as_ref().unwrap();
    assert_eq!(run.test_name, "orchestrated_basic");
    assert_eq!(run.config.num_clients, 2);
    assert_eq!(run.config.test_mode, "stress_test");
    assert!((run.network_profile.packet_loss_percent - 5.0).abs() < 1e-9);
    assert_eq!(
        run.log_files.keys().cloned().collect::<Vec<_>>(),
        vec!["client_0", "client_1", "server"]
    );
    let roles: Vec<_> = run.processes.iter().map(|p| p.role.as_str()).collect();
    assert_eq!(roles, vec!["server", "client_0", "client_1"]);
    for process in &run.processes {
        assert!(!process.forced_kill, "{} was killed", process.role);
        assert!(!process.exited_early, "{} exited early", process.role);
        assert_eq!(process.exit_code, Some(0));
    }

    let client_log = fs::read_to_string(outcome.log_dir.join("client_0.log")).unwrap();
    assert!(client_log.contains("behavior=stress_test"));
    assert!(client_log.contains("loss=0.05"));
}

#[test]
#[serial]
fn test_disappearances_surface_as_critical_issues() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let config = fast_config(engine, root.path())
        .with_extra_arg("--disappearances")
        .with_extra_arg("5");
    let orchestrator = Orchestrator::new(config).unwrap();

    let outcome = orchestrator
        .run(&ScenarioConfig::new("disappearing").with_duration_secs(1))
        .unwrap();

    assert_eq!(outcome.report.summary.total_player_disappearances, 5);
    assert!(outcome.report.summary.has_critical_issues);
    let advisory = fs::read_to_string(&outcome.paths.as_ref().unwrap().advisory).unwrap();
    assert!(advisory.contains("Player disappearance detected 5 times"));
}

#[test]
#[serial]
fn test_process_ignoring_sigterm_is_killed_after_grace() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let config = fast_config(engine, root.path())
        .with_shutdown_grace(Duration::from_millis(300))
        .with_extra_arg("--ignore-term");
    let orchestrator = Orchestrator::new(config).unwrap();

    let outcome = orchestrator
        .run(&ScenarioConfig::new("stubborn").with_duration_secs(1))
        .unwrap();

    let run = outcome.report.run.as_ref().unwrap();
    assert_eq!(run.processes.len(), 2);
    for process in &run.processes {
        assert!(process.forced_kill, "{} was not killed", process.role);
        assert!(!process.exited_early);
    }
}

#[test]
#[serial]
fn test_all_clients_exiting_ends_the_run() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let config = fast_config(engine, root.path())
        .with_extra_arg("--client-exit-after-ms")
        .with_extra_arg("200")
        .with_extra_arg("--exit-code")
        .with_extra_arg("3");
    let orchestrator = Orchestrator::new(config).unwrap();

    let start = Instant::now();
    let outcome = orchestrator
        .run(&ScenarioConfig::new("flaky_clients").with_duration_secs(30))
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(15));

    assert_eq!(outcome.stop_reason, StopReason::ClientsDied);
    let run = outcome.report.run.as_ref().unwrap();
    let client = run.processes.iter().find(|p| p.role == "client_0").unwrap();
    assert!(client.exited_early);
    assert_eq!(client.exit_code, Some(3));
    let server = run.processes.iter().find(|p| p.role == "server").unwrap();
    assert!(!server.exited_early);

    let advisory = fs::read_to_string(&outcome.paths.as_ref().unwrap().advisory).unwrap();
    assert!(advisory.contains("exited before the run ended"));
}

#[test]
#[serial]
fn test_server_exit_ends_the_run() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let config = fast_config(engine, root.path())
        .with_extra_arg("--server-exit-after-ms")
        .with_extra_arg("500");
    let orchestrator = Orchestrator::new(config).unwrap();

    let outcome = orchestrator
        .run(&ScenarioConfig::new("dying_server").with_duration_secs(30))
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::ServerDied);
    let run = outcome.report.run.as_ref().unwrap();
    assert!(run.processes[0].exited_early);
    assert!(!run.processes[1].exited_early);
}

#[test]
#[serial]
fn test_shutdown_flag_interrupts_and_still_reports() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(fast_config(engine, root.path())).unwrap();

    let flag = orchestrator.shutdown_flag().clone();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(800));
        flag.request();
    });

    let start = Instant::now();
    let outcome = orchestrator
        .run(&ScenarioConfig::new("interrupted").with_duration_secs(60))
        .unwrap();
    trigger.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(outcome.stop_reason, StopReason::Interrupted);
    assert!(outcome.paths.as_ref().unwrap().json.exists());
    let run = outcome.report.run.as_ref().unwrap();
    assert!(run.processes.iter().all(|p| !p.forced_kill));

    // Later scenarios in a batch are skipped.
    let rest = orchestrator.run_all(&[ScenarioConfig::new("never_runs")], Duration::ZERO);
    assert!(rest.is_empty());
}

#[test]
#[serial]
fn test_repeated_runs_get_distinct_directories() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(fast_config(engine, root.path())).unwrap();

    let scenario = ScenarioConfig::new("repeat").with_duration_secs(1);
    let outcomes = orchestrator.run_all(&[scenario.clone(), scenario], Duration::ZERO);
    assert_eq!(outcomes.len(), 2);
    let first = outcomes[0].as_ref().unwrap();
    let second = outcomes[1].as_ref().unwrap();
    assert_ne!(first.test_id, second.test_id);
    assert_ne!(first.log_dir, second.log_dir);
    assert_ne!(first.paths.as_ref().unwrap().json, second.paths.as_ref().unwrap().json);
}

#[test]
#[serial]
fn test_unwritable_report_root_keeps_the_analysis() {
    let engine = skip_if_no_fake_engine!();
    let root = tempfile::tempdir().unwrap();
    let blocker = root.path().join("not-a-dir");
    fs::write(&blocker, "file in the way").unwrap();
    let config = fast_config(engine, root.path()).with_report_root(blocker.join("reports"));
    let orchestrator = Orchestrator::new(config).unwrap();

    let outcome = orchestrator
        .run(&ScenarioConfig::new("no_reports").with_duration_secs(1))
        .unwrap();

    assert!(matches!(outcome.paths, Err(HarnessError::Io { .. })));
    assert!(outcome.log_dir.join("server.log").exists());
    assert_eq!(outcome.report.files.len(), 2);
    assert!(outcome.report.summary.total_snapshots_sent > 0);
    assert!(outcome.report.run.is_some());
}

#[test]
#[serial]
fn test_missing_engine_fails_the_run() {
    let root = tempfile::tempdir().unwrap();
    let config = fast_config(root.path().join("no-such-engine"), root.path());
    let orchestrator = Orchestrator::new(config).unwrap();

    let err = orchestrator
        .run(&ScenarioConfig::new("no_engine").with_duration_secs(1))
        .unwrap_err();
    assert!(matches!(err, HarnessError::Spawn { .. }));
}

#[test]
fn test_invalid_scenario_is_rejected_before_launch() {
    let root = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(fast_config(PathBuf::from("unused"), root.path())).unwrap();
    let err = orchestrator.run(&ScenarioConfig::new("zero").with_clients(0)).unwrap_err();
    assert!(matches!(err, HarnessError::InvalidConfig { .. }));
    assert!(!root.path().join("logs").exists());
}
