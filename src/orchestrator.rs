//! Process orchestration: launch one server and N clients, let them run,
//! tear them down, analyze what they logged.
//!
//! The orchestrator does not talk to the engine processes. It starts them
//! with the scenario's environment, polls their liveness, and stops them:
//!
//! 1. start the server, wait `warmup`
//! 2. start each client, `stagger` apart
//! 3. poll every `poll_interval` until the duration elapses, the server
//!    dies, every client dies, or shutdown is requested
//! 4. stop clients, then the server: SIGTERM, wait up to `shutdown_grace`,
//!    then kill
//! 5. analyze the run directory and write reports
//!
//! Every wait is a short poll on a [`ShutdownFlag`], so an interrupt ends the
//! run promptly and still goes through step 4.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::analyzer::{AnalysisConfig, LogAnalyzer};
use crate::error::HarnessError;
use crate::report::{ProcessOutcome, Report, ReportPaths, ReportWriter, RunContext};
use crate::scenario::ScenarioConfig;

/// Environment variable that names the engine executable.
pub const ENGINE_PATH_ENV: &str = "GODOT_PATH";

/// Command names searched on `PATH`, in order.
const ENGINE_NAMES: [&str; 2] = ["godot4", "godot"];

/// Well-known install locations checked last.
const ENGINE_FALLBACK_PATHS: [&str; 2] = ["/Applications/Godot.app/Contents/MacOS/Godot", "/usr/bin/godot"];

/// Granularity of every interruptible wait.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Pause between scenarios in [`Orchestrator::run_all`].
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Which part an engine process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// The authoritative server.
    Server,
    /// A client, by zero-based index.
    Client(u32),
}

impl Role {
    /// `server` or `client_<i>`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Server => "server".to_owned(),
            Self::Client(id) => format!("client_{}", id),
        }
    }

    /// Name of the file the role's output is captured in.
    #[must_use]
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.label())
    }

    /// Returns `true` for [`Role::Server`].
    #[must_use]
    pub const fn is_server(&self) -> bool {
        matches!(self, Self::Server)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client(id) => write!(f, "client_{}", id),
        }
    }
}

/// Cooperative cancellation shared between the orchestrator and whoever may interrupt it.
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Creates a flag that is not set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder to stop.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`request`](Self::request) was called.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `total`, waking early on shutdown.
    ///
    /// Returns `false` if shutdown was requested.
    pub fn sleep(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SHUTDOWN_POLL.min(deadline - now));
        }
    }
}

/// Locates the engine executable.
///
/// Order: the `GODOT_PATH` variable (taken as is), `godot4` then `godot` on
/// `PATH`, then the usual macOS and Linux install locations.
#[must_use]
pub fn find_engine_executable() -> Option<PathBuf> {
    find_engine_with(std::env::var_os(ENGINE_PATH_ENV).map(PathBuf::from))
}

fn find_engine_with(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Some(path);
    }
    for name in ENGINE_NAMES {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }
    ENGINE_FALLBACK_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// How the orchestrator launches and supervises processes.
#[derive(Debug, Clone)]
#[must_use = "OrchestratorConfig has no effect unless passed to Orchestrator::new()"]
pub struct OrchestratorConfig {
    /// Engine executable.
    pub engine: PathBuf,
    /// Game project directory, passed as `--path`.
    pub project: PathBuf,
    /// Parent of all run directories.
    ///
    /// Default: `test_logs`
    pub log_root: PathBuf,
    /// Parent of all report directories.
    ///
    /// Default: `test_reports`
    pub report_root: PathBuf,
    /// Wait after starting the server.
    ///
    /// Default: 3s
    pub warmup: Duration,
    /// Wait between client starts.
    ///
    /// Default: 1s
    pub stagger: Duration,
    /// Liveness polling period.
    ///
    /// Default: 1s
    pub poll_interval: Duration,
    /// How often progress is logged.
    ///
    /// Default: 10s
    pub progress_interval: Duration,
    /// How long a process may take to exit after SIGTERM before it is killed.
    ///
    /// Default: 5s
    pub shutdown_grace: Duration,
    /// Extra arguments appended to every engine command line.
    pub extra_args: Vec<String>,
    /// Settings for analyzing the run's logs.
    pub analysis: AnalysisConfig,
}

impl OrchestratorConfig {
    /// Creates a config with default timings.
    pub fn new(engine: impl Into<PathBuf>, project: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            project: project.into(),
            log_root: PathBuf::from("test_logs"),
            report_root: PathBuf::from("test_reports"),
            warmup: Duration::from_secs(3),
            stagger: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            extra_args: Vec::new(),
            analysis: AnalysisConfig::default(),
        }
    }

    /// Like [`new`](Self::new), locating the engine with [`find_engine_executable`].
    pub fn discover(project: impl Into<PathBuf>) -> Result<Self, HarnessError> {
        let engine = find_engine_executable().ok_or(HarnessError::EngineNotFound)?;
        Ok(Self::new(engine, project))
    }

    /// Sets where run directories are created.
    pub fn with_log_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_root = dir.into();
        self
    }

    /// Sets where report directories are created.
    pub fn with_report_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_root = dir.into();
        self
    }

    /// Sets the server warm-up and client stagger delays.
    pub fn with_startup_delays(mut self, warmup: Duration, stagger: Duration) -> Self {
        self.warmup = warmup;
        self.stagger = stagger;
        self
    }

    /// Sets the liveness polling period.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how often progress is logged.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Sets the SIGTERM grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Appends an argument to every engine command line.
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Sets the analysis settings.
    pub fn with_analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }

    /// Checks paths and intervals.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.engine.as_os_str().is_empty() {
            return Err(HarnessError::invalid_config("engine path must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(HarnessError::invalid_config("poll_interval must be non-zero"));
        }
        if self.progress_interval.is_zero() {
            return Err(HarnessError::invalid_config("progress_interval must be non-zero"));
        }
        self.analysis.validate()
    }
}

/// A fully resolved engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    /// The role this command launches.
    pub role: Role,
    /// Executable.
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Variables added to the inherited environment.
    pub env: Vec<(&'static str, String)>,
}

impl EngineCommand {
    /// Builds the invocation for `role`.
    #[must_use]
    pub fn for_role(config: &OrchestratorConfig, scenario: &ScenarioConfig, role: Role) -> Self {
        let mut args = vec![
            "--path".to_owned(),
            config.project.display().to_string(),
            "--headless".to_owned(),
        ];
        args.extend(config.extra_args.iter().cloned());
        Self {
            role,
            program: config.engine.clone(),
            args,
            env: scenario.environment(role),
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// A running engine process whose output goes to a log file.
#[derive(Debug)]
pub struct EngineProcess {
    role: Role,
    child: Child,
    log_path: PathBuf,
    started: Instant,
}

impl EngineProcess {
    /// Starts `command` with stdout and stderr both appended to `log_path`.
    pub fn start(command: &EngineCommand, log_path: &Path) -> Result<Self, HarnessError> {
        let stdout = File::create(log_path)
            .map_err(|e| HarnessError::io(format!("creating {}", log_path.display()), &e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| HarnessError::io(format!("sharing {}", log_path.display()), &e))?;

        let child = command
            .to_command()
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| HarnessError::Spawn {
                role: command.role.label(),
                context: format!("{}: {}", command.program.display(), e),
            })?;

        tracing::info!(
            role = %command.role,
            pid = child.id(),
            log = %log_path.display(),
            "started engine process"
        );

        Ok(Self {
            role: command.role,
            child,
            log_path: log_path.to_path_buf(),
            started: Instant::now(),
        })
    }

    /// The process's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Where the process's output is captured.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Returns `true` while the process has not exited.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => {
                tracing::warn!(role = %self.role, error = %e, "could not query process status");
                false
            },
        }
    }

    /// Stops the process: SIGTERM, wait up to `grace`, then kill.
    ///
    /// A process that already exited is reported as `exited_early`.
    pub fn stop(mut self, grace: Duration) -> ProcessOutcome {
        let pid = self.pid();
        let mut outcome = ProcessOutcome {
            role: self.role.label(),
            pid,
            exit_code: None,
            forced_kill: false,
            exited_early: false,
        };

        if let Ok(Some(status)) = self.child.try_wait() {
            outcome.exited_early = true;
            outcome.exit_code = status.code();
            log_exit(self.role, pid, status, "exited before shutdown");
            return outcome;
        }

        self.terminate();
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    outcome.exit_code = status.code();
                    log_exit(self.role, pid, status, "stopped");
                    return outcome;
                },
                Ok(None) if Instant::now() < deadline => thread::sleep(SHUTDOWN_POLL),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(role = %self.role, pid, error = %e, "could not query process status");
                    break;
                },
            }
        }

        tracing::warn!(
            role = %self.role,
            pid,
            grace_secs = grace.as_secs_f64(),
            "process ignored termination request, killing"
        );
        outcome.forced_kill = true;
        self.kill();
        match self.child.wait() {
            Ok(status) => outcome.exit_code = status.code(),
            Err(e) => tracing::warn!(role = %self.role, pid, error = %e, "could not reap process"),
        }
        outcome
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let sent = i32::try_from(self.pid())
            .ok()
            .map(|raw| kill(Pid::from_raw(raw), Signal::SIGTERM));
        match sent {
            Some(Ok(())) => {},
            Some(Err(e)) => {
                tracing::debug!(role = %self.role, error = %e, "SIGTERM failed, killing instead");
                self.kill();
            },
            None => self.kill(),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        self.kill();
    }

    /// Kills the process, logging instead of failing when it is already gone.
    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::warn!(role = %self.role, pid = self.pid(), error = %e, "kill failed");
        }
    }

    /// Time since the process was started.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

fn log_exit(role: Role, pid: u32, status: ExitStatus, what: &str) {
    if status.success() {
        tracing::info!(%role, pid, "engine process {}", what);
    } else {
        tracing::warn!(%role, pid, status = %status, "engine process {} with failure", what);
    }
}

/// Why the run window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The full duration elapsed.
    Completed,
    /// The server exited during the run.
    ServerDied,
    /// Every client exited during the run.
    ClientsDied,
    /// Shutdown was requested.
    Interrupted,
}

impl StopReason {
    /// Returns a string representation suitable for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ServerDied => "server_died",
            Self::ClientsDied => "clients_died",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one orchestrated run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `<scenario name>_<YYYYmmdd_HHMMSS>`.
    pub test_id: String,
    /// Directory holding the run's logs.
    pub log_dir: PathBuf,
    /// Why the run window ended.
    pub stop_reason: StopReason,
    /// The analysis of the run's logs.
    pub report: Report,
    /// Where the reports were written, or why writing them failed. The
    /// analysis above survives a failed write.
    pub paths: Result<ReportPaths, HarnessError>,
}

/// Runs scenarios against the engine.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    shutdown: ShutdownFlag,
}

impl Orchestrator {
    /// Validates `config` and creates an orchestrator with its own shutdown flag.
    pub fn new(config: OrchestratorConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown: ShutdownFlag::new(),
        })
    }

    /// Uses `flag` for cancellation, typically one a signal handler sets.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = flag;
        self
    }

    /// The flag that interrupts this orchestrator.
    #[must_use]
    pub fn shutdown_flag(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    /// The orchestrator's settings.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs one scenario end to end.
    ///
    /// Engine processes that exit with a failure are recorded in the report's
    /// run context; they do not fail the run. Errors are returned for
    /// configuration problems and processes that cannot be started. A report
    /// directory that cannot be written is reported in
    /// [`RunOutcome::paths`], next to the finished analysis.
    pub fn run(&self, scenario: &ScenarioConfig) -> Result<RunOutcome, HarnessError> {
        scenario.validate()?;

        let started_at = chrono::Local::now();
        let (test_id, log_dir) = self.create_run_dir(scenario, &started_at)?;
        let net = &scenario.network;
        tracing::info!(
            test = %scenario.name,
            clients = scenario.num_clients,
            duration_secs = scenario.duration_secs,
            behavior = %scenario.behavior,
            loss = net.packet_loss,
            lag_ms = net.lag_ms,
            jitter_ms = net.jitter_ms,
            bw_kbps = net.bandwidth_kbps,
            duplicate = net.duplicate_rate,
            log_dir = %log_dir.display(),
            "running scenario"
        );

        let mut processes = Vec::with_capacity(scenario.num_clients as usize + 1);
        let stop_reason = match self.launch(scenario, &log_dir, &mut processes) {
            Ok(true) => self.monitor(scenario, &mut processes),
            Ok(false) => StopReason::Interrupted,
            Err(e) => {
                tracing::error!(error = %e, "launch failed, stopping started processes");
                self.stop_all(processes);
                return Err(e);
            },
        };
        tracing::info!(reason = %stop_reason, "run window ended, stopping processes");

        let mut run = RunContext::from_scenario(scenario, started_at.to_rfc3339());
        for process in &processes {
            let path = process.log_path();
            let shown = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            run.log_files
                .insert(process.role().label(), shown.display().to_string());
        }
        run.processes = self.stop_all(processes);

        let analyzer = LogAnalyzer::new(self.config.analysis.clone());
        let report = analyzer.analyze_run(&log_dir, run)?;
        let paths = ReportWriter::new(self.config.report_root.join(&test_id)).write_all(&report);
        match &paths {
            Ok(written) => tracing::info!(
                test = %scenario.name,
                critical = report.summary.has_critical_issues,
                warnings = report.summary.has_warnings,
                report = %written.json.display(),
                "scenario finished"
            ),
            Err(e) => tracing::error!(
                test = %scenario.name,
                critical = report.summary.has_critical_issues,
                warnings = report.summary.has_warnings,
                error = %e,
                "scenario finished but its reports could not be written"
            ),
        }

        Ok(RunOutcome {
            test_id,
            log_dir,
            stop_reason,
            report,
            paths,
        })
    }

    /// Runs scenarios one after another with `cooldown` in between.
    ///
    /// A failed scenario does not stop the batch; shutdown does.
    pub fn run_all(
        &self,
        scenarios: &[ScenarioConfig],
        cooldown: Duration,
    ) -> Vec<Result<RunOutcome, HarnessError>> {
        let mut outcomes = Vec::with_capacity(scenarios.len());
        for (i, scenario) in scenarios.iter().enumerate() {
            if self.shutdown.is_requested() {
                tracing::info!(remaining = scenarios.len() - i, "shutdown requested, skipping remaining scenarios");
                break;
            }
            if i > 0 && !self.shutdown.sleep(cooldown) {
                break;
            }
            let outcome = self.run(scenario);
            if let Err(e) = &outcome {
                tracing::error!(test = %scenario.name, error = %e, "scenario failed");
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    fn create_run_dir(
        &self,
        scenario: &ScenarioConfig,
        started_at: &chrono::DateTime<chrono::Local>,
    ) -> Result<(String, PathBuf), HarnessError> {
        let base = format!("{}_{}", scenario.name, started_at.format("%Y%m%d_%H%M%S"));
        let mut test_id = base.clone();
        let mut suffix = 1;
        while self.config.log_root.join(&test_id).exists() {
            suffix += 1;
            test_id = format!("{}_{}", base, suffix);
        }
        let log_dir = self.config.log_root.join(&test_id);
        fs::create_dir_all(&log_dir)
            .map_err(|e| HarnessError::io(format!("creating run directory {}", log_dir.display()), &e))?;
        Ok((test_id, log_dir))
    }

    /// Starts the server and clients. `Ok(false)` means shutdown interrupted the launch.
    fn launch(
        &self,
        scenario: &ScenarioConfig,
        log_dir: &Path,
        processes: &mut Vec<EngineProcess>,
    ) -> Result<bool, HarnessError> {
        for role in scenario.roles() {
            if let Role::Client(id) = role {
                if id > 0 && !self.shutdown.sleep(self.config.stagger) {
                    return Ok(false);
                }
            }
            let command = EngineCommand::for_role(&self.config, scenario, role);
            processes.push(EngineProcess::start(&command, &log_dir.join(role.log_file_name()))?);
            if role.is_server() && !self.shutdown.sleep(self.config.warmup) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn monitor(&self, scenario: &ScenarioConfig, processes: &mut [EngineProcess]) -> StopReason {
        let duration = scenario.duration();
        let start = Instant::now();
        let mut last_progress = start;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return StopReason::Completed;
            }
            if self.shutdown.is_requested() {
                return StopReason::Interrupted;
            }

            let (server, clients) = match processes.split_first_mut() {
                Some(split) => split,
                None => return StopReason::ServerDied,
            };
            if !server.is_alive() {
                tracing::error!(elapsed_secs = elapsed.as_secs(), "server died");
                return StopReason::ServerDied;
            }
            let alive = clients
                .iter_mut()
                .map(EngineProcess::is_alive)
                .filter(|alive| *alive)
                .count();
            if alive == 0 {
                tracing::error!(elapsed_secs = elapsed.as_secs(), "all clients died");
                return StopReason::ClientsDied;
            }

            if last_progress.elapsed() >= self.config.progress_interval {
                last_progress = Instant::now();
                tracing::info!(
                    elapsed_secs = elapsed.as_secs(),
                    duration_secs = duration.as_secs(),
                    clients_alive = alive,
                    clients = clients.len(),
                    "progress"
                );
            }

            let remaining = duration.saturating_sub(start.elapsed());
            if !self.shutdown.sleep(self.config.poll_interval.min(remaining)) {
                return StopReason::Interrupted;
            }
        }
    }

    /// Stops clients first, then the server. Outcomes are returned in start order.
    fn stop_all(&self, mut processes: Vec<EngineProcess>) -> Vec<ProcessOutcome> {
        let mut outcomes = Vec::with_capacity(processes.len());
        while let Some(process) = processes.pop() {
            outcomes.push(process.stop(self.config.shutdown_grace));
        }
        outcomes.reverse();
        outcomes
    }
}
