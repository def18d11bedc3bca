//! Headless stand-in for the game engine.
//!
//! Reads the same environment contract as the real engine (`TEST_MODE`,
//! `TEST_CLIENT_ID`, `TEST_BEHAVIOR`, `TEST_PACKET_LOSS`, ...) and writes
//! structured log lines to stdout until it receives SIGTERM or its safety
//! timeout expires:
//!
//! - server: one `SERVER_SNAPSHOT` line per tick, a `SERVER_CHUNK` change now and then
//! - client: one `CLIENT_SNAPSHOT` line per tick with a delay sample
//!
//! # Usage
//!
//! ```bash
//! TEST_MODE=server fake_engine --path . --headless
//! TEST_MODE=client TEST_CLIENT_ID=0 fake_engine --path . --headless --disappearances 5
//! ```
//!
//! # Fault Options
//!
//! ```bash
//! --tick-ms 20               # Tick period (default 50)
//! --client-exit-after-ms 300 # Clients exit on their own after 300ms
//! --server-exit-after-ms 300 # The server exits on its own after 300ms
//! --exit-code 3              # Code used for self-initiated exits
//! --ignore-term              # Keep running after SIGTERM (forces a kill)
//! --disappearances 5         # Clients log 5 missing-player errors
//! --max-secs 120             # Safety timeout
//! ```

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use snapshot_harness::{LogLevel, LogRecord};

#[derive(Debug)]
struct Args {
    tick_ms: u64,
    client_exit_after_ms: Option<u64>,
    server_exit_after_ms: Option<u64>,
    exit_code: u8,
    ignore_term: bool,
    disappearances: u32,
    max_secs: u64,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            client_exit_after_ms: None,
            server_exit_after_ms: None,
            exit_code: 1,
            ignore_term: false,
            disappearances: 0,
            max_secs: 120,
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args::default();

    fn value<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, String> {
        let raw = args.get(i).ok_or_else(|| format!("Missing value for {}", args[i - 1]))?;
        raw.parse()
            .map_err(|_| format!("Invalid value for {}: {}", args[i - 1], raw))
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            // Engine arguments the harness always passes.
            "--path" => i += 1,
            "--headless" => {},
            "--tick-ms" => {
                i += 1;
                result.tick_ms = value(&args, i)?;
            },
            "--client-exit-after-ms" => {
                i += 1;
                result.client_exit_after_ms = Some(value(&args, i)?);
            },
            "--server-exit-after-ms" => {
                i += 1;
                result.server_exit_after_ms = Some(value(&args, i)?);
            },
            "--exit-code" => {
                i += 1;
                result.exit_code = value(&args, i)?;
            },
            "--ignore-term" => result.ignore_term = true,
            "--disappearances" => {
                i += 1;
                result.disappearances = value(&args, i)?;
            },
            "--max-secs" => {
                i += 1;
                result.max_secs = value(&args, i)?;
            },
            other => eprintln!("Unknown argument: {}", other),
        }
        i += 1;
    }

    Ok(result)
}

/// Writes log lines with timestamps relative to process start.
struct Logger {
    start: Instant,
}

impl Logger {
    fn line(&self, level: LogLevel, category: &str, message: impl Into<String>, meta: &[(&str, String)]) {
        let secs = self.start.elapsed().as_secs_f64();
        let record = LogRecord {
            // Millisecond resolution, like the engine's own logger.
            timestamp: (secs * 1000.0).round() / 1000.0,
            level,
            category: category.to_owned(),
            message: message.into(),
            metadata: meta
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
            raw: String::new(),
        };
        println!("{}", record);
    }
}

enum Mode {
    Server,
    Client(u32),
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        },
    };

    let mode = match std::env::var("TEST_MODE").as_deref() {
        Ok("server") => Mode::Server,
        Ok("client") => Mode::Client(env_or("TEST_CLIENT_ID", "0").parse().unwrap_or(0)),
        other => {
            eprintln!("TEST_MODE must be 'server' or 'client', got {:?}", other.ok());
            return ExitCode::from(2);
        },
    };

    let terminated = Arc::new(AtomicBool::new(false));
    let flag = terminated.clone();
    let ignore_term = args.ignore_term;
    if let Err(e) = ctrlc::set_handler(move || {
        if !ignore_term {
            flag.store(true, Ordering::SeqCst);
        }
    }) {
        eprintln!("could not install signal handler: {}", e);
        return ExitCode::from(2);
    }

    // Unstructured startup noise, as a real engine prints.
    println!("Fake Engine v0.1.0 - headless");
    println!();

    let log = Logger { start: Instant::now() };
    let (exit_after, role) = match mode {
        Mode::Server => (args.server_exit_after_ms, "server".to_owned()),
        Mode::Client(id) => (args.client_exit_after_ms, format!("client_{}", id)),
    };
    log.line(
        LogLevel::Info,
        "TEST",
        format!("Starting as {}", role),
        &[
            ("behavior", env_or("TEST_BEHAVIOR", "none")),
            ("loss", env_or("TEST_PACKET_LOSS", "0")),
            ("lag_ms", env_or("TEST_LAG_MS", "0")),
            ("interp_delay", env_or("NET_CFG_INTERP_DELAY", "default")),
        ],
    );

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let deadline = Instant::now() + Duration::from_secs(args.max_secs);
    let exit_at = exit_after.map(|ms| Instant::now() + Duration::from_millis(ms));
    let mut seq: u64 = 0;
    let mut disappearances_left = args.disappearances;

    loop {
        if terminated.load(Ordering::SeqCst) {
            log.line(LogLevel::Info, "TEST", "Received SIGTERM, shutting down", &[]);
            return ExitCode::SUCCESS;
        }
        if exit_at.is_some_and(|at| Instant::now() >= at) {
            log.line(LogLevel::Error, "TEST", "Exiting on request", &[]);
            return ExitCode::from(args.exit_code);
        }
        if Instant::now() >= deadline {
            log.line(LogLevel::Warn, "TEST", "Safety timeout reached", &[]);
            return ExitCode::SUCCESS;
        }

        seq += 1;
        match mode {
            Mode::Server => {
                log.line(
                    LogLevel::Debug,
                    "SERVER_SNAPSHOT",
                    format!("Snapshot #{} to peer 2: {} bytes", seq, 200 + seq % 64),
                    &[],
                );
                if seq % 20 == 0 {
                    log.line(
                        LogLevel::Info,
                        "SERVER_CHUNK",
                        format!("Entity 1 changed chunk ({},0)->({},0)", seq / 20 - 1, seq / 20),
                        &[],
                    );
                }
            },
            Mode::Client(_) => {
                log.line(
                    LogLevel::Debug,
                    "CLIENT_SNAPSHOT",
                    format!("Received snapshot {}", seq),
                    &[("delay_ms", format!("{}", 40 + seq % 10))],
                );
                if disappearances_left > 0 {
                    disappearances_left -= 1;
                    log.line(
                        LogLevel::Error,
                        "CLIENT_ERROR",
                        "Player entity missing from snapshot",
                        &[("seq", seq.to_string())],
                    );
                }
            },
        }

        thread::sleep(tick);
    }
}
