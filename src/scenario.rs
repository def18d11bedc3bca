//! Test scenarios: what to launch and under which network conditions.
//!
//! A [`ScenarioConfig`] is a plain value handed to the
//! [`Orchestrator`](crate::orchestrator::Orchestrator). The engine under test
//! reads its settings from environment variables; [`ScenarioConfig::environment`]
//! is the single place that maps options to variables:
//!
//! | Option | Variable | Set for |
//! |--------|----------|---------|
//! | role | `TEST_MODE` (`server` / `client`) | both |
//! | client index | `TEST_CLIENT_ID` | clients |
//! | behavior | `TEST_BEHAVIOR` | clients |
//! | packet loss | `TEST_PACKET_LOSS` | clients |
//! | lag | `TEST_LAG_MS` | clients |
//! | jitter | `TEST_JITTER_MS` | clients |
//! | bandwidth | `TEST_BW_KBPS` | clients |
//! | duplication | `TEST_DUPLICATE_RATE` | clients |
//! | interpolation delay override | `NET_CFG_INTERP_DELAY` | both, only when set |
//! | jitter buffer override | `NET_CFG_JITTER_BUF` | both, only when set |
//!
//! Network conditions are simulated inside the engine; this crate only passes
//! them along.
//!
//! # Example
//!
//! ```
//! use snapshot_harness::orchestrator::Role;
//! use snapshot_harness::scenario::{NetworkConditions, ScenarioConfig};
//!
//! let scenario = ScenarioConfig::new("lossy_pair")
//!     .with_clients(2)
//!     .with_duration_secs(20)
//!     .with_network(NetworkConditions::lossy(0.05));
//! scenario.validate().expect("valid scenario");
//!
//! let env = scenario.environment(Role::Client(1));
//! assert!(env.contains(&("TEST_CLIENT_ID", "1".to_owned())));
//! assert!(env.contains(&("TEST_PACKET_LOSS", "0.05".to_owned())));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::orchestrator::Role;

/// Movement pattern the engine's test client drives the player with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMode {
    /// Random direction changes.
    #[default]
    RandomWalk,
    /// Rapid input changes meant to stress the snapshot pipeline.
    StressTest,
    /// Walks back and forth across chunk borders.
    ChunkCrossing,
    /// Walks in a circle.
    CirclePattern,
}

impl BehaviorMode {
    /// All modes, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::RandomWalk,
        Self::StressTest,
        Self::ChunkCrossing,
        Self::CirclePattern,
    ];

    /// The value passed in `TEST_BEHAVIOR`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RandomWalk => "random_walk",
            Self::StressTest => "stress_test",
            Self::ChunkCrossing => "chunk_crossing",
            Self::CirclePattern => "circle_pattern",
        }
    }
}

impl fmt::Display for BehaviorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                HarnessError::invalid_config(format!(
                    "unknown behavior mode '{}' (expected one of: random_walk, stress_test, chunk_crossing, circle_pattern)",
                    s
                ))
            })
    }
}

/// Network conditions the engine's clients simulate.
///
/// All rates default to 0.0 and all delays to zero (no effect).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
#[must_use = "NetworkConditions have no effect unless attached to a ScenarioConfig"]
pub struct NetworkConditions {
    /// Probability of dropping a packet (0.0 - 1.0).
    pub packet_loss: f64,
    /// Base latency in milliseconds.
    pub lag_ms: u32,
    /// Random latency variation in milliseconds.
    pub jitter_ms: u32,
    /// Bandwidth cap in KB/s; 0 means uncapped.
    pub bandwidth_kbps: f64,
    /// Probability of duplicating a packet (0.0 - 1.0).
    pub duplicate_rate: f64,
}

impl NetworkConditions {
    /// No simulated impairment.
    pub fn perfect() -> Self {
        Self::default()
    }

    /// Constant extra latency.
    pub fn high_latency(lag_ms: u32) -> Self {
        Self {
            lag_ms,
            ..Self::default()
        }
    }

    /// Random packet loss.
    pub fn lossy(packet_loss: f64) -> Self {
        Self {
            packet_loss,
            ..Self::default()
        }
    }

    /// Latency with large variation.
    pub fn jittery(lag_ms: u32, jitter_ms: u32) -> Self {
        Self {
            lag_ms,
            jitter_ms,
            ..Self::default()
        }
    }

    /// Loss, latency, jitter and duplication together.
    pub fn terrible() -> Self {
        Self {
            packet_loss: 0.05,
            lag_ms: 150,
            jitter_ms: 40,
            bandwidth_kbps: 0.0,
            duplicate_rate: 0.02,
        }
    }

    /// Sets the packet loss rate.
    pub fn with_packet_loss(mut self, rate: f64) -> Self {
        self.packet_loss = rate;
        self
    }

    /// Sets the base latency.
    pub fn with_lag_ms(mut self, ms: u32) -> Self {
        self.lag_ms = ms;
        self
    }

    /// Sets the jitter.
    pub fn with_jitter_ms(mut self, ms: u32) -> Self {
        self.jitter_ms = ms;
        self
    }

    /// Sets the bandwidth cap.
    pub fn with_bandwidth_kbps(mut self, kbps: f64) -> Self {
        self.bandwidth_kbps = kbps;
        self
    }

    /// Sets the duplication rate.
    pub fn with_duplicate_rate(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate;
        self
    }

    /// Returns `true` if no impairment is configured.
    #[must_use]
    pub fn is_perfect(&self) -> bool {
        *self == Self::default()
    }

    /// Checks that both rates are probabilities and the cap is not negative.
    pub fn validate(&self) -> Result<(), HarnessError> {
        check_rate("packet_loss", self.packet_loss)?;
        check_rate("duplicate_rate", self.duplicate_rate)?;
        check_override("bandwidth_kbps", Some(self.bandwidth_kbps))
    }
}

fn check_rate(name: &str, value: f64) -> Result<(), HarnessError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(HarnessError::invalid_config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_override(name: &str, value: Option<f64>) -> Result<(), HarnessError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(HarnessError::invalid_config(format!(
            "{} must be a non-negative number, got {}",
            name, v
        ))),
        _ => Ok(()),
    }
}

/// One test scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use = "ScenarioConfig has no effect unless passed to the Orchestrator"]
pub struct ScenarioConfig {
    /// Scenario name; prefixes the run directory.
    pub name: String,
    /// Number of client processes.
    #[serde(default = "default_num_clients")]
    pub num_clients: u32,
    /// Length of the run window in seconds.
    #[serde(default = "default_duration_secs", alias = "duration")]
    pub duration_secs: u64,
    /// Client movement pattern.
    #[serde(default, alias = "test_mode")]
    pub behavior: BehaviorMode,
    /// Simulated network conditions.
    #[serde(default)]
    pub network: NetworkConditions,
    /// Interpolation delay override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interp_delay: Option<f64>,
    /// Jitter buffer override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_buffer: Option<f64>,
}

const fn default_num_clients() -> u32 {
    1
}

const fn default_duration_secs() -> u64 {
    60
}

/// Preset keys accepted by [`ScenarioConfig::preset`], in run order.
pub const PRESET_NAMES: [&str; 7] = [
    "basic",
    "stress",
    "lag",
    "packet_loss",
    "multi_client",
    "jitter",
    "bad_network",
];

impl ScenarioConfig {
    /// One client, 60 seconds, random walk, perfect network.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_clients: default_num_clients(),
            duration_secs: default_duration_secs(),
            behavior: BehaviorMode::default(),
            network: NetworkConditions::default(),
            interp_delay: None,
            jitter_buffer: None,
        }
    }

    /// Looks up a named preset.
    pub fn preset(key: &str) -> Option<Self> {
        let scenario = match key {
            "basic" => Self::new("basic_single_client").with_duration_secs(30),
            "stress" => Self::new("stress_test").with_behavior(BehaviorMode::StressTest),
            "lag" => Self::new("high_lag_test")
                .with_duration_secs(30)
                .with_network(NetworkConditions::high_latency(200)),
            "packet_loss" => Self::new("packet_loss_test")
                .with_duration_secs(30)
                .with_network(NetworkConditions::lossy(0.1)),
            "multi_client" => Self::new("multi_client_test").with_clients(3),
            "jitter" => Self::new("high_jitter_test")
                .with_duration_secs(30)
                .with_network(NetworkConditions::jittery(100, 50)),
            "bad_network" => Self::new("bad_network_chaos")
                .with_clients(2)
                .with_behavior(BehaviorMode::StressTest)
                .with_network(NetworkConditions::terrible()),
            _ => return None,
        };
        Some(scenario)
    }

    /// Keys accepted by [`preset`](Self::preset).
    #[must_use]
    pub fn preset_names() -> &'static [&'static str] {
        &PRESET_NAMES
    }

    /// Every preset, in [`PRESET_NAMES`] order.
    #[must_use]
    pub fn all_presets() -> Vec<Self> {
        PRESET_NAMES.iter().filter_map(|key| Self::preset(key)).collect()
    }

    /// Loads a scenario from JSON. Missing fields take their defaults; only
    /// `name` is required.
    pub fn from_json(json: &str) -> Result<Self, HarnessError> {
        let scenario: Self = serde_json::from_str(json).map_err(|e| HarnessError::Serialization {
            context: format!("decoding scenario: {}", e),
        })?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Sets the client count.
    pub fn with_clients(mut self, num_clients: u32) -> Self {
        self.num_clients = num_clients;
        self
    }

    /// Sets the run length.
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Sets the client behavior.
    pub fn with_behavior(mut self, behavior: BehaviorMode) -> Self {
        self.behavior = behavior;
        self
    }

    /// Sets the network conditions.
    pub fn with_network(mut self, network: NetworkConditions) -> Self {
        self.network = network;
        self
    }

    /// Overrides the engine's interpolation delay (seconds).
    pub fn with_interp_delay(mut self, secs: f64) -> Self {
        self.interp_delay = Some(secs);
        self
    }

    /// Overrides the engine's jitter buffer (milliseconds).
    pub fn with_jitter_buffer(mut self, ms: f64) -> Self {
        self.jitter_buffer = Some(ms);
        self
    }

    /// The run window.
    #[must_use]
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.duration_secs)
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::invalid_config("scenario name must not be empty"));
        }
        if self
            .name
            .chars()
            .any(|c| std::path::is_separator(c) || c.is_control())
        {
            return Err(HarnessError::invalid_config(format!(
                "scenario name '{}' must be usable as a directory name",
                self.name
            )));
        }
        if self.num_clients == 0 {
            return Err(HarnessError::invalid_config("num_clients must be at least 1"));
        }
        if self.duration_secs == 0 {
            return Err(HarnessError::invalid_config("duration must be at least 1 second"));
        }
        self.network.validate()?;
        check_override("interp_delay", self.interp_delay)?;
        check_override("jitter_buffer", self.jitter_buffer)
    }

    /// Environment variables for the engine process playing `role`.
    #[must_use]
    pub fn environment(&self, role: Role) -> Vec<(&'static str, String)> {
        let mut env = Vec::with_capacity(10);
        if let Some(delay) = self.interp_delay {
            env.push(("NET_CFG_INTERP_DELAY", delay.to_string()));
        }
        if let Some(buffer) = self.jitter_buffer {
            env.push(("NET_CFG_JITTER_BUF", buffer.to_string()));
        }

        match role {
            Role::Server => env.push(("TEST_MODE", "server".to_owned())),
            Role::Client(id) => {
                let net = &self.network;
                env.push(("TEST_MODE", "client".to_owned()));
                env.push(("TEST_CLIENT_ID", id.to_string()));
                env.push(("TEST_BEHAVIOR", self.behavior.as_str().to_owned()));
                env.push(("TEST_PACKET_LOSS", net.packet_loss.to_string()));
                env.push(("TEST_LAG_MS", net.lag_ms.to_string()));
                env.push(("TEST_JITTER_MS", net.jitter_ms.to_string()));
                env.push(("TEST_BW_KBPS", net.bandwidth_kbps.to_string()));
                env.push(("TEST_DUPLICATE_RATE", net.duplicate_rate.to_string()));
            },
        }
        env
    }

    /// Every role the scenario launches: the server, then each client.
    pub fn roles(&self) -> impl Iterator<Item = Role> {
        std::iter::once(Role::Server).chain((0..self.num_clients).map(Role::Client))
    }
}
