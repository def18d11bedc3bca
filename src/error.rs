use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), HarnessError>`].
///
/// Detected anomalies in a log are never errors: they end up as issues inside the report.
/// A `HarnessError` means the harness itself could not do its job (bad configuration,
/// unwritable output directory, engine binary missing, ...).
///
/// [`Result<(), HarnessError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HarnessError {
    /// A configuration value was rejected by validation.
    InvalidConfig {
        /// Further specifies why the configuration was invalid.
        info: String,
    },
    /// A filesystem operation failed.
    Io {
        /// What was being attempted and the underlying error text.
        context: String,
    },
    /// The log directory handed to the analyzer does not exist.
    LogDirMissing {
        /// The directory that was looked up.
        dir: String,
    },
    /// The log directory exists but holds no file matching the pattern.
    NoLogFiles {
        /// The directory that was searched.
        dir: String,
        /// The glob pattern that matched nothing.
        pattern: String,
    },
    /// No engine executable was given and none could be found.
    EngineNotFound,
    /// An engine process could not be started.
    Spawn {
        /// The role of the process (`server`, `client_0`, ...).
        role: String,
        /// The underlying error text.
        context: String,
    },
    /// Serialization or deserialization of a report or scenario failed.
    Serialization {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
}

impl HarnessError {
    pub(crate) fn io(what: impl Display, err: &std::io::Error) -> Self {
        Self::Io {
            context: format!("{}: {}", what, err),
        }
    }

    pub(crate) fn invalid_config(info: impl Into<String>) -> Self {
        Self::InvalidConfig { info: info.into() }
    }
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            },
            Self::Io { context } => {
                write!(f, "I/O error: {}", context)
            },
            Self::LogDirMissing { dir } => {
                write!(f, "Log directory not found: {}", dir)
            },
            Self::NoLogFiles { dir, pattern } => {
                write!(f, "No log files matching '{}' found in {}", pattern, dir)
            },
            Self::EngineNotFound => {
                write!(
                    f,
                    "Engine executable not found. Please set GODOT_PATH or pass --engine."
                )
            },
            Self::Spawn { role, context } => {
                write!(f, "Failed to start {}: {}", role, context)
            },
            Self::Serialization { context } => {
                write!(f, "Serialization error: {}", context)
            },
        }
    }
}

impl Error for HarnessError {}
