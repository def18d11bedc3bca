//! Structured log line parsing.
//!
//! The engine processes under test write lines of the form
//!
//! ```text
//! [<timestamp>] [<LEVEL>] [<category>] <message> | key=value key2=value2
//! ```
//!
//! where the `| ...` metadata suffix is optional. [`parse_line`] turns one such
//! line into a [`LogRecord`]. Anything else (engine banners, stack traces,
//! blank lines) is not an error: the parser returns `None` and the caller
//! still counts the line toward the file's total.
//!
//! # Example
//!
//! ```
//! use snapshot_harness::record::{parse_line, LogLevel};
//!
//! let record = parse_line("[12.50] [WARN] [INTERPOLATOR] Buffer low | buffered=1 target=3")
//!     .expect("structured line");
//! assert_eq!(record.level, LogLevel::Warn);
//! assert_eq!(record.category, "INTERPOLATOR");
//! assert_eq!(record.message, "Buffer low");
//! assert_eq!(record.metadata.get("target").map(String::as_str), Some("3"));
//!
//! assert!(parse_line("Godot Engine v4.2.1.stable").is_none());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Grammar of a structured line. Anchored at the start only: trailing text
/// after a complete match does not make a line unstructured.
#[allow(clippy::expect_used)]
static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+\.\d+)\]\s+\[(\w+)\]\s+\[([^\]]+)\]\s+([^|]+)(?:\s*\|\s*(.+))?")
        .expect("line pattern is a valid constant regex")
});

/// Severity token of a structured line.
///
/// Matching is exact and case-sensitive, mirroring what the engine emits.
/// Tokens outside the four known levels are kept as [`LogLevel::Other`] and
/// increment no level counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// `ERROR`
    Error,
    /// `WARN`
    Warn,
    /// `INFO`
    Info,
    /// `DEBUG`
    Debug,
    /// Any other word, kept verbatim.
    Other(String),
}

impl LogLevel {
    /// Classifies a bracketed level token.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "ERROR" => Self::Error,
            "WARN" => Self::Warn,
            "INFO" => Self::Info,
            "DEBUG" => Self::Debug,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the token as it appears in a log line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Other(token) => token,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed structured log line.
///
/// Records are immutable once constructed; the accumulator reads them and
/// drops them.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Seconds since the engine process started, as printed by the engine.
    pub timestamp: f64,
    /// Severity token.
    pub level: LogLevel,
    /// Free-form subsystem label, e.g. `SERVER_SNAPSHOT`.
    pub category: String,
    /// Message text with surrounding whitespace removed.
    pub message: String,
    /// Trailing `key=value` tokens. Last occurrence of a key wins.
    pub metadata: BTreeMap<String, String>,
    /// The trimmed source line.
    pub raw: String,
}

impl LogRecord {
    /// Returns the metadata value for `key`, if present.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Renders the record back into the line grammar.
///
/// For records produced by [`parse_line`], parsing the rendered line yields
/// the same timestamp, level, category, message and metadata.
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{}` on f64 drops the fractional part of whole numbers, but the grammar requires one.
        let ts = self.timestamp.to_string();
        if ts.contains('.') {
            write!(f, "[{}]", ts)?;
        } else {
            write!(f, "[{}.0]", ts)?;
        }
        write!(f, " [{}] [{}] {}", self.level, self.category, self.message)?;
        if !self.metadata.is_empty() {
            f.write_str(" |")?;
            for (key, value) in &self.metadata {
                write!(f, " {}={}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Parses one log line.
///
/// Returns `None` for lines that do not follow the structured grammar,
/// including lines whose timestamp does not parse as a finite real number.
#[must_use]
pub fn parse_line(line: &str) -> Option<LogRecord> {
    let line = line.trim();
    let caps = LINE_PATTERN.captures(line)?;

    let timestamp = caps
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())?;
    let level = LogLevel::from_token(caps.get(2)?.as_str());
    let category = caps.get(3)?.as_str().to_owned();
    let message = caps.get(4)?.as_str().trim().to_owned();
    let metadata = caps
        .get(5)
        .map(|m| parse_metadata(m.as_str()))
        .unwrap_or_default();

    Some(LogRecord {
        timestamp,
        level,
        category,
        message,
        metadata,
        raw: line.to_owned(),
    })
}

/// Splits a metadata segment into key/value pairs.
///
/// Tokens are whitespace separated; each token splits on its first `=`.
/// Tokens without `=` are dropped.
#[must_use]
pub fn parse_metadata(segment: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for token in segment.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            metadata.insert(key.to_owned(), value.to_owned());
        }
    }
    metadata
}
