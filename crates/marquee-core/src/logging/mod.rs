//! Logging setup on top of `tracing`.
//!
//! - [`LogLevel`]: the verbosity selector callers pass with each operation
//! - [`init_subscriber`]: installs the global stderr subscriber
//! - [`capture_logs`]: in-thread event capture for tests

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Verbosity selector for an operation.
///
/// Has no behavioral effect beyond how much is logged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including forwarded browser console output.
    Verbose = 10,
    /// Progress and outcomes.
    #[default]
    Info = 20,
    /// Non-fatal issues.
    Warn = 30,
    /// Errors only.
    Error = 40,
}

impl LogLevel {
    /// Whether a message at `level` should be shown when running at `self`.
    pub fn is_enabled(self, level: LogLevel) -> bool {
        level >= self
    }

    /// `tracing` filter directive matching this level.
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Verbose => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Convert from string (case-insensitive); unknown values map to `Info`.
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Self::Info)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verbose => write!(f, "verbose"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verbose" | "trace" | "debug" => Ok(Self::Verbose),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_subscriber(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}
