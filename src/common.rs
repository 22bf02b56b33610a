//! Types needed in multiple modules

use serde::{Deserialize, Serialize};

/// Custom error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid parameter error (precondition on a range or shape violated)
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
    /// Resource exhausted error (a fixed capacity would be exceeded)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Operation needs state that has not been set up yet
    #[error("Not initialized: {0}")]
    NotInitialized(String),
    /// Iterative procedure did not reach its goal
    #[error("Convergence failure: {0}")]
    Convergence(String),
    /// Unsupported variant or option
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// File read/write error
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// CSV write error
    #[error("{0}")]
    Csv(#[from] csv::Error),
    /// Serde read/write error
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

/// Verbosity threshold carried by each codec and driver instance
///
/// Variants are ordered from quietest to most verbose, so that an instance configured with level
/// `L` emits an event of level `E` if and only if `E <= L` (and `E` is not `Off`).
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No events
    Off,
    /// Errors only
    Error,
    /// Errors and warnings
    #[default]
    Warn,
    /// Errors, warnings and progress information
    Info,
    /// Everything, including per-packet and per-iteration detail
    Debug,
}

impl LogLevel {
    /// Returns `true` if an event of level `event` passes this threshold.
    #[must_use]
    pub fn allows(self, event: LogLevel) -> bool {
        event != LogLevel::Off && event <= self
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(Error::Unsupported(format!("Unknown log level \"{s}\""))),
        }
    }
}

#[cfg(test)]
mod tests_of_log_level {
    use super::*;

    #[test]
    fn test_allows() {
        assert!(!LogLevel::Off.allows(LogLevel::Error));
        assert!(LogLevel::Warn.allows(LogLevel::Error));
        assert!(LogLevel::Warn.allows(LogLevel::Warn));
        assert!(!LogLevel::Warn.allows(LogLevel::Info));
        assert!(LogLevel::Debug.allows(LogLevel::Info));
        assert!(!LogLevel::Debug.allows(LogLevel::Off));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }
}
