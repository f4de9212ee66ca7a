//! Configuration types and utilities

use crate::error::DebuggerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_REPLY_TIMEOUT: &str = "WIRETAP_REPLY_TIMEOUT";
pub const ENV_MAX_DELAY_MS: &str = "WIRETAP_MAX_DELAY_MS";

/// Engine settings chosen by the embedding application.
/// These are fixed for the lifetime of a debugger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerSettings {
    /// Upper bound for waiting on a debugger decision, in seconds.
    /// 0 waits until the decision arrives or the connection drops.
    pub reply_timeout_secs: u64,
    /// Clamp applied to every delay the debugger configures, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for DebuggerSettings {
    fn default() -> Self {
        Self {
            reply_timeout_secs: 300,
            max_delay_ms: 60_000,
        }
    }
}

impl DebuggerSettings {
    pub fn reply_timeout(&self) -> Option<Duration> {
        match self.reply_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Read settings from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DebuggerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DebuggerError::Configuration(format!("Invalid settings file {}: {}", path.display(), e)))
    }

    /// Apply `WIRETAP_*` environment overrides on top of `self`
    pub fn with_env_overrides(mut self) -> Result<Self, DebuggerError> {
        if let Some(value) = env_u64(ENV_REPLY_TIMEOUT)? {
            self.reply_timeout_secs = value;
        }
        if let Some(value) = env_u64(ENV_MAX_DELAY_MS)? {
            self.max_delay_ms = value;
        }
        Ok(self)
    }

    /// Defaults, then the optional settings file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, DebuggerError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, DebuggerError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| DebuggerError::Configuration(format!("{} must be a non-negative integer: {}", name, e))),
        Err(_) => Ok(None),
    }
}
