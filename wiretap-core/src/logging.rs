use crate::error::DebuggerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for applications embedding the debugger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to enable JSON formatted logs
    pub json_format: bool,

    /// Whether to include thread names in logs
    pub include_thread_names: bool,

    /// Whether to include file and line number information
    pub include_file_info: bool,

    /// Whether to enable colored output (stdout only)
    pub enable_colors: bool,

    /// Log file path, rotated daily. Logs go to stdout when unset.
    pub log_file: Option<PathBuf>,

    /// Module-specific log levels
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();
        module_levels.insert("wiretap_core".to_string(), "info".to_string());

        Self {
            level: "info".to_string(),
            json_format: false,
            include_thread_names: true,
            include_file_info: false,
            enable_colors: true,
            log_file: None,
            module_levels,
        }
    }
}

impl LoggingConfig {
    fn build_filter(&self) -> Result<EnvFilter, DebuggerError> {
        if !levels::is_valid_level(&self.level) {
            return Err(DebuggerError::Configuration(format!("Invalid log level: {}", self.level)));
        }

        let mut filter = EnvFilter::new(&self.level);
        for (module, level) in &self.module_levels {
            if !levels::is_valid_level(level) {
                return Err(DebuggerError::Configuration(format!("Invalid log level for {}: {}", module, level)));
            }
            let directive = format!("{}={}", module, level);
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| DebuggerError::Configuration(format!("Invalid log directive: {}", e)))?,
            );
        }
        Ok(filter)
    }
}

/// Initialize logging based on the provided configuration.
///
/// Keep the returned guard alive while logging to a file: dropping it
/// flushes and stops the background writer. Calling this again after a
/// subscriber is installed is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, DebuggerError> {
    let filter = config.build_filter()?;

    let (writer, guard) = match &config.log_file {
        Some(path) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(rolling_file_writer(path)?);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(config.include_thread_names)
        .with_file(config.include_file_info)
        .with_line_number(config.include_file_info)
        .with_ansi(config.enable_colors && config.log_file.is_none())
        .with_writer(writer);

    let result = if config.json_format {
        tracing_subscriber::registry().with(filter).with(layer.json()).try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(layer).try_init()
    };

    match result {
        Ok(()) => tracing::info!("Logging initialized with level: {}", config.level),
        Err(_) => tracing::debug!("Logging already initialized, skipping"),
    }

    Ok(guard)
}

/// Daily rolling file next to `log_file`, creating its directory. A bare
/// file name logs into the working directory.
fn rolling_file_writer(log_file: &Path) -> Result<RollingFileAppender, DebuggerError> {
    let Some(file_name) = log_file.file_name() else {
        return Err(DebuggerError::Configuration(format!(
            "Log file path {} does not name a file",
            log_file.display()
        )));
    };
    let directory = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(directory).map_err(|e| {
        DebuggerError::Configuration(format!("Cannot create log directory {}: {}", directory.display(), e))
    })?;
    Ok(RollingFileAppender::new(Rotation::DAILY, directory, file_name))
}

/// Log level utilities
pub mod levels {
    pub fn is_valid_level(level: &str) -> bool {
        matches!(level.to_lowercase().as_str(), "trace" | "debug" | "info" | "warn" | "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_format);
        assert!(config.log_file.is_none());
        assert_eq!(config.module_levels.get("wiretap_core"), Some(&"info".to_string()));
    }

    #[test]
    fn test_log_level_validation() {
        assert!(levels::is_valid_level("info"));
        assert!(levels::is_valid_level("DEBUG"));
        assert!(!levels::is_valid_level("loud"));
        assert!(!levels::is_valid_level(""));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(init_logging(&config), Err(DebuggerError::Configuration(_))));
    }

    #[test]
    fn test_invalid_module_directive_rejected() {
        let mut config = LoggingConfig::default();
        config.module_levels.insert("wiretap_core".to_string(), "loudest".to_string());
        assert!(config.build_filter().is_err());
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("wiretap.log");
        let config = LoggingConfig {
            log_file: Some(log_path),
            ..Default::default()
        };

        let guard = init_logging(&config).unwrap();
        assert!(guard.is_some());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_log_path_must_name_a_file() {
        let err = rolling_file_writer(Path::new("/")).unwrap_err();
        assert!(matches!(err, DebuggerError::Configuration(_)));
    }

    #[test]
    fn test_log_directory_creation_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = rolling_file_writer(&blocker.join("wiretap.log")).unwrap_err();
        assert!(err.to_string().contains("Cannot create log directory"));
    }
}
