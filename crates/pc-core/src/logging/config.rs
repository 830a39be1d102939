//! Logging configuration.
//!
//! Sources, lowest to highest precedence: defaults, `RUST_LOG`, `PC_LOG`,
//! `PC_LOG_FORMAT`, then CLI flags (`-v`, `-q`, `--format`).

use serde::{Deserialize, Serialize};

/// Environment variable naming the log level.
pub const ENV_LOG_LEVEL: &str = "PC_LOG";
/// Environment variable naming the log format.
pub const ENV_LOG_FORMAT: &str = "PC_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines on stderr.
    #[default]
    Human,
    /// One JSON object per line on stderr.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "console" | "text" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

/// Minimum level that gets emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Level after applying `-v` (more verbose) and `-q` (quieter) counts.
    pub fn adjusted(self, verbose: u8, quiet: bool) -> LogLevel {
        if quiet {
            return LogLevel::Error;
        }
        match verbose {
            0 => self,
            1 => self.min(LogLevel::Debug),
            _ => LogLevel::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        })
    }
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        use tracing_subscriber::filter::LevelFilter;
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Timestamps in human output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Build from the environment, then apply CLI overrides.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        let pc_log = std::env::var(ENV_LOG_LEVEL).ok();
        let rust_log = std::env::var("RUST_LOG").ok();
        let format = std::env::var(ENV_LOG_FORMAT).ok();
        Self::from_sources(
            pc_log.as_deref(),
            rust_log.as_deref(),
            format.as_deref(),
            cli_level,
            cli_format,
        )
    }

    fn from_sources(
        pc_log: Option<&str>,
        rust_log: Option<&str>,
        format: Option<&str>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let mut config = LogConfig::default();

        if let Some(level) = pc_log.and_then(|v| v.parse().ok()) {
            config.level = level;
        } else if let Some(level) = rust_log.and_then(level_from_rust_log) {
            config.level = level;
        }

        if let Some(fmt) = format.and_then(|v| v.parse().ok()) {
            config.format = fmt;
        }

        if let Some(level) = cli_level {
            config.level = level;
        }
        if let Some(fmt) = cli_format {
            config.format = fmt;
        }
        config
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Take the most verbose bare level mentioned in a RUST_LOG directive list.
fn level_from_rust_log(value: &str) -> Option<LogLevel> {
    value
        .split(',')
        .filter_map(|directive| {
            let level = directive.rsplit('=').next()?;
            level.parse::<LogLevel>().ok()
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_and_level() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("Human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
    }

    #[test]
    fn test_pc_log_beats_rust_log() {
        let config = LogConfig::from_sources(Some("warn"), Some("debug"), None, None, None);
        assert_eq!(config.level, LogLevel::Warn);
    }

    #[test]
    fn test_rust_log_directives() {
        let config =
            LogConfig::from_sources(None, Some("hyper=warn,pc_core=debug"), None, None, None);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(level_from_rust_log("garbage"), None);
    }

    #[test]
    fn test_cli_overrides_env() {
        let config = LogConfig::from_sources(
            Some("trace"),
            None,
            Some("human"),
            Some(LogLevel::Error),
            Some(LogFormat::Jsonl),
        );
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn test_verbosity_adjustment() {
        assert_eq!(LogLevel::Info.adjusted(0, false), LogLevel::Info);
        assert_eq!(LogLevel::Info.adjusted(1, false), LogLevel::Debug);
        assert_eq!(LogLevel::Info.adjusted(2, false), LogLevel::Trace);
        assert_eq!(LogLevel::Trace.adjusted(1, false), LogLevel::Trace);
        assert_eq!(LogLevel::Debug.adjusted(3, true), LogLevel::Error);
    }
}
