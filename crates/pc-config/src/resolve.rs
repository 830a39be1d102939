//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths → /etc → defaults.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Discovered policy file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to policy.json (or None if not found).
    pub policy: Option<PathBuf>,

    /// Source of the policy config (for diagnostics).
    pub policy_source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/process-cleanup/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_POLICY_PATH: &str = "PC_POLICY";
pub const ENV_CONFIG_DIR: &str = "PC_CONFIG_DIR";

/// Standard config file name.
const POLICY_FILENAME: &str = "policy.json";

/// Application name for XDG directories.
const APP_NAME: &str = "process-cleanup";

/// Resolve the policy path using the standard resolution order.
///
/// 1. Explicit CLI path (used even if missing, so the load reports it)
/// 2. `PC_POLICY`
/// 3. `PC_CONFIG_DIR` + policy.json
/// 4. XDG config directory (~/.config/process-cleanup/)
/// 5. System config (/etc/process-cleanup/)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_policy: Option<&Path>) -> ConfigPaths {
    if let Some(path) = cli_policy {
        return ConfigPaths {
            policy: Some(path.to_path_buf()),
            policy_source: ConfigSource::CliArgument,
        };
    }

    if let Ok(env_path) = std::env::var(ENV_POLICY_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(POLICY_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(POLICY_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::XdgConfig);
        }
    }

    let system_path = system_config_dir().join(POLICY_FILENAME);
    if system_path.exists() {
        return found(system_path, ConfigSource::SystemConfig);
    }

    ConfigPaths::default()
}

fn found(path: PathBuf, source: ConfigSource) -> ConfigPaths {
    ConfigPaths {
        policy: Some(path),
        policy_source: source,
    }
}

/// Get the XDG config directory for process-cleanup.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
