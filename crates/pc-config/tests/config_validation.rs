//! Configuration loading, resolution and validation against real files.

use pc_config::resolve::{resolve_config, ConfigSource, ENV_CONFIG_DIR, ENV_POLICY_PATH};
use pc_config::validate::ValidationError;
use pc_config::{load_policy, MatchingMode, PolicyMode};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys.iter().map(|k| env::var(k).ok()).collect();
        for key in keys {
            env::remove_var(key);
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.keys.iter().zip(&self.saved) {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock poisoned");
    f()
}

fn write_policy(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create policy parent");
    }
    fs::write(path, body).expect("write policy");
}

const BALANCED: &str = r#"{ "schema_version": "1.0.0", "mode": "balanced" }"#;
const AGGRESSIVE: &str = r#"{ "schema_version": "1.0.0", "mode": "aggressive" }"#;

#[test]
fn test_load_valid_policy_file() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("policy.json");
    write_policy(
        &path,
        r#"{
            "schema_version": "1.0.0",
            "mode": "aggressive",
            "matching": { "mode": "exact" },
            "allowlist": [ { "pattern": "helper", "category": "browser" } ],
            "guardrails": {
                "max_terminations_per_pass": 3,
                "grace_ms": 500,
                "cooldown_seconds": 60
            }
        }"#,
    );

    let loaded = load_policy(Some(&path)).expect("valid policy loads");
    assert_eq!(loaded.policy.mode, PolicyMode::Aggressive);
    assert_eq!(loaded.policy.matching.mode, MatchingMode::Exact);
    assert_eq!(loaded.policy.allowlist.len(), 1);
    assert_eq!(loaded.policy.guardrails.max_terminations_per_pass, 3);
    assert!(loaded.clamped.is_empty());
    assert_eq!(loaded.snapshot.policy_source, "CLI argument");
    assert!(loaded.snapshot.policy_hash.is_some());
}

#[test]
fn test_out_of_range_thresholds_are_clamped_not_rejected() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("policy.json");
    write_policy(
        &path,
        r#"{
            "schema_version": "1.0.0",
            "mode": "balanced",
            "thresholds": {
                "conservative": { "cpu_percent": 90, "memory_percent": 95 },
                "balanced": { "cpu_percent": 250, "memory_percent": -10 },
                "aggressive": { "cpu_percent": 50, "memory_percent": 70 }
            }
        }"#,
    );

    let loaded = load_policy(Some(&path)).expect("clamped policy loads");
    let pair = loaded.policy.active_thresholds().expect("balanced has thresholds");
    assert_eq!(pair.cpu_percent, 100.0);
    assert_eq!(pair.memory_percent, 0.0);
    assert_eq!(loaded.clamped.len(), 2);
}

#[test]
fn test_invalid_regex_is_rejected() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("policy.json");
    write_policy(
        &path,
        r#"{
            "schema_version": "1.0.0",
            "never_kill": [ { "pattern": "[unclosed", "kind": "regex", "category": "editor" } ]
        }"#,
    );

    let err = load_policy(Some(&path)).expect_err("bad regex must fail");
    assert!(matches!(err, ValidationError::InvalidValue { .. }));
}

#[test]
fn test_unknown_mode_is_a_parse_error() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("policy.json");
    write_policy(&path, r#"{ "schema_version": "1.0.0", "mode": "turbo" }"#);

    let err = load_policy(Some(&path)).expect_err("unknown mode must fail");
    assert!(matches!(err, ValidationError::ParseError(_)));
}

#[test]
fn test_missing_cli_file_is_io_error() {
    let err = load_policy(Some(Path::new("/nonexistent/pc/policy.json")))
        .expect_err("missing file must fail");
    assert!(matches!(err, ValidationError::IoError(_)));
}

#[test]
fn test_resolve_env_over_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&[ENV_POLICY_PATH, ENV_CONFIG_DIR]);

        let temp = TempDir::new().expect("temp dir");
        let env_file = temp.path().join("env").join("policy.json");
        let dir_file = temp.path().join("dir").join("policy.json");
        write_policy(&env_file, AGGRESSIVE);
        write_policy(&dir_file, BALANCED);

        env::set_var(ENV_POLICY_PATH, env_file.display().to_string());
        env::set_var(ENV_CONFIG_DIR, temp.path().join("dir").display().to_string());

        let paths = resolve_config(None);
        assert_eq!(paths.policy_source, ConfigSource::Environment);
        assert_eq!(paths.policy.as_deref(), Some(env_file.as_path()));

        let loaded = load_policy(None).expect("env policy loads");
        assert_eq!(loaded.policy.mode, PolicyMode::Aggressive);
    });
}

#[test]
fn test_resolve_config_dir_when_env_path_missing() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&[ENV_POLICY_PATH, ENV_CONFIG_DIR]);

        let temp = TempDir::new().expect("temp dir");
        let dir_file = temp.path().join("policy.json");
        write_policy(&dir_file, BALANCED);

        env::set_var(ENV_POLICY_PATH, temp.path().join("missing.json"));
        env::set_var(ENV_CONFIG_DIR, temp.path());

        let paths = resolve_config(None);
        assert_eq!(paths.policy_source, ConfigSource::Environment);
        assert_eq!(paths.policy.as_deref(), Some(dir_file.as_path()));
    });
}

#[test]
fn test_cli_beats_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&[ENV_POLICY_PATH, ENV_CONFIG_DIR]);

        let temp = TempDir::new().expect("temp dir");
        let cli_file = temp.path().join("cli.json");
        let env_file = temp.path().join("env.json");
        write_policy(&cli_file, BALANCED);
        write_policy(&env_file, AGGRESSIVE);
        env::set_var(ENV_POLICY_PATH, &env_file);

        let loaded = load_policy(Some(&cli_file)).expect("cli policy loads");
        assert_eq!(loaded.policy.mode, PolicyMode::Balanced);
        assert_eq!(loaded.snapshot.policy_source, "CLI argument");
    });
}
