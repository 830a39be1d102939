//! Policy configuration types.
//!
//! A policy is the explicit configuration struct every cleanup pass receives:
//! operating mode, activation thresholds, the never-kill / allowlist /
//! background-helper / safe-sweep pattern tables, scoring caps and guardrails.
//! Every field has a default so a minimal `policy.json` only needs
//! `schema_version` and whatever it wants to override.

use pc_common::ProcessCategory;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Complete policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    pub schema_version: String,

    #[serde(default)]
    pub policy_id: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Active operating mode.
    #[serde(default)]
    pub mode: PolicyMode,

    /// System-wide activation thresholds per mode.
    #[serde(default)]
    pub thresholds: ModeThresholds,

    /// Per-process CPU gate for killability, per mode.
    #[serde(default)]
    pub individual_cpu_threshold: IndividualCpuThresholds,

    /// Protected name fragments, evaluated in order.
    #[serde(default = "default_never_kill")]
    pub never_kill: Vec<PatternEntry>,

    /// Non-critical but resource-heavy processes eligible for termination.
    #[serde(default = "default_allowlist")]
    pub allowlist: Vec<PatternEntry>,

    /// Known non-essential helpers that receive the category weight.
    #[serde(default = "default_background_helpers")]
    pub background_helpers: Vec<PatternEntry>,

    /// Helpers terminated on every pass regardless of score.
    #[serde(default = "default_safe_sweep")]
    pub safe_sweep: Vec<PatternEntry>,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub guardrails: Guardrails,

    #[serde(default)]
    pub matching: Matching,

    #[serde(default)]
    pub notes: Option<String>,
}

/// Operating mode of the policy controller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Never auto-runs; explicit forced passes still work.
    #[default]
    Off,
    Conservative,
    Balanced,
    Aggressive,
}

impl PolicyMode {
    pub fn all() -> &'static [PolicyMode] {
        &[
            PolicyMode::Off,
            PolicyMode::Conservative,
            PolicyMode::Balanced,
            PolicyMode::Aggressive,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Off => "off",
            PolicyMode::Conservative => "conservative",
            PolicyMode::Balanced => "balanced",
            PolicyMode::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        PolicyMode::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| {
                format!("unknown mode '{s}' (expected off, conservative, balanced or aggressive)")
            })
    }
}

/// CPU / memory activation pair. A pass runs when either is strictly exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdPair {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Activation thresholds for every mode except `Off`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModeThresholds {
    pub conservative: ThresholdPair,
    pub balanced: ThresholdPair,
    pub aggressive: ThresholdPair,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            conservative: ThresholdPair {
                cpu_percent: 90.0,
                memory_percent: 95.0,
            },
            balanced: ThresholdPair {
                cpu_percent: 70.0,
                memory_percent: 85.0,
            },
            aggressive: ThresholdPair {
                cpu_percent: 50.0,
                memory_percent: 70.0,
            },
        }
    }
}

impl ModeThresholds {
    /// Threshold pair for a mode; `Off` has none.
    pub fn for_mode(&self, mode: PolicyMode) -> Option<ThresholdPair> {
        match mode {
            PolicyMode::Off => None,
            PolicyMode::Conservative => Some(self.conservative),
            PolicyMode::Balanced => Some(self.balanced),
            PolicyMode::Aggressive => Some(self.aggressive),
        }
    }

    pub(crate) fn pairs_mut(&mut self) -> [(&'static str, &mut ThresholdPair); 3] {
        [
            ("conservative", &mut self.conservative),
            ("balanced", &mut self.balanced),
            ("aggressive", &mut self.aggressive),
        ]
    }
}

/// Individual high-CPU gate used by `is_killable`.
///
/// `off` applies to manual passes forced while the mode is `Off`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndividualCpuThresholds {
    pub off: f64,
    pub conservative: f64,
    pub balanced: f64,
    pub aggressive: f64,
}

impl Default for IndividualCpuThresholds {
    fn default() -> Self {
        Self {
            off: 20.0,
            conservative: 30.0,
            balanced: 30.0,
            aggressive: 20.0,
        }
    }
}

impl IndividualCpuThresholds {
    pub fn for_mode(&self, mode: PolicyMode) -> f64 {
        match mode {
            PolicyMode::Off => self.off,
            PolicyMode::Conservative => self.conservative,
            PolicyMode::Balanced => self.balanced,
            PolicyMode::Aggressive => self.aggressive,
        }
    }

    pub(crate) fn values_mut(&mut self) -> [(&'static str, &mut f64); 4] {
        [
            ("off", &mut self.off),
            ("conservative", &mut self.conservative),
            ("balanced", &mut self.balanced),
            ("aggressive", &mut self.aggressive),
        ]
    }
}

/// One entry of a pattern table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternEntry {
    pub pattern: String,

    #[serde(default = "default_pattern_kind")]
    pub kind: PatternKind,

    #[serde(default)]
    pub category: ProcessCategory,

    #[serde(default)]
    pub notes: Option<String>,
}

impl PatternEntry {
    pub fn new(pattern: &str, kind: PatternKind, category: ProcessCategory) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind,
            category,
            notes: None,
        }
    }

    /// Case-insensitive substring entry.
    pub fn literal(pattern: &str, category: ProcessCategory) -> Self {
        Self::new(pattern, PatternKind::Literal, category)
    }
}

fn default_pattern_kind() -> PatternKind {
    PatternKind::Literal
}

/// How a pattern entry matches a command name. Matching is always
/// case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Substring of the command (exact name when `matching.mode = exact`).
    Literal,
    /// Whole command name.
    Exact,
    /// Regular expression searched anywhere in the command.
    Regex,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Exact => "exact",
            Self::Regex => "regex",
        }
    }
}

/// Scoring normalization caps and category weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoringConfig {
    /// Descriptor count that maps to a full fd term.
    pub fd_cap: u32,
    /// Age that maps to a full age term.
    pub age_cap_seconds: u64,
    /// Category weight for recognized background helpers, 0-100.
    pub helper_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fd_cap: 256,
            age_cap_seconds: 86_400,
            helper_weight: 100.0,
        }
    }
}

/// Safety limits applied to every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Guardrails {
    /// Scored-tier terminations allowed per pass.
    pub max_terminations_per_pass: u32,
    /// Delay between the graceful and the forced signal.
    pub grace_ms: u64,
    /// Quiet period after a pass that terminated something.
    pub cooldown_seconds: u64,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            max_terminations_per_pass: 10,
            grace_ms: 1000,
            cooldown_seconds: 180,
        }
    }
}

/// Global matching behaviour for `literal` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Matching {
    #[serde(default)]
    pub mode: MatchingMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchingMode {
    #[default]
    Substring,
    Exact,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            policy_id: None,
            description: None,
            mode: PolicyMode::default(),
            thresholds: ModeThresholds::default(),
            individual_cpu_threshold: IndividualCpuThresholds::default(),
            never_kill: default_never_kill(),
            allowlist: default_allowlist(),
            background_helpers: default_background_helpers(),
            safe_sweep: default_safe_sweep(),
            scoring: ScoringConfig::default(),
            guardrails: Guardrails::default(),
            matching: Matching::default(),
            notes: None,
        }
    }
}

impl Policy {
    /// Load policy from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::validate::ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::validate::ValidationError::IoError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_json(&content)
    }

    /// Parse policy from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self, crate::validate::ValidationError> {
        serde_json::from_str(json).map_err(|e| {
            crate::validate::ValidationError::ParseError(format!("Invalid JSON: {}", e))
        })
    }

    /// Activation thresholds for the active mode.
    pub fn active_thresholds(&self) -> Option<ThresholdPair> {
        self.thresholds.for_mode(self.mode)
    }

    /// Copy of this policy with a different mode.
    pub fn with_mode(mut self, mode: PolicyMode) -> Self {
        self.mode = mode;
        self
    }
}

use PatternKind::{Exact, Literal, Regex};
use ProcessCategory as C;

const NEVER_KILL: &[(&str, PatternKind, ProcessCategory)] = &[
    // OS services
    ("kernel_task", Literal, C::SystemCritical),
    ("launchd", Literal, C::SystemCritical),
    ("systemd", Literal, C::SystemCritical),
    ("SystemUIServer", Literal, C::SystemCritical),
    ("Finder", Literal, C::SystemCritical),
    ("Dock", Exact, C::SystemCritical),
    ("loginwindow", Literal, C::SystemCritical),
    ("WindowServer", Literal, C::SystemCritical),
    ("coreaudiod", Literal, C::SystemCritical),
    ("cfprefsd", Literal, C::SystemCritical),
    ("securityd", Literal, C::SystemCritical),
    ("mds", Exact, C::SystemCritical),
    ("fseventsd", Literal, C::SystemCritical),
    ("syslogd", Literal, C::SystemCritical),
    ("configd", Literal, C::SystemCritical),
    // Editors and IDEs
    ("code", Exact, C::Editor),
    (r"Code$", Regex, C::Editor),
    ("Code Helper", Literal, C::Editor),
    ("Code - Insiders", Literal, C::Editor),
    ("code-server", Literal, C::Editor),
    ("cursor", Literal, C::Editor),
    ("IntelliJ", Literal, C::Editor),
    ("WebStorm", Literal, C::Editor),
    ("PyCharm", Literal, C::Editor),
    ("GoLand", Literal, C::Editor),
    ("CLion", Literal, C::Editor),
    ("Xcode", Literal, C::Editor),
    ("Android Studio", Literal, C::Editor),
    ("Sublime", Literal, C::Editor),
    ("vim", Literal, C::Editor),
    ("emacs", Literal, C::Editor),
    ("nano", Exact, C::Editor),
    ("rust-analyzer", Literal, C::Editor),
    ("gopls", Literal, C::Editor),
    ("typescript-language", Literal, C::Editor),
    ("electron", Literal, C::Editor),
    // Coding assistants
    ("claude", Literal, C::Editor),
    ("copilot", Literal, C::Editor),
    // Terminal emulators
    ("Terminal", Literal, C::Terminal),
    ("iTerm", Literal, C::Terminal),
    ("Alacritty", Literal, C::Terminal),
    ("kitty", Literal, C::Terminal),
    ("WezTerm", Literal, C::Terminal),
    ("Warp", Exact, C::Terminal),
    ("gnome-terminal", Literal, C::Terminal),
    ("konsole", Literal, C::Terminal),
    // Shells and multiplexers
    (r"^(ba|z|da|k|tc|c|fi)?sh$", Regex, C::Shell),
    ("tmux", Literal, C::Shell),
    ("screen", Exact, C::Shell),
    // Runtimes and toolchains
    (r"^node$", Regex, C::Runtime),
    ("npm", Literal, C::Runtime),
    ("yarn", Literal, C::Runtime),
    ("pnpm", Literal, C::Runtime),
    (r"^bunx?$", Regex, C::Runtime),
    (r"^python[23]?(\.\d+)?$", Regex, C::Runtime),
    ("ruby", Literal, C::Runtime),
    (r"^java$", Regex, C::Runtime),
    ("gradle", Literal, C::Runtime),
    ("cargo", Literal, C::Runtime),
    ("rustc", Literal, C::Runtime),
    ("rustup", Literal, C::Runtime),
    (r"^go$", Regex, C::Runtime),
    ("postgres", Literal, C::Runtime),
    ("mysqld", Literal, C::Runtime),
    ("redis-server", Literal, C::Runtime),
    ("mongod", Literal, C::Runtime),
    ("nginx", Literal, C::Runtime),
    ("apache", Literal, C::Runtime),
    ("httpd", Exact, C::Runtime),
    // Version control
    (r"^git(-.*)?$", Regex, C::Vcs),
    (r"^gh$", Regex, C::Vcs),
    // Containers
    ("docker", Literal, C::Container),
    ("containerd", Literal, C::Container),
    ("kubectl", Literal, C::Container),
    ("podman", Literal, C::Container),
    ("helm", Exact, C::Container),
    ("terraform", Literal, C::Container),
    // Remote sessions
    (r"^sshd?$", Regex, C::RemoteSession),
    ("mosh", Literal, C::RemoteSession),
];

const ALLOWLIST: &[(&str, PatternKind, ProcessCategory)] = &[
    ("Chrome Helper", Literal, C::Browser),
    ("Safari Web Content", Literal, C::Browser),
    ("Safari Networking", Literal, C::Browser),
    ("firefox", Literal, C::Browser),
    ("Brave Browser", Literal, C::Browser),
    ("Microsoft Edge", Literal, C::Browser),
    ("Arc Helper", Literal, C::Browser),
    ("chromium", Literal, C::Browser),
    ("Slack Helper", Literal, C::Communication),
    ("Discord Helper", Literal, C::Communication),
    ("Teams", Literal, C::Communication),
    ("WhatsApp", Literal, C::Communication),
    ("Telegram", Literal, C::Communication),
    ("zoom", Literal, C::Communication),
    ("Dropbox", Literal, C::CloudSync),
    ("Google Drive", Literal, C::CloudSync),
    ("OneDrive", Literal, C::CloudSync),
    ("Box Sync", Literal, C::CloudSync),
];

const BACKGROUND_HELPERS: &[(&str, PatternKind, ProcessCategory)] = &[
    ("mds_stores", Literal, C::BackgroundHelper),
    ("photoanalysisd", Literal, C::BackgroundHelper),
    ("photolibraryd", Literal, C::BackgroundHelper),
    ("mediaanalysisd", Literal, C::BackgroundHelper),
    ("suggestd", Literal, C::BackgroundHelper),
    ("ReportCrash", Literal, C::BackgroundHelper),
    ("spindump", Literal, C::BackgroundHelper),
    ("tailspind", Literal, C::BackgroundHelper),
    ("analyticsd", Literal, C::BackgroundHelper),
    ("diagnosticd", Literal, C::BackgroundHelper),
    ("tracker-miner", Literal, C::BackgroundHelper),
    ("baloo_file", Literal, C::BackgroundHelper),
    ("Spotify Helper", Literal, C::Media),
];

const SAFE_SWEEP: &[(&str, PatternKind, ProcessCategory)] = &[
    ("photoanalysisd", Exact, C::BackgroundHelper),
    ("mediaanalysisd", Exact, C::BackgroundHelper),
    ("ReportCrash", Exact, C::BackgroundHelper),
    ("spindump", Exact, C::BackgroundHelper),
    ("tailspind", Exact, C::BackgroundHelper),
];

fn table(rows: &[(&str, PatternKind, ProcessCategory)]) -> Vec<PatternEntry> {
    rows.iter()
        .map(|(pattern, kind, category)| PatternEntry::new(pattern, *kind, *category))
        .collect()
}

pub fn default_never_kill() -> Vec<PatternEntry> {
    table(NEVER_KILL)
}

pub fn default_allowlist() -> Vec<PatternEntry> {
    table(ALLOWLIST)
}

pub fn default_background_helpers() -> Vec<PatternEntry> {
    table(BACKGROUND_HELPERS)
}

pub fn default_safe_sweep() -> Vec<PatternEntry> {
    table(SAFE_SWEEP)
}
