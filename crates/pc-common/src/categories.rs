//! Process category taxonomy.
//!
//! Every command name is resolved once per snapshot into one of these
//! categories through the policy's pattern tables. The classifier, scorer and
//! policy controller reason about categories, never about raw name literals.
//!
//! Categories fall into three groups:
//! - Interactive / developer-critical: never terminated by the engine
//!   (`SystemCritical`, `Editor`, `Terminal`, `Shell`, `Runtime`, `Vcs`,
//!   `Container`, `RemoteSession`)
//! - Non-critical but resource-heavy: eligible for automatic termination
//!   (`Browser`, `Communication`, `CloudSync`, `Media`)
//! - Background helpers: indexing, sync and telemetry daemons that raise the
//!   cleanup score (`BackgroundHelper`)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Category of a process, resolved from its command name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessCategory {
    /// OS services the desktop cannot live without: launchd, WindowServer, systemd
    SystemCritical,
    /// Editors/IDEs: code, vim, nvim, emacs, Xcode, IntelliJ family
    Editor,
    /// Terminal emulators: Terminal, iTerm, Alacritty, kitty, WezTerm
    Terminal,
    /// Interactive shells and multiplexers: bash, zsh, fish, tmux
    Shell,
    /// Language runtimes and toolchains: node, python, java, cargo, rustc
    Runtime,
    /// Version control: git, gh
    Vcs,
    /// Container and cluster tools: docker, kubectl, podman
    Container,
    /// Remote sessions: ssh, sshd, mosh
    RemoteSession,
    /// Browser helpers and renderers
    Browser,
    /// Chat and collaboration helpers: Slack, Discord, Teams, Zoom
    Communication,
    /// Cloud-sync helpers: Dropbox, Google Drive, OneDrive
    CloudSync,
    /// Media players and their helpers
    Media,
    /// Non-essential background helpers: indexing, analytics, crash reporting
    BackgroundHelper,
    /// Nothing matched
    Unknown,
}

impl ProcessCategory {
    /// Get all category variants in declaration order.
    pub fn all() -> &'static [ProcessCategory] {
        &[
            ProcessCategory::SystemCritical,
            ProcessCategory::Editor,
            ProcessCategory::Terminal,
            ProcessCategory::Shell,
            ProcessCategory::Runtime,
            ProcessCategory::Vcs,
            ProcessCategory::Container,
            ProcessCategory::RemoteSession,
            ProcessCategory::Browser,
            ProcessCategory::Communication,
            ProcessCategory::CloudSync,
            ProcessCategory::Media,
            ProcessCategory::BackgroundHelper,
            ProcessCategory::Unknown,
        ]
    }

    /// Get human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ProcessCategory::SystemCritical => "system_critical",
            ProcessCategory::Editor => "editor",
            ProcessCategory::Terminal => "terminal",
            ProcessCategory::Shell => "shell",
            ProcessCategory::Runtime => "runtime",
            ProcessCategory::Vcs => "vcs",
            ProcessCategory::Container => "container",
            ProcessCategory::RemoteSession => "remote_session",
            ProcessCategory::Browser => "browser",
            ProcessCategory::Communication => "communication",
            ProcessCategory::CloudSync => "cloud_sync",
            ProcessCategory::Media => "media",
            ProcessCategory::BackgroundHelper => "background_helper",
            ProcessCategory::Unknown => "unknown",
        }
    }

    /// Parse a category from its snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Self::all().iter().copied().find(|c| c.name() == wanted)
    }

    /// Categories the default never-kill table draws from.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            ProcessCategory::SystemCritical
                | ProcessCategory::Editor
                | ProcessCategory::Terminal
                | ProcessCategory::Shell
                | ProcessCategory::Runtime
                | ProcessCategory::Vcs
                | ProcessCategory::Container
                | ProcessCategory::RemoteSession
        )
    }
}

impl Default for ProcessCategory {
    fn default() -> Self {
        ProcessCategory::Unknown
    }
}

impl std::fmt::Display for ProcessCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProcessCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown process category: {s}"))
    }
}
