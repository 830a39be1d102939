//! Compiled pattern tables and category resolution.
//!
//! Every policy table is compiled once per policy. Callers ask the table
//! questions ("is this never-kill?", "which category?") instead of matching
//! raw strings themselves.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use pc_common::ProcessCategory;
use pc_config::{MatchingMode, PatternEntry, PatternKind, Policy};

/// Errors compiling a pattern table.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern in {table}: {pattern:?}: {message}")]
    InvalidPattern {
        table: &'static str,
        pattern: String,
        message: String,
    },
}

impl From<PatternError> for pc_common::Error {
    fn from(err: PatternError) -> Self {
        pc_common::Error::ConfigurationInvalid(err.to_string())
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Lowercased needle, case-insensitive substring.
    Contains(String),
    /// Lowercased name, case-insensitive equality.
    Equals(String),
    Regex(Regex),
}

/// One compiled pattern entry.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub original: String,
    pub kind: PatternKind,
    pub category: ProcessCategory,
    matcher: Matcher,
}

impl CompiledPattern {
    /// Compile an entry. In exact matching mode, literal entries compare
    /// the whole name rather than searching for a substring.
    pub fn compile(
        table: &'static str,
        entry: &PatternEntry,
        mode: MatchingMode,
    ) -> Result<Self, PatternError> {
        let matcher = match (entry.kind, mode) {
            (PatternKind::Literal, MatchingMode::Substring) => {
                Matcher::Contains(entry.pattern.to_lowercase())
            }
            (PatternKind::Literal, MatchingMode::Exact) | (PatternKind::Exact, _) => {
                Matcher::Equals(entry.pattern.to_lowercase())
            }
            (PatternKind::Regex, _) => {
                let regex = RegexBuilder::new(&entry.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| PatternError::InvalidPattern {
                        table,
                        pattern: entry.pattern.clone(),
                        message: e.to_string(),
                    })?;
                Matcher::Regex(regex)
            }
        };

        Ok(CompiledPattern {
            original: entry.pattern.clone(),
            kind: entry.kind,
            category: entry.category,
            matcher,
        })
    }

    /// An empty command never matches.
    pub fn matches(&self, command: &str) -> bool {
        if command.is_empty() {
            return false;
        }
        match &self.matcher {
            Matcher::Contains(needle) => command.to_lowercase().contains(needle.as_str()),
            Matcher::Equals(name) => command.to_lowercase() == *name,
            Matcher::Regex(re) => re.is_match(command),
        }
    }
}

/// The four policy tables, compiled.
#[derive(Debug, Clone)]
pub struct PatternTable {
    never_kill: Vec<CompiledPattern>,
    allowlist: Vec<CompiledPattern>,
    background_helpers: Vec<CompiledPattern>,
    safe_sweep: Vec<CompiledPattern>,
}

fn compile_all(
    table: &'static str,
    entries: &[PatternEntry],
    mode: MatchingMode,
) -> Result<Vec<CompiledPattern>, PatternError> {
    entries
        .iter()
        .map(|e| CompiledPattern::compile(table, e, mode))
        .collect()
}

fn first_match<'a>(table: &'a [CompiledPattern], command: &str) -> Option<&'a CompiledPattern> {
    table.iter().find(|p| p.matches(command))
}

impl PatternTable {
    pub fn compile(policy: &Policy) -> Result<Self, PatternError> {
        let mode = policy.matching.mode;
        Ok(PatternTable {
            never_kill: compile_all("never_kill", &policy.never_kill, mode)?,
            allowlist: compile_all("allowlist", &policy.allowlist, mode)?,
            background_helpers: compile_all("background_helpers", &policy.background_helpers, mode)?,
            safe_sweep: compile_all("safe_sweep", &policy.safe_sweep, mode)?,
        })
    }

    /// Category of a command: never-kill table first, then allowlist,
    /// then background helpers, else `Unknown`.
    pub fn resolve(&self, command: &str) -> ProcessCategory {
        self.never_kill_match(command)
            .or_else(|| first_match(&self.allowlist, command))
            .or_else(|| first_match(&self.background_helpers, command))
            .map(|p| p.category)
            .unwrap_or(ProcessCategory::Unknown)
    }

    pub fn never_kill_match(&self, command: &str) -> Option<&CompiledPattern> {
        first_match(&self.never_kill, command)
    }

    pub fn is_allowlisted(&self, command: &str) -> bool {
        first_match(&self.allowlist, command).is_some()
    }

    pub fn is_background_helper(&self, command: &str) -> bool {
        first_match(&self.background_helpers, command).is_some()
    }

    pub fn is_safe_sweep(&self, command: &str) -> bool {
        first_match(&self.safe_sweep, command).is_some()
    }

    /// Number of compiled entries across all tables.
    pub fn len(&self) -> usize {
        self.never_kill.len()
            + self.allowlist.len()
            + self.background_helpers.len()
            + self.safe_sweep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PatternTable {
        PatternTable::compile(&Policy::default()).unwrap()
    }

    #[test]
    fn test_default_categories() {
        let t = table();
        assert_eq!(t.resolve("Terminal"), ProcessCategory::Terminal);
        assert_eq!(t.resolve("zsh"), ProcessCategory::Shell);
        assert_eq!(t.resolve("sshd"), ProcessCategory::RemoteSession);
        assert_eq!(t.resolve("Slack Helper"), ProcessCategory::Communication);
        assert_eq!(t.resolve("photoanalysisd"), ProcessCategory::BackgroundHelper);
        assert_eq!(t.resolve("unknownTool"), ProcessCategory::Unknown);
    }

    #[test]
    fn test_literal_is_case_insensitive_substring() {
        let t = table();
        assert!(t.never_kill_match("iTerm2").is_some());
        assert!(t.never_kill_match("ITERM2").is_some());
    }

    #[test]
    fn test_shell_regex_is_anchored() {
        let t = table();
        assert!(t.never_kill_match("bash").is_some());
        assert_eq!(t.resolve("bashtop"), ProcessCategory::Unknown);
    }

    #[test]
    fn test_dev_tooling_is_protected_by_default() {
        let t = table();
        for name in [
            "Electron",
            "Visual Studio Code",
            "Cursor",
            "claude",
            "copilot-language-server",
            "bun",
            "helm",
            "terraform",
            "nginx",
        ] {
            assert!(t.never_kill_match(name).is_some(), "{name} is not protected");
        }
        assert!(t.never_kill_match("ubuntu-report").is_none());
        assert!(t.never_kill_match("helmet").is_none());
    }

    #[test]
    fn test_empty_command_never_matches() {
        let t = table();
        assert!(t.never_kill_match("").is_none());
        assert!(!t.is_allowlisted(""));
        assert!(!t.is_safe_sweep(""));
        assert_eq!(t.resolve(""), ProcessCategory::Unknown);
    }

    #[test]
    fn test_exact_matching_mode() {
        let mut policy = Policy::default();
        policy.never_kill = vec![PatternEntry::literal("code", ProcessCategory::Editor)];
        policy.matching.mode = MatchingMode::Exact;
        let t = PatternTable::compile(&policy).unwrap();
        assert!(t.never_kill_match("Code").is_some());
        assert!(t.never_kill_match("unicode-helper").is_none());

        policy.matching.mode = MatchingMode::Substring;
        let t = PatternTable::compile(&policy).unwrap();
        assert!(t.never_kill_match("unicode-helper").is_some());
    }

    #[test]
    fn test_bad_regex() {
        let mut policy = Policy::default();
        policy.allowlist = vec![PatternEntry::new(
            "(",
            PatternKind::Regex,
            ProcessCategory::Browser,
        )];
        let err = PatternTable::compile(&policy).unwrap_err();
        assert!(err.to_string().contains("allowlist"));
    }
}
