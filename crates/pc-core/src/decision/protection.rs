//! Protection classifier.
//!
//! Decides, per process, whether it is exempt from termination. Rules are
//! evaluated in a fixed order and the first one that fires names the reason:
//!
//! 1. the engine itself or one of its ancestors (`CurrentSessionAncestor`)
//! 2. a never-kill pattern match (`NeverKillList`)
//! 3. the process has children (`HasChildren`)
//! 4. the process holds files under `$HOME` open (`HasHomeFiles`)
//!
//! Classification is a pure function of the snapshot, the session context
//! and the compiled pattern table.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use pc_common::ProcessId;

use super::patterns::PatternTable;
use crate::collect::ProcessSnapshot;

/// Why a process is (or is not) protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionReason {
    NeverKillList,
    CurrentSessionAncestor,
    HasChildren,
    HasHomeFiles,
    None,
}

impl ProtectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionReason::NeverKillList => "never_kill_list",
            ProtectionReason::CurrentSessionAncestor => "current_session_ancestor",
            ProtectionReason::HasChildren => "has_children",
            ProtectionReason::HasHomeFiles => "has_home_files",
            ProtectionReason::None => "none",
        }
    }
}

impl std::fmt::Display for ProtectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionVerdict {
    pub protected: bool,
    pub reason: ProtectionReason,
}

impl ProtectionVerdict {
    pub const UNPROTECTED: ProtectionVerdict = ProtectionVerdict {
        protected: false,
        reason: ProtectionReason::None,
    };

    fn protected(reason: ProtectionReason) -> Self {
        ProtectionVerdict {
            protected: true,
            reason,
        }
    }
}

/// The calling process and its ancestor chain within one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub self_pid: ProcessId,
    pub ancestry: BTreeSet<ProcessId>,
}

impl SessionContext {
    /// Resolve the ancestry of `self_pid` through the snapshot's parent links.
    ///
    /// The walk starts at the immediate parent: taken from the snapshot when
    /// the caller appears in it, else `fallback_parent` (the OS-reported
    /// parent). It stops at pid 0, at a pid missing from the snapshot, or on
    /// a cycle. The immediate parent is always included.
    pub fn resolve(
        self_pid: ProcessId,
        fallback_parent: Option<ProcessId>,
        processes: &[ProcessSnapshot],
    ) -> Self {
        let parents: HashMap<ProcessId, ProcessId> =
            processes.iter().map(|p| (p.pid, p.ppid)).collect();

        let mut ancestry = BTreeSet::new();
        let mut cursor = parents.get(&self_pid).copied().or(fallback_parent);
        while let Some(pid) = cursor {
            if pid.0 == 0 || pid == self_pid || !ancestry.insert(pid) {
                break;
            }
            cursor = parents.get(&pid).copied();
        }

        SessionContext { self_pid, ancestry }
    }

    /// Context for the running engine process.
    pub fn current(processes: &[ProcessSnapshot]) -> Self {
        let parent = std::os::unix::process::parent_id();
        Self::resolve(
            ProcessId(std::process::id()),
            Some(ProcessId(parent)),
            processes,
        )
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        pid == self.self_pid || self.ancestry.contains(&pid)
    }
}

/// Classify one process.
pub fn classify(
    snapshot: &ProcessSnapshot,
    session: &SessionContext,
    patterns: &PatternTable,
) -> ProtectionVerdict {
    if session.contains(snapshot.pid) {
        return ProtectionVerdict::protected(ProtectionReason::CurrentSessionAncestor);
    }
    if patterns.never_kill_match(&snapshot.command).is_some() {
        return ProtectionVerdict::protected(ProtectionReason::NeverKillList);
    }
    if snapshot.child_count > 0 {
        return ProtectionVerdict::protected(ProtectionReason::HasChildren);
    }
    if snapshot.has_home_files {
        return ProtectionVerdict::protected(ProtectionReason::HasHomeFiles);
    }
    ProtectionVerdict::UNPROTECTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_config::Policy;

    fn patterns() -> PatternTable {
        PatternTable::compile(&Policy::default()).unwrap()
    }

    fn session(self_pid: u32, procs: &[ProcessSnapshot]) -> SessionContext {
        SessionContext::resolve(ProcessId(self_pid), None, procs)
    }

    #[test]
    fn test_ancestry_walk() {
        let procs = vec![
            ProcessSnapshot::new(1, 0, "init"),
            ProcessSnapshot::new(50, 1, "login"),
            ProcessSnapshot::new(60, 50, "zsh"),
            ProcessSnapshot::new(70, 60, "pc-core"),
            ProcessSnapshot::new(80, 1, "other"),
        ];
        let ctx = session(70, &procs);
        let ancestry: Vec<u32> = ctx.ancestry.iter().map(|p| p.0).collect();
        assert_eq!(ancestry, vec![1, 50, 60]);
        assert!(ctx.contains(ProcessId(70)));
        assert!(!ctx.contains(ProcessId(80)));
    }

    #[test]
    fn test_ancestry_uses_fallback_parent_when_self_missing() {
        let procs = vec![
            ProcessSnapshot::new(1, 0, "init"),
            ProcessSnapshot::new(60, 1, "zsh"),
        ];
        let ctx = SessionContext::resolve(ProcessId(999), Some(ProcessId(60)), &procs);
        assert!(ctx.contains(ProcessId(60)));
        assert!(ctx.contains(ProcessId(1)));
    }

    #[test]
    fn test_ancestry_cycle_terminates() {
        let procs = vec![
            ProcessSnapshot::new(10, 20, "a"),
            ProcessSnapshot::new(20, 10, "b"),
            ProcessSnapshot::new(30, 10, "me"),
        ];
        let ctx = session(30, &procs);
        assert_eq!(ctx.ancestry.len(), 2);
    }

    #[test]
    fn test_rule_order() {
        let p = patterns();
        let ctx = session(70, &[]);

        // Self wins over a never-kill name.
        let me = ProcessSnapshot::new(70, 0, "Terminal");
        assert_eq!(
            classify(&me, &ctx, &p).reason,
            ProtectionReason::CurrentSessionAncestor
        );

        // Pattern wins over children.
        let mut term = ProcessSnapshot::new(5, 1, "Terminal");
        term.child_count = 3;
        assert_eq!(
            classify(&term, &ctx, &p).reason,
            ProtectionReason::NeverKillList
        );

        // Children win over home files.
        let mut busy = ProcessSnapshot::new(6, 1, "worker").with_home_files(true);
        busy.child_count = 1;
        assert_eq!(
            classify(&busy, &ctx, &p).reason,
            ProtectionReason::HasChildren
        );

        let holder = ProcessSnapshot::new(7, 1, "worker").with_home_files(true);
        assert_eq!(
            classify(&holder, &ctx, &p).reason,
            ProtectionReason::HasHomeFiles
        );

        let plain = ProcessSnapshot::new(8, 1, "worker");
        assert_eq!(classify(&plain, &ctx, &p), ProtectionVerdict::UNPROTECTED);
    }

    #[test]
    fn test_empty_command_falls_through_to_heuristics() {
        let p = patterns();
        let ctx = session(70, &[]);
        let mut snap = ProcessSnapshot::new(9, 1, "");
        assert!(!classify(&snap, &ctx, &p).protected);
        snap.child_count = 2;
        assert_eq!(
            classify(&snap, &ctx, &p).reason,
            ProtectionReason::HasChildren
        );
    }

    #[test]
    fn test_heuristics_ignore_legacy_toggles() {
        // Older policy files may still carry the removed guardrail switches;
        // they are ignored and both heuristics stay on.
        let policy = Policy::parse_json(
            r#"{ "schema_version": "1.0.0",
                 "guardrails": { "max_terminations_per_pass": 5, "grace_ms": 1000,
                                 "cooldown_seconds": 60, "protect_children": false,
                                 "protect_home_files": false } }"#,
        )
        .unwrap();
        let p = PatternTable::compile(&policy).unwrap();
        let ctx = session(70, &[]);

        let mut parent = ProcessSnapshot::new(9, 1, "worker");
        parent.child_count = 4;
        assert_eq!(classify(&parent, &ctx, &p).reason, ProtectionReason::HasChildren);

        let holder = ProcessSnapshot::new(10, 1, "worker").with_home_files(true);
        assert_eq!(classify(&holder, &ctx, &p).reason, ProtectionReason::HasHomeFiles);
    }
}
