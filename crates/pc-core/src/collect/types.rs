//! Inventory data model.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pc_common::ProcessId;

/// One process at one observation instant.
///
/// Immutable once the inventory is captured. Fields an adapter cannot
/// observe default to zero/false, which means "this heuristic does not fire"
/// for the classifier and "no contribution" for the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: ProcessId,

    #[serde(default = "default_ppid")]
    pub ppid: ProcessId,

    /// Display name / executable path tail.
    #[serde(default)]
    pub command: String,

    /// May exceed 100 on multi-core hosts.
    #[serde(default)]
    pub cpu_percent: f64,

    #[serde(default)]
    pub memory_percent: f64,

    #[serde(default)]
    pub open_fd_count: u32,

    #[serde(default)]
    pub age_seconds: u64,

    /// Derived from `ppid` links within the same inventory.
    #[serde(default)]
    pub child_count: u32,

    /// Holds at least one descriptor under the user's home directory.
    #[serde(default)]
    pub has_home_files: bool,

    /// Kernel start time in clock ticks, when the adapter can read it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_ticks: Option<u64>,
}

fn default_ppid() -> ProcessId {
    ProcessId(0)
}

impl ProcessSnapshot {
    /// Snapshot with every optional metric at its neutral value.
    pub fn new(pid: u32, ppid: u32, command: impl Into<String>) -> Self {
        ProcessSnapshot {
            pid: ProcessId(pid),
            ppid: ProcessId(ppid),
            command: command.into(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            open_fd_count: 0,
            age_seconds: 0,
            child_count: 0,
            has_home_files: false,
            start_time_ticks: None,
        }
    }

    pub fn with_cpu(mut self, cpu_percent: f64) -> Self {
        self.cpu_percent = cpu_percent;
        self
    }

    pub fn with_memory(mut self, memory_percent: f64) -> Self {
        self.memory_percent = memory_percent;
        self
    }

    pub fn with_fds(mut self, open_fd_count: u32) -> Self {
        self.open_fd_count = open_fd_count;
        self
    }

    pub fn with_age(mut self, age_seconds: u64) -> Self {
        self.age_seconds = age_seconds;
        self
    }

    pub fn with_home_files(mut self, has_home_files: bool) -> Self {
        self.has_home_files = has_home_files;
        self
    }
}

/// System-wide load derived from an inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemLoad {
    /// Sum of process CPU divided by logical CPUs, clamped to [0, 100].
    pub cpu_percent: f64,
    /// Sum of process memory, clamped to [0, 100].
    pub memory_percent: f64,
    /// Raw sum of process CPU (may exceed 100).
    pub total_cpu_percent: f64,
}

impl SystemLoad {
    pub fn from_processes(processes: &[ProcessSnapshot], logical_cpus: u32) -> Self {
        let finite = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        let total_cpu: f64 = processes.iter().map(|p| finite(p.cpu_percent)).sum();
        let total_mem: f64 = processes.iter().map(|p| finite(p.memory_percent)).sum();
        let cpus = f64::from(logical_cpus.max(1));
        SystemLoad {
            cpu_percent: (total_cpu / cpus).clamp(0.0, 100.0),
            memory_percent: total_mem.clamp(0.0, 100.0),
            total_cpu_percent: total_cpu,
        }
    }
}

/// Capture metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryMetadata {
    pub source: String,
    pub captured_at: DateTime<Utc>,
    pub logical_cpus: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// All visible processes as of one capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub processes: Vec<ProcessSnapshot>,
    pub load: SystemLoad,
    pub metadata: InventoryMetadata,
}

impl Inventory {
    /// Assemble an inventory: derive child counts, then system load.
    pub fn assemble(
        mut processes: Vec<ProcessSnapshot>,
        source: &str,
        logical_cpus: u32,
        duration: Duration,
        warnings: Vec<String>,
    ) -> Self {
        annotate_child_counts(&mut processes);
        let load = SystemLoad::from_processes(&processes, logical_cpus);
        Inventory {
            processes,
            load,
            metadata: InventoryMetadata {
                source: source.to_string(),
                captured_at: Utc::now(),
                logical_cpus: logical_cpus.max(1),
                duration_ms: duration.as_millis() as u64,
                warnings,
            },
        }
    }

    pub fn get(&self, pid: ProcessId) -> Option<&ProcessSnapshot> {
        self.processes.iter().find(|p| p.pid == pid)
    }
}

/// Recompute `child_count` for every process from the `ppid` links.
pub fn annotate_child_counts(processes: &mut [ProcessSnapshot]) {
    let mut counts: HashMap<ProcessId, u32> = HashMap::new();
    for proc in processes.iter() {
        if proc.ppid != proc.pid {
            *counts.entry(proc.ppid).or_default() += 1;
        }
    }
    for proc in processes.iter_mut() {
        proc.child_count = counts.get(&proc.pid).copied().unwrap_or(0);
    }
}

/// Number of logical CPUs, at least 1.
pub fn logical_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Errors from an inventory pull. Any of these aborts the pass.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory source unavailable: {0}")]
    Unavailable(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("parse error at line {line_num}: {message}")]
    Parse { message: String, line_num: usize },

    #[error("inventory timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid inventory file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl From<InventoryError> for pc_common::Error {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::UnsupportedPlatform(p) => pc_common::Error::UnsupportedPlatform(p),
            other => pc_common::Error::InventoryUnavailable(other.to_string()),
        }
    }
}

/// Anything that can produce an inventory on demand.
pub trait InventorySource {
    /// Short name recorded in the inventory metadata.
    fn name(&self) -> &'static str;

    /// Capture every visible process as of one instant.
    fn pull(&self) -> Result<Inventory, InventoryError>;

    /// Whether the pids describe processes running on this host right now.
    /// Passes over a non-live source never send signals.
    fn is_live(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_counts_from_parent_links() {
        let mut procs = vec![
            ProcessSnapshot::new(1, 0, "init"),
            ProcessSnapshot::new(10, 1, "shell"),
            ProcessSnapshot::new(11, 10, "child-a"),
            ProcessSnapshot::new(12, 10, "child-b"),
        ];
        procs[2].child_count = 99;
        annotate_child_counts(&mut procs);
        assert_eq!(procs[0].child_count, 1);
        assert_eq!(procs[1].child_count, 2);
        assert_eq!(procs[2].child_count, 0);
    }

    #[test]
    fn test_self_parent_not_counted() {
        let mut procs = vec![ProcessSnapshot::new(0, 0, "swapper")];
        annotate_child_counts(&mut procs);
        assert_eq!(procs[0].child_count, 0);
    }

    #[test]
    fn test_system_load_divides_by_cpus() {
        let procs = vec![
            ProcessSnapshot::new(1, 0, "a").with_cpu(150.0).with_memory(30.0),
            ProcessSnapshot::new(2, 0, "b").with_cpu(50.0).with_memory(90.0),
            ProcessSnapshot::new(3, 0, "c").with_cpu(f64::NAN),
        ];
        let load = SystemLoad::from_processes(&procs, 4);
        assert_eq!(load.cpu_percent, 50.0);
        assert_eq!(load.memory_percent, 100.0);
        assert_eq!(load.total_cpu_percent, 200.0);
    }

    #[test]
    fn test_missing_fields_degrade() {
        let snap: ProcessSnapshot =
            serde_json::from_str(r#"{ "pid": 7, "command": "x" }"#).unwrap();
        assert_eq!(snap.ppid, ProcessId(0));
        assert_eq!(snap.open_fd_count, 0);
        assert!(!snap.has_home_files);
        assert!(snap.start_time_ticks.is_none());
    }
}
