//! Injected inventories for tests and `--inventory` replays.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::types::{Inventory, InventoryError, InventorySource, ProcessSnapshot};

/// On-disk replay format: either a bare array of snapshots or an object
/// with `processes` and an optional `logical_cpus`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Bare(Vec<ProcessSnapshot>),
    Wrapped {
        processes: Vec<ProcessSnapshot>,
        #[serde(default = "one")]
        logical_cpus: u32,
    },
}

fn one() -> u32 {
    1
}

/// A fixed set of snapshots returned by every pull.
///
/// Built with [`StaticInventory::new`] the snapshots are taken to describe
/// this host. Replays loaded from JSON are recorded elsewhere or earlier, so
/// their pids may name unrelated live processes and are never signalled.
#[derive(Debug, Clone)]
pub struct StaticInventory {
    processes: Vec<ProcessSnapshot>,
    logical_cpus: u32,
    live: bool,
}

impl StaticInventory {
    /// Load-derived CPU equals the raw sum when `logical_cpus` is 1.
    pub fn new(processes: Vec<ProcessSnapshot>) -> Self {
        StaticInventory {
            processes,
            logical_cpus: 1,
            live: true,
        }
    }

    pub fn with_logical_cpus(mut self, logical_cpus: u32) -> Self {
        self.logical_cpus = logical_cpus.max(1);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, InventoryError> {
        let inventory = match serde_json::from_str::<ReplayFile>(json)? {
            ReplayFile::Bare(processes) => StaticInventory::new(processes),
            ReplayFile::Wrapped {
                processes,
                logical_cpus,
            } => StaticInventory::new(processes).with_logical_cpus(logical_cpus),
        };
        Ok(StaticInventory {
            live: false,
            ..inventory
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, InventoryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InventoryError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }
}

impl InventorySource for StaticInventory {
    fn name(&self) -> &'static str {
        "static"
    }

    fn pull(&self) -> Result<Inventory, InventoryError> {
        Ok(Inventory::assemble(
            self.processes.clone(),
            self.name(),
            self.logical_cpus,
            Duration::ZERO,
            Vec::new(),
        ))
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

/// A source whose every pull fails.
#[derive(Debug, Clone)]
pub struct UnavailableInventory(pub String);

impl InventorySource for UnavailableInventory {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn pull(&self) -> Result<Inventory, InventoryError> {
        Err(InventoryError::Unavailable(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_common::ProcessId;

    #[test]
    fn test_bare_array() {
        let inv = StaticInventory::from_json(
            r#"[ { "pid": 1, "command": "launchd" }, { "pid": 5, "ppid": 1, "command": "x" } ]"#,
        )
        .unwrap()
        .pull()
        .unwrap();
        assert_eq!(inv.processes.len(), 2);
        assert_eq!(inv.get(ProcessId(1)).unwrap().child_count, 1);
        assert_eq!(inv.metadata.logical_cpus, 1);
    }

    #[test]
    fn test_wrapped_with_cpus() {
        let inv = StaticInventory::from_json(
            r#"{ "logical_cpus": 2, "processes": [ { "pid": 9, "command": "a", "cpu_percent": 120 } ] }"#,
        )
        .unwrap()
        .pull()
        .unwrap();
        assert_eq!(inv.load.cpu_percent, 60.0);
        assert_eq!(inv.load.total_cpu_percent, 120.0);
    }

    #[test]
    fn test_replays_are_not_live() {
        let replay = StaticInventory::from_json(r#"[ { "pid": 1, "command": "launchd" } ]"#).unwrap();
        assert!(!replay.is_live());
        assert!(StaticInventory::new(Vec::new()).is_live());
        assert!(UnavailableInventory("gone".into()).is_live());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            StaticInventory::from_json("{ nope"),
            Err(InventoryError::Json(_))
        ));
    }
}
