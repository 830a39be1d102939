//! Process inventory adapters.
//!
//! - [`ProcInventory`]: Linux procfs, two-sample CPU
//! - [`PsInventory`]: one `ps` call, for other Unix hosts
//! - [`StaticInventory`]: injected snapshots

#[cfg(target_os = "linux")]
pub mod proc_inventory;
pub mod proc_stat;
pub mod ps_inventory;
pub mod static_inventory;
pub mod types;

#[cfg(target_os = "linux")]
pub use proc_inventory::ProcInventory;
pub use ps_inventory::PsInventory;
pub use static_inventory::{StaticInventory, UnavailableInventory};
pub use types::{
    annotate_child_counts, logical_cpus, Inventory, InventoryError, InventoryMetadata,
    InventorySource, ProcessSnapshot, SystemLoad,
};

/// The live inventory source for this platform.
pub fn default_source() -> Box<dyn InventorySource> {
    #[cfg(target_os = "linux")]
    {
        if std::path::Path::new("/proc/self/stat").exists() {
            return Box::new(ProcInventory::new());
        }
    }
    Box::new(PsInventory::new())
}
