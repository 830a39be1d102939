//! Linux inventory from /proc.
//!
//! CPU% comes from two reads of `/proc/[pid]/stat` across a short sample
//! window. Everything else is read once, after the second sample, so all
//! fields describe the same instant up to the sample window.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use pc_common::ProcessId;

use super::proc_stat::{argv0_name, parse_meminfo_total, parse_stat_content, parse_uptime, StatFields};
use super::types::{logical_cpus, Inventory, InventoryError, InventorySource, ProcessSnapshot};

/// Default CPU sample window.
pub const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_millis(250);

/// Kernel `comm` is cut to this many bytes.
const COMM_MAX: usize = 15;

/// PID of kthreadd; its children are kernel threads.
const KTHREADD_PID: u32 = 2;

/// Inventory adapter backed by a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcInventory {
    root: PathBuf,
    sample_window: Duration,
    home: Option<PathBuf>,
}

impl Default for ProcInventory {
    fn default() -> Self {
        ProcInventory {
            root: PathBuf::from("/proc"),
            sample_window: DEFAULT_SAMPLE_WINDOW,
            home: dirs::home_dir(),
        }
    }
}

impl ProcInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_sample_window(mut self, window: Duration) -> Self {
        self.sample_window = window;
        self
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    fn list_pids(&self) -> Result<Vec<u32>, InventoryError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            InventoryError::Unavailable(format!("cannot read {}: {}", self.root.display(), e))
        })?;
        let mut pids: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn read_stat(&self, pid: u32) -> Option<StatFields> {
        let content = fs::read_to_string(self.root.join(pid.to_string()).join("stat")).ok()?;
        parse_stat_content(&content)
    }

    fn sample_ticks(&self, pids: &[u32]) -> HashMap<u32, StatFields> {
        pids.iter()
            .filter_map(|&pid| self.read_stat(pid).map(|s| (pid, s)))
            .collect()
    }

    /// Prefer argv[0] when the kernel cut `comm` short.
    fn command_name(&self, stat: &StatFields) -> String {
        if stat.comm.len() >= COMM_MAX {
            let cmdline_path = self.root.join(stat.pid.to_string()).join("cmdline");
            if let Some(name) = fs::read(cmdline_path).ok().and_then(|b| argv0_name(&b)) {
                if name.starts_with(&stat.comm) {
                    return name;
                }
            }
        }
        stat.comm.clone()
    }

    /// Descriptor count and whether any descriptor points under `$HOME`.
    ///
    /// Unreadable fd directories (other users' processes) yield `(0, false)`.
    fn scan_fds(&self, pid: u32) -> (u32, bool) {
        let fd_dir = self.root.join(pid.to_string()).join("fd");
        let Ok(entries) = fs::read_dir(&fd_dir) else {
            return (0, false);
        };
        let mut count = 0u32;
        let mut under_home = false;
        for entry in entries.flatten() {
            count = count.saturating_add(1);
            if under_home {
                continue;
            }
            if let (Some(home), Ok(target)) = (&self.home, fs::read_link(entry.path())) {
                under_home = is_under_home(&target, home);
            }
        }
        (count, under_home)
    }

    fn read_file(&self, name: &str) -> Result<String, InventoryError> {
        fs::read_to_string(self.root.join(name)).map_err(|e| {
            InventoryError::Unavailable(format!("cannot read {}/{}: {}", self.root.display(), name, e))
        })
    }
}

/// Regular file path under `home`, excluding the home directory itself.
fn is_under_home(target: &Path, home: &Path) -> bool {
    target.is_absolute() && target != home && target.starts_with(home)
}

fn is_kernel_thread(stat: &StatFields) -> bool {
    stat.pid == KTHREADD_PID || stat.ppid == KTHREADD_PID || stat.pid == 0
}

impl InventorySource for ProcInventory {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn pull(&self) -> Result<Inventory, InventoryError> {
        let start = Instant::now();
        let clk_tck = clock_ticks_per_second();
        let page_size = page_size_bytes();
        let mem_total = parse_meminfo_total(&self.read_file("meminfo")?)
            .filter(|t| *t > 0)
            .ok_or_else(|| InventoryError::Unavailable("MemTotal missing from meminfo".into()))?;

        let pids = self.list_pids()?;
        if pids.is_empty() {
            return Err(InventoryError::Unavailable(format!(
                "no processes visible under {}",
                self.root.display()
            )));
        }

        let first = self.sample_ticks(&pids);
        let sample_start = Instant::now();
        std::thread::sleep(self.sample_window);
        let window_secs = sample_start.elapsed().as_secs_f64().max(0.001);

        let uptime = parse_uptime(&self.read_file("uptime")?)
            .ok_or_else(|| InventoryError::Unavailable("unparseable uptime".into()))?;

        let mut processes = Vec::with_capacity(pids.len());
        let mut vanished = 0usize;
        for &pid in &pids {
            // Gone between samples: skip rather than fail the pull.
            let Some(stat) = self.read_stat(pid) else {
                vanished += 1;
                continue;
            };
            if is_kernel_thread(&stat) {
                continue;
            }

            let cpu_percent = match first.get(&pid) {
                Some(before) if before.starttime == stat.starttime => {
                    let delta = stat.total_ticks().saturating_sub(before.total_ticks());
                    delta as f64 / (clk_tck * window_secs) * 100.0
                }
                _ => 0.0,
            };
            let memory_percent =
                stat.rss_pages as f64 * page_size / mem_total as f64 * 100.0;
            let started_secs = stat.starttime as f64 / clk_tck;
            let age_seconds = (uptime - started_secs).max(0.0) as u64;
            let (open_fd_count, has_home_files) = self.scan_fds(pid);

            trace!(pid, comm = %stat.comm, cpu_percent, "sampled");
            processes.push(ProcessSnapshot {
                pid: ProcessId(pid),
                ppid: ProcessId(stat.ppid),
                command: self.command_name(&stat),
                cpu_percent,
                memory_percent,
                open_fd_count,
                age_seconds,
                child_count: 0,
                has_home_files,
                start_time_ticks: Some(stat.starttime),
            });
        }

        let mut warnings = Vec::new();
        if vanished > 0 {
            warnings.push(format!("{} processes exited during sampling", vanished));
        }
        debug!(
            count = processes.len(),
            vanished,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "procfs inventory captured"
        );
        Ok(Inventory::assemble(
            processes,
            self.name(),
            logical_cpus(),
            start.elapsed(),
            warnings,
        ))
    }
}

fn clock_ticks_per_second() -> f64 {
    // SAFETY: sysconf has no preconditions.
    let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if tck > 0 {
        tck as f64
    } else {
        100.0
    }
}

fn page_size_bytes() -> f64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as f64
    } else {
        4096.0
    }
}
