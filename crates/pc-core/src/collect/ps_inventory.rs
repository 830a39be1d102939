//! Portable inventory from a single `ps` invocation.
//!
//! Used where procfs is not available (macOS, BSD). `ps` cannot report
//! descriptor counts or open paths, so those fields stay at their neutral
//! values and the matching heuristics simply do not fire.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, span, Level};

use pc_common::ProcessId;

use super::types::{logical_cpus, Inventory, InventoryError, InventorySource, ProcessSnapshot};

/// Output columns, all with empty headers so no header line is printed.
const PS_FORMAT: &str = "pid=,ppid=,%cpu=,%mem=,etime=,comm=";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Inventory adapter that shells out to `ps`.
#[derive(Debug, Clone)]
pub struct PsInventory {
    program: String,
    timeout: Duration,
}

impl Default for PsInventory {
    fn default() -> Self {
        PsInventory {
            program: "ps".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl PsInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl InventorySource for PsInventory {
    fn name(&self) -> &'static str {
        "ps"
    }

    fn pull(&self) -> Result<Inventory, InventoryError> {
        let _span = span!(Level::DEBUG, "ps_inventory").entered();
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(["-A", "-o", PS_FORMAT])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| InventoryError::CommandFailed(format!("{}: {}", self.program, e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| InventoryError::CommandFailed("failed to capture ps stdout".into()))?;
        let reader = thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        });

        // The child is only reaped here, so kill() can never hit a reused pid.
        let deadline = start + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                debug!(ps_pid = child.id(), "ps timed out, killing it");
                let _ = child.kill();
                let _ = child.wait();
                // Left detached; a grandchild may still hold the pipe.
                drop(reader);
                return Err(InventoryError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = reader
            .join()
            .map_err(|_| InventoryError::CommandFailed("ps reader thread panicked".into()))??;

        let mut processes = Vec::new();
        let mut warnings = Vec::new();
        for (idx, line) in output.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_ps_line(line, idx + 1) {
                Ok(snapshot) if is_kernel_thread(&snapshot) => {}
                Ok(snapshot) => processes.push(snapshot),
                Err(e) => warnings.push(e.to_string()),
            }
        }

        if !status.success() && processes.is_empty() {
            return Err(InventoryError::CommandFailed(format!(
                "ps exited with {}",
                status
            )));
        }
        if processes.is_empty() {
            return Err(InventoryError::Unavailable("ps listed no processes".into()));
        }

        debug!(
            count = processes.len(),
            warnings = warnings.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "ps inventory captured"
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

fn is_kernel_thread(snapshot: &ProcessSnapshot) -> bool {
    cfg!(target_os = "linux") && (snapshot.pid.0 == 2 || snapshot.ppid.0 == 2)
}

/// Parse one `ps` line: pid, ppid, %cpu, %mem, etime, then the command,
/// which runs to the end of the line and may contain spaces.
pub fn parse_ps_line(line: &str, line_num: usize) -> Result<ProcessSnapshot, InventoryError> {
    let err = |message: &str| InventoryError::Parse {
        message: format!("{}: {:?}", message, line),
        line_num,
    };

    let mut rest = line.trim_start();
    let mut fields = [""; 5];
    for slot in fields.iter_mut() {
        let end = rest.find(char::is_whitespace).ok_or_else(|| err("too few columns"))?;
        *slot = &rest[..end];
        rest = rest[end..].trim_start();
    }
    let command = rest.trim_end();
    if command.is_empty() {
        return Err(err("missing command"));
    }

    let pid: u32 = fields[0].parse().map_err(|_| err("bad pid"))?;
    let ppid: u32 = fields[1].parse().map_err(|_| err("bad ppid"))?;
    let cpu: f64 = fields[2].parse().map_err(|_| err("bad %cpu"))?;
    let mem: f64 = fields[3].parse().map_err(|_| err("bad %mem"))?;
    let age = parse_etime(fields[4]).ok_or_else(|| err("bad etime"))?;

    // macOS reports the full executable path in comm.
    let name = match command.strip_prefix('/') {
        Some(path) => path.rsplit('/').next().unwrap_or(path),
        None => command,
    };

    Ok(ProcessSnapshot {
        pid: ProcessId(pid),
        ppid: ProcessId(ppid),
        command: name.to_string(),
        cpu_percent: cpu,
        memory_percent: mem,
        open_fd_count: 0,
        age_seconds: age,
        child_count: 0,
        has_home_files: false,
        start_time_ticks: None,
    })
}

/// Parse `ps` elapsed time: `[[dd-]hh:]mm:ss`.
pub fn parse_etime(s: &str) -> Option<u64> {
    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, s),
    };
    let parts: Vec<u64> = clock
        .split(':')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    let (h, m, sec) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        [s] => (0, 0, *s),
        _ => return None,
    };
    days.checked_mul(86_400)?
        .checked_add(h.checked_mul(3_600)?)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(sec)
}
