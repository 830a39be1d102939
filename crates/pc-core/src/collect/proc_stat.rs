//! Parsers for Linux /proc text files.
//!
//! Pure functions over file content so they can be unit-tested and fuzzed
//! without a live /proc.

/// Fields of `/proc/[pid]/stat` used by the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFields {
    pub pid: u32,
    /// Kernel `comm`, at most 15 bytes, may contain spaces and parentheses.
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
    /// Clock ticks after boot.
    pub starttime: u64,
    /// Resident set size in pages.
    pub rss_pages: u64,
}

impl StatFields {
    pub fn total_ticks(&self) -> u64 {
        self.utime.saturating_add(self.stime)
    }
}

/// Parse `/proc/[pid]/stat` content.
///
/// `comm` is delimited by the first `(` and the *last* `)`, since the
/// name itself may contain either character.
pub fn parse_stat_content(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close < open {
        return None;
    }
    let pid: u32 = content[..open].trim().parse().ok()?;
    let comm = content[open + 1..close].to_string();

    // Indices below are relative to the first field after comm (the state).
    let fields: Vec<&str> = content.get(close + 1..)?.split_whitespace().collect();
    if fields.len() < 22 {
        return None;
    }

    let mut state_chars = fields[0].chars();
    let state = state_chars.next()?;
    if state_chars.next().is_some() {
        return None;
    }

    let rss: i64 = fields[21].parse().ok()?;

    Some(StatFields {
        pid,
        comm,
        state,
        ppid: fields[1].parse().ok()?,
        utime: fields[11].parse().ok()?,
        stime: fields[12].parse().ok()?,
        starttime: fields[19].parse().ok()?,
        rss_pages: rss.max(0) as u64,
    })
}

/// `MemTotal` from `/proc/meminfo`, in bytes.
pub fn parse_meminfo_total(content: &str) -> Option<u64> {
    let line = content.lines().find(|l| l.starts_with("MemTotal:"))?;
    let mut parts = line["MemTotal:".len()..].split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") | None => value.checked_mul(1024),
        Some(_) => None,
    }
}

/// Seconds since boot from `/proc/uptime`.
pub fn parse_uptime(content: &str) -> Option<f64> {
    let secs: f64 = content.split_whitespace().next()?.parse().ok()?;
    secs.is_finite().then_some(secs)
}

/// Executable name from `/proc/[pid]/cmdline` (argv[0] path tail).
pub fn argv0_name(cmdline: &[u8]) -> Option<String> {
    let argv0 = cmdline.split(|b| *b == 0).next()?;
    if argv0.is_empty() {
        return None;
    }
    let argv0 = String::from_utf8_lossy(argv0);
    let tail = argv0.rsplit('/').next().unwrap_or(&argv0).trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}
