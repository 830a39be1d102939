//! At-most-one pass per host via an advisory `flock`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use super::PassError;

/// Lock file name inside the runtime/cache directory.
pub const LOCK_FILE_NAME: &str = "pass.lock";

/// Held for the duration of a pass; released on drop.
#[derive(Debug)]
pub struct PassLock {
    file: File,
    path: PathBuf,
}

impl PassLock {
    /// Take the lock without blocking. Contention is `LockUnavailable`.
    pub fn acquire(path: &Path) -> Result<Self, PassError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        // SAFETY: the fd is owned by `file` and open for the call's duration.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(PassError::LockUnavailable {
                    path: path.to_path_buf(),
                });
            }
            return Err(PassError::Io(err));
        }

        // Record the holder for operators; the lock itself is the flock.
        file.set_len(0)?;
        let mut writer = &file;
        let _ = writer.write_all(std::process::id().to_string().as_bytes());
        let _ = writer.flush();

        Ok(PassLock {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        // SAFETY: fd still owned by `self.file`.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        // The file stays: unlinking it would let a waiter lock a deleted inode
        // while a newcomer locks a fresh file.
    }
}

/// Default lock path: `$XDG_RUNTIME_DIR` if set, else the cache dir, else /tmp.
pub fn default_lock_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("process-cleanup")
        .join(LOCK_FILE_NAME)
}
