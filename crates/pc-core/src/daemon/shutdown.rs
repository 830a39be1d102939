//! SIGINT/SIGTERM to [`CancelFlag`] bridge.
//!
//! The handler only stores into a static atomic; a watcher thread copies
//! that into the flag so the pass loop sees it between terminations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::time::Duration;

use crate::pass::CancelFlag;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

extern "C" fn on_shutdown_signal(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// True once SIGINT or SIGTERM has been received.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Route SIGINT and SIGTERM into `cancel`. Handlers are installed once per
/// process; later calls only add another bridge.
pub fn install_shutdown_handler(cancel: CancelFlag) -> std::io::Result<()> {
    let mut result = Ok(());
    INSTALL.call_once(|| {
        for signum in [libc::SIGINT, libc::SIGTERM] {
            let handler = on_shutdown_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            // SAFETY: the handler only performs an atomic store.
            let previous = unsafe { libc::signal(signum, handler) };
            if previous == libc::SIG_ERR {
                result = Err(std::io::Error::last_os_error());
                return;
            }
        }
    });
    result?;

    std::thread::Builder::new()
        .name("pc-shutdown".to_string())
        .spawn(move || loop {
            if shutdown_requested() {
                tracing::info!("shutdown signal received; cancelling");
                cancel.cancel();
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        })?;
    Ok(())
}
