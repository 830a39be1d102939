//! Structured logging for pc-core.
//!
//! Two output modes, both on stderr so stdout stays free for reports:
//! - human-readable lines for interactive use
//! - JSONL for the watcher and for agents
//!
//! ```ignore
//! use pc_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! init_logging(&LogConfig::from_env(None, None));
//! let ctx = LogContext::current().with_pass_id("pc-20260115-143022-a7xq");
//! pc_core::log_event!(ctx, INFO, event_names::PASS_STARTED, Stage::Inventory, "pass started");
//! ```

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, Stage};
pub use layer::{truncate_for_log, JsonlLayer};

use std::io::IsTerminal;

use sha2::{Digest, Sha256};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// The filter is a bare level so that events whose target is an event name
/// (`pass.started`, ...) pass alongside module-path targets. Calling this
/// twice leaves the first subscriber in place.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::new(config.level.to_string());

    let result = match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };

    if let Err(err) = result {
        tracing::debug!(error = %err, "logging already initialised");
    }
}

/// Unique ID for this invocation: `run-<12 hex>`.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

/// Stable host identifier: machine-id prefix, else a hash of the hostname.
pub fn get_host_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if id.len() >= 8 {
            return format!("host-{}", &id[..8]);
        }
    }

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        let digest = hex::encode(Sha256::digest(hostname.as_bytes()));
        return format!("host-{}", &digest[..8]);
    }

    format!("host-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Emit an event with the correlation fields of a [`LogContext`].
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::PASS_STARTED, Stage::Inventory, "pass started");
/// log_event!(ctx, DEBUG, event_names::APPLY_ACTION_RESULT, Stage::Apply, "terminated",
///     pid = 1234, outcome = "succeeded");
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::info!(
            target: $event,
            run_id = %$ctx.run_id,
            pass_id = $ctx.pass_id.as_deref().unwrap_or(""),
            host_id = %$ctx.host_id,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::debug!(
            target: $event,
            run_id = %$ctx.run_id,
            pass_id = $ctx.pass_id.as_deref().unwrap_or(""),
            host_id = %$ctx.host_id,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::warn!(
            target: $event,
            run_id = %$ctx.run_id,
            pass_id = $ctx.pass_id.as_deref().unwrap_or(""),
            host_id = %$ctx.host_id,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::error!(
            target: $event,
            run_id = %$ctx.run_id,
            pass_id = $ctx.pass_id.as_deref().unwrap_or(""),
            host_id = %$ctx.host_id,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
}
