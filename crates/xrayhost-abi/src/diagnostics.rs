//! Diagnostic logging for the shim.
//!
//! The shim only emits `tracing` events. When `XRAYHOST_LOG` is set it also
//! installs a stderr subscriber with that filter, once, on first use. A host
//! process that already installed a global subscriber keeps its own.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use xrayhost_core::host_config;

/// Install the `XRAYHOST_LOG` subscriber if configured. Idempotent.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        install(host_config().log_filter.as_deref());
    });
}

/// Install a stderr subscriber for `directive`. An unparsable directive
/// falls back to `warn`. Returns whether this call became the global
/// subscriber.
fn install(directive: Option<&str>) -> bool {
    let Some(directive) = directive else {
        return false;
    };
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(directive, "xrayhost diagnostics enabled");
    }
    installed
}
