//! Runtime configuration.
//!
//! The shim is configured through environment variables, read once on first
//! use and cached for the life of the process:
//! - `XRAYHOST_LIBRARY`: library name or path used when a caller does not
//!   supply one (`XH_Init(NULL)` and every implicit load). Empty is ignored.
//! - `XRAYHOST_LOG`: `tracing` filter directive for shim diagnostics
//!   (e.g. `info`, `xrayhost_abi=debug`). Unset means the shim installs no
//!   subscriber of its own.

use std::ffi::{OsStr, OsString};
use std::sync::OnceLock;

use crate::wrapper::default_library_name;

pub const LIBRARY_ENV: &str = "XRAYHOST_LIBRARY";
pub const LOG_ENV: &str = "XRAYHOST_LOG";

/// Resolved shim configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Override for the default wrapper library.
    pub library: Option<OsString>,
    /// Diagnostic filter directive.
    pub log_filter: Option<String>,
}

impl HostConfig {
    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Build configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let library = lookup(LIBRARY_ENV).filter(|v| !v.is_empty());
        let log_filter = lookup(LOG_ENV)
            .and_then(|v| v.into_string().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self {
            library,
            log_filter,
        }
    }

    /// Library opened when the caller passes no path.
    #[must_use]
    pub fn default_library(&self) -> &OsStr {
        self.library
            .as_deref()
            .unwrap_or_else(|| OsStr::new(default_library_name()))
    }
}

/// Process-wide configuration (reads the environment on first call).
pub fn host_config() -> &'static HostConfig {
    static CONFIG: OnceLock<HostConfig> = OnceLock::new();
    CONFIG.get_or_init(HostConfig::from_env)
}
