//! Wrapper library naming: default file name and required exports.
//!
//! Pure-logic half of the loader. The actual `dlopen`/`LoadLibraryW` and
//! symbol lookups live in the ABI crate.

use std::ffi::{OsStr, OsString};

/// Exported symbol names the wrapper must provide.
pub const SYM_VERSION: &str = "Xray_Version";
pub const SYM_START: &str = "Xray_Start";
pub const SYM_RELOAD: &str = "Xray_Reload";
pub const SYM_STOP: &str = "Xray_Stop";
pub const SYM_LAST_ERROR: &str = "Xray_LastError";
pub const SYM_POLL_LOG: &str = "Xray_PollLog";

/// All six required exports, in resolution order.
pub const REQUIRED_SYMBOLS: [&str; 6] = [
    SYM_VERSION,
    SYM_START,
    SYM_RELOAD,
    SYM_STOP,
    SYM_LAST_ERROR,
    SYM_POLL_LOG,
];

/// Platform file name for the wrapper library, resolved through the
/// platform's standard library search path.
#[must_use]
pub fn default_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "xraywrapper.dll"
    } else if cfg!(target_os = "macos") {
        "libxraywrapper.dylib"
    } else {
        "libxraywrapper.so"
    }
}

/// Pick the library to open: the requested name unless it is absent or
/// empty, otherwise `fallback`.
#[must_use]
pub fn resolve_library_name(requested: Option<&OsStr>, fallback: &OsStr) -> OsString {
    match requested {
        Some(name) if !name.is_empty() => name.to_os_string(),
        _ => fallback.to_os_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_library_name_matches_platform() {
        let name = default_library_name();
        assert!(name.contains("xraywrapper"));
        if cfg!(target_os = "windows") {
            assert!(name.ends_with(".dll"));
        } else if cfg!(target_os = "macos") {
            assert!(name.ends_with(".dylib"));
        } else {
            assert!(name.ends_with(".so"));
        }
    }

    #[test]
    fn test_resolve_library_name() {
        let fallback = OsStr::new("libxraywrapper.so");
        assert_eq!(resolve_library_name(None, fallback), fallback);
        assert_eq!(resolve_library_name(Some(OsStr::new("")), fallback), fallback);
        assert_eq!(
            resolve_library_name(Some(OsStr::new("/opt/xray/libwrap.so")), fallback),
            OsStr::new("/opt/xray/libwrap.so")
        );
    }

    #[test]
    fn test_required_symbols_are_distinct() {
        for (i, a) in REQUIRED_SYMBOLS.iter().enumerate() {
            for b in &REQUIRED_SYMBOLS[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
