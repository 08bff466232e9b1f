//! The exported `XH_*` entry points.
//!
//! Each export converts its raw arguments and delegates to the process-wide
//! [`WrapperHost`] facade:
//! - Null pointers become `None`; the facade rejects them after binding.
//! - Output buffers are borrowed as `cap`-byte slices.
//! - UTF-16 paths are decoded with `xrayhost_core::path_from_wide`.
//!
//! Return conventions: lifecycle calls return the wrapper's status or 1,
//! buffer calls return a byte count or 0, `XH_Init` returns TRUE/FALSE.

use std::ffi::{c_char, c_int, c_uint};
use std::path::PathBuf;

use libloading::Library;
use xrayhost_core::path_from_wide;

use crate::diagnostics;
use crate::facade::{FALSE, HostError, count, flag, status};
use crate::loader::WrapperHost;
use crate::util::{buffer_arg, c_str_arg, wide_arg};

static HOST: WrapperHost<Library> = WrapperHost::new();

/// The process-wide wrapper host behind the exports.
pub fn host() -> &'static WrapperHost<Library> {
    diagnostics::init();
    &HOST
}

/// Decode a nullable UTF-16 path argument. `Err` means non-null but undecodable.
unsafe fn path_arg(ptr: *const u16) -> Result<Option<PathBuf>, HostError> {
    match unsafe { wide_arg(ptr) } {
        None => Ok(None),
        Some(units) => path_from_wide(units)
            .map(Some)
            .ok_or(HostError::Payload(xrayhost_core::PayloadError::InvalidPath)),
    }
}

abi_fn! {
    /// Bind the wrapper library from `library` (UTF-16), or the default name
    /// when null or empty. Returns TRUE if bound, including when it already was.
    fn XH_Init(library: *const u16) -> c_int {
        let host = host();
        match path_arg(library) {
            Ok(path) => flag(host.init(path.as_deref().map(|p| p.as_os_str()))),
            Err(err) => {
                tracing::warn!(error = %err, "XH_Init called with an undecodable library path");
                FALSE
            }
        }
    }
}

abi_fn! {
    /// Start the wrapper from a NUL-terminated JSON configuration.
    fn XH_StartJson(json: *const c_char) -> c_int {
        status(host().start_json(c_str_arg(json)))
    }
}

abi_fn! {
    /// Reload the wrapper from a NUL-terminated JSON configuration.
    fn XH_ReloadJson(json: *const c_char) -> c_int {
        status(host().reload_json(c_str_arg(json)))
    }
}

abi_fn! {
    /// Start the wrapper from the JSON file at `path` (UTF-16).
    fn XH_StartFile(path: *const u16) -> c_int {
        let host = host();
        match path_arg(path) {
            Ok(path) => status(host.start_file(path.as_deref())),
            Err(err) => {
                // Bind first, as every entry point does.
                let _ = host.ensure_loaded(None);
                status(Err(err))
            }
        }
    }
}

abi_fn! {
    /// Reload the wrapper from the JSON file at `path` (UTF-16).
    fn XH_ReloadFile(path: *const u16) -> c_int {
        let host = host();
        match path_arg(path) {
            Ok(path) => status(host.reload_file(path.as_deref())),
            Err(err) => {
                // Bind first, as every entry point does.
                let _ = host.ensure_loaded(None);
                status(Err(err))
            }
        }
    }
}

abi_fn! {
    fn XH_Stop() -> c_int {
        status(host().stop())
    }
}

abi_fn! {
    /// Copy the wrapper's last error text into `buf` (at most `cap` bytes).
    fn XH_LastErrorA(buf: *mut c_char, cap: c_uint) -> c_uint {
        count(host().last_error(buffer_arg(buf, cap)))
    }
}

abi_fn! {
    /// Copy pending wrapper log bytes into `buf` (at most `cap` bytes).
    fn XH_PollLogA(buf: *mut c_char, cap: c_uint) -> c_uint {
        count(host().poll_log(buffer_arg(buf, cap)))
    }
}

abi_fn! {
    /// Copy the wrapper version into `buf`, NUL-terminated within `cap`.
    /// Returns the bytes copied, excluding the terminator.
    fn XH_VersionA(buf: *mut c_char, cap: c_uint) -> c_uint {
        count(host().version(buffer_arg(buf, cap)))
    }
}

abi_fn! {
    /// Copy the most recent library load failure into `buf`, NUL-terminated
    /// within `cap`. Never triggers a load.
    fn XH_LoaderErrorA(buf: *mut c_char, cap: c_uint) -> c_uint {
        count(host().loader_error(buffer_arg(buf, cap)))
    }
}
