//! UTF-16 path handling.
//!
//! `XH_Init`, `XH_StartFile` and `XH_ReloadFile` take NUL-terminated UTF-16
//! paths on every platform. These operate on `u16` slices; the raw pointer
//! scan lives in the ABI crate.

use std::path::PathBuf;

/// Returns the length of a NUL-terminated UTF-16 string (not counting the NUL).
///
/// If no NUL is found, returns the full slice length.
pub fn wide_len(units: &[u16]) -> usize {
    units.iter().position(|&c| c == 0).unwrap_or(units.len())
}

/// Decodes UTF-16 code units (up to the first NUL) into a path.
///
/// On Windows the units are taken verbatim, unpaired surrogates included.
/// Elsewhere they must be valid UTF-16; `None` is returned otherwise.
pub fn path_from_wide(units: &[u16]) -> Option<PathBuf> {
    let units = &units[..wide_len(units)];
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStringExt;
        Some(PathBuf::from(std::ffi::OsString::from_wide(units)))
    }
    #[cfg(not(windows))]
    {
        String::from_utf16(units).ok().map(PathBuf::from)
    }
}
