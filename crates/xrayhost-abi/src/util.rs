//! Shared internal utilities for converting raw ABI arguments.

use std::ffi::{CStr, c_char, c_uint};

/// Length of a C string, scanning at most `limit` bytes.
///
/// Returns the byte length before the first NUL, or `limit` when no NUL
/// occurs within it.
///
/// # Safety
///
/// `ptr` must be valid to read up to the returned length, plus the NUL when
/// one is found.
pub unsafe fn scan_c_string(ptr: *const c_char, limit: usize) -> usize {
    for i in 0..limit {
        if unsafe { *ptr.add(i) } == 0 {
            return i;
        }
    }
    limit
}

/// Borrow a nullable NUL-terminated C string argument.
///
/// # Safety
///
/// A non-null `ptr` must point to a NUL-terminated string that outlives `'a`.
pub unsafe fn c_str_arg<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) })
    }
}

/// Borrow a nullable NUL-terminated UTF-16 argument, excluding the terminator.
///
/// # Safety
///
/// A non-null `ptr` must point to a `0u16`-terminated sequence that outlives `'a`.
pub unsafe fn wide_arg<'a>(ptr: *const u16) -> Option<&'a [u16]> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0usize;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    Some(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Borrow a caller-owned output buffer of `cap` bytes.
///
/// Returns `None` for a null pointer; a zero capacity yields an empty slice.
///
/// # Safety
///
/// A non-null `ptr` must be valid for writes of `cap` bytes for `'a`.
pub unsafe fn buffer_arg<'a>(ptr: *mut c_char, cap: c_uint) -> Option<&'a mut [u8]> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), cap as usize) })
    }
}
