//! # xrayhost-core
//!
//! Safe building blocks for the xrayhost shim.
//!
//! The shim itself (`xrayhost-abi`) loads the wrapper library and exposes the
//! `XH_*` C entry points. Everything that can be expressed without raw
//! pointers lives here instead: the wrapper's symbol names, UTF-16 path
//! decoding, whole-file payload reading with its size bounds, the bounded
//! terminated text copy used by the `*A` buffer exports, and environment
//! configuration. No `unsafe` code is permitted at the crate level.

#![deny(unsafe_code)]

pub mod config;
pub mod payload;
pub mod text;
pub mod wide;
pub mod wrapper;

pub use config::{HostConfig, host_config};
pub use payload::{MAX_PAYLOAD_BYTES, Payload, PayloadError, read_payload};
pub use text::{c_text_len, copy_terminated};
pub use wide::{path_from_wide, wide_len};
pub use wrapper::{REQUIRED_SYMBOLS, default_library_name, resolve_library_name};
