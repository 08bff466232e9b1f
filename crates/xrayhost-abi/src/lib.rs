// All extern ABI exports accept raw pointers from foreign callers; arguments are
// validated at the boundary, so per-function safety docs would be redundant boilerplate.
#![allow(clippy::missing_safety_doc)]
//! # xrayhost-abi
//!
//! C ABI host shim for the `xraywrapper` library.
//!
//! This crate produces a `cdylib` exposing the `XH_*` entry points. The first
//! call maps the wrapper library, resolves its six `Xray_*` exports as one
//! all-or-nothing binding, and every later call forwards through that binding.
//!
//! # Architecture
//!
//! ```text
//! foreign caller -> XH_* export (host_abi) -> argument conversion -> WrapperHost facade
//!                -> ensure_loaded (loader) -> Xray_* in the wrapper library -> return
//! ```
//!
//! Failures never cross the boundary as anything but plain values: lifecycle
//! exports return 1, buffer exports return 0, `XH_Init` returns FALSE. The
//! reason is logged through `tracing` and the most recent load failure can be
//! read back with `XH_LoaderErrorA`.

#[macro_use]
mod macros;

pub mod diagnostics;
pub mod facade;
pub mod host_abi;
pub mod loader;
pub mod util;

pub use facade::{HostError, STATUS_FAILURE};
pub use host_abi::host;
pub use loader::{LoadError, Module, WrapperApi, WrapperHost};
