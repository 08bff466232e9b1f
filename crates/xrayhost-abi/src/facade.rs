//! Forwarding facade.
//!
//! Safe Rust form of the `XH_*` entry points. Each operation binds the wrapper
//! library first (default name), then checks its arguments, then forwards.
//! Nullable pointers map to `Option`. Results carry the reason for any local
//! failure; [`status`], [`count`] and [`flag`] collapse them into the plain
//! values the C exports return.

use std::ffi::{CStr, OsStr, c_int, c_uint};
use std::path::Path;

use thiserror::Error;
use xrayhost_core::{PayloadError, copy_terminated, read_payload};

use crate::loader::{LoadError, Module, WrapperApi, WrapperHost};

/// Status returned by lifecycle exports for any local failure.
pub const STATUS_FAILURE: c_int = 1;

/// Windows `BOOL` values returned by `XH_Init`.
pub const TRUE: c_int = 1;
pub const FALSE: c_int = 0;

/// Local failure of a facade operation. Wrapper status codes are not errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("{0} must not be null")]
    NullArgument(&'static str),
    #[error("output buffer must be non-null with non-zero capacity")]
    InvalidBuffer,
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Start,
    Reload,
}

impl Lifecycle {
    fn forward(self, api: &WrapperApi<'_>, payload: &CStr) -> c_int {
        match self {
            Self::Start => api.start(payload),
            Self::Reload => api.reload(payload),
        }
    }
}

impl<M: Module> WrapperHost<M> {
    /// Bind the wrapper from `library`, or the default when absent or empty.
    pub fn init(&self, library: Option<&OsStr>) -> Result<(), LoadError> {
        self.ensure_loaded(library).map(|_| ())
    }

    pub fn start_json(&self, json: Option<&CStr>) -> Result<c_int, HostError> {
        self.forward_json(json, Lifecycle::Start)
    }

    pub fn reload_json(&self, json: Option<&CStr>) -> Result<c_int, HostError> {
        self.forward_json(json, Lifecycle::Reload)
    }

    /// Read the whole file at `path` and forward it to `Xray_Start`.
    pub fn start_file(&self, path: Option<&Path>) -> Result<c_int, HostError> {
        self.forward_file(path, Lifecycle::Start)
    }

    /// Read the whole file at `path` and forward it to `Xray_Reload`.
    pub fn reload_file(&self, path: Option<&Path>) -> Result<c_int, HostError> {
        self.forward_file(path, Lifecycle::Reload)
    }

    pub fn stop(&self) -> Result<c_int, HostError> {
        Ok(self.ensure_loaded(None)?.stop())
    }

    pub fn last_error(&self, buf: Option<&mut [u8]>) -> Result<c_uint, HostError> {
        let api = self.ensure_loaded(None)?;
        Ok(api.last_error_into(non_empty(buf)?))
    }

    pub fn poll_log(&self, buf: Option<&mut [u8]>) -> Result<c_uint, HostError> {
        let api = self.ensure_loaded(None)?;
        Ok(api.poll_log_into(non_empty(buf)?))
    }

    /// Copy the wrapper version into `buf`; returns bytes copied, excluding the NUL.
    pub fn version(&self, buf: Option<&mut [u8]>) -> Result<c_uint, HostError> {
        let api = self.ensure_loaded(None)?;
        let copied = api.version_into(non_empty(buf)?);
        Ok(c_uint::try_from(copied).unwrap_or(c_uint::MAX))
    }

    /// Copy the most recent load failure into `buf` without attempting a load.
    ///
    /// No recorded failure yields an empty string.
    pub fn loader_error(&self, buf: Option<&mut [u8]>) -> Result<c_uint, HostError> {
        let buf = non_empty(buf)?;
        let text = self.last_load_error().unwrap_or_default();
        let copied = copy_terminated(buf, text.as_bytes());
        Ok(c_uint::try_from(copied).unwrap_or(c_uint::MAX))
    }

    fn forward_json(&self, json: Option<&CStr>, op: Lifecycle) -> Result<c_int, HostError> {
        let api = self.ensure_loaded(None)?;
        let json = json.ok_or(HostError::NullArgument("json"))?;
        Ok(op.forward(&api, json))
    }

    fn forward_file(&self, path: Option<&Path>, op: Lifecycle) -> Result<c_int, HostError> {
        let api = self.ensure_loaded(None)?;
        let path = path.ok_or(HostError::NullArgument("path"))?;
        let payload = read_payload(path)?;
        tracing::debug!(path = %path.display(), bytes = payload.len(), ?op, "forwarding payload file");
        Ok(op.forward(&api, payload.as_c_str()))
    }
}

fn non_empty(buf: Option<&mut [u8]>) -> Result<&mut [u8], HostError> {
    match buf {
        Some(buf) if !buf.is_empty() => Ok(buf),
        _ => Err(HostError::InvalidBuffer),
    }
}

/// Collapse a lifecycle result: wrapper status, or [`STATUS_FAILURE`].
pub fn status(result: Result<c_int, HostError>) -> c_int {
    result.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "lifecycle call failed locally");
        STATUS_FAILURE
    })
}

/// Collapse a buffer result: byte count, or 0.
pub fn count(result: Result<c_uint, HostError>) -> c_uint {
    result.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "buffer call failed locally");
        0
    })
}

/// Collapse an init result into a Windows `BOOL`.
pub fn flag(result: Result<(), LoadError>) -> c_int {
    if result.is_ok() { TRUE } else { FALSE }
}
