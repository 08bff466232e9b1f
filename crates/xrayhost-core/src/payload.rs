//! Whole-file configuration payloads for `XH_StartFile` / `XH_ReloadFile`.
//!
//! A payload file is read in one piece: files that are empty or larger than
//! [`MAX_PAYLOAD_BYTES`] are rejected before reading, and a short read is a
//! total failure. Partial content is never forwarded.

use std::ffi::CStr;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Upper bound on payload file size (64 MiB).
pub const MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Reasons a payload could not be produced.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload path is not valid UTF-16")]
    InvalidPath,
    #[error("cannot open payload file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot stat payload file {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("payload file {path} is empty")]
    Empty { path: PathBuf },
    #[error("payload file {path} is {size} bytes, limit is {limit}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("reading payload file {path} failed: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("short read from {path}: expected {expected} bytes, got {actual}")]
    ShortRead {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// Configuration bytes handed to the wrapper's start/reload.
///
/// Always stored with one trailing NUL so it can be passed as a C string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    /// Wrap raw content, appending the terminator.
    #[must_use]
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        bytes.push(0);
        Self { bytes }
    }

    /// Content length, excluding the terminator.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw content, excluding the terminator.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// The payload as the wrapper sees it: content up to the first NUL.
    #[must_use]
    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_until_nul(&self.bytes).unwrap_or_default()
    }
}

/// Read an entire payload file into memory.
///
/// Rejects files of size 0 or above [`MAX_PAYLOAD_BYTES`], then reads exactly
/// the reported size. Fewer bytes than reported is [`PayloadError::ShortRead`].
pub fn read_payload(path: &Path) -> Result<Payload, PayloadError> {
    let file = File::open(path).map_err(|source| PayloadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let size = file
        .metadata()
        .map_err(|source| PayloadError::Metadata {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    if size == 0 {
        return Err(PayloadError::Empty {
            path: path.to_path_buf(),
        });
    }
    if size > MAX_PAYLOAD_BYTES {
        return Err(PayloadError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: MAX_PAYLOAD_BYTES,
        });
    }

    // Bounded by MAX_PAYLOAD_BYTES above, fits in usize on every target.
    let mut bytes = Vec::with_capacity(size as usize + 1);
    let actual = file
        .take(size)
        .read_to_end(&mut bytes)
        .map_err(|source| PayloadError::Read {
            path: path.to_path_buf(),
            source,
        })? as u64;
    if actual != size {
        return Err(PayloadError::ShortRead {
            path: path.to_path_buf(),
            expected: size,
            actual,
        });
    }

    Ok(Payload::from_bytes(bytes))
}
