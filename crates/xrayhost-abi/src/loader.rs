//! Wrapper library loader.
//!
//! Maps the wrapper library once and binds its six `Xray_*` exports together.
//! The binding is all-or-nothing: a library missing any export is unmapped
//! again and the host stays [`Binding::Unloaded`], so callers can never observe
//! a partially usable table. Once loaded, the library is never unmapped; the
//! function addresses handed out through [`WrapperApi`] remain valid for as
//! long as the [`WrapperHost`] lives.

use std::error::Error as StdError;
use std::ffi::{CStr, OsStr, OsString, c_char, c_int, c_uint, c_void};
use std::marker::PhantomData;
use std::ptr::NonNull;

use libloading::Library;
use parking_lot::{Mutex, const_mutex};
use thiserror::Error;
use xrayhost_core::{REQUIRED_SYMBOLS, copy_terminated, host_config, resolve_library_name};

use crate::util::scan_c_string;

pub type VersionFn = unsafe extern "C" fn() -> *const c_char;
pub type StartFn = unsafe extern "C" fn(*const c_char) -> c_int;
pub type ReloadFn = unsafe extern "C" fn(*const c_char) -> c_int;
pub type StopFn = unsafe extern "C" fn() -> c_int;
pub type LastErrorFn = unsafe extern "C" fn(*mut c_char, c_uint) -> c_uint;
pub type PollLogFn = unsafe extern "C" fn(*mut c_char, c_uint) -> c_uint;

/// Why the wrapper library could not be bound.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot load wrapper library {library}: {source}")]
    Open {
        library: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("wrapper library {library} is missing required exports: {}", .symbols.join(", "))]
    MissingSymbols {
        library: String,
        symbols: Vec<&'static str>,
    },
}

/// A dynamically mapped module the loader can bind against.
///
/// Dropping the value unmaps the module.
pub trait Module: Sized {
    /// Map the named module (bare name or path) into the process.
    fn open(name: &OsStr) -> Result<Self, Box<dyn StdError + Send + Sync>>;

    /// Address of an exported symbol, `None` when it is absent.
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>>;
}

impl Module for Library {
    fn open(name: &OsStr) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        // SAFETY: running the wrapper's initialisers is inherent to loading it.
        unsafe { Library::new(name) }.map_err(Into::into)
    }

    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        // SAFETY: the symbol is read as an opaque address, never dereferenced here.
        let sym = unsafe { self.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*sym)
    }
}

/// The six resolved exports.
#[derive(Clone, Copy)]
struct FnTable {
    version: VersionFn,
    start: StartFn,
    reload: ReloadFn,
    stop: StopFn,
    last_error: LastErrorFn,
    poll_log: PollLogFn,
}

impl FnTable {
    /// Resolve every required export, or report all that are missing.
    ///
    /// Lookup order follows `REQUIRED_SYMBOLS`.
    fn resolve<M: Module>(module: &M) -> Result<Self, Vec<&'static str>> {
        let addrs = REQUIRED_SYMBOLS.map(|name| module.symbol(name));
        let missing: Vec<&'static str> = REQUIRED_SYMBOLS
            .iter()
            .zip(&addrs)
            .filter(|(_, addr)| addr.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let [version, start, reload, stop, last_error, poll_log] =
            addrs.map(|addr| addr.map_or(std::ptr::null_mut(), NonNull::as_ptr));
        // SAFETY: every address is non-null (checked above) and the wrapper
        // exports these symbols with exactly these C signatures.
        unsafe {
            Ok(Self {
                version: std::mem::transmute::<*mut c_void, VersionFn>(version),
                start: std::mem::transmute::<*mut c_void, StartFn>(start),
                reload: std::mem::transmute::<*mut c_void, ReloadFn>(reload),
                stop: std::mem::transmute::<*mut c_void, StopFn>(stop),
                last_error: std::mem::transmute::<*mut c_void, LastErrorFn>(last_error),
                poll_log: std::mem::transmute::<*mut c_void, PollLogFn>(poll_log),
            })
        }
    }
}

/// Loader state. No partially bound variant exists.
enum Binding<M> {
    Unloaded,
    Loaded {
        _module: M,
        table: FnTable,
        library: OsString,
    },
}

struct HostState<M> {
    binding: Binding<M>,
    last_error: Option<String>,
}

/// Owner of the (at most one) wrapper library binding.
pub struct WrapperHost<M> {
    state: Mutex<HostState<M>>,
    default_library: Option<OsString>,
}

impl<M: Module> Default for WrapperHost<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Module> WrapperHost<M> {
    /// Host whose default library comes from [`host_config`].
    pub const fn new() -> Self {
        Self {
            state: const_mutex(HostState {
                binding: Binding::Unloaded,
                last_error: None,
            }),
            default_library: None,
        }
    }

    /// Host with a fixed default library, ignoring the environment.
    pub fn with_default_library(name: impl Into<OsString>) -> Self {
        Self {
            default_library: Some(name.into()),
            ..Self::new()
        }
    }

    /// Bind the wrapper library if not already bound.
    ///
    /// `requested` names the library to open; absent or empty selects the
    /// default. When a library is already bound this returns it immediately
    /// without opening anything, whatever `requested` says. A failed attempt
    /// leaves the host unloaded and is retried from scratch on the next call.
    pub fn ensure_loaded(&self, requested: Option<&OsStr>) -> Result<WrapperApi<'_>, LoadError> {
        let mut state = self.state.lock();
        if let Binding::Loaded { table, .. } = &state.binding {
            return Ok(WrapperApi::new(*table));
        }

        let fallback = match &self.default_library {
            Some(name) => name.as_os_str(),
            None => host_config().default_library(),
        };
        let library = resolve_library_name(requested, fallback);

        match Self::bind(&library) {
            Ok((module, table)) => {
                tracing::info!(library = %library.to_string_lossy(), "wrapper library bound");
                state.binding = Binding::Loaded {
                    _module: module,
                    table,
                    library,
                };
                state.last_error = None;
                Ok(WrapperApi::new(table))
            }
            Err(err) => {
                tracing::warn!(error = %err, "wrapper library load failed");
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn bind(library: &OsStr) -> Result<(M, FnTable), LoadError> {
        let library_name = library.to_string_lossy().into_owned();
        let module = M::open(library).map_err(|source| LoadError::Open {
            library: library_name.clone(),
            source,
        })?;
        match FnTable::resolve(&module) {
            Ok(table) => Ok((module, table)),
            Err(symbols) => {
                tracing::debug!(library = %library_name, ?symbols, "unmapping incomplete wrapper library");
                drop(module);
                Err(LoadError::MissingSymbols {
                    library: library_name,
                    symbols,
                })
            }
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.state.lock().binding, Binding::Loaded { .. })
    }

    /// Name or path the bound library was opened with.
    #[must_use]
    pub fn loaded_library(&self) -> Option<OsString> {
        match &self.state.lock().binding {
            Binding::Loaded { library, .. } => Some(library.clone()),
            Binding::Unloaded => None,
        }
    }

    /// Text of the most recent load failure; cleared by a successful load.
    #[must_use]
    pub fn last_load_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }
}

/// Callable view of a bound wrapper library.
///
/// Borrows the host, so it cannot outlive the module its addresses point into.
#[derive(Clone, Copy)]
pub struct WrapperApi<'host> {
    table: FnTable,
    _host: PhantomData<&'host ()>,
}

impl WrapperApi<'_> {
    fn new(table: FnTable) -> Self {
        Self {
            table,
            _host: PhantomData,
        }
    }

    /// Copy the wrapper's version text into `dst`.
    ///
    /// The text is owned by the wrapper and may be invalidated by its next
    /// call, so it is copied here before returning. At most `dst.len() - 1`
    /// bytes are copied and a NUL always follows them; a null version pointer
    /// yields an empty string. Returns the bytes copied, excluding the NUL.
    pub fn version_into(&self, dst: &mut [u8]) -> usize {
        let Some(limit) = dst.len().checked_sub(1) else {
            return 0;
        };
        // SAFETY: Xray_Version takes no arguments.
        let text = unsafe { (self.table.version)() };
        if text.is_null() {
            return copy_terminated(dst, &[]);
        }
        // SAFETY: the wrapper returns NUL-terminated text; the scan stops at
        // the NUL or at `limit`, whichever comes first.
        let src = unsafe {
            let len = scan_c_string(text, limit);
            std::slice::from_raw_parts(text.cast::<u8>(), len)
        };
        copy_terminated(dst, src)
    }

    /// Forward a configuration payload to `Xray_Start`.
    pub fn start(&self, payload: &CStr) -> c_int {
        // SAFETY: payload is NUL-terminated and outlives the call.
        unsafe { (self.table.start)(payload.as_ptr()) }
    }

    /// Forward a configuration payload to `Xray_Reload`.
    pub fn reload(&self, payload: &CStr) -> c_int {
        // SAFETY: payload is NUL-terminated and outlives the call.
        unsafe { (self.table.reload)(payload.as_ptr()) }
    }

    pub fn stop(&self) -> c_int {
        // SAFETY: Xray_Stop takes no arguments.
        unsafe { (self.table.stop)() }
    }

    /// Let `Xray_LastError` fill `dst`; returns the wrapper's count unchanged.
    pub fn last_error_into(&self, dst: &mut [u8]) -> c_uint {
        let cap = c_uint::try_from(dst.len()).unwrap_or(c_uint::MAX);
        // SAFETY: dst is writable for `cap` bytes.
        unsafe { (self.table.last_error)(dst.as_mut_ptr().cast::<c_char>(), cap) }
    }

    /// Let `Xray_PollLog` fill `dst`; returns the wrapper's count unchanged.
    pub fn poll_log_into(&self, dst: &mut [u8]) -> c_uint {
        let cap = c_uint::try_from(dst.len()).unwrap_or(c_uint::MAX);
        // SAFETY: dst is writable for `cap` bytes.
        unsafe { (self.table.poll_log)(dst.as_mut_ptr().cast::<c_char>(), cap) }
    }
}
