//! Session driver for the wrapper host.
//!
//! [`run`] binds the wrapper, starts it, drains its log at a fixed interval,
//! optionally reloads once, and stops it. Each step becomes one JSONL entry.

use std::ffi::{CString, OsStr};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use xrayhost_abi::{HostError, LoadError, Module, STATUS_FAILURE, WrapperHost};

use crate::structured_log::{LogEmitter, LogLevel};

/// Poll buffer size for `Xray_PollLog`.
pub const POLL_BUFFER_BYTES: usize = 64 * 1024;

/// Upper bound on consecutive non-empty polls within one tick.
const MAX_DRAIN_ROUNDS: usize = 64;

const VERSION_BUFFER_BYTES: usize = 256;
const ERROR_BUFFER_BYTES: usize = 4096;

/// Where a start or reload configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Inline JSON text.
    Json(String),
    /// A JSON file read whole by the shim.
    File(PathBuf),
}

/// A reload issued once, `after` the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadStep {
    pub source: ConfigSource,
    pub after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub source: ConfigSource,
    pub duration: Duration,
    pub poll_interval: Duration,
    pub reload: Option<ReloadStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub start_status: i32,
    pub reload_status: Option<i32>,
    pub stop_status: i32,
    pub log_bytes: u64,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("inline JSON contains an interior NUL byte")]
    InteriorNul,
    #[error("wrapper refused to start (status {status}): {message}")]
    StartRejected { status: i32, message: String },
    #[error("writing the run log failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of [`probe`], printed as one JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub loaded: bool,
    pub library: Option<String>,
    pub version: Option<String>,
    pub load_error: Option<String>,
}

/// Bind the wrapper and report its version, or why it could not be bound.
pub fn probe<M: Module>(host: &WrapperHost<M>, library: Option<&OsStr>) -> ProbeReport {
    match host.init(library) {
        Ok(()) => {
            let mut buf = [0u8; VERSION_BUFFER_BYTES];
            let version = host
                .version(Some(&mut buf))
                .ok()
                .map(|n| text_of(&buf, n));
            ProbeReport {
                loaded: true,
                library: host.loaded_library().map(|l| l.to_string_lossy().into_owned()),
                version,
                load_error: None,
            }
        }
        Err(err) => ProbeReport {
            loaded: false,
            library: None,
            version: None,
            load_error: Some(err.to_string()),
        },
    }
}

/// Drive one session described by `plan`, logging each step to `log`.
pub fn run<M: Module, W: Write>(
    host: &WrapperHost<M>,
    library: Option<&OsStr>,
    plan: &RunPlan,
    log: &mut LogEmitter<W>,
) -> Result<RunSummary, RunError> {
    if let Err(err) = host.init(library) {
        let entry = log.entry(LogLevel::Error, "init").with_text(err.to_string());
        log.emit(&entry)?;
        return Err(err.into());
    }
    let bound = host
        .loaded_library()
        .map(|l| l.to_string_lossy().into_owned())
        .unwrap_or_default();
    let entry = log.entry(LogLevel::Info, "init").with_library(bound);
    log.emit(&entry)?;

    let start_status = forward(host, &plan.source, Phase::Start)?;
    if start_status != 0 {
        let message = wrapper_error(host);
        let entry = log
            .entry(LogLevel::Error, "start")
            .with_status(start_status)
            .with_text(message.clone());
        log.emit(&entry)?;
        return Err(RunError::StartRejected {
            status: start_status,
            message,
        });
    }
    let started = Instant::now();
    let mut buf = vec![0u8; POLL_BUFFER_BYTES];
    let mut progress = Progress::default();
    let supervised = supervise(host, plan, started, &mut buf, log, &mut progress);

    // The wrapper is running from here on; stop it even if supervising failed.
    let stop_status = host.stop()?;
    let entry = log
        .entry(LogLevel::Info, "stop")
        .with_status(stop_status)
        .with_elapsed_ms(elapsed_ms(started));
    let stopped = log
        .emit(&entry)
        .map_err(RunError::from)
        .and_then(|()| drain(host, &mut buf, log));
    supervised?;
    progress.log_bytes += stopped?;

    Ok(RunSummary {
        start_status,
        reload_status: progress.reload_status,
        stop_status,
        log_bytes: progress.log_bytes,
    })
}

#[derive(Debug, Default)]
struct Progress {
    log_bytes: u64,
    reload_status: Option<i32>,
}

/// Everything between a successful start and the stop.
fn supervise<M: Module, W: Write>(
    host: &WrapperHost<M>,
    plan: &RunPlan,
    started: Instant,
    buf: &mut [u8],
    log: &mut LogEmitter<W>,
    progress: &mut Progress,
) -> Result<(), RunError> {
    let entry = log.entry(LogLevel::Info, "start").with_status(0);
    log.emit(&entry)?;

    let deadline = started + plan.duration;
    loop {
        progress.log_bytes += drain(host, buf, log)?;

        let due = plan
            .reload
            .as_ref()
            .filter(|step| progress.reload_status.is_none() && started.elapsed() >= step.after);
        if let Some(step) = due {
            let (status, entry) = match forward(host, &step.source, Phase::Reload) {
                Ok(0) => (0, log.entry(LogLevel::Info, "reload")),
                Ok(status) => (
                    status,
                    log.entry(LogLevel::Warn, "reload").with_text(wrapper_error(host)),
                ),
                // Failed before reaching the wrapper; the running config stays.
                Err(err) => (
                    STATUS_FAILURE,
                    log.entry(LogLevel::Warn, "reload").with_text(err.to_string()),
                ),
            };
            let entry = entry.with_status(status).with_elapsed_ms(elapsed_ms(started));
            progress.reload_status = Some(status);
            log.emit(&entry)?;
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep(plan.poll_interval.min(deadline - now));
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Start,
    Reload,
}

fn forward<M: Module>(
    host: &WrapperHost<M>,
    source: &ConfigSource,
    phase: Phase,
) -> Result<i32, RunError> {
    let status = match source {
        ConfigSource::Json(text) => {
            let json = CString::new(text.as_str()).map_err(|_| RunError::InteriorNul)?;
            match phase {
                Phase::Start => host.start_json(Some(&json))?,
                Phase::Reload => host.reload_json(Some(&json))?,
            }
        }
        ConfigSource::File(path) => match phase {
            Phase::Start => host.start_file(Some(path))?,
            Phase::Reload => host.reload_file(Some(path))?,
        },
    };
    Ok(status)
}

/// Poll until the wrapper has nothing pending; returns bytes received.
fn drain<M: Module, W: Write>(
    host: &WrapperHost<M>,
    buf: &mut [u8],
    log: &mut LogEmitter<W>,
) -> Result<u64, RunError> {
    let mut total = 0u64;
    for _ in 0..MAX_DRAIN_ROUNDS {
        let n = host.poll_log(Some(buf))?;
        if n == 0 {
            break;
        }
        total += u64::from(n);
        let entry = log
            .entry(LogLevel::Info, "log")
            .with_bytes(n)
            .with_text(text_of(buf, n));
        log.emit(&entry)?;
        // A short read means nothing else is pending.
        if (n as usize) < buf.len() {
            return Ok(total);
        }
    }
    tracing::debug!(total, "log drain round limit reached");
    Ok(total)
}

fn wrapper_error<M: Module>(host: &WrapperHost<M>) -> String {
    let mut buf = vec![0u8; ERROR_BUFFER_BYTES];
    match host.last_error(Some(&mut buf)) {
        Ok(n) => text_of(&buf, n),
        Err(_) => String::new(),
    }
}

/// Text in the first `n` bytes of `buf`, stopping early at a NUL.
fn text_of(buf: &[u8], n: u32) -> String {
    let n = usize::try_from(n).unwrap_or(usize::MAX).min(buf.len());
    let bytes = &buf[..n];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;
    use std::ffi::{c_char, c_int, c_uint, c_void};
    use std::ptr::NonNull;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    static TEST_LOCK: Mutex<()> = Mutex::new(());
    static START_STATUS: AtomicI32 = AtomicI32::new(0);
    static RELOAD_STATUS: AtomicI32 = AtomicI32::new(0);
    static STARTS: AtomicUsize = AtomicUsize::new(0);
    static RELOADS: AtomicUsize = AtomicUsize::new(0);
    static STOPS: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn version() -> *const c_char {
        c"fake 1.0".as_ptr()
    }
    extern "C" fn start(_: *const c_char) -> c_int {
        STARTS.fetch_add(1, Ordering::SeqCst);
        START_STATUS.load(Ordering::SeqCst)
    }
    extern "C" fn reload(_: *const c_char) -> c_int {
        RELOADS.fetch_add(1, Ordering::SeqCst);
        RELOAD_STATUS.load(Ordering::SeqCst)
    }
    extern "C" fn stop() -> c_int {
        STOPS.fetch_add(1, Ordering::SeqCst);
        0
    }
    extern "C" fn nothing(_: *mut c_char, _: c_uint) -> c_uint {
        0
    }

    /// Opens any name except "absent".
    struct Fake;

    impl Module for Fake {
        fn open(name: &OsStr) -> Result<Self, Box<dyn StdError + Send + Sync>> {
            if name == "absent" {
                return Err("no such module".into());
            }
            Ok(Self)
        }

        fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
            let addr = match name {
                "Xray_Version" => version as *const (),
                "Xray_Start" => start as *const (),
                "Xray_Reload" => reload as *const (),
                "Xray_Stop" => stop as *const (),
                "Xray_LastError" | "Xray_PollLog" => nothing as *const (),
                _ => return None,
            };
            NonNull::new(addr as *mut c_void)
        }
    }

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        START_STATUS.store(0, Ordering::SeqCst);
        RELOAD_STATUS.store(0, Ordering::SeqCst);
        STARTS.store(0, Ordering::SeqCst);
        RELOADS.store(0, Ordering::SeqCst);
        STOPS.store(0, Ordering::SeqCst);
        guard
    }

    fn events(log: LogEmitter<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(log.into_inner())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn plan(reload: Option<ReloadStep>) -> RunPlan {
        RunPlan {
            source: ConfigSource::Json("{\"inbounds\":[]}".into()),
            duration: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
            reload,
        }
    }

    #[test]
    fn probe_reports_version_when_bound() {
        let _guard = lock();
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        let report = probe(&host, None);
        assert!(report.loaded);
        assert_eq!(report.library.as_deref(), Some("fake"));
        assert_eq!(report.version.as_deref(), Some("fake 1.0"));
        assert_eq!(report.load_error, None);
    }

    #[test]
    fn probe_reports_load_error() {
        let _guard = lock();
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("absent");
        let report = probe(&host, None);
        assert!(!report.loaded);
        assert_eq!(report.version, None);
        let reason = report.load_error.unwrap();
        assert!(reason.contains("absent"), "{reason}");

        let json = serde_json::to_value(ProbeReport {
            loaded: false,
            library: None,
            version: None,
            load_error: Some(reason),
        })
        .unwrap();
        assert_eq!(json["loaded"], false);
    }

    #[test]
    fn run_starts_then_stops() {
        let _guard = lock();
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        let mut log = LogEmitter::new(Vec::new(), "run");
        let summary = run(&host, None, &plan(None), &mut log).unwrap();
        assert_eq!(summary.start_status, 0);
        assert_eq!(summary.stop_status, 0);
        assert_eq!(summary.reload_status, None);
        assert_eq!(summary.log_bytes, 0);
        assert_eq!(STARTS.load(Ordering::SeqCst), 1);
        assert_eq!(STOPS.load(Ordering::SeqCst), 1);

        let events = events(log);
        let names: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
        assert_eq!(names, ["init", "start", "stop"]);
        assert_eq!(events[0]["library"], "fake");
        assert_eq!(events[2]["status"], 0);
    }

    #[test]
    fn run_reloads_once() {
        let _guard = lock();
        RELOAD_STATUS.store(7, Ordering::SeqCst);
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        let mut log = LogEmitter::new(Vec::new(), "run");
        let step = ReloadStep {
            source: ConfigSource::Json("{}".into()),
            after: Duration::ZERO,
        };
        let summary = run(&host, None, &plan(Some(step)), &mut log).unwrap();
        assert_eq!(summary.reload_status, Some(7));
        assert_eq!(RELOADS.load(Ordering::SeqCst), 1);

        let events = events(log);
        let reload = events.iter().find(|e| e["event"] == "reload").unwrap();
        assert_eq!(reload["status"], 7);
        assert_eq!(reload["level"], "warn");
    }

    #[test]
    fn rejected_start_skips_stop() {
        let _guard = lock();
        START_STATUS.store(2, Ordering::SeqCst);
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        let mut log = LogEmitter::new(Vec::new(), "run");
        let err = run(&host, None, &plan(None), &mut log).unwrap_err();
        assert!(matches!(err, RunError::StartRejected { status: 2, .. }));
        assert_eq!(STOPS.load(Ordering::SeqCst), 0);

        let events = events(log);
        assert_eq!(events.last().unwrap()["event"], "start");
        assert_eq!(events.last().unwrap()["level"], "error");
    }

    #[test]
    fn interior_nul_is_refused_before_forwarding() {
        let _guard = lock();
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        let mut log = LogEmitter::new(Vec::new(), "run");
        let mut bad = plan(None);
        bad.source = ConfigSource::Json("{\0}".into());
        let err = run(&host, None, &bad, &mut log).unwrap_err();
        assert!(matches!(err, RunError::InteriorNul));
        assert_eq!(STARTS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_file_surfaces_payload_error() {
        let _guard = lock();
        let dir = tempfile::tempdir().unwrap();
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        let mut log = LogEmitter::new(Vec::new(), "run");
        let mut bad = plan(None);
        bad.source = ConfigSource::File(dir.path().join("missing.json"));
        let err = run(&host, None, &bad, &mut log).unwrap_err();
        assert!(matches!(err, RunError::Host(HostError::Payload(_))));
        assert_eq!(STARTS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_reload_is_logged_and_wrapper_still_stopped() {
        let _guard = lock();
        let dir = tempfile::tempdir().unwrap();
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        let mut log = LogEmitter::new(Vec::new(), "run");
        let step = ReloadStep {
            source: ConfigSource::File(dir.path().join("missing-reload.json")),
            after: Duration::ZERO,
        };
        let summary = run(&host, None, &plan(Some(step)), &mut log).unwrap();
        assert_eq!(summary.reload_status, Some(STATUS_FAILURE));
        assert_eq!(STARTS.load(Ordering::SeqCst), 1);
        assert_eq!(RELOADS.load(Ordering::SeqCst), 0);
        assert_eq!(STOPS.load(Ordering::SeqCst), 1);

        let events = events(log);
        let reload = events.iter().find(|e| e["event"] == "reload").unwrap();
        assert_eq!(reload["level"], "warn");
        assert!(reload["text"].as_str().unwrap().contains("missing-reload.json"));
        assert_eq!(events.last().unwrap()["event"], "stop");
    }

    /// Accepts writes but fails every flush after the first `ok`.
    struct FlakyLog {
        ok: usize,
    }

    impl Write for FlakyLog {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if self.ok == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            self.ok -= 1;
            Ok(())
        }
    }

    #[test]
    fn log_failure_after_start_still_stops_wrapper() {
        let _guard = lock();
        let host: WrapperHost<Fake> = WrapperHost::with_default_library("fake");
        // Only the "init" entry gets through.
        let mut log = LogEmitter::new(FlakyLog { ok: 1 }, "run");
        let err = run(&host, None, &plan(None), &mut log).unwrap_err();
        assert!(matches!(err, RunError::Io(_)));
        assert_eq!(STARTS.load(Ordering::SeqCst), 1);
        assert_eq!(STOPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn text_of_stops_at_nul_and_count() {
        assert_eq!(text_of(b"abc\0def", 7), "abc");
        assert_eq!(text_of(b"abcdef", 3), "abc");
        assert_eq!(text_of(b"ab", 10), "ab");
    }
}
