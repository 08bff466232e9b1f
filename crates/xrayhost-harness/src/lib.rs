//! Command-line harness for the xrayhost shim.
//!
//! This crate provides:
//! - Probe: bind the wrapper library and report its version or load failure
//! - Run: drive a start / poll / reload / stop session through the safe facade
//! - Structured JSONL logging of every step

#![forbid(unsafe_code)]

pub mod runner;
pub mod structured_log;

pub use runner::{ConfigSource, ProbeReport, ReloadStep, RunError, RunPlan, RunSummary, probe, run};
pub use structured_log::{LogEmitter, LogEntry, LogLevel};
