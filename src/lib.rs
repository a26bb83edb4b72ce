//! dupe-engine - embeddable duplicate file detection
//!
//! Scans a directory tree in the background, groups files with identical
//! content, and reports progress, logs and results to a host application.
//! Files are narrowed by size, then by a partial digest, and confirmed by a
//! full BLAKE3 digest.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod signal;
pub mod status;

pub use cli::run_app;
pub use config::ScanConfig;
pub use engine::{initialize, version, Engine, PlatformHints};
pub use error::EngineError;
pub use report::{ReportSummary, ScanReport};
pub use status::{JobStatus, LifecycleState, LogEntry, LogLevel, Phase, StatusSink, StatusUpdate};
