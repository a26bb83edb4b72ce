//! The engine facade consumed by binding layers.
//!
//! An [`Engine`] composes the job controller and the status reporter. Hosts
//! either construct their own instance or use the process-wide one from
//! [`Engine::global`] / [`initialize`].
//!
//! # Example
//!
//! ```no_run
//! use dupe_engine::{Engine, PlatformHints, ScanConfig};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let engine = Engine::new(PlatformHints::default());
//! engine.start(Path::new("/data"), ScanConfig::default()).unwrap();
//! engine.wait(Some(Duration::from_secs(60)));
//!
//! if let Ok(report) = engine.result() {
//!     println!("{} duplicate sets", report.groups.len());
//! }
//! ```

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::EngineError;
use crate::job::JobController;
use crate::logging;
use crate::report::ScanReport;
use crate::status::{
    JobStatus, LifecycleState, LogEntry, StatusReporter, StatusSink, DEFAULT_LOG_CAPACITY,
};

/// Platform-supplied tuning handed to the engine at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformHints {
    /// Preferred hashing thread count when a job does not set one
    pub worker_threads: Option<usize>,
    /// Log ring buffer capacity
    pub log_capacity: usize,
}

impl Default for PlatformHints {
    fn default() -> Self {
        Self {
            worker_threads: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Duplicate detection engine.
#[derive(Debug)]
pub struct Engine {
    hints: PlatformHints,
    reporter: Arc<StatusReporter>,
    jobs: JobController,
}

static GLOBAL: OnceLock<Engine> = OnceLock::new();

impl Engine {
    /// Create an idle engine.
    #[must_use]
    pub fn new(hints: PlatformHints) -> Self {
        let reporter = Arc::new(StatusReporter::new(hints.log_capacity));
        let jobs = JobController::new(hints.clone(), Arc::clone(&reporter));
        Self {
            hints,
            reporter,
            jobs,
        }
    }

    /// The hints this engine was created with.
    #[must_use]
    pub fn hints(&self) -> &PlatformHints {
        &self.hints
    }

    /// The process-wide engine, created with default hints on first use.
    pub fn global() -> &'static Engine {
        GLOBAL.get_or_init(|| Engine::new(PlatformHints::default()))
    }

    /// Start a scan of `root` in the background.
    ///
    /// # Errors
    ///
    /// See [`JobController::start`].
    pub fn start(&self, root: &Path, config: ScanConfig) -> Result<(), EngineError> {
        self.jobs.start(root, config)
    }

    /// Request cancellation of the running job. No-op otherwise.
    pub fn cancel(&self) {
        self.jobs.cancel();
    }

    /// Snapshot of the current (or last) job.
    #[must_use]
    pub fn current_status(&self) -> JobStatus {
        self.reporter.current_status()
    }

    /// Up to `n` most recent log entries, oldest first.
    #[must_use]
    pub fn recent_logs(&self, n: usize) -> Vec<LogEntry> {
        self.reporter.recent_logs(n)
    }

    /// Whether a job is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.jobs.is_running()
    }

    /// The report of the last completed job.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotReady`] unless the last job completed.
    pub fn result(&self) -> Result<Arc<ScanReport>, EngineError> {
        self.jobs.result()
    }

    /// Register a push consumer for status updates and log entries.
    pub fn set_status_sink(&self, sink: Arc<dyn StatusSink>) {
        self.reporter.set_sink(sink);
    }

    /// Remove the push consumer.
    pub fn clear_status_sink(&self) {
        self.reporter.clear_sink();
    }

    /// Drop the log history.
    pub fn clear_logs(&self) {
        self.reporter.clear_logs();
    }

    /// Block until no job is running or `timeout` elapses.
    pub fn wait(&self, timeout: Option<Duration>) -> LifecycleState {
        self.jobs.wait(timeout)
    }

    /// Crate version.
    #[must_use]
    pub fn version(&self) -> &'static str {
        version()
    }
}

/// Crate version string.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Process startup entry point for binding layers.
///
/// Installs the default logger if the host has none and creates the global
/// engine with `hints`. Later calls return the existing engine unchanged and
/// warn when their hints differ from the ones it was created with.
pub fn initialize(hints: PlatformHints) -> &'static Engine {
    logging::init_logging(0, false);
    let mut created = false;
    let engine = GLOBAL.get_or_init(|| {
        created = true;
        log::info!("dupe-engine {} initialized", version());
        Engine::new(hints.clone())
    });
    if !created && engine.hints() != &hints {
        log::warn!(
            "Engine already initialized; ignoring hints {:?} (active: {:?})",
            hints,
            engine.hints()
        );
    }
    engine
}
