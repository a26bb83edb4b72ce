//! Job status and log types observed by the host.
//!
//! Everything here is `Serialize` so a binding layer can hand snapshots
//! across the C boundary as JSON. The live holder is [`StatusReporter`].

mod reporter;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use reporter::{StatusReporter, DEFAULT_LOG_CAPACITY, PROGRESS_NOTIFY_INTERVAL};

/// Lifecycle of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No job has been started, or a new one is being prepared
    #[default]
    Idle,
    /// A job is in progress
    Running,
    /// The last job finished and its result is available
    Completed,
    /// The last job was cancelled; no result
    Cancelled,
    /// The last job could not run; see the error summary
    Failed,
}

impl LifecycleState {
    /// Whether the job has settled.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Pipeline stage of a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started
    #[default]
    Idle,
    /// Walking the tree and bucketing by size
    Walking,
    /// Splitting buckets by partial digest
    PartialHashing,
    /// Confirming candidates by full digest
    FullHashing,
    /// Looking for duplicated folders
    FolderAnalysis,
    /// Sorting and storing the report
    Finalizing,
    /// Settled
    Done,
}

impl Phase {
    /// The slice of overall progress this phase covers, in percent.
    #[must_use]
    pub fn percent_range(self) -> (f64, f64) {
        match self {
            Self::Idle => (0.0, 0.0),
            Self::Walking => (0.0, 20.0),
            Self::PartialHashing => (20.0, 50.0),
            Self::FullHashing => (50.0, 85.0),
            Self::FolderAnalysis => (85.0, 95.0),
            Self::Finalizing => (95.0, 100.0),
            Self::Done => (100.0, 100.0),
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Walking => "Scanning files",
            Self::PartialHashing => "Comparing file samples",
            Self::FullHashing => "Verifying file contents",
            Self::FolderAnalysis => "Analyzing folders",
            Self::Finalizing => "Finalizing results",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Normal progress
    Info,
    /// A path was skipped or a digest failed
    Warn,
    /// An operation failed
    Error,
    /// The job could not continue
    Fatal,
}

impl LogLevel {
    /// Matching `log` crate level; `Fatal` maps to `Error`.
    #[must_use]
    pub fn as_log_level(self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warn => log::Level::Warn,
            Self::Error | Self::Fatal => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// One record in the log ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Component that produced it ("walker", "hasher", "job", ...)
    pub context: String,
    /// Message text
    pub message: String,
}

impl LogEntry {
    /// Entry stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            context: context.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.context,
            self.message
        )
    }
}

/// Point-in-time snapshot of the current (or last) job.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobStatus {
    /// Lifecycle state
    pub state: LifecycleState,
    /// Pipeline stage
    pub phase: Phase,
    /// Overall progress, 0 to 100
    pub progress_percent: f64,
    /// Short description of what is happening
    pub message: String,
    /// Path currently being processed
    pub detail: Option<PathBuf>,
    /// Scan root of the job
    pub root: Option<PathBuf>,
    /// Regular files found by the walker so far
    pub files_scanned: usize,
    /// Duplicate groups confirmed so far (known once the full stage ends)
    pub duplicate_groups: usize,
    /// Items processed in the current phase
    pub current_item: usize,
    /// Items in the current phase (0 while walking)
    pub total_items: usize,
    /// When the job started
    pub started_at: Option<DateTime<Utc>>,
    /// When the job settled
    pub finished_at: Option<DateTime<Utc>>,
    /// Milliseconds since start, frozen once settled
    pub elapsed_ms: u64,
    /// Error summary for failed jobs
    pub error: Option<String>,
}

/// What a [`StatusSink`] receives.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    /// Status at the time of the event
    pub status: JobStatus,
    /// The log entry that triggered the update, if any
    pub log: Option<LogEntry>,
}

/// Push-style status consumer registered by the host.
///
/// Called synchronously from engine threads, possibly from several at once,
/// and never while the reporter's lock is held.
pub trait StatusSink: Send + Sync {
    /// Receive one update.
    fn on_update(&self, update: &StatusUpdate);
}

impl<F> StatusSink for F
where
    F: Fn(&StatusUpdate) + Send + Sync,
{
    fn on_update(&self, update: &StatusUpdate) {
        self(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!LifecycleState::Idle.is_terminal());
        assert!(!LifecycleState::Running.is_terminal());
        assert!(LifecycleState::Completed.is_terminal());
        assert!(LifecycleState::Cancelled.is_terminal());
        assert!(LifecycleState::Failed.is_terminal());
    }

    #[test]
    fn test_phase_ranges_are_contiguous() {
        let phases = [
            Phase::Walking,
            Phase::PartialHashing,
            Phase::FullHashing,
            Phase::FolderAnalysis,
            Phase::Finalizing,
        ];
        for pair in phases.windows(2) {
            assert!((pair[0].percent_range().1 - pair[1].percent_range().0).abs() < f64::EPSILON);
        }
        assert!((Phase::Finalizing.percent_range().1 - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Fatal.as_log_level(), log::Level::Error);
        assert_eq!(LogLevel::Warn.as_log_level(), log::Level::Warn);
        assert!(LogLevel::Debug < LogLevel::Fatal);
    }

    #[test]
    fn test_log_entry_display() {
        let entry = LogEntry::new(LogLevel::Warn, "walker", "Skipped: /x");
        let line = entry.to_string();
        assert!(line.contains("[WARN] [walker] Skipped: /x"));
    }

    #[test]
    fn test_status_serializes() {
        let status = JobStatus {
            state: LifecycleState::Running,
            phase: Phase::FullHashing,
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["phase"], "full_hashing");

        let entry = serde_json::to_value(LogEntry::new(LogLevel::Info, "job", "hi")).unwrap();
        assert_eq!(entry["level"], "INFO");
    }

    #[test]
    fn test_closure_sink() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = AtomicUsize::new(0);
        let sink = |_: &StatusUpdate| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        sink.on_update(&StatusUpdate {
            status: JobStatus::default(),
            log: None,
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
