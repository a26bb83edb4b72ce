//! Thread-safe status holder with a bounded log history.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use super::{JobStatus, LifecycleState, LogEntry, LogLevel, Phase, StatusSink, StatusUpdate};
use crate::progress::ProgressCallback;

/// Default number of log entries retained.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Progress counters push to the sink at most once per this many items.
pub const PROGRESS_NOTIFY_INTERVAL: usize = 100;

struct Inner {
    status: JobStatus,
    logs: VecDeque<LogEntry>,
    capacity: usize,
    last_notified_item: usize,
    sink: Option<Arc<dyn StatusSink>>,
}

impl Inner {
    fn snapshot(&self) -> JobStatus {
        let mut status = self.status.clone();
        if let Some(started) = status.started_at {
            let end = status.finished_at.unwrap_or_else(Utc::now);
            status.elapsed_ms = u64::try_from((end - started).num_milliseconds()).unwrap_or(0);
        }
        status
    }
}

/// Holds the status of the current job plus recent log entries.
///
/// One mutex guards both, so every read is a consistent snapshot. A condvar
/// on the same mutex wakes [`wait`](Self::wait) callers on state changes.
/// The registered [`StatusSink`], if any, is called after the lock is
/// released.
pub struct StatusReporter {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("StatusReporter")
            .field("state", &inner.status.state)
            .field("logs", &inner.logs.len())
            .field("capacity", &inner.capacity)
            .field("sink", &inner.sink.is_some())
            .finish()
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl StatusReporter {
    /// Reporter keeping at most `capacity` log entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                status: JobStatus::default(),
                logs: VecDeque::with_capacity(capacity),
                capacity,
                last_notified_item: 0,
                sink: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(sink: Option<Arc<dyn StatusSink>>, status: JobStatus, log: Option<LogEntry>) {
        if let Some(sink) = sink {
            sink.on_update(&StatusUpdate { status, log });
        }
    }

    /// Register the push consumer, replacing any previous one.
    pub fn set_sink(&self, sink: Arc<dyn StatusSink>) {
        self.lock().sink = Some(sink);
    }

    /// Remove the push consumer.
    pub fn clear_sink(&self) {
        self.lock().sink = None;
    }

    /// Append a log entry, mirror it to `log`, and push it to the sink.
    pub fn log(&self, level: LogLevel, context: &str, message: impl Into<String>) {
        let message = message.into();

        let (entry, sink, status) = {
            let mut inner = self.lock();
            // Stamped under the lock so the ring stays in time order
            let entry = LogEntry::new(level, context, message);
            if inner.logs.len() >= inner.capacity {
                inner.logs.pop_front();
            }
            inner.logs.push_back(entry.clone());
            (entry, inner.sink.clone(), inner.snapshot())
        };

        log::log!(
            level.as_log_level(),
            "[{}] {}",
            entry.context,
            entry.message
        );
        Self::notify(sink, status, Some(entry));
    }

    /// Up to `n` most recent entries, oldest first.
    #[must_use]
    pub fn recent_logs(&self, n: usize) -> Vec<LogEntry> {
        let inner = self.lock();
        let skip = inner.logs.len().saturating_sub(n);
        inner.logs.iter().skip(skip).cloned().collect()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn log_len(&self) -> usize {
        self.lock().logs.len()
    }

    /// Drop all log entries.
    pub fn clear_logs(&self) {
        self.lock().logs.clear();
    }

    /// Consistent snapshot of the job status.
    #[must_use]
    pub fn current_status(&self) -> JobStatus {
        self.lock().snapshot()
    }

    /// Lifecycle state only.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().status.state
    }

    /// Reset for a new job and enter `Running`.
    ///
    /// Returns `false` (and changes nothing) if a job is already running.
    /// The sink is not called here; it sees the new state with the job's
    /// first log entry, so callers may hold their own locks around this.
    pub fn begin(&self, root: &Path) -> bool {
        {
            let mut inner = self.lock();
            if inner.status.state == LifecycleState::Running {
                return false;
            }
            // terminal -> Idle -> Running
            inner.status = JobStatus {
                state: LifecycleState::Running,
                message: "Starting scan".to_string(),
                root: Some(root.to_path_buf()),
                started_at: Some(Utc::now()),
                ..JobStatus::default()
            };
            inner.last_notified_item = 0;
        }
        self.changed.notify_all();
        true
    }

    /// Enter a pipeline phase with `total` items (0 if unknown).
    pub fn set_phase(&self, phase: Phase, total: usize) {
        let (sink, status) = {
            let mut inner = self.lock();
            if inner.status.state != LifecycleState::Running {
                return;
            }
            inner.status.phase = phase;
            inner.status.current_item = 0;
            inner.status.total_items = total;
            inner.status.progress_percent = phase.percent_range().0;
            inner.status.message = phase.label().to_string();
            inner.status.detail = None;
            inner.last_notified_item = 0;
            (inner.sink.clone(), inner.snapshot())
        };
        Self::notify(sink, status, None);
    }

    /// Record progress within the current phase.
    pub fn set_progress(&self, current: usize, path: &Path) {
        let pushed = {
            let mut inner = self.lock();
            if inner.status.state != LifecycleState::Running {
                return;
            }
            let current = current.max(inner.status.current_item);
            inner.status.current_item = current;
            inner.status.detail = Some(path.to_path_buf());
            if inner.status.phase == Phase::Walking {
                inner.status.files_scanned = current;
            }

            let (start, end) = inner.status.phase.percent_range();
            let total = inner.status.total_items;
            if total > 0 {
                let fraction = (current as f64 / total as f64).min(1.0);
                inner.status.progress_percent = start + (end - start) * fraction;
            }

            let due = current.saturating_sub(inner.last_notified_item) >= PROGRESS_NOTIFY_INTERVAL
                || (total > 0 && current >= total);
            if due {
                inner.last_notified_item = current;
                Some((inner.sink.clone(), inner.snapshot()))
            } else {
                None
            }
        };

        if let Some((sink, status)) = pushed {
            Self::notify(sink, status, None);
        }
    }

    /// Record the number of duplicate groups found.
    pub fn set_duplicate_groups(&self, groups: usize) {
        self.lock().status.duplicate_groups = groups;
    }

    /// Settle the job in a terminal state.
    pub fn finish(&self, state: LifecycleState, error: Option<String>) {
        let (sink, status) = {
            let mut inner = self.lock();
            inner.status.state = state;
            inner.status.phase = Phase::Done;
            inner.status.finished_at = Some(Utc::now());
            inner.status.detail = None;
            inner.status.message = match state {
                LifecycleState::Completed => "Scan complete".to_string(),
                LifecycleState::Cancelled => "Scan cancelled".to_string(),
                LifecycleState::Failed => "Scan failed".to_string(),
                other => other.to_string(),
            };
            if state == LifecycleState::Completed {
                inner.status.progress_percent = 100.0;
            }
            inner.status.error = error;
            (inner.sink.clone(), inner.snapshot())
        };
        self.changed.notify_all();
        Self::notify(sink, status, None);
    }

    /// Block until the state is no longer `Running` or `timeout` elapses.
    ///
    /// Returns the state observed on return.
    pub fn wait(&self, timeout: Option<Duration>) -> LifecycleState {
        let guard = self.lock();
        let running = |inner: &mut Inner| inner.status.state == LifecycleState::Running;

        let guard = match timeout {
            Some(timeout) => {
                self.changed
                    .wait_timeout_while(guard, timeout, running)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .changed
                .wait_while(guard, running)
                .unwrap_or_else(PoisonError::into_inner),
        };
        guard.status.state
    }
}

impl ProgressCallback for StatusReporter {
    fn on_phase_start(&self, phase: Phase, total: usize) {
        self.set_phase(phase, total);
        let message = if total > 0 {
            format!("{} ({} files)", phase.label(), total)
        } else {
            phase.label().to_string()
        };
        self.log(LogLevel::Info, "pipeline", message);
    }

    fn on_progress(&self, current: usize, path: &Path) {
        self.set_progress(current, path);
    }

    fn on_phase_end(&self, phase: Phase) {
        self.log(LogLevel::Debug, "pipeline", format!("{} finished", phase.label()));
    }

    fn on_groups_found(&self, count: usize) {
        self.set_duplicate_groups(count);
    }

    fn on_warning(&self, context: &str, message: &str) {
        self.log(LogLevel::Warn, context, message);
    }
}
