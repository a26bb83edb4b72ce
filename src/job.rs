//! Lifecycle of a single scan job.
//!
//! [`JobController`] owns at most one job at a time. `start` validates the
//! root, moves the status to `Running` and spawns a job thread; the job
//! thread runs the pipeline and settles the status in `Completed`,
//! `Cancelled` or `Failed`. A settled state stays visible until the next
//! `start`.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::ScanConfig;
use crate::duplicates::{DuplicateFinder, FinderConfig, FinderError, FinderOutput};
use crate::engine::PlatformHints;
use crate::error::EngineError;
use crate::report::ScanReport;
use crate::signal::CancelToken;
use crate::status::{LifecycleState, LogLevel, Phase, StatusReporter};

#[derive(Default)]
struct Slot {
    cancel: Option<CancelToken>,
    result: Option<Arc<ScanReport>>,
    handle: Option<JoinHandle<()>>,
}

/// Starts, cancels and collects scan jobs.
pub struct JobController {
    hints: PlatformHints,
    reporter: Arc<StatusReporter>,
    slot: Arc<Mutex<Slot>>,
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("hints", &self.hints)
            .field("state", &self.reporter.state())
            .finish()
    }
}

impl JobController {
    /// Controller reporting through `reporter`.
    #[must_use]
    pub fn new(hints: PlatformHints, reporter: Arc<StatusReporter>) -> Self {
        Self {
            hints,
            reporter,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        lock_slot(&self.slot)
    }

    /// Start scanning `root` in the background.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if `config` is invalid
    /// - [`EngineError::InvalidPath`] if `root` is missing or not a directory
    /// - [`EngineError::JobAlreadyRunning`] if a job is running; it is left untouched
    /// - [`EngineError::PipelineFault`] if the job thread cannot be spawned
    pub fn start(&self, root: &Path, config: ScanConfig) -> Result<(), EngineError> {
        config.validate()?;

        if !root.is_dir() {
            return Err(EngineError::InvalidPath(root.to_path_buf()));
        }
        let root =
            fs::canonicalize(root).map_err(|_| EngineError::InvalidPath(root.to_path_buf()))?;

        let workers = config.resolved_workers(&self.hints);

        let (previous, spawn_error) = {
            let mut slot = self.lock();
            if !self.reporter.begin(&root) {
                return Err(EngineError::JobAlreadyRunning);
            }

            // The previous job has settled; its thread is reaped below, unlocked
            let previous = slot.handle.take();
            slot.result = None;

            let token = CancelToken::new();
            slot.cancel = Some(token.clone());

            let job = Job {
                root,
                config,
                workers,
                cancel: token,
                reporter: Arc::clone(&self.reporter),
                slot: Arc::clone(&self.slot),
            };

            let spawn_error = match thread::Builder::new()
                .name("dupe-job".to_string())
                .spawn(move || job.run())
            {
                Ok(handle) => {
                    slot.handle = Some(handle);
                    None
                }
                Err(e) => Some(format!("Failed to spawn job thread: {e}")),
            };
            (previous, spawn_error)
        };

        // The previous job thread may still be inside a status sink that calls
        // back into this controller, possibly this very call.
        if let Some(handle) = previous {
            reap(handle);
        }

        if let Some(message) = spawn_error {
            self.reporter.log(LogLevel::Fatal, "job", message.clone());
            self.reporter
                .finish(LifecycleState::Failed, Some(message.clone()));
            return Err(EngineError::PipelineFault(message));
        }
        Ok(())
    }

    /// Request cancellation of the running job. No-op otherwise.
    pub fn cancel(&self) {
        let tripped = {
            let slot = self.lock();
            match slot.cancel {
                Some(ref token)
                    if self.reporter.state() == LifecycleState::Running
                        && slot.result.is_none()
                        && !token.is_cancelled() =>
                {
                    token.cancel();
                    true
                }
                _ => false,
            }
        };

        if tripped {
            self.reporter
                .log(LogLevel::Info, "job", "Cancellation requested");
        }
    }

    /// Whether a job is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.reporter.state() == LifecycleState::Running
    }

    /// The report of the last job, once it has completed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotReady`] unless the last job is `Completed`.
    pub fn result(&self) -> Result<Arc<ScanReport>, EngineError> {
        let slot = self.lock();
        if self.reporter.state() != LifecycleState::Completed {
            return Err(EngineError::NotReady);
        }
        slot.result.clone().ok_or(EngineError::NotReady)
    }

    /// Block until no job is running or `timeout` elapses; returns the state.
    pub fn wait(&self, timeout: Option<Duration>) -> LifecycleState {
        self.reporter.wait(timeout)
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        let handle = {
            let mut slot = self.lock();
            if let Some(ref token) = slot.cancel {
                token.cancel();
            }
            slot.handle.take()
        };
        if let Some(handle) = handle {
            reap(handle);
        }
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Join a job thread, or detach it when called from that same thread.
fn reap(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        log::debug!("Detaching the calling job thread");
        return;
    }
    let _ = handle.join();
}

/// Everything the job thread needs.
struct Job {
    root: PathBuf,
    config: ScanConfig,
    workers: usize,
    cancel: CancelToken,
    reporter: Arc<StatusReporter>,
    slot: Arc<Mutex<Slot>>,
}

impl Job {
    fn run(self) {
        let started = Instant::now();
        self.reporter.log(
            LogLevel::Info,
            "job",
            format!(
                "Scan started: {} ({} workers)",
                self.root.display(),
                self.workers
            ),
        );

        let finder_config = FinderConfig::from_scan_config(&self.config, self.workers)
            .with_cancel_token(self.cancel.clone())
            .with_progress_callback(self.reporter.clone());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            DuplicateFinder::new(finder_config).and_then(|finder| finder.find_duplicates(&self.root))
        }));

        match outcome {
            Ok(Ok(output)) => self.complete(output, started.elapsed()),
            Ok(Err(FinderError::Interrupted)) => self.cancelled(),
            Ok(Err(FinderError::Fault(message))) => self.fail(message),
            Err(payload) => self.fail(format!("Pipeline panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    fn complete(&self, output: FinderOutput, elapsed: Duration) {
        self.reporter.set_phase(Phase::Finalizing, 0);
        let report = ScanReport::new(self.root.clone(), output, elapsed);
        let summary = report.summary.clone();

        {
            let mut slot = lock_slot(&self.slot);
            if self.cancel.is_cancelled() {
                drop(slot);
                self.cancelled();
                return;
            }
            slot.result = Some(Arc::new(report));
        }

        self.reporter.set_duplicate_groups(summary.file_sets);
        self.reporter.log(
            LogLevel::Info,
            "job",
            format!(
                "Scan complete: {} files, {} duplicate sets, {} folder sets, {} reclaimable",
                summary.files_scanned,
                summary.file_sets,
                summary.folder_sets,
                summary.reclaimable_display()
            ),
        );
        self.reporter.finish(LifecycleState::Completed, None);
    }

    fn cancelled(&self) {
        self.reporter
            .log(LogLevel::Info, "job", "Scan cancelled; results discarded");
        self.reporter.finish(LifecycleState::Cancelled, None);
    }

    fn fail(&self, message: String) {
        self.reporter.log(LogLevel::Fatal, "job", message.clone());
        self.reporter.finish(LifecycleState::Failed, Some(message));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusUpdate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn controller() -> JobController {
        JobController::new(
            PlatformHints::default(),
            Arc::new(StatusReporter::default()),
        )
    }

    #[test]
    fn test_start_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let jobs = controller();
        let err = jobs
            .start(&dir.path().join("missing"), ScanConfig::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPath(_)));
        assert!(!jobs.is_running());
    }

    #[test]
    fn test_start_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let err = controller().start(&file, ScanConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPath(_)));
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = ScanConfig {
            worker_pool_size: Some(0),
            ..Default::default()
        };
        let err = controller().start(dir.path(), config).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_job_completes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), "same").unwrap();
        fs::write(dir.path().join("b"), "same").unwrap();

        let jobs = controller();
        assert!(matches!(jobs.result(), Err(EngineError::NotReady)));

        jobs.start(dir.path(), ScanConfig::default()).unwrap();
        let state = jobs.wait(Some(Duration::from_secs(30)));
        assert_eq!(state, LifecycleState::Completed);

        let report = jobs.result().unwrap();
        assert_eq!(report.groups.len(), 1);
        // Repeated reads return the same report
        assert!(Arc::ptr_eq(&report, &jobs.result().unwrap()));
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let jobs = controller();
        jobs.cancel();
        assert!(!jobs.is_running());
        assert!(matches!(jobs.result(), Err(EngineError::NotReady)));
    }

    #[test]
    fn test_restart_clears_previous_result() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), "same").unwrap();
        fs::write(dir.path().join("b"), "same").unwrap();

        let jobs = controller();
        jobs.start(dir.path(), ScanConfig::default()).unwrap();
        jobs.wait(None);
        assert!(jobs.result().is_ok());

        fs::remove_file(dir.path().join("b")).unwrap();
        jobs.start(dir.path(), ScanConfig::default()).unwrap();
        jobs.wait(None);
        assert!(jobs.result().unwrap().groups.is_empty());
    }

    fn duplicate_pair() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), "same").unwrap();
        fs::write(dir.path().join("b"), "same").unwrap();
        dir
    }

    fn shared_controller() -> (Arc<StatusReporter>, Arc<JobController>) {
        let reporter = Arc::new(StatusReporter::default());
        let jobs = Arc::new(JobController::new(
            PlatformHints::default(),
            Arc::clone(&reporter),
        ));
        (reporter, jobs)
    }

    #[test]
    fn test_restart_from_completion_sink() {
        let dir = duplicate_pair();
        let (reporter, jobs) = shared_controller();

        let completions = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&completions);
        let weak = Arc::downgrade(&jobs);
        let root = dir.path().to_path_buf();
        reporter.set_sink(Arc::new(move |update: &StatusUpdate| {
            if update.status.state == LifecycleState::Completed
                && seen.fetch_add(1, Ordering::SeqCst) == 0
            {
                // Runs on the job thread that just completed
                if let Some(jobs) = weak.upgrade() {
                    jobs.start(&root, ScanConfig::default()).unwrap();
                }
            }
        }));

        jobs.start(dir.path(), ScanConfig::default()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        while completions.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(completions.load(Ordering::SeqCst), 2);
        assert_eq!(
            jobs.wait(Some(Duration::from_secs(30))),
            LifecycleState::Completed
        );
        assert!(!jobs.is_running());
        assert_eq!(jobs.result().unwrap().groups.len(), 1);

        reporter.clear_sink();
        jobs.start(dir.path(), ScanConfig::default()).unwrap();
        assert_eq!(
            jobs.wait(Some(Duration::from_secs(30))),
            LifecycleState::Completed
        );
    }

    #[test]
    fn test_start_while_previous_sink_reads_result() {
        let dir = duplicate_pair();
        let (reporter, jobs) = shared_controller();

        let first = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&jobs);
        reporter.set_sink(Arc::new(move |update: &StatusUpdate| {
            if update.status.state == LifecycleState::Completed
                && first.fetch_add(1, Ordering::SeqCst) == 0
            {
                // Still inside the sink when the host starts the next job
                thread::sleep(Duration::from_millis(200));
                if let Some(jobs) = weak.upgrade() {
                    let _ = jobs.result();
                    jobs.cancel();
                }
            }
        }));

        jobs.start(dir.path(), ScanConfig::default()).unwrap();
        assert_eq!(jobs.wait(None), LifecycleState::Completed);

        let (tx, rx) = mpsc::channel();
        let restart = {
            let jobs = Arc::clone(&jobs);
            let root = dir.path().to_path_buf();
            thread::spawn(move || {
                let outcome = jobs.start(&root, ScanConfig::default());
                let _ = tx.send(outcome.is_ok());
            })
        };

        assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(true));
        restart.join().unwrap();
        assert!(jobs.wait(Some(Duration::from_secs(30))).is_terminal());
        reporter.clear_sink();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
