//! Progress reporting.
//!
//! Two seams live here:
//! - [`ProgressCallback`], which the pipeline calls as it works (implemented
//!   by the status reporter)
//! - [`Progress`], an indicatif renderer the CLI registers as its
//!   [`StatusSink`]

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::status::{LifecycleState, LogLevel, Phase, StatusSink, StatusUpdate};

/// Callback trait for pipeline progress.
///
/// Implementations must be thread-safe; hashing workers call in concurrently.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts with its item count (0 if unknown).
    fn on_phase_start(&self, phase: Phase, total: usize);

    /// Called for each item processed (`current` is 1-based).
    fn on_progress(&self, current: usize, path: &Path);

    /// Called after an item's full content has been hashed.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: Phase);

    /// Called once the full stage has confirmed `count` duplicate groups.
    fn on_groups_found(&self, _count: usize) {}

    /// Called when a path is skipped or a digest fails.
    fn on_warning(&self, context: &str, message: &str) {
        log::warn!("[{}] {}", context, message);
    }
}

/// Terminal progress display driven by status updates.
pub struct Progress {
    multi: MultiProgress,
    bar: Mutex<Option<(Phase, ProgressBar)>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress display. With `quiet`, nothing is drawn.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupe_engine::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn walking_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn hashing_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn bar_for(&self, phase: Phase, total: usize) -> ProgressBar {
        if phase == Phase::Walking || total == 0 {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::walking_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::hashing_style());
            pb
        }
    }
}

impl StatusSink for Progress {
    fn on_update(&self, update: &StatusUpdate) {
        if self.quiet {
            return;
        }

        let status = &update.status;
        let mut slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = &update.log {
            if entry.level >= LogLevel::Warn {
                let _ = self.multi.println(entry.to_string());
            }
        }

        if status.state.is_terminal() {
            if let Some((_, pb)) = slot.take() {
                match status.state {
                    LifecycleState::Completed => pb.finish_with_message("done"),
                    _ => pb.abandon_with_message(status.state.to_string()),
                }
            }
            return;
        }

        if status.state != LifecycleState::Running || matches!(status.phase, Phase::Idle) {
            return;
        }

        let stale = slot.as_ref().map_or(true, |(phase, _)| *phase != status.phase);
        if stale {
            if let Some((_, pb)) = slot.take() {
                pb.finish_and_clear();
            }
            let pb = self.bar_for(status.phase, status.total_items);
            *slot = Some((status.phase, pb));
        }

        if let Some((_, pb)) = slot.as_ref() {
            pb.set_position(status.current_item as u64);
            let detail = status
                .detail
                .as_deref()
                .map(|p| truncate_path(&p.to_string_lossy(), 30))
                .unwrap_or_default();
            if detail.is_empty() {
                pb.set_message(status.phase.label());
            } else {
                pb.set_message(format!("{}: {}", status.phase.label(), detail));
            }
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{JobStatus, LogEntry};

    #[test]
    fn test_truncate_path_short() {
        assert_eq!(truncate_path("/a/b.txt", 30), "/a/b.txt");
    }

    #[test]
    fn test_truncate_path_long() {
        let path = "/very/long/directory/structure/that/goes/on/file.txt";
        assert_eq!(truncate_path(path, 30), ".../file.txt");
    }

    #[test]
    fn test_truncate_path_long_name() {
        let name = "a".repeat(50);
        let truncated = truncate_path(&format!("/dir/{name}"), 30);
        assert!(truncated.starts_with("..."));
        assert_eq!(truncated.chars().count(), 30);
    }

    #[test]
    fn test_progress_handles_lifecycle() {
        let progress = Progress::new(false);
        let running = JobStatus {
            state: LifecycleState::Running,
            phase: Phase::PartialHashing,
            total_items: 10,
            current_item: 3,
            ..Default::default()
        };
        progress.on_update(&StatusUpdate {
            status: running.clone(),
            log: Some(LogEntry::new(LogLevel::Warn, "hasher", "skipped")),
        });
        assert!(progress.bar.lock().unwrap().is_some());

        let done = JobStatus {
            state: LifecycleState::Completed,
            ..running
        };
        progress.on_update(&StatusUpdate {
            status: done,
            log: None,
        });
        assert!(progress.bar.lock().unwrap().is_none());
    }

    #[test]
    fn test_quiet_progress_draws_nothing() {
        let progress = Progress::new(true);
        progress.on_update(&StatusUpdate {
            status: JobStatus {
                state: LifecycleState::Running,
                phase: Phase::Walking,
                ..Default::default()
            },
            log: None,
        });
        assert!(progress.bar.lock().unwrap().is_none());
    }
}
