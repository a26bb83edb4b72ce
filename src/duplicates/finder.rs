//! Duplicate finder implementation with staged detection.
//!
//! # Overview
//!
//! This module orchestrates the duplicate detection pipeline:
//! 1. **Walk + size buckets**: the walker runs on its own thread and streams
//!    records over a bounded channel into a [`SizeIndex`]
//! 2. **Partial digest**: split each size bucket by a cheap XxHash64 digest
//! 3. **Full digest**: confirm with BLAKE3 over the entire content
//! 4. **Folders** (optional): find directories duplicated as a whole
//!
//! Stages 2 and 3 run on a rayon pool owned by the finder, parallel across
//! buckets and across the members of each bucket. Any bucket that shrinks to
//! a single member is dropped on the spot.
//!
//! # Example
//!
//! ```no_run
//! use dupe_engine::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::new(FinderConfig::default().with_workers(4)).unwrap();
//! let output = finder.find_duplicates(Path::new("/some/path")).unwrap();
//!
//! println!("Found {} duplicate groups", output.groups.len());
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use rayon::prelude::*;

use super::folders::{FolderAnalyzer, FolderGroup};
use super::groups::{sort_groups, DuplicateGroup, SizeBucket, SizeIndex};
use crate::config::ScanConfig;
use crate::progress::ProgressCallback;
use crate::scanner::{
    FileRecord, Hash, HashError, Hasher, PartialStrategy, ScanError, Walker, WalkerConfig,
    DEFAULT_PARTIAL_WINDOW,
};
use crate::signal::CancelToken;
use crate::status::Phase;

/// Records in flight between the walker thread and bucket assembly.
const WALK_CHANNEL_CAPACITY: usize = 1024;

/// Files larger than this are logged before full hashing.
const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Hashing threads.
    pub workers: usize,
    /// Traversal options.
    pub walker: WalkerConfig,
    /// Bytes per partial digest sample.
    pub partial_window: usize,
    /// Partial sampling strategy.
    pub partial_strategy: PartialStrategy,
    /// Key size buckets by (size, file name).
    pub filter_by_filename: bool,
    /// Run folder analysis after file grouping.
    pub detect_folders: bool,
    /// Cooperative cancellation.
    pub cancel: CancelToken,
    /// Optional progress callback.
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("workers", &self.workers)
            .field("walker", &self.walker)
            .field("partial_window", &self.partial_window)
            .field("partial_strategy", &self.partial_strategy)
            .field("filter_by_filename", &self.filter_by_filename)
            .field("detect_folders", &self.detect_folders)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            walker: WalkerConfig::default(),
            partial_window: DEFAULT_PARTIAL_WINDOW,
            partial_strategy: PartialStrategy::Prefix,
            filter_by_filename: false,
            detect_folders: true,
            cancel: CancelToken::new(),
            progress: None,
        }
    }
}

impl FinderConfig {
    /// Derive a finder configuration from job options.
    #[must_use]
    pub fn from_scan_config(config: &ScanConfig, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            walker: WalkerConfig::from(config),
            partial_window: config.partial_hash_window_bytes,
            partial_strategy: config.partial_strategy,
            filter_by_filename: config.filter_by_filename,
            detect_folders: config.detect_folders,
            ..Self::default()
        }
    }

    /// Set the number of hashing threads.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Enable or disable folder analysis.
    #[must_use]
    pub fn with_detect_folders(mut self, enabled: bool) -> Self {
        self.detect_folders = enabled;
        self
    }
}

/// Counters collected over a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinderStats {
    /// Regular files yielded by the walker
    pub files_scanned: usize,
    /// Sum of their sizes
    pub bytes_scanned: u64,
    /// Paths the walker skipped with a warning
    pub skipped_paths: usize,
    /// Partial digests successfully computed
    pub partial_digests: usize,
    /// Full digests successfully computed
    pub full_digests: usize,
    /// Files dropped because a digest could not be computed
    pub failed_files: usize,
    /// Bytes read by full digests
    pub bytes_hashed: u64,
}

/// Files sharing a size and a partial digest.
#[derive(Debug, Clone)]
pub struct HashBucket {
    /// Shared file size
    pub size: u64,
    /// Shared partial digest
    pub partial: u64,
    /// Candidate files
    pub files: Vec<FileRecord>,
}

/// Everything a pipeline run produces.
#[derive(Debug, Clone, Default)]
pub struct FinderOutput {
    /// Confirmed duplicate groups in report order
    pub groups: Vec<DuplicateGroup>,
    /// Duplicated folders in report order
    pub folders: Vec<FolderGroup>,
    /// Run counters
    pub stats: FinderStats,
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was cancelled.
    #[error("Scan interrupted")]
    Interrupted,

    /// The pipeline cannot continue at all.
    #[error("{0}")]
    Fault(String),
}

/// Per-stage hashing outcome shared across workers.
#[derive(Default)]
struct StageCounters {
    done: AtomicUsize,
    hashed: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

/// Duplicate finder that orchestrates the staged detection pipeline.
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Hasher,
    pool: rayon::ThreadPool,
}

impl DuplicateFinder {
    /// Create a finder and its hashing pool.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Fault`] if the thread pool cannot be built.
    pub fn new(config: FinderConfig) -> Result<Self, FinderError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("dupe-hash-{i}"))
            .build()
            .map_err(|e| FinderError::Fault(format!("Failed to build worker pool: {e}")))?;

        let hasher = Hasher::new()
            .with_window(config.partial_window)
            .with_strategy(config.partial_strategy)
            .with_cancel_token(config.cancel.clone());

        Ok(Self {
            config,
            hasher,
            pool,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.config.cancel.is_cancelled()
    }

    fn check_cancelled(&self) -> Result<(), FinderError> {
        if self.is_cancelled() {
            Err(FinderError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn warn(&self, context: &str, message: &str) {
        match self.config.progress {
            Some(ref callback) => callback.on_warning(context, message),
            None => log::warn!("[{}] {}", context, message),
        }
    }

    fn phase_start(&self, phase: Phase, total: usize) {
        if let Some(ref callback) = self.config.progress {
            callback.on_phase_start(phase, total);
        }
    }

    fn phase_end(&self, phase: Phase) {
        if let Some(ref callback) = self.config.progress {
            callback.on_phase_end(phase);
        }
    }

    fn progress(&self, current: usize, path: &Path) {
        if let Some(ref callback) = self.config.progress {
            callback.on_progress(current, path);
        }
    }

    /// Run the whole pipeline over `root`.
    ///
    /// # Errors
    ///
    /// - [`FinderError::Interrupted`] if the cancel token trips
    /// - [`FinderError::Fault`] if the root cannot be read, vanishes during
    ///   the walk, or the walker dies
    pub fn find_duplicates(&self, root: &Path) -> Result<FinderOutput, FinderError> {
        let mut stats = FinderStats::default();

        let buckets = self.collect_buckets(root, &mut stats)?;
        self.check_cancelled()?;

        let hash_buckets = self.partial_stage(buckets, &mut stats)?;
        self.check_cancelled()?;

        let mut groups = self.full_stage(hash_buckets, &mut stats)?;
        self.check_cancelled()?;
        sort_groups(&mut groups);
        if let Some(ref callback) = self.config.progress {
            callback.on_groups_found(groups.len());
        }

        let folders = if self.config.detect_folders && !groups.is_empty() {
            self.phase_start(Phase::FolderAnalysis, 0);
            let analyzer = FolderAnalyzer::new(root, self.config.walker.include_hidden)
                .with_cancel_token(self.config.cancel.clone());
            let folders = analyzer.analyze(&groups)?;
            self.phase_end(Phase::FolderAnalysis);
            folders
        } else {
            Vec::new()
        };

        log::info!(
            "Pipeline complete: {} files, {} groups, {} folder groups",
            stats.files_scanned,
            groups.len(),
            folders.len()
        );

        Ok(FinderOutput {
            groups,
            folders,
            stats,
        })
    }

    /// Walk `root` on a dedicated thread and bucket records by size as they arrive.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Fault`] if the root is unavailable, is gone once
    /// the walk ends, or the walker thread panics. Returns
    /// [`FinderError::Interrupted`] if cancelled.
    pub fn collect_buckets(
        &self,
        root: &Path,
        stats: &mut FinderStats,
    ) -> Result<Vec<SizeBucket>, FinderError> {
        self.phase_start(Phase::Walking, 0);

        let (tx, rx) = crossbeam_channel::bounded::<Result<FileRecord, ScanError>>(
            WALK_CHANNEL_CAPACITY,
        );
        let walker = Walker::new(root, self.config.walker.clone())
            .with_cancel_token(self.config.cancel.clone());

        let handle = thread::Builder::new()
            .name("dupe-walker".to_string())
            .spawn(move || {
                for item in walker.walk() {
                    if tx.send(item).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| FinderError::Fault(format!("Failed to spawn walker thread: {e}")))?;

        let mut index = SizeIndex::new(self.config.filter_by_filename);
        let mut fatal = None;

        for item in rx {
            match item {
                Ok(record) => {
                    stats.files_scanned += 1;
                    stats.bytes_scanned += record.size;
                    self.progress(stats.files_scanned, &record.path);
                    index.push(record);
                }
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    stats.skipped_paths += 1;
                    self.warn("walker", &format!("Skipped: {e}"));
                }
            }
        }

        handle
            .join()
            .map_err(|_| FinderError::Fault("Walker thread panicked".to_string()))?;

        if let Some(e) = fatal {
            return Err(FinderError::Fault(e.to_string()));
        }
        self.check_cancelled()?;

        // Losing the root mid-walk only surfaces as per-entry skips
        if !fs::metadata(root).map(|m| m.is_dir()).unwrap_or(false) {
            return Err(FinderError::Fault(format!(
                "Scan root vanished during walk: {}",
                root.display()
            )));
        }

        self.phase_end(Phase::Walking);
        let (buckets, grouping) = index.finish();
        log::debug!(
            "Walk complete: {} files in {} size buckets",
            grouping.total_files,
            grouping.buckets
        );
        Ok(buckets)
    }

    /// Split size buckets by partial digest, dropping sub-buckets of one.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Interrupted`] if cancelled.
    pub fn partial_stage(
        &self,
        buckets: Vec<SizeBucket>,
        stats: &mut FinderStats,
    ) -> Result<Vec<HashBucket>, FinderError> {
        let total: usize = buckets.iter().map(SizeBucket::len).sum();
        log::info!("Partial stage: {} files in {} buckets", total, buckets.len());
        self.phase_start(Phase::PartialHashing, total);

        let counters = StageCounters::default();
        let split: Vec<Vec<HashBucket>> = self.pool.install(|| {
            buckets
                .into_par_iter()
                .map(|bucket| self.split_by_partial(bucket, &counters))
                .collect()
        });
        self.check_cancelled()?;

        stats.partial_digests += counters.hashed.load(Ordering::Relaxed);
        stats.failed_files += counters.failed.load(Ordering::Relaxed);

        let mut hash_buckets: Vec<HashBucket> = split.into_iter().flatten().collect();
        hash_buckets.sort_by(|a, b| b.size.cmp(&a.size).then(a.partial.cmp(&b.partial)));

        self.phase_end(Phase::PartialHashing);
        log::info!(
            "Partial stage complete: {} files -> {} candidates",
            total,
            hash_buckets.iter().map(|b| b.files.len()).sum::<usize>()
        );
        Ok(hash_buckets)
    }

    fn split_by_partial(&self, bucket: SizeBucket, counters: &StageCounters) -> Vec<HashBucket> {
        if self.is_cancelled() {
            return Vec::new();
        }

        let size = bucket.size;
        let digests: Vec<(u64, FileRecord)> = bucket
            .files
            .into_par_iter()
            .filter_map(|file| {
                if self.is_cancelled() {
                    return None;
                }
                let current = counters.done.fetch_add(1, Ordering::Relaxed) + 1;
                self.progress(current, &file.path);

                match self.hasher.partial_digest(&file.path) {
                    Ok(digest) => {
                        counters.hashed.fetch_add(1, Ordering::Relaxed);
                        Some((digest, file))
                    }
                    Err(e) => {
                        self.record_failure("partial digest", &e, counters);
                        None
                    }
                }
            })
            .collect();

        let mut by_digest: HashMap<u64, Vec<FileRecord>> = HashMap::new();
        for (digest, file) in digests {
            by_digest.entry(digest).or_default().push(file);
        }

        by_digest
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(partial, files)| HashBucket {
                size,
                partial,
                files,
            })
            .collect()
    }

    /// Confirm candidates by full digest.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Interrupted`] if cancelled.
    pub fn full_stage(
        &self,
        buckets: Vec<HashBucket>,
        stats: &mut FinderStats,
    ) -> Result<Vec<DuplicateGroup>, FinderError> {
        let total: usize = buckets.iter().map(|b| b.files.len()).sum();
        log::info!("Full stage: {} files in {} buckets", total, buckets.len());
        self.phase_start(Phase::FullHashing, total);

        let counters = StageCounters::default();
        let confirmed: Vec<Vec<DuplicateGroup>> = self.pool.install(|| {
            buckets
                .into_par_iter()
                .map(|bucket| self.confirm_by_full(bucket, &counters))
                .collect()
        });
        self.check_cancelled()?;

        stats.full_digests += counters.hashed.load(Ordering::Relaxed);
        stats.failed_files += counters.failed.load(Ordering::Relaxed);
        stats.bytes_hashed += counters.bytes.load(Ordering::Relaxed);

        let groups: Vec<DuplicateGroup> = confirmed.into_iter().flatten().collect();

        self.phase_end(Phase::FullHashing);
        log::info!(
            "Full stage complete: {} groups, {} bytes reclaimable",
            groups.len(),
            groups.iter().map(DuplicateGroup::reclaimable).sum::<u64>()
        );
        Ok(groups)
    }

    fn confirm_by_full(&self, bucket: HashBucket, counters: &StageCounters) -> Vec<DuplicateGroup> {
        if self.is_cancelled() {
            return Vec::new();
        }

        let size = bucket.size;
        let digests: Vec<(Hash, PathBuf)> = bucket
            .files
            .into_par_iter()
            .filter_map(|file| {
                if self.is_cancelled() {
                    return None;
                }
                if file.size > LARGE_FILE_THRESHOLD {
                    log::debug!(
                        "Hashing large file ({} MB): {}",
                        file.size / (1024 * 1024),
                        file.path.display()
                    );
                }
                let current = counters.done.fetch_add(1, Ordering::Relaxed) + 1;
                self.progress(current, &file.path);

                match self.hasher.full_digest(&file.path) {
                    Ok(digest) => {
                        counters.hashed.fetch_add(1, Ordering::Relaxed);
                        counters.bytes.fetch_add(file.size, Ordering::Relaxed);
                        if let Some(ref callback) = self.config.progress {
                            callback.on_item_completed(file.size);
                        }
                        Some((digest, file.path))
                    }
                    Err(e) => {
                        self.record_failure("full digest", &e, counters);
                        None
                    }
                }
            })
            .collect();

        let mut by_digest: HashMap<Hash, Vec<PathBuf>> = HashMap::new();
        for (digest, path) in digests {
            by_digest.entry(digest).or_default().push(path);
        }

        by_digest
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(hash, paths)| {
                log::debug!(
                    "Duplicate group {}: {} files, {} bytes each",
                    crate::scanner::hash_to_hex(&hash),
                    paths.len(),
                    size
                );
                DuplicateGroup::new(hash, size, paths)
            })
            .collect()
    }

    fn record_failure(&self, operation: &str, error: &HashError, counters: &StageCounters) {
        if matches!(error, HashError::Interrupted(_)) {
            return;
        }
        counters.failed.fetch_add(1, Ordering::Relaxed);
        let message = match error {
            HashError::NotFound(path) => {
                format!("{operation} skipped, file vanished: {}", path.display())
            }
            other => format!("{operation} failed: {other}"),
        };
        self.warn("hasher", &message);
    }
}
