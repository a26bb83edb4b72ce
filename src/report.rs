//! Scan results handed back to the host.

use std::path::PathBuf;
use std::time::Duration;

use bytesize::ByteSize;
use serde::Serialize;

use crate::duplicates::{DuplicateGroup, FinderOutput, FolderGroup};

/// Totals for a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Number of duplicate file groups
    pub file_sets: usize,
    /// Number of duplicate folder groups
    pub folder_sets: usize,
    /// Redundant copies across all file groups
    pub duplicate_files: usize,
    /// Bytes freed by keeping one copy of every file group
    pub reclaimable_bytes: u64,
    /// Regular files found by the walker
    pub files_scanned: usize,
    /// Total size of those files
    pub bytes_scanned: u64,
    /// Paths skipped with a warning
    pub skipped_paths: usize,
    /// Files dropped because a digest failed
    pub failed_files: usize,
    /// Partial digests computed
    pub partial_digests: usize,
    /// Full digests computed
    pub full_digests: usize,
    /// Wall time of the job in milliseconds
    pub duration_ms: u64,
}

impl ReportSummary {
    /// Reclaimable space as a human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_bytes).to_string()
    }

    /// Scanned volume as a human-readable string.
    #[must_use]
    pub fn scanned_display(&self) -> String {
        ByteSize::b(self.bytes_scanned).to_string()
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Root that was scanned
    pub root: PathBuf,
    /// Duplicate file groups, largest reclaimable space first
    pub groups: Vec<DuplicateGroup>,
    /// Duplicate folder groups, largest reclaimable space first
    pub folders: Vec<FolderGroup>,
    /// Totals
    pub summary: ReportSummary,
}

impl ScanReport {
    /// Assemble a report from a finished pipeline run.
    #[must_use]
    pub fn new(root: PathBuf, output: FinderOutput, duration: Duration) -> Self {
        let FinderOutput {
            groups,
            folders,
            stats,
        } = output;

        let summary = ReportSummary {
            file_sets: groups.len(),
            folder_sets: folders.len(),
            duplicate_files: groups.iter().map(|g| g.count().saturating_sub(1)).sum(),
            reclaimable_bytes: groups.iter().map(DuplicateGroup::reclaimable).sum(),
            files_scanned: stats.files_scanned,
            bytes_scanned: stats.bytes_scanned,
            skipped_paths: stats.skipped_paths,
            failed_files: stats.failed_files,
            partial_digests: stats.partial_digests,
            full_digests: stats.full_digests,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        };

        Self {
            root,
            groups,
            folders,
            summary,
        }
    }

    /// Whether no duplicates of any kind were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.folders.is_empty()
    }
}
