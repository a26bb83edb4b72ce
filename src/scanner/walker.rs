//! Directory walker.
//!
//! # Overview
//!
//! [`Walker`] traverses a directory tree with `walkdir` and yields a
//! [`FileRecord`] for every regular file that passes the configured filters.
//! Problems with individual entries are yielded as [`ScanError`] values so the
//! caller can log them and keep going; only
//! [`ScanError::RootUnavailable`] is fatal.
//!
//! # Features
//!
//! - Symlinks skipped by default; when followed, loops are reported, not walked
//! - Hidden entry policy (dot-prefixed names, plus the hidden attribute on Windows)
//! - Minimum size filter
//! - Children visited in file-name order for deterministic output
//! - Cancellation checked before every directory entry
//!
//! # Example
//!
//! ```no_run
//! use dupe_engine::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} files", files.len());
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

use super::{FileRecord, ScanError, WalkerConfig};
use crate::signal::CancelToken;

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional cancellation token
    cancel: Option<CancelToken>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            cancel: None,
        }
    }

    /// Stop iteration as soon as `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The root this walker traverses.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Walk the directory tree, yielding file records.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration. The iterator ends early once the cancel token trips.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let include_hidden = self.config.include_hidden;
        let mut entries = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| include_hidden || entry.depth() == 0 || !is_hidden(entry));

        std::iter::from_fn(move || loop {
            if self.is_cancelled() {
                log::debug!("Walker: cancellation requested, stopping iteration");
                return None;
            }
            let next = entries.next()?;
            let outcome = match next {
                Ok(entry) => self.process_entry(entry),
                Err(e) => Some(Err(self.convert_error(e))),
            };
            if outcome.is_some() {
                return outcome;
            }
        })
    }

    /// Turn a directory entry into a record, or `None` when it is filtered out.
    fn process_entry(&self, entry: DirEntry) -> Option<Result<FileRecord, ScanError>> {
        let file_type = entry.file_type();

        if file_type.is_dir() {
            return None;
        }

        // Only reachable when links are not followed
        if file_type.is_symlink() {
            log::trace!("Skipping symlink: {}", entry.path().display());
            return None;
        }

        if !file_type.is_file() {
            return Some(Err(ScanError::Unsupported(entry.into_path())));
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => return Some(Err(self.convert_error(e))),
        };

        let size = metadata.len();
        if size < self.config.min_size {
            log::trace!(
                "Skipping file below minimum size ({} < {}): {}",
                size,
                self.config.min_size,
                entry.path().display()
            );
            return None;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Some(Ok(FileRecord::new(entry.into_path(), size, modified)))
    }

    /// Classify a walkdir error.
    fn convert_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        if error.depth() == 0 {
            return ScanError::RootUnavailable {
                path,
                reason: error.to_string(),
            };
        }

        if error.loop_ancestor().is_some() {
            return ScanError::Loop(path);
        }

        match error.io_error().map(io::Error::kind) {
            Some(io::ErrorKind::PermissionDenied) => ScanError::PermissionDenied(path),
            Some(io::ErrorKind::NotFound) => ScanError::NotFound(path),
            _ => {
                let message = error.to_string();
                ScanError::Io {
                    path,
                    source: error
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other(message)),
                }
            }
        }
    }
}

/// Whether an entry is hidden by platform convention.
fn is_hidden(entry: &DirEntry) -> bool {
    if entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
    {
        return true;
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
        if let Ok(metadata) = entry.metadata() {
            return metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0;
        }
    }

    false
}
