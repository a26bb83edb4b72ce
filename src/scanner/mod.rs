//! Scanner module for directory traversal and file hashing.
//!
//! This module provides functionality for:
//! - Directory walking with cooperative cancellation
//! - Partial (XxHash64) and full (BLAKE3) content digests
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Streaming digest computation
//!
//! # Example
//!
//! ```no_run
//! use dupe_engine::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     min_size: 1024,
//!     include_hidden: false,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

use crate::config::ScanConfig;

// Re-export main types
pub use hasher::{hash_to_hex, Hash, Hasher, PartialStrategy, DEFAULT_PARTIAL_WINDOW};
pub use walker::Walker;

/// Metadata for a discovered file.
///
/// Immutable once the walker has produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileRecord {
    /// Create a new FileRecord.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Link loops are detected and skipped.
    pub follow_symlinks: bool,

    /// Include hidden files and directories.
    pub include_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            min_size: 0,
        }
    }
}

impl From<&ScanConfig> for WalkerConfig {
    fn from(config: &ScanConfig) -> Self {
        Self {
            follow_symlinks: config.follow_symlinks,
            include_hidden: config.include_hidden,
            min_size: config.min_file_size,
        }
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path disappeared between listing and inspection.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A symbolic link loop was detected while following links.
    #[error("Symlink loop at {0}")]
    Loop(PathBuf),

    /// The entry is not a regular file (socket, FIFO, device).
    #[error("Not a regular file: {0}")]
    Unsupported(PathBuf),

    /// The scan root itself could not be read. Fatal for the job.
    #[error("Scan root unavailable: {path}: {reason}")]
    RootUnavailable {
        /// The scan root
        path: PathBuf,
        /// Description of the underlying failure
        reason: String,
    },

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Whether this error makes further progress on the whole scan impossible.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RootUnavailable { .. })
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file vanished before or while it was read.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because the job was cancelled.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error for `path`.
    pub(crate) fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
