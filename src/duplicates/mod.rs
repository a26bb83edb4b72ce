//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based file bucketing, pipelined with the walk
//! - Partial digest comparison
//! - Full digest confirmation
//! - Whole-folder duplicate detection

pub mod finder;
pub mod folders;
pub mod groups;

pub use finder::{DuplicateFinder, FinderConfig, FinderError, FinderOutput, FinderStats, HashBucket};
pub use folders::{FolderAnalyzer, FolderGroup};
pub use groups::{
    compare_groups, group_by_size, sort_groups, sort_paths, DuplicateGroup, GroupingStats, SizeBucket,
    SizeIndex,
};
