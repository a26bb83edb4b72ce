//! Size buckets and confirmed duplicate groups.
//!
//! # Overview
//!
//! Size bucketing is the first stage of duplicate detection. Files with
//! different sizes cannot be duplicates, so [`SizeIndex`] groups records by
//! exact size as they stream in from the walker. A size seen once is kept
//! aside; on its second occurrence it is promoted to a bucket. Sizes that
//! never see a second file are dropped by [`SizeIndex::finish`].
//!
//! # Example
//!
//! ```
//! use dupe_engine::scanner::FileRecord;
//! use dupe_engine::duplicates::SizeIndex;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let mut index = SizeIndex::new(false);
//! index.push(FileRecord::new(PathBuf::from("/file1.txt"), 1024, SystemTime::now()));
//! index.push(FileRecord::new(PathBuf::from("/file2.txt"), 1024, SystemTime::now()));
//! index.push(FileRecord::new(PathBuf::from("/file3.txt"), 2048, SystemTime::now()));
//!
//! let (buckets, stats) = index.finish();
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(buckets.len(), 1);
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::scanner::{hash_to_hex, FileRecord, Hash};

/// Bucket identity: the size, plus the file name when filename filtering is on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct BucketKey {
    size: u64,
    name: Option<OsString>,
}

/// Files sharing a size (and file name, when filtering by name).
#[derive(Debug, Clone)]
pub struct SizeBucket {
    /// File size in bytes (shared by all files in this bucket)
    pub size: u64,
    /// Files with this exact size
    pub files: Vec<FileRecord>,
}

impl SizeBucket {
    /// Number of files in this bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Space reclaimable if every file turned out identical.
    #[must_use]
    pub fn potential_savings(&self) -> u64 {
        self.size * self.files.len().saturating_sub(1) as u64
    }
}

/// Statistics from the size bucketing stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Total number of files pushed
    pub total_files: usize,
    /// Sum of all pushed file sizes
    pub total_size: u64,
    /// Files dropped because nothing else shared their key
    pub eliminated_unique: usize,
    /// Files left in buckets of two or more
    pub potential_duplicates: usize,
    /// Number of buckets of two or more
    pub buckets: usize,
}

impl GroupingStats {
    /// Percentage of files eliminated by size alone.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Streaming size bucket builder.
#[derive(Debug, Default)]
pub struct SizeIndex {
    by_filename: bool,
    singles: HashMap<BucketKey, FileRecord>,
    buckets: HashMap<BucketKey, Vec<FileRecord>>,
    stats: GroupingStats,
}

impl SizeIndex {
    /// Create an empty index. With `by_filename` the key is (size, file name).
    #[must_use]
    pub fn new(by_filename: bool) -> Self {
        Self {
            by_filename,
            ..Self::default()
        }
    }

    fn key_for(&self, record: &FileRecord) -> BucketKey {
        BucketKey {
            size: record.size,
            name: self
                .by_filename
                .then(|| record.path.file_name().map(ToOwned::to_owned))
                .flatten(),
        }
    }

    /// Add one record.
    pub fn push(&mut self, record: FileRecord) {
        self.stats.total_files += 1;
        self.stats.total_size += record.size;

        let key = self.key_for(&record);
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.push(record);
        } else if let Some(first) = self.singles.remove(&key) {
            self.buckets.insert(key, vec![first, record]);
        } else {
            self.singles.insert(key, record);
        }
    }

    /// Files pushed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.total_files
    }

    /// Whether nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.total_files == 0
    }

    /// Files currently sitting in buckets of two or more.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Drop singletons and return the buckets, largest size first.
    #[must_use]
    pub fn finish(self) -> (Vec<SizeBucket>, GroupingStats) {
        let mut stats = self.stats;
        stats.eliminated_unique = self.singles.len();

        for (key, record) in &self.singles {
            log::trace!(
                "Eliminated unique size {}: {}",
                key.size,
                record.path.display()
            );
        }

        let mut keyed: Vec<_> = self.buckets.into_iter().collect();
        keyed.sort_by(|(a, _), (b, _)| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));

        let buckets: Vec<SizeBucket> = keyed
            .into_iter()
            .map(|(key, files)| {
                log::debug!(
                    "Size bucket {} bytes: {} potential duplicates",
                    key.size,
                    files.len()
                );
                SizeBucket {
                    size: key.size,
                    files,
                }
            })
            .collect();

        stats.buckets = buckets.len();
        stats.potential_duplicates = buckets.iter().map(SizeBucket::len).sum();

        log::info!(
            "Size stage complete: {} files -> {} potential duplicates ({:.1}% eliminated)",
            stats.total_files,
            stats.potential_duplicates,
            stats.elimination_rate()
        );

        (buckets, stats)
    }
}

/// Group a finished collection of records by size.
#[must_use]
pub fn group_by_size(
    files: impl IntoIterator<Item = FileRecord>,
    by_filename: bool,
) -> (Vec<SizeBucket>, GroupingStats) {
    let mut index = SizeIndex::new(by_filename);
    for file in files {
        index.push(file);
    }
    index.finish()
}

/// Confirmed duplicate group of files.
///
/// Every member has the same size and the same full-content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// BLAKE3 hash of the file content
    pub hash: Hash,
    /// File size in bytes
    pub size: u64,
    /// Member paths, ordered by path
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Create a new group. Paths are sorted by their string form.
    #[must_use]
    pub fn new(hash: Hash, size: u64, mut paths: Vec<PathBuf>) -> Self {
        sort_paths(&mut paths);
        Self { hash, size, paths }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Total size of all copies.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size * self.paths.len() as u64
    }

    /// Space freed by keeping a single copy.
    #[must_use]
    pub fn reclaimable(&self) -> u64 {
        self.size * self.paths.len().saturating_sub(1) as u64
    }

    /// Hash as hexadecimal string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.hash)
    }
}

impl Serialize for DuplicateGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DuplicateGroup", 5)?;
        state.serialize_field("digest", &self.hash_hex())?;
        state.serialize_field("size", &self.size)?;
        state.serialize_field("count", &self.count())?;
        state.serialize_field("reclaimable", &self.reclaimable())?;
        state.serialize_field("paths", &self.paths)?;
        state.end()
    }
}

/// Report order: reclaimable space descending, then size descending, then digest.
#[must_use]
pub fn compare_groups(a: &DuplicateGroup, b: &DuplicateGroup) -> Ordering {
    b.reclaimable()
        .cmp(&a.reclaimable())
        .then_with(|| b.size.cmp(&a.size))
        .then_with(|| a.hash.cmp(&b.hash))
}

/// Sort paths by their string form, so `a-b` sorts before `a/x`.
pub fn sort_paths(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
}

/// Sort groups into report order.
pub fn sort_groups(groups: &mut [DuplicateGroup]) {
    groups.sort_by(compare_groups);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn make_file(path: &str, size: u64) -> FileRecord {
        FileRecord::new(PathBuf::from(path), size, SystemTime::now())
    }

    #[test]
    fn test_size_bucket_savings() {
        let bucket = SizeBucket {
            size: 1000,
            files: vec![make_file("/a", 1000), make_file("/b", 1000), make_file("/c", 1000)],
        };
        assert_eq!(bucket.len(), 3);
        assert_eq!(bucket.potential_savings(), 2000);
    }

    #[test]
    fn test_group_by_size_empty_input() {
        let (buckets, stats) = group_by_size(Vec::new(), false);

        assert!(buckets.is_empty());
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.potential_duplicates, 0);
        assert!((stats.elimination_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_group_by_size_all_unique() {
        let files = vec![
            make_file("/a.txt", 100),
            make_file("/b.txt", 200),
            make_file("/c.txt", 300),
        ];
        let (buckets, stats) = group_by_size(files, false);

        assert!(buckets.is_empty());
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.eliminated_unique, 3);
        assert_eq!(stats.potential_duplicates, 0);
    }

    #[test]
    fn test_group_by_size_multiple_buckets() {
        let files = vec![
            make_file("/a1.txt", 100),
            make_file("/a2.txt", 100),
            make_file("/b1.txt", 200),
            make_file("/b2.txt", 200),
            make_file("/b3.txt", 200),
            make_file("/c.txt", 300),
        ];
        let (buckets, stats) = group_by_size(files, false);

        assert_eq!(buckets.len(), 2);
        // Largest size first
        assert_eq!(buckets[0].size, 200);
        assert_eq!(buckets[0].len(), 3);
        assert_eq!(buckets[1].size, 100);

        assert_eq!(stats.total_files, 6);
        assert_eq!(stats.total_size, 1100);
        assert_eq!(stats.eliminated_unique, 1);
        assert_eq!(stats.potential_duplicates, 5);
        assert_eq!(stats.buckets, 2);
    }

    #[test]
    fn test_empty_files_form_a_bucket() {
        let files = vec![make_file("/e1", 0), make_file("/e2", 0), make_file("/n", 5)];
        let (buckets, stats) = group_by_size(files, false);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].size, 0);
        assert_eq!(stats.eliminated_unique, 1);
    }

    #[test]
    fn test_streaming_promotion() {
        let mut index = SizeIndex::new(false);
        index.push(make_file("/a", 10));
        assert_eq!(index.candidate_count(), 0);
        index.push(make_file("/b", 10));
        assert_eq!(index.candidate_count(), 2);
        index.push(make_file("/c", 10));
        assert_eq!(index.candidate_count(), 3);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_filename_keying() {
        let files = vec![
            make_file("/x/report.txt", 10),
            make_file("/y/report.txt", 10),
            make_file("/z/other.txt", 10),
        ];

        let (by_size, _) = group_by_size(files.clone(), false);
        assert_eq!(by_size.len(), 1);
        assert_eq!(by_size[0].len(), 3);

        let (by_name, stats) = group_by_size(files, true);
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].len(), 2);
        assert_eq!(stats.eliminated_unique, 1);
    }

    #[test]
    fn test_duplicate_group_sorts_paths() {
        let group = DuplicateGroup::new(
            [1; 32],
            100,
            vec![PathBuf::from("/b"), PathBuf::from("/a"), PathBuf::from("/c")],
        );
        assert_eq!(group.paths[0], PathBuf::from("/a"));
        assert_eq!(group.count(), 3);
        assert_eq!(group.total_size(), 300);
        assert_eq!(group.reclaimable(), 200);
    }

    #[test]
    fn test_paths_sort_as_strings() {
        let group = DuplicateGroup::new(
            [2; 32],
            10,
            vec![PathBuf::from("/r/a/x"), PathBuf::from("/r/a-b")],
        );
        assert_eq!(
            group.paths,
            vec![PathBuf::from("/r/a-b"), PathBuf::from("/r/a/x")]
        );
    }

    #[test]
    fn test_group_ordering() {
        let small_many = DuplicateGroup::new(
            [3; 32],
            10,
            (0..5).map(|i| PathBuf::from(format!("/s{i}"))).collect(),
        );
        let large_pair = DuplicateGroup::new(
            [2; 32],
            1000,
            vec![PathBuf::from("/l1"), PathBuf::from("/l2")],
        );
        let tie_a = DuplicateGroup::new([0; 32], 20, vec![PathBuf::from("/t1"), PathBuf::from("/t2")]);
        let tie_b = DuplicateGroup::new([1; 32], 20, vec![PathBuf::from("/u1"), PathBuf::from("/u2")]);
        let tie_c = DuplicateGroup::new(
            [4; 32],
            10,
            vec![PathBuf::from("/v1"), PathBuf::from("/v2"), PathBuf::from("/v3")],
        );

        let mut groups = vec![tie_c.clone(), tie_b.clone(), small_many.clone(), tie_a.clone(), large_pair.clone()];
        sort_groups(&mut groups);

        assert_eq!(groups[0], large_pair);
        assert_eq!(groups[1], small_many);
        // Equal reclaimable (20): larger size first
        assert_eq!(groups[2], tie_a);
        assert_eq!(groups[3], tie_b);
        assert_eq!(groups[4], tie_c);
    }

    #[test]
    fn test_duplicate_group_serializes_hex_digest() {
        let group = DuplicateGroup::new([0xab; 32], 4, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        let json = serde_json::to_value(&group).unwrap();

        assert_eq!(json["digest"].as_str().unwrap().len(), 64);
        assert_eq!(json["count"], 2);
        assert_eq!(json["reclaimable"], 4);
        assert_eq!(json["paths"][0], "/a");
    }
}
