use dupe_engine::duplicates::{group_by_size, DuplicateFinder, FinderConfig};
use dupe_engine::scanner::{FileRecord, Hasher};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tempfile::TempDir;

// Small alphabet and short lengths so equal sizes and equal contents collide often
fn contents() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(0u8..3, 0..6), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_groups_match_byte_comparison(files in contents()) {
        let dir = TempDir::new().unwrap();
        let mut written = HashMap::new();
        for (i, data) in files.iter().enumerate() {
            let path = dir.path().join(format!("f{i:02}"));
            fs::write(&path, data).unwrap();
            written.insert(path, data.clone());
        }

        let finder = DuplicateFinder::new(
            FinderConfig::default().with_workers(2).with_detect_folders(false),
        )
        .unwrap();
        let output = finder.find_duplicates(dir.path()).unwrap();

        let mut digests = HashSet::new();
        let mut grouped = HashSet::new();
        for group in &output.groups {
            prop_assert!(group.count() >= 2);
            prop_assert!(digests.insert(group.hash));

            // No false positives
            let first = &written[&group.paths[0]];
            for path in &group.paths {
                prop_assert_eq!(&written[path], first);
                prop_assert_eq!(written[path].len() as u64, group.size);
                prop_assert!(grouped.insert(path.clone()));
            }
        }

        // No misses: every pair of equal files shares a group
        let mut by_content: HashMap<&Vec<u8>, usize> = HashMap::new();
        for data in written.values() {
            *by_content.entry(data).or_default() += 1;
        }
        let expected_groups = by_content.values().filter(|&&n| n >= 2).count();
        prop_assert_eq!(output.groups.len(), expected_groups);

        prop_assert_eq!(output.stats.files_scanned, files.len());
    }

    #[test]
    fn test_full_digest_determinism(content in prop::collection::vec(any::<u8>(), 0..20_000)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.bin");
        fs::write(&path, &content).unwrap();

        let hasher = Hasher::new();
        let first = hasher.full_digest(&path).unwrap();
        let second = hasher.full_digest(&path).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, *blake3::hash(&content).as_bytes());
    }

    #[test]
    fn test_group_by_size_invariants(sizes in prop::collection::vec(0u64..64, 0..80)) {
        let records: Vec<FileRecord> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| FileRecord::new(PathBuf::from(format!("/fake/{i}")), size, SystemTime::UNIX_EPOCH))
            .collect();

        let (buckets, stats) = group_by_size(records.clone(), false);

        let mut seen_sizes = HashSet::new();
        for bucket in &buckets {
            prop_assert!(bucket.len() >= 2);
            prop_assert!(seen_sizes.insert(bucket.size));
            for file in &bucket.files {
                prop_assert_eq!(file.size, bucket.size);
            }
        }
        prop_assert!(buckets.windows(2).all(|w| w[0].size >= w[1].size));

        prop_assert_eq!(stats.total_files, records.len());
        prop_assert_eq!(stats.total_size, sizes.iter().sum::<u64>());
        prop_assert_eq!(
            stats.potential_duplicates + stats.eliminated_unique,
            stats.total_files
        );
        prop_assert_eq!(
            stats.potential_duplicates,
            buckets.iter().map(|b| b.len()).sum::<usize>()
        );
    }
}
