//! Duplicate folder detection.
//!
//! A folder is a duplicate of another when both contain exactly the same
//! entries: the same file names with the same content digests and the same
//! sub-folder names with the same sub-folder signatures. Only folders made
//! up entirely of files that already belong to a [`DuplicateGroup`] can
//! qualify, so the candidates are the ancestors (below the scan root) of
//! grouped files.
//!
//! When two folders match, their matching sub-folders match as well; those
//! nested matches are collapsed so only the top-most duplicated folders are
//! reported.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::finder::FinderError;
use super::groups::{sort_paths, DuplicateGroup};
use crate::scanner::{hash_to_hex, Hash};
use crate::signal::CancelToken;

/// Folders with identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderGroup {
    /// Digest over the folder's entry signatures
    pub signature: Hash,
    /// Total bytes contained in each folder
    pub size: u64,
    /// Member folders, ordered by path
    pub paths: Vec<PathBuf>,
}

impl FolderGroup {
    /// Create a new group. Paths are sorted by their string form.
    #[must_use]
    pub fn new(signature: Hash, size: u64, mut paths: Vec<PathBuf>) -> Self {
        sort_paths(&mut paths);
        Self {
            signature,
            size,
            paths,
        }
    }

    /// Number of folders in this group.
    #[must_use]
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Space freed by keeping a single folder.
    #[must_use]
    pub fn reclaimable(&self) -> u64 {
        self.size * self.paths.len().saturating_sub(1) as u64
    }
}

impl Serialize for FolderGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FolderGroup", 5)?;
        state.serialize_field("signature", &hash_to_hex(&self.signature))?;
        state.serialize_field("size", &self.size)?;
        state.serialize_field("count", &self.count())?;
        state.serialize_field("reclaimable", &self.reclaimable())?;
        state.serialize_field("paths", &self.paths)?;
        state.end()
    }
}

fn compare_folder_groups(a: &FolderGroup, b: &FolderGroup) -> Ordering {
    b.reclaimable()
        .cmp(&a.reclaimable())
        .then_with(|| b.size.cmp(&a.size))
        .then_with(|| a.signature.cmp(&b.signature))
}

/// Signature and byte total of a folder that may be duplicated.
type FolderSummary = Option<(Hash, u64)>;

/// Finds folders whose complete contents are duplicated.
#[derive(Debug)]
pub struct FolderAnalyzer {
    root: PathBuf,
    include_hidden: bool,
    cancel: Option<CancelToken>,
}

impl FolderAnalyzer {
    /// Analyzer for folders below `root`.
    #[must_use]
    pub fn new(root: &Path, include_hidden: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            include_hidden,
            cancel: None,
        }
    }

    /// Stop between folders once `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Group folders from the file groups of a finished run.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Interrupted`] if cancelled.
    pub fn analyze(&self, groups: &[DuplicateGroup]) -> Result<Vec<FolderGroup>, FinderError> {
        let mut digests: HashMap<&Path, (Hash, u64)> = HashMap::new();
        let mut candidates: BTreeSet<&Path> = BTreeSet::new();

        for group in groups {
            for path in &group.paths {
                digests.insert(path.as_path(), (group.hash, group.size));
                candidates.extend(
                    path.ancestors()
                        .skip(1)
                        .take_while(|p| *p != self.root && p.starts_with(&self.root)),
                );
            }
        }
        log::debug!("Folder analysis: {} candidate folders", candidates.len());

        let mut memo: HashMap<PathBuf, FolderSummary> = HashMap::new();
        let mut by_signature: HashMap<Hash, (u64, Vec<PathBuf>)> = HashMap::new();

        for folder in candidates {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(FinderError::Interrupted);
            }
            if let Some((signature, size)) = self.summarize(folder, &digests, &mut memo) {
                by_signature
                    .entry(signature)
                    .or_insert_with(|| (size, Vec::new()))
                    .1
                    .push(folder.to_path_buf());
            }
        }

        let matched: Vec<(Hash, u64, Vec<PathBuf>)> = by_signature
            .into_iter()
            .filter(|(_, (_, paths))| paths.len() > 1)
            .map(|(signature, (size, paths))| (signature, size, paths))
            .collect();

        let mut groups = collapse_nested(matched);
        groups.sort_by(compare_folder_groups);

        log::info!("Folder analysis complete: {} folder groups", groups.len());
        Ok(groups)
    }

    /// Signature for `folder`, or `None` if anything in it is not a grouped file.
    fn summarize(
        &self,
        folder: &Path,
        digests: &HashMap<&Path, (Hash, u64)>,
        memo: &mut HashMap<PathBuf, FolderSummary>,
    ) -> FolderSummary {
        if let Some(cached) = memo.get(folder) {
            return *cached;
        }
        let summary = self.compute_summary(folder, digests, memo);
        memo.insert(folder.to_path_buf(), summary);
        summary
    }

    fn compute_summary(
        &self,
        folder: &Path,
        digests: &HashMap<&Path, (Hash, u64)>,
        memo: &mut HashMap<PathBuf, FolderSummary>,
    ) -> FolderSummary {
        let entries = match fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Folder {} not readable: {}", folder.display(), e);
                return None;
            }
        };

        let mut items = Vec::new();
        let mut total = 0u64;

        for entry in entries {
            let entry = entry.ok()?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if !self.include_hidden && name.starts_with('.') {
                // Content the scan never saw
                return None;
            }

            let file_type = entry.file_type().ok()?;
            if file_type.is_file() {
                let (hash, size) = digests.get(path.as_path())?;
                items.push(format!("F:{}:{}", name, hash_to_hex(hash)));
                total += size;
            } else if file_type.is_dir() {
                let (child, size) = self.summarize(&path, digests, memo)?;
                items.push(format!("D:{}:{}", name, hash_to_hex(&child)));
                total += size;
            } else {
                return None;
            }
        }

        items.sort();
        let mut hasher = blake3::Hasher::new();
        for item in &items {
            hasher.update(item.as_bytes());
            hasher.update(b"\n");
        }
        Some((*hasher.finalize().as_bytes(), total))
    }
}

/// Drop folders that sit inside another duplicated folder, then groups left with one member.
fn collapse_nested(matched: Vec<(Hash, u64, Vec<PathBuf>)>) -> Vec<FolderGroup> {
    let duplicated: HashSet<PathBuf> = matched
        .iter()
        .flat_map(|(_, _, paths)| paths.iter().cloned())
        .collect();

    matched
        .into_iter()
        .filter_map(|(signature, size, paths)| {
            let top_level: Vec<PathBuf> = paths
                .into_iter()
                .filter(|p| !p.ancestors().skip(1).any(|a| duplicated.contains(a)))
                .collect();
            (top_level.len() > 1).then(|| FolderGroup::new(signature, size, top_level))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn group(content: &[u8], paths: Vec<PathBuf>) -> DuplicateGroup {
        DuplicateGroup::new(*blake3::hash(content).as_bytes(), content.len() as u64, paths)
    }

    #[test]
    fn test_identical_trees() {
        let dir = TempDir::new().unwrap();
        let a1 = create_file(dir.path(), "left/a.txt", b"alpha");
        let b1 = create_file(dir.path(), "left/sub/b.txt", b"beta");
        let a2 = create_file(dir.path(), "right/a.txt", b"alpha");
        let b2 = create_file(dir.path(), "right/sub/b.txt", b"beta");

        let groups = vec![group(b"alpha", vec![a1, a2]), group(b"beta", vec![b1, b2])];
        let folders = FolderAnalyzer::new(dir.path(), true).analyze(&groups).unwrap();

        // left/sub and right/sub collapse into their parents
        assert_eq!(folders.len(), 1);
        assert_eq!(
            folders[0].paths,
            vec![dir.path().join("left"), dir.path().join("right")]
        );
        assert_eq!(folders[0].size, 9);
        assert_eq!(folders[0].reclaimable(), 9);
    }

    #[test]
    fn test_extra_file_breaks_match() {
        let dir = TempDir::new().unwrap();
        let a1 = create_file(dir.path(), "left/a.txt", b"alpha");
        let a2 = create_file(dir.path(), "right/a.txt", b"alpha");
        create_file(dir.path(), "right/unique.txt", b"only here");

        let groups = vec![group(b"alpha", vec![a1, a2])];
        let folders = FolderAnalyzer::new(dir.path(), true).analyze(&groups).unwrap();
        assert!(folders.is_empty());
    }

    #[test]
    fn test_names_matter() {
        let dir = TempDir::new().unwrap();
        let a1 = create_file(dir.path(), "left/a.txt", b"alpha");
        let a2 = create_file(dir.path(), "right/renamed.txt", b"alpha");

        let groups = vec![group(b"alpha", vec![a1, a2])];
        let folders = FolderAnalyzer::new(dir.path(), true).analyze(&groups).unwrap();
        assert!(folders.is_empty());
    }

    #[test]
    fn test_root_is_never_a_candidate() {
        let dir = TempDir::new().unwrap();
        let a1 = create_file(dir.path(), "a.txt", b"alpha");
        let a2 = create_file(dir.path(), "b.txt", b"alpha");

        let groups = vec![group(b"alpha", vec![a1, a2])];
        let folders = FolderAnalyzer::new(dir.path(), true).analyze(&groups).unwrap();
        assert!(folders.is_empty());
    }

    #[test]
    fn test_hidden_content_blocks_match_when_excluded() {
        let dir = TempDir::new().unwrap();
        let a1 = create_file(dir.path(), "left/a.txt", b"alpha");
        let a2 = create_file(dir.path(), "right/a.txt", b"alpha");
        create_file(dir.path(), "right/.secret", b"hidden");

        let groups = vec![group(b"alpha", vec![a1, a2])];
        let folders = FolderAnalyzer::new(dir.path(), false).analyze(&groups).unwrap();
        assert!(folders.is_empty());
    }

    #[test]
    fn test_cancelled() {
        let dir = TempDir::new().unwrap();
        let a1 = create_file(dir.path(), "left/a.txt", b"alpha");
        let a2 = create_file(dir.path(), "right/a.txt", b"alpha");

        let token = CancelToken::new();
        token.cancel();
        let result = FolderAnalyzer::new(dir.path(), true)
            .with_cancel_token(token)
            .analyze(&[group(b"alpha", vec![a1, a2])]);
        assert!(matches!(result, Err(FinderError::Interrupted)));
    }

    #[test]
    fn test_collapse_keeps_unrelated_nested() {
        let top = (
            [1u8; 32],
            10,
            vec![PathBuf::from("/r/a"), PathBuf::from("/r/b")],
        );
        let nested = (
            [2u8; 32],
            5,
            vec![PathBuf::from("/r/a/x"), PathBuf::from("/r/b/x")],
        );
        let other = (
            [3u8; 32],
            5,
            vec![PathBuf::from("/r/c/y"), PathBuf::from("/r/d/y")],
        );

        let groups = collapse_nested(vec![top, nested, other]);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.signature != [2u8; 32]));
    }

    #[test]
    fn test_folder_paths_sort_as_strings() {
        let dir = TempDir::new().unwrap();
        let x1 = create_file(dir.path(), "a/x/f.txt", b"same");
        let x2 = create_file(dir.path(), "a-b/f.txt", b"same");

        let groups = vec![group(b"same", vec![x1, x2])];
        let folders = FolderAnalyzer::new(dir.path(), true).analyze(&groups).unwrap();

        // a/x matches a-b; a itself holds only the folder x, so it does not
        assert_eq!(folders.len(), 1);
        assert_eq!(
            folders[0].paths,
            vec![dir.path().join("a-b"), dir.path().join("a").join("x")]
        );
    }
}
