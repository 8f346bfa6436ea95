//! Status Tree
//!
//! Hierarchical index of corpus test statuses. Every file path maps to a
//! [`StatusTreeFile`] and every directory prefix maps to a [`StatusTreeDir`].
//!
//! The two flat maps are the only owners of nodes. A directory refers to its
//! children by key, so walking a subtree is a sequence of map lookups and
//! there is no way to build a reference cycle.
//!
//! # Example
//! ```
//! use corpus_runner::tree::StatusTree;
//! use corpus_runner::TestStatus;
//!
//! let mut tree = StatusTree::new();
//! tree.add_file("built-ins/Array/length.js", TestStatus::Pass);
//! tree.add_file("built-ins/Array/from/iter.js", TestStatus::Fail);
//!
//! assert_eq!(tree.count_files("built-ins/Array", false).unwrap(), 1);
//! assert_eq!(tree.count_files("built-ins/", true).unwrap(), 2);
//! ```

use crate::error::{Error, Result};
use crate::status::TestStatus;
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Normalize a corpus-relative path.
///
/// Empty and `.` segments are dropped, `..` pops the previous segment, and
/// leading or trailing slashes are stripped. The corpus root is the empty
/// string, so `""`, `"."`, `"/"` and `"./"` all normalize to `""`.
/// Normalizing an already normalized path returns it unchanged.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Parent directory key of a normalized path (`""` for top-level entries)
pub(crate) fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// A single test file and its status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTreeFile {
    pub path: String,
    pub status: TestStatus,
}

/// A directory node. Children are stored as keys into the tree's flat maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTreeDir {
    pub path: String,
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
}

impl StatusTreeDir {
    fn new(path: String) -> Self {
        Self {
            path,
            files: BTreeSet::new(),
            dirs: BTreeSet::new(),
        }
    }

    /// Paths of the files directly inside this directory
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Paths of the directories directly inside this directory
    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(String::as_str)
    }
}

/// Path → status index with directory-level aggregation
#[derive(Debug, Clone, Default)]
pub struct StatusTree {
    files: HashMap<String, StatusTreeFile>,
    dirs: HashMap<String, StatusTreeDir>,
}

impl StatusTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tree with room for the given number of files and dirs
    pub fn with_capacity(files: usize, dirs: usize) -> Self {
        let mut file_map = HashMap::default();
        file_map.reserve(files);
        let mut dir_map = HashMap::default();
        dir_map.reserve(dirs);
        Self {
            files: file_map,
            dirs: dir_map,
        }
    }

    /// Build a tree from `(path, status)` pairs
    pub fn from_records<I, P>(records: I) -> Self
    where
        I: IntoIterator<Item = (P, TestStatus)>,
        P: AsRef<str>,
    {
        let mut tree = Self::new();
        for (path, status) in records {
            tree.add_file(path.as_ref(), status);
        }
        tree
    }

    /// Insert or replace a file, creating every ancestor directory
    pub fn add_file(&mut self, path: &str, status: TestStatus) {
        let path = normalize_path(path);
        if path.is_empty() {
            tracing::warn!("ignoring test file with an empty path");
            return;
        }

        let dir = parent_of(&path).to_string();
        self.add_dir(&dir);
        if let Some(node) = self.dirs.get_mut(&dir) {
            node.files.insert(path.clone());
        }

        self.files.insert(path.clone(), StatusTreeFile { path, status });
    }

    /// Create a directory and all of its parents. Idempotent.
    pub fn add_dir(&mut self, path: &str) {
        let path = normalize_path(path);
        if self.dirs.contains_key(&path) {
            return;
        }

        if !path.is_empty() {
            let parent = parent_of(&path).to_string();
            self.add_dir(&parent);
            if let Some(node) = self.dirs.get_mut(&parent) {
                node.dirs.insert(path.clone());
            }
        }

        self.dirs.insert(path.clone(), StatusTreeDir::new(path));
    }

    /// Total number of files in the tree
    pub fn num_tests(&self) -> usize {
        self.files.len()
    }

    /// Whether the tree has no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether a directory node exists
    pub fn contains_dir(&self, dir: &str) -> bool {
        self.dirs.contains_key(&normalize_path(dir))
    }

    /// Look up a file node
    pub fn file(&self, path: &str) -> Option<&StatusTreeFile> {
        self.files.get(&normalize_path(path))
    }

    /// Look up a directory node
    pub fn dir(&self, dir: &str) -> Option<&StatusTreeDir> {
        self.dirs.get(&normalize_path(dir))
    }

    /// Iterate over every file node, in no particular order
    pub fn files(&self) -> impl Iterator<Item = &StatusTreeFile> {
        self.files.values()
    }

    /// Status of a single test
    pub fn status_of(&self, path: &str) -> Result<TestStatus> {
        self.file(path)
            .map(|f| f.status)
            .ok_or_else(|| Error::test_not_found(path))
    }

    fn lookup_dir(&self, dir: &str) -> Result<&StatusTreeDir> {
        self.dirs
            .get(&normalize_path(dir))
            .ok_or_else(|| Error::directory_not_found(dir))
    }

    /// Visit the files of `dir` (and, if `recursive`, all of its descendants)
    fn visit_files<'a>(&'a self, dir: &'a StatusTreeDir, recursive: bool, f: &mut impl FnMut(&'a StatusTreeFile)) {
        for path in &dir.files {
            if let Some(file) = self.files.get(path) {
                f(file);
            }
        }
        if recursive {
            for child in &dir.dirs {
                if let Some(sub) = self.dirs.get(child) {
                    self.visit_files(sub, true, f);
                }
            }
        }
    }

    /// Number of files in a directory
    pub fn count_files(&self, dir: &str, recursive: bool) -> Result<usize> {
        let node = self.lookup_dir(dir)?;
        if !recursive {
            return Ok(node.files.len());
        }
        let mut count = 0;
        self.visit_files(node, true, &mut |_| count += 1);
        Ok(count)
    }

    /// Paths of the files in a directory, sorted
    pub fn list_files(&self, dir: &str, recursive: bool) -> Result<Vec<String>> {
        self.select_files(dir, recursive, |_| true)
    }

    /// Paths of the directories directly inside `dir`, sorted
    pub fn child_dirs(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self.lookup_dir(dir)?.dirs.iter().cloned().collect())
    }

    /// Paths of files in `dir` that have exactly `status`, sorted
    pub fn files_with_status(&self, dir: &str, status: TestStatus, recursive: bool) -> Result<Vec<String>> {
        self.select_files(dir, recursive, |f| f.status == status)
    }

    /// Paths of files in `dir` whose status is a failing one, sorted
    pub fn failed_files(&self, dir: &str, recursive: bool) -> Result<Vec<String>> {
        self.select_files(dir, recursive, |f| f.status.is_failing())
    }

    /// Status of every file in `dir`, keyed by path
    pub fn statuses_in_dir(&self, dir: &str, recursive: bool) -> Result<BTreeMap<String, TestStatus>> {
        let node = self.lookup_dir(dir)?;
        let mut out = BTreeMap::new();
        self.visit_files(node, recursive, &mut |f| {
            out.insert(f.path.clone(), f.status);
        });
        Ok(out)
    }

    fn select_files(
        &self,
        dir: &str,
        recursive: bool,
        mut keep: impl FnMut(&StatusTreeFile) -> bool,
    ) -> Result<Vec<String>> {
        let node = self.lookup_dir(dir)?;
        let mut out = Vec::new();
        self.visit_files(node, recursive, &mut |f| {
            if keep(f) {
                out.push(f.path.clone());
            }
        });
        out.sort();
        Ok(out)
    }

    /// Every file whose path contains `query`, ignoring case, sorted
    pub fn files_by_path_substring(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        let mut out: Vec<String> = self
            .files
            .keys()
            .filter(|path| path.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        out.sort();
        out
    }
}
