//! Corpus enumeration
//!
//! Walks a subtree of the corpus in a stable (file name) order. Fixture files
//! are helpers imported by other tests and are never reported. Files under an
//! exclusion prefix are reported as [`Discovered::Excluded`] so the caller can
//! record a synthetic skip without running them.

use super::Job;
use crate::error::{Error, Result};
use crate::tree::normalize_path;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Marker in a file name that identifies a fixture
pub const FIXTURE_MARKER: &str = "_FIXTURE";

/// Corpus directories that are skipped by default
pub const DEFAULT_EXCLUSIONS: [&str; 2] = ["intl402", "staging"];

/// A file found while walking the corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
    /// A test to run
    Job(Job),
    /// A test under an exclusion prefix; holds its corpus-relative path
    Excluded(String),
}

/// Enumerates test files below the corpus root
#[derive(Debug, Clone)]
pub struct CorpusWalker {
    root: PathBuf,
    exclusions: Vec<String>,
}

impl CorpusWalker {
    /// Walker over `root` with the default exclusions
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the exclusion prefixes (corpus-relative directories)
    pub fn with_exclusions<I, S>(mut self, exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclusions = exclusions
            .into_iter()
            .map(|s| normalize_path(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    /// Whether a corpus-relative path lies under an exclusion prefix.
    /// Prefixes match whole path components: `staging` excludes
    /// `staging/a.js` but not `staging-old/a.js`.
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.exclusions.iter().any(|prefix| {
            relative == prefix
                || relative
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn is_fixture(path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().contains(FIXTURE_MARKER))
    }

    /// Filesystem path of a corpus-relative directory or file.
    ///
    /// `None` if the path leads outside the corpus root.
    pub fn full_path(&self, relative: &str) -> Option<PathBuf> {
        let relative = normalize_path(relative);
        if relative == ".." || relative.starts_with("../") {
            return None;
        }
        if relative.is_empty() {
            Some(self.root.clone())
        } else {
            Some(self.root.join(relative))
        }
    }

    /// Corpus-relative path of a file below the root, always `/`-separated.
    ///
    /// `None` unless every component after the root is a plain name.
    pub fn relative_path(&self, full: &Path) -> Option<String> {
        let rel = full.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }

    fn entries(&self, dir: &str) -> Result<impl Iterator<Item = walkdir::Result<walkdir::DirEntry>>> {
        let start = self
            .full_path(dir)
            .filter(|start| start.is_dir())
            .ok_or_else(|| Error::directory_not_found(dir))?;
        Ok(WalkDir::new(start).sort_by_file_name().into_iter())
    }

    /// Number of test files below `dir`, excluded ones included, fixtures not
    pub fn count(&self, dir: &str) -> Result<usize> {
        let mut count = 0;
        for entry in self.entries(dir)? {
            let entry = entry?;
            if entry.file_type().is_file() && !Self::is_fixture(entry.path()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Walk `dir`, handing every discovered file to `visit`.
    ///
    /// Stops at the first walk error or the first error returned by `visit`.
    /// Returns the number of files visited.
    pub fn walk(&self, dir: &str, mut visit: impl FnMut(Discovered) -> Result<()>) -> Result<usize> {
        let mut visited = 0;
        for entry in self.entries(dir)? {
            let entry = entry?;
            if !entry.file_type().is_file() || Self::is_fixture(entry.path()) {
                continue;
            }
            let Some(relative_path) = self.relative_path(entry.path()) else {
                continue;
            };

            if self.is_excluded(&relative_path) {
                tracing::trace!(test = %relative_path, "excluded");
                visit(Discovered::Excluded(relative_path))?;
            } else {
                visit(Discovered::Job(Job {
                    full_path: entry.into_path(),
                    relative_path,
                }))?;
            }
            visited += 1;
        }
        Ok(visited)
    }
}
