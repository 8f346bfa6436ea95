//! Diff Engine
//!
//! Compares two result sets under a root directory. Every path present in
//! either set whose status changed becomes part of a [`Transition`] group;
//! a path missing on one side has `None` for that side.

use crate::error::{Error, Result};
use crate::results::{ResultSet, StatusCounts};
use crate::status::TestStatus;
use crate::tree::{normalize_path, parent_of};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Status change of one path between two result sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Transition {
    /// Previous status, `None` if the test is new
    pub from: Option<TestStatus>,
    /// Current status, `None` if the test was removed
    pub to: Option<TestStatus>,
}

impl Transition {
    pub fn new(from: Option<TestStatus>, to: Option<TestStatus>) -> Self {
        Self { from, to }
    }

    /// The path started failing: its new status fails and its old one did not
    pub fn is_new_failure(&self) -> bool {
        self.to.is_some_and(TestStatus::is_failing) && !self.from.is_some_and(TestStatus::is_failing)
    }
}

fn side(status: Option<TestStatus>) -> &'static str {
    status.map(TestStatus::as_str).unwrap_or("<none>")
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", side(self.from), side(self.to))
    }
}

/// All paths that made the same transition, sorted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionGroup {
    pub transition: Transition,
    pub paths: Vec<String>,
}

/// Status transitions between a previous and a current result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    root: String,
    groups: Vec<TransitionGroup>,
    new_failures: usize,
}

impl Diff {
    /// Diff every path under `root` (recursively).
    ///
    /// A root missing from one side counts as an empty directory there. A
    /// root missing from both sides is [`Error::DirectoryNotFound`].
    pub fn compute(previous: &ResultSet, current: &ResultSet, root: &str) -> Result<Self> {
        let root = normalize_path(root);
        let (before, after) = match (statuses_under(previous, &root), statuses_under(current, &root)) {
            (None, None) => return Err(Error::directory_not_found(root)),
            (before, after) => (before.unwrap_or_default(), after.unwrap_or_default()),
        };

        let paths: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        let mut grouped: BTreeMap<Transition, Vec<String>> = BTreeMap::new();
        let mut new_failures = 0;

        for path in paths {
            let transition = Transition::new(before.get(path).copied(), after.get(path).copied());
            if transition.from == transition.to {
                continue;
            }
            if transition.is_new_failure() {
                new_failures += 1;
            }
            // paths arrive sorted, so every group stays sorted
            grouped.entry(transition).or_default().push(path.clone());
        }

        Ok(Self {
            root,
            groups: grouped
                .into_iter()
                .map(|(transition, paths)| TransitionGroup { transition, paths })
                .collect(),
            new_failures,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Groups ordered by `(from, to)`
    pub fn groups(&self) -> &[TransitionGroup] {
        &self.groups
    }

    /// Paths that made exactly `transition`
    pub fn paths(&self, transition: Transition) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|g| g.transition == transition)
            .map(|g| g.paths.as_slice())
    }

    /// Number of paths that started failing
    pub fn new_failures(&self) -> usize {
        self.new_failures
    }

    /// Number of paths whose status changed
    pub fn num_changed(&self) -> usize {
        self.groups.iter().map(|g| g.paths.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Paths that started failing, sorted
    pub fn regressions(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .groups
            .iter()
            .filter(|g| g.transition.is_new_failure())
            .flat_map(|g| g.paths.iter().map(String::as_str))
            .collect();
        out.sort_unstable();
        out
    }
}

/// Statuses below `root`, `None` if the set has no such directory. The root
/// of an empty set still exists.
fn statuses_under(set: &ResultSet, root: &str) -> Option<BTreeMap<String, TestStatus>> {
    if root.is_empty() && set.is_empty() {
        return Some(BTreeMap::new());
    }
    set.tree().statuses_in_dir(root, true).ok()
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            return writeln!(f, "No status changes");
        }
        for group in &self.groups {
            writeln!(f, "{} ({}):", group.transition, group.paths.len())?;
            for path in &group.paths {
                writeln!(f, "    {}", path)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "{} changed, {} new failures", self.num_changed(), self.new_failures)
    }
}

/// Signed per-status change between two sets of counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountsDelta {
    pub total: i64,
    deltas: BTreeMap<TestStatus, i64>,
}

impl CountsDelta {
    pub fn between(previous: &StatusCounts, current: &StatusCounts) -> Self {
        let deltas = TestStatus::ALL
            .into_iter()
            .map(|status| (status, current.get(status) as i64 - previous.get(status) as i64))
            .collect();
        Self {
            total: current.total as i64 - previous.total as i64,
            deltas,
        }
    }

    pub fn get(&self, status: TestStatus) -> i64 {
        self.deltas.get(&status).copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.deltas.values().all(|d| *d == 0)
    }
}

impl fmt::Display for CountsDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "no change");
        }
        write!(f, "total {:+}", self.total)?;
        for (status, delta) in &self.deltas {
            if *delta != 0 {
                write!(f, ", {} {:+}", status, delta)?;
            }
        }
        Ok(())
    }
}

/// Per-directory counters over the files directly inside each directory
#[derive(Debug, Clone, Default)]
pub struct DirectorySummaries {
    dirs: BTreeMap<String, StatusCounts>,
}

impl DirectorySummaries {
    pub fn from_results(set: &ResultSet) -> Self {
        let mut dirs: BTreeMap<String, StatusCounts> = BTreeMap::new();
        for file in set.tree().files() {
            dirs.entry(parent_of(&file.path).to_string())
                .or_default()
                .increment(file.status);
        }
        Self { dirs }
    }

    /// Counters for the files directly inside `dir`
    pub fn get(&self, dir: &str) -> Option<&StatusCounts> {
        self.dirs.get(&normalize_path(dir))
    }

    /// Directories that directly contain at least one file, sorted
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.dirs.keys().map(String::as_str)
    }

    /// Counters summed over `dir` and every directory below it.
    /// The root (`""`) aggregates everything.
    pub fn aggregate(&self, dir: &str) -> StatusCounts {
        let dir = normalize_path(dir);
        let prefix = format!("{}/", dir);
        let mut total = StatusCounts::default();
        for (key, counts) in &self.dirs {
            if dir.is_empty() || *key == dir || key.starts_with(&prefix) {
                total.merge(counts);
            }
        }
        total
    }
}
