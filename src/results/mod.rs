//! Run results and aggregation
//!
//! A [`TestResult`] is produced by a worker for each job and consumed exactly
//! once by the [`Aggregator`], which folds it into the run's [`ResultSet`].

use crate::status::TestStatus;
use crate::tree::{normalize_path, StatusTree};
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of executing one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Corpus-relative path of the test
    pub path: String,
    pub status: TestStatus,
    /// Assertion message, stack trace or runner diagnostics
    #[serde(rename = "msg")]
    pub message: String,
    /// Peak memory of the engine process, in KB
    pub memory_kb: u64,
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
}

impl TestResult {
    /// Create a result with no memory or timing information
    pub fn new(path: impl Into<String>, status: TestStatus, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status,
            message: message.into(),
            memory_kb: 0,
            duration: Duration::ZERO,
        }
    }

    /// Synthetic result for a test that was excluded from execution
    pub fn skipped(path: impl Into<String>) -> Self {
        Self::new(path, TestStatus::Skip, "skip")
    }

    /// Result for a job the runner itself could not execute
    pub fn runner_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, TestStatus::RunnerError, message)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_memory_kb(mut self, memory_kb: u64) -> Self {
        self.memory_kb = memory_kb;
        self
    }
}

/// Serde helper for Duration (as milliseconds)
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Per-status counters for a set of results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timeouts: usize,
    pub crashed: usize,
    pub parse_errors: usize,
    pub not_implemented: usize,
    pub runner_errors: usize,
    pub errors: usize,
}

impl StatusCounts {
    fn slot(&mut self, status: TestStatus) -> &mut usize {
        match status {
            TestStatus::Pass => &mut self.passed,
            TestStatus::Fail => &mut self.failed,
            TestStatus::Skip => &mut self.skipped,
            TestStatus::Timeout => &mut self.timeouts,
            TestStatus::Crash => &mut self.crashed,
            TestStatus::ParseError => &mut self.parse_errors,
            TestStatus::NotImplemented => &mut self.not_implemented,
            TestStatus::RunnerError => &mut self.runner_errors,
            TestStatus::Error => &mut self.errors,
        }
    }

    /// Count for a single status
    pub fn get(&self, status: TestStatus) -> usize {
        match status {
            TestStatus::Pass => self.passed,
            TestStatus::Fail => self.failed,
            TestStatus::Skip => self.skipped,
            TestStatus::Timeout => self.timeouts,
            TestStatus::Crash => self.crashed,
            TestStatus::ParseError => self.parse_errors,
            TestStatus::NotImplemented => self.not_implemented,
            TestStatus::RunnerError => self.runner_errors,
            TestStatus::Error => self.errors,
        }
    }

    /// Record one more result with `status`
    pub fn increment(&mut self, status: TestStatus) {
        self.total += 1;
        *self.slot(status) += 1;
    }

    /// Forget one result with `status`
    pub fn decrement(&mut self, status: TestStatus) {
        self.total = self.total.saturating_sub(1);
        let slot = self.slot(status);
        *slot = slot.saturating_sub(1);
    }

    /// Add every counter of `other` into `self`
    pub fn merge(&mut self, other: &StatusCounts) {
        self.total += other.total;
        for status in TestStatus::ALL {
            *self.slot(status) += other.get(status);
        }
    }

    /// Number of results with a failing status
    pub fn failing(&self) -> usize {
        TestStatus::ALL
            .into_iter()
            .filter(|s| s.is_failing())
            .map(|s| self.get(s))
            .sum()
    }

    /// Pass rate as a percentage of the non-skipped results
    pub fn pass_rate(&self) -> f64 {
        let runnable = self.total.saturating_sub(self.skipped);
        if runnable == 0 {
            0.0
        } else {
            self.passed as f64 / runnable as f64 * 100.0
        }
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Timeout: {} | Crash: {} | Parse error: {} | Not implemented: {} | Runner error: {} | Error: {}",
            self.total,
            self.passed,
            self.failed,
            self.skipped,
            self.timeouts,
            self.crashed,
            self.parse_errors,
            self.not_implemented,
            self.runner_errors,
            self.errors,
        )
    }
}

/// Complete status snapshot of one run (or of a loaded snapshot)
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    tree: StatusTree,
    counts: StatusCounts,
    details: HashMap<String, TestResult>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set sized for roughly `expected` results
    pub fn with_capacity(expected: usize) -> Self {
        let mut details = HashMap::default();
        details.reserve(expected);
        Self {
            tree: StatusTree::with_capacity(expected, expected / 8),
            counts: StatusCounts::default(),
            details,
        }
    }

    /// Build a status-only set from `(path, status)` pairs, e.g. a stored snapshot
    pub fn from_statuses<I, P>(records: I) -> Self
    where
        I: IntoIterator<Item = (P, TestStatus)>,
        P: AsRef<str>,
    {
        let mut set = Self::new();
        for (path, status) in records {
            set.record(path.as_ref(), status);
        }
        set
    }

    /// Returns the normalized path, or `None` if the path was empty
    fn record(&mut self, path: &str, status: TestStatus) -> Option<String> {
        let path = normalize_path(path);
        if path.is_empty() {
            tracing::warn!("dropping result with an empty path");
            return None;
        }
        if let Some(previous) = self.tree.file(&path) {
            self.counts.decrement(previous.status);
        }
        self.tree.add_file(&path, status);
        self.counts.increment(status);
        Some(path)
    }

    /// Fold a run result into the set, replacing any earlier result for its path
    pub fn add(&mut self, mut result: TestResult) {
        if let Some(path) = self.record(&result.path, result.status) {
            result.path = path;
            self.details.insert(result.path.clone(), result);
        }
    }

    /// Record a directory that exists but may hold no results, so subtree
    /// lookups on it succeed
    pub fn add_dir(&mut self, dir: &str) {
        self.tree.add_dir(dir);
    }

    pub fn tree(&self) -> &StatusTree {
        &self.tree
    }

    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.tree.num_tests()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn status_of(&self, path: &str) -> Option<TestStatus> {
        self.tree.file(path).map(|f| f.status)
    }

    /// Full run details for a path, if this set came from a run
    pub fn result(&self, path: &str) -> Option<&TestResult> {
        self.details.get(&normalize_path(path))
    }

    /// All run details, sorted by path
    pub fn results(&self) -> Vec<&TestResult> {
        let mut out: Vec<&TestResult> = self.details.values().collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    /// `(path, status)` for every entry, sorted by path
    pub fn statuses(&self) -> Vec<(&str, TestStatus)> {
        let mut out: Vec<(&str, TestStatus)> = self
            .tree
            .files()
            .map(|f| (f.path.as_str(), f.status))
            .collect();
        out.sort();
        out
    }

    /// Format as a summary string
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.counts.to_string());
        s.push('\n');
        s.push_str(&format!(
            "Pass Rate: {:.1}% ({}/{})\n",
            self.counts.pass_rate(),
            self.counts.passed,
            self.counts.total - self.counts.skipped
        ));
        s
    }
}

/// Single consumer that folds results into one [`ResultSet`]
///
/// Exactly one aggregator exists per run, so it owns its set outright.
#[derive(Debug, Default)]
pub struct Aggregator {
    set: ResultSet,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(expected: usize) -> Self {
        Self {
            set: ResultSet::with_capacity(expected),
        }
    }

    pub fn add(&mut self, result: TestResult) {
        self.set.add(result);
    }

    /// Drain `results` until the producer side closes it
    pub fn consume(mut self, results: impl IntoIterator<Item = TestResult>) -> ResultSet {
        for result in results {
            self.add(result);
        }
        self.set
    }

    pub fn finish(self) -> ResultSet {
        self.set
    }
}
