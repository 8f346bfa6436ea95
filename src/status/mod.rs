//! Test statuses
//!
//! The closed set of outcomes a corpus test can have. Status strings coming
//! from outside (remote feeds, snapshots, user queries) are parsed once at the
//! boundary and the enum is used everywhere else.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of one corpus test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Timeout,
    Crash,
    ParseError,
    NotImplemented,
    RunnerError,
    Error,
}

impl TestStatus {
    /// Every status, in declaration order
    pub const ALL: [TestStatus; 9] = [
        TestStatus::Pass,
        TestStatus::Fail,
        TestStatus::Skip,
        TestStatus::Timeout,
        TestStatus::Crash,
        TestStatus::ParseError,
        TestStatus::NotImplemented,
        TestStatus::RunnerError,
        TestStatus::Error,
    ];

    /// Canonical upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Skip => "SKIP",
            TestStatus::Timeout => "TIMEOUT",
            TestStatus::Crash => "CRASH",
            TestStatus::ParseError => "PARSE_ERROR",
            TestStatus::NotImplemented => "NOT_IMPLEMENTED",
            TestStatus::RunnerError => "RUNNER_ERROR",
            TestStatus::Error => "ERROR",
        }
    }

    /// Short code used by the compact status feed
    pub fn short_code(self) -> &'static str {
        match self {
            TestStatus::Pass => "P",
            TestStatus::Fail => "F",
            TestStatus::Skip => "S",
            TestStatus::Timeout => "T",
            TestStatus::Crash => "C",
            TestStatus::ParseError => "O",
            TestStatus::NotImplemented => "PF",
            TestStatus::RunnerError => "N",
            TestStatus::Error => "E",
        }
    }

    /// Parse a full status name, ignoring case
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidStatus(s.to_string()))
    }

    /// Expand a feed status code.
    ///
    /// Accepts the short codes as well as full names. Anything unrecognized
    /// becomes [`TestStatus::Error`].
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "P" => TestStatus::Pass,
            "F" => TestStatus::Fail,
            "S" => TestStatus::Skip,
            "T" => TestStatus::Timeout,
            "C" => TestStatus::Crash,
            "O" => TestStatus::ParseError,
            "PF" => TestStatus::NotImplemented,
            "N" => TestStatus::RunnerError,
            other => Self::parse(other).unwrap_or(TestStatus::Error),
        }
    }

    /// Whether this status counts as a failure for regression gating
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            TestStatus::Fail
                | TestStatus::Timeout
                | TestStatus::Crash
                | TestStatus::RunnerError
                | TestStatus::Error
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
