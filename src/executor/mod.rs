//! Test execution
//!
//! The engine binary is a black box: it is started once per test and reports
//! its verdict as a JSON line on stdout. Anything that keeps the runner from
//! getting a verdict becomes a `RUNNER_ERROR` result rather than an error.

use crate::process::{self, Termination};
use crate::results::TestResult;
use crate::status::TestStatus;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Environment variable telling the engine where the corpus root is
pub const TEST_ROOT_ENV: &str = "TEST_ROOT_DIR";

/// Default per-job timeout
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs one test against an engine binary
///
/// Implementations are shared by every worker, so they must be `Send + Sync`.
/// They never fail: problems are reported through the returned status.
pub trait TestExecutor: Send + Sync {
    fn run_test(&self, relative_path: &str, full_path: &Path, engine: &Path, corpus_root: &Path) -> TestResult;
}

impl<F> TestExecutor for F
where
    F: Fn(&str, &Path, &Path, &Path) -> TestResult + Send + Sync,
{
    fn run_test(&self, relative_path: &str, full_path: &Path, engine: &Path, corpus_root: &Path) -> TestResult {
        self(relative_path, full_path, engine, corpus_root)
    }
}

/// Verdict line printed by the engine
#[derive(Debug, Deserialize)]
struct EngineVerdict {
    status: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    memory_kb: u64,
    #[serde(default)]
    duration_ms: Option<u64>,
}

/// Spawns the engine as a subprocess for every test
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            timeout: Some(DEFAULT_JOB_TIMEOUT),
        }
    }

    /// Extra arguments passed before the test path
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Per-job timeout; `None` waits forever
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl TestExecutor for ProcessExecutor {
    fn run_test(&self, relative_path: &str, full_path: &Path, engine: &Path, corpus_root: &Path) -> TestResult {
        let mut command = Command::new(engine);
        command.args(&self.args).arg(full_path).env(TEST_ROOT_ENV, corpus_root);

        tracing::trace!(test = relative_path, engine = %engine.display(), "spawning engine");

        let output = match process::run_supervised(command, self.timeout, None) {
            Ok(output) => output,
            Err(e) => {
                return TestResult::runner_error(
                    relative_path,
                    format!("failed to start {}: {}", engine.display(), e),
                );
            }
        };

        let elapsed = output.elapsed;
        match output.termination {
            Termination::TimedOut => {
                let limit = self.timeout.unwrap_or_default();
                TestResult::new(relative_path, TestStatus::Timeout, format!("timed out after {:?}", limit))
                    .with_duration(elapsed)
            }
            // jobs run without a cancel token
            Termination::Cancelled => {
                TestResult::runner_error(relative_path, "cancelled").with_duration(elapsed)
            }
            Termination::Exited(status) if process::killed_by_signal(&status) => TestResult::new(
                relative_path,
                TestStatus::Crash,
                format!("engine terminated by {}\n{}", status, output.stderr_tail(20)),
            )
            .with_duration(elapsed),
            Termination::Exited(status) => match parse_verdict(&output.stdout_string()) {
                Some(verdict) => verdict_to_result(relative_path, verdict, elapsed),
                None => TestResult::runner_error(
                    relative_path,
                    format!("engine exited with {} without a verdict\n{}", status, output.stderr_tail(20)),
                )
                .with_duration(elapsed),
            },
        }
    }
}

/// Last stdout line that decodes as a verdict
fn parse_verdict(stdout: &str) -> Option<EngineVerdict> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str(line).ok())
}

fn verdict_to_result(relative_path: &str, verdict: EngineVerdict, elapsed: Duration) -> TestResult {
    let status = match TestStatus::parse(&verdict.status) {
        Ok(status) => status,
        Err(_) => {
            return TestResult::runner_error(
                relative_path,
                format!("engine reported unknown status {:?}: {}", verdict.status, verdict.msg),
            )
            .with_duration(elapsed);
        }
    };
    let duration = verdict.duration_ms.map(Duration::from_millis).unwrap_or(elapsed);
    TestResult::new(relative_path, status, verdict.msg)
        .with_memory_kb(verdict.memory_kb)
        .with_duration(duration)
}
