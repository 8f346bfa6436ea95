//! Orchestration
//!
//! [`Runner`] owns its collaborators (engine manager, executor, corpus walker
//! and pool settings), so independent runners can coexist in one process.

use crate::config::RunnerConfig;
use crate::diff::{CountsDelta, Diff, DirectorySummaries};
use crate::engine::{CargoBuilder, EngineBuilder, EngineManager, ReleaseBuild};
use crate::error::{Error, Result};
use crate::executor::{ProcessExecutor, TestExecutor};
use crate::provider::{self, SnapshotSource};
use crate::results::{ResultSet, TestResult};
use crate::worker::{CorpusWalker, WorkerPool};
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of a directory run
#[derive(Debug)]
pub struct DirRun {
    /// Corpus-relative directory that was run
    pub dir: String,
    pub results: ResultSet,
    /// Changes against the previous snapshot, if one was available
    pub diff: Option<Diff>,
    /// Counter changes for the same directory in the previous snapshot
    pub comparison: Option<CountsDelta>,
    pub release_build: ReleaseBuild,
    pub elapsed: Duration,
}

impl DirRun {
    /// Whether the run finished on the debug binary because the release build failed
    pub fn is_degraded(&self) -> bool {
        self.release_build.is_degraded()
    }

    /// Number of paths that started failing, 0 without a previous snapshot
    pub fn new_failures(&self) -> usize {
        self.diff.as_ref().map_or(0, Diff::new_failures)
    }
}

/// Runs single tests and whole directories of the corpus
pub struct Runner<B, E> {
    engine: EngineManager<B>,
    executor: E,
    walker: CorpusWalker,
    pool: WorkerPool,
}

impl Runner<CargoBuilder, ProcessExecutor> {
    /// Runner that builds with cargo and runs tests as engine subprocesses
    pub fn from_config(config: &RunnerConfig) -> Self {
        let engine = EngineManager::new(
            CargoBuilder::new(&config.repo_path),
            config.debug_binary(),
            config.release_binary(),
        )
        .with_release_threshold(config.release_threshold);
        let executor = ProcessExecutor::new().with_timeout(config.job_timeout());
        let walker = CorpusWalker::new(&config.test_root_dir).with_exclusions(&config.exclusions);
        Self::new(engine, executor, walker, WorkerPool::new(config.workers))
    }
}

impl<B: EngineBuilder, E: TestExecutor> Runner<B, E> {
    pub fn new(engine: EngineManager<B>, executor: E, walker: CorpusWalker, pool: WorkerPool) -> Self {
        Self {
            engine,
            executor,
            walker,
            pool,
        }
    }

    pub fn corpus_root(&self) -> &Path {
        self.walker.root()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run one test directly, without the pool.
    ///
    /// `test_path` may carry the `/test262/test/` prefix the corpus is
    /// usually addressed by.
    pub fn run_test(&self, test_path: &str, rebuild: bool) -> Result<TestResult> {
        let relative = provider::resolve_path(test_path);
        let full = self
            .walker
            .full_path(&relative)
            .filter(|full| !relative.is_empty() && full.is_file())
            .ok_or_else(|| Error::test_not_found(test_path))?;

        let session = self.engine.prepare(1, rebuild)?;
        let engine = session.current_path();
        tracing::info!(test = %relative, engine = %engine.display(), "running test");

        let mut result = self
            .executor
            .run_test(&relative, &full, engine, self.walker.root());
        result.path = relative;
        session.finish();
        Ok(result)
    }

    /// Run every test under `dir` and, if `previous` yields a snapshot, diff
    /// the results against it
    pub fn run_dir(&self, dir: &str, rebuild: bool, previous: Option<&dyn SnapshotSource>) -> Result<DirRun> {
        let dir = provider::resolve_path(dir);

        // a broken snapshot should fail before any build or test work
        let previous = match previous {
            Some(source) => provider::load_result_set(source)?,
            None => None,
        };

        let estimated = self.walker.count(&dir)?;
        let session = self.engine.prepare(estimated, rebuild)?;
        tracing::info!(
            dir = %dir,
            tests = estimated,
            workers = self.pool.workers(),
            engine = %session.current_path().display(),
            "running directory"
        );

        let started = Instant::now();
        let results = self.pool.run(
            &self.executor,
            session.location(),
            self.walker.root(),
            estimated,
            |sink| self.walker.walk(&dir, |found| sink.dispatch(found)).map(|_| ()),
        );
        let elapsed = started.elapsed();
        let release_build = session.finish();
        let mut results = results?;
        // the walk found the directory, even if it holds no tests
        results.add_dir(&dir);

        tracing::info!(
            dir = %dir,
            tests = results.len(),
            elapsed = ?elapsed,
            release = ?release_build,
            "{}",
            results.counts()
        );
        if release_build.is_degraded() {
            tracing::warn!("run finished on the debug engine because the release build failed");
        }

        let (diff, comparison) = match previous {
            Some(previous) => {
                let diff = Diff::compute(&previous, &results, &dir)?;
                let before = DirectorySummaries::from_results(&previous).aggregate(&dir);
                let comparison = CountsDelta::between(&before, results.counts());
                tracing::info!(changed = diff.num_changed(), new_failures = diff.new_failures(), "compared with previous run");
                (Some(diff), Some(comparison))
            }
            None => (None, None),
        };

        Ok(DirRun {
            dir,
            results,
            diff,
            comparison,
            release_build,
            elapsed,
        })
    }

    /// Rerun only the failing tests of a directory. Not available: callers
    /// get [`Error::Unimplemented`] instead of a full run.
    pub fn rerun_failed_in_dir(&self, _dir: &str, _rebuild: bool) -> Result<DirRun> {
        Err(Error::Unimplemented("rerunning only failed tests"))
    }
}
