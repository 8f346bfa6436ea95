//! Worker Pool
//!
//! A fixed number of OS threads drain a bounded job queue, run each job
//! against the engine binary that is current at dispatch time, and push the
//! result onto a bounded result queue. A single aggregator thread folds the
//! results into a [`ResultSet`].
//!
//! Shutdown order is fixed: the producer finishes and the job queue is
//! closed, every worker exits, the result queue is closed, and only then is
//! the aggregator joined. The returned set therefore contains every result.

mod queue;
mod walker;

pub use queue::{BoundedQueue, Drain, QueueClosed};
pub use walker::{CorpusWalker, Discovered, DEFAULT_EXCLUSIONS, FIXTURE_MARKER};

use crate::engine::EngineLocation;
use crate::error::{Error, Result};
use crate::executor::TestExecutor;
use crate::results::{Aggregator, ResultSet, TestResult};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

/// Default number of workers. Jobs spend their time waiting on a subprocess,
/// so the pool is much larger than the core count.
pub const DEFAULT_WORKERS: usize = 256;

/// Queue capacity per worker
pub const QUEUE_FACTOR: usize = 8;

/// One scheduled test execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub full_path: PathBuf,
    /// Corpus-relative path, the identity of the test everywhere else
    pub relative_path: String,
}

/// Producer handle passed to [`WorkerPool::run`]
pub struct JobSink<'a> {
    jobs: &'a BoundedQueue<Job>,
    results: &'a BoundedQueue<TestResult>,
    submitted: Cell<usize>,
    skipped: Cell<usize>,
}

impl JobSink<'_> {
    /// Queue a job, blocking while the queue is full
    pub fn submit(&self, job: Job) -> Result<()> {
        tracing::trace!(test = %job.relative_path, "queued");
        self.jobs
            .send(job)
            .map_err(|_| Error::InternalError("job queue closed while producing".to_string()))?;
        self.submitted.set(self.submitted.get() + 1);
        Ok(())
    }

    /// Record a synthetic SKIP result without running anything
    pub fn skip(&self, relative_path: impl Into<String>) -> Result<()> {
        self.results
            .send(TestResult::skipped(relative_path))
            .map_err(|_| Error::InternalError("result queue closed while producing".to_string()))?;
        self.skipped.set(self.skipped.get() + 1);
        Ok(())
    }

    /// Route a walker discovery to [`submit`](Self::submit) or [`skip`](Self::skip)
    pub fn dispatch(&self, found: Discovered) -> Result<()> {
        match found {
            Discovered::Job(job) => self.submit(job),
            Discovered::Excluded(path) => self.skip(path),
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted.get()
    }

    pub fn skipped(&self) -> usize {
        self.skipped.get()
    }
}

/// Fixed-size pool of test workers
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl WorkerPool {
    /// Pool with `workers` threads (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Capacity of both the job and the result queue
    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(QUEUE_FACTOR)
    }

    /// Run every job `produce` submits and return the aggregated results.
    ///
    /// `produce` runs on the calling thread. `expected` only sizes the result
    /// set. An error from `produce` is returned after the jobs it already
    /// queued have drained; the partial results are discarded.
    pub fn run<E, P>(
        &self,
        executor: &E,
        engine: &EngineLocation,
        corpus_root: &Path,
        expected: usize,
        produce: P,
    ) -> Result<ResultSet>
    where
        E: TestExecutor + ?Sized,
        P: FnOnce(&JobSink<'_>) -> Result<()>,
    {
        let jobs: BoundedQueue<Job> = BoundedQueue::with_capacity(self.queue_capacity());
        let results: BoundedQueue<TestResult> = BoundedQueue::with_capacity(self.queue_capacity());

        thread::scope(|scope| {
            let aggregator = thread::Builder::new()
                .name("aggregator".to_string())
                .spawn_scoped(scope, || Aggregator::with_capacity(expected).consume(results.iter()))?;

            let mut handles = Vec::with_capacity(self.workers);
            for id in 0..self.workers {
                let spawned = thread::Builder::new()
                    .name(format!("worker-{}", id))
                    .spawn_scoped(scope, || work(executor, engine, corpus_root, &jobs, &results));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        tracing::warn!(error = %e, started = id, "could not start all workers");
                        break;
                    }
                }
            }

            let sink = JobSink {
                jobs: &jobs,
                results: &results,
                submitted: Cell::new(0),
                skipped: Cell::new(0),
            };
            let produced = if handles.is_empty() {
                Err(Error::InternalError("no worker thread could be started".to_string()))
            } else {
                produce(&sink)
            };
            jobs.close();
            tracing::debug!(submitted = sink.submitted(), skipped = sink.skipped(), "producer finished");

            let mut lost_workers = 0;
            for handle in handles {
                if handle.join().is_err() {
                    lost_workers += 1;
                }
            }
            results.close();

            let set = aggregator
                .join()
                .map_err(|_| Error::InternalError("aggregator thread panicked".to_string()))?;
            produced?;
            if lost_workers > 0 {
                return Err(Error::InternalError(format!("{} worker threads died", lost_workers)));
            }
            Ok(set)
        })
    }
}

fn work<E: TestExecutor + ?Sized>(
    executor: &E,
    engine: &EngineLocation,
    corpus_root: &Path,
    jobs: &BoundedQueue<Job>,
    results: &BoundedQueue<TestResult>,
) {
    for job in jobs.iter() {
        // read per job so a release promotion applies to the next dispatch
        let engine_path = engine.current_path();
        tracing::debug!(test = %job.relative_path, engine = %engine_path.display(), "running");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            executor.run_test(&job.relative_path, &job.full_path, engine_path, corpus_root)
        }));
        let mut result = match outcome {
            Ok(result) => result,
            Err(_) => TestResult::runner_error(job.relative_path.as_str(), "executor panicked"),
        };
        result.path = job.relative_path;

        if results.send(result).is_err() {
            break;
        }
    }
}
