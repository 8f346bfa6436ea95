//! Shared test helpers for integration tests

#![allow(dead_code)]

use corpus_runner::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A corpus on disk. Each file's content is the status the fake engine reports.
pub struct TempCorpus {
    dir: tempfile::TempDir,
}

impl TempCorpus {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, path: &str, content: &str) {
        fs::write(self.dir.path().join(path), content).unwrap();
    }
}

/// Executor that reports the status written in the test file.
///
/// Unknown content becomes RUNNER_ERROR and `PANIC` makes it panic.
#[derive(Default)]
pub struct FileStatusExecutor {
    pub calls: AtomicUsize,
    pub engines: Mutex<Vec<PathBuf>>,
    /// Set while the first job should wait for a release promotion
    pub hold_first_until: Option<Arc<AtomicBool>>,
}

impl FileStatusExecutor {
    pub fn engines_used(&self) -> Vec<PathBuf> {
        self.engines.lock().unwrap().clone()
    }
}

impl TestExecutor for FileStatusExecutor {
    fn run_test(&self, relative_path: &str, full_path: &Path, engine: &Path, _corpus_root: &Path) -> TestResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            if let Some(flag) = &self.hold_first_until {
                let deadline = Instant::now() + Duration::from_secs(10);
                while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(5));
                }
                // the builder flags success just before the promotion
                thread::sleep(Duration::from_millis(100));
            }
        }
        self.engines.lock().unwrap().push(engine.to_path_buf());

        let content = fs::read_to_string(full_path).unwrap_or_default();
        let content = content.trim();
        if content == "PANIC" {
            panic!("fake engine harness failure");
        }
        match TestStatus::parse(content) {
            Ok(status) => TestResult::new(relative_path, status, format!("reported {}", status)),
            Err(_) => TestResult::runner_error(relative_path, format!("unexpected output {:?}", content)),
        }
    }
}

/// Build collaborator with scripted outcomes
#[derive(Default)]
pub struct FakeBuilder {
    pub fail_debug: bool,
    pub fail_release: bool,
    pub debug_builds: Arc<AtomicUsize>,
    pub release_builds: Arc<AtomicUsize>,
    /// Set once the release build has succeeded
    pub release_done: Arc<AtomicBool>,
    /// Set once the release build has failed
    pub release_failed: Arc<AtomicBool>,
}

impl EngineBuilder for FakeBuilder {
    fn build_debug(&self) -> Result<()> {
        self.debug_builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_debug {
            return Err(Error::build(BuildProfile::Debug, "error[E0308]: mismatched types"));
        }
        Ok(())
    }

    fn build_release(&self, _cancel: &CancelToken) -> Result<()> {
        self.release_builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            self.release_failed.store(true, Ordering::SeqCst);
            return Err(Error::build(BuildProfile::Release, "linker killed"));
        }
        self.release_done.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub const DEBUG_ENGINE: &str = "/engine/target/debug/engine";
pub const RELEASE_ENGINE: &str = "/engine/target/release/engine";

pub fn runner(
    corpus: &TempCorpus,
    builder: FakeBuilder,
    executor: FileStatusExecutor,
    workers: usize,
) -> Runner<FakeBuilder, FileStatusExecutor> {
    Runner::new(
        EngineManager::new(builder, DEBUG_ENGINE, RELEASE_ENGINE),
        executor,
        CorpusWalker::new(corpus.root()),
        WorkerPool::new(workers),
    )
}

/// A small corpus with excluded directories and a fixture
pub fn sample_corpus() -> TempCorpus {
    TempCorpus::new(&[
        ("built-ins/Array/length.js", "PASS"),
        ("built-ins/Array/from/iter.js", "FAIL"),
        ("built-ins/Array/from/proxy.js", "NOT_IMPLEMENTED"),
        ("built-ins/Array/from/helper_FIXTURE.js", "FAIL"),
        ("language/types/number.js", "PASS"),
        ("language/types/crash.js", "CRASH"),
        ("language/garbage.js", "this is not a status"),
        ("intl402/DateTimeFormat/a.js", "FAIL"),
        ("staging/new.js", "FAIL"),
    ])
}
