//! End-to-end tests for directory and single-test runs
//!
//! The engine and its build are replaced by fakes from `common`, so these
//! tests exercise the real walker, queues, workers, aggregation and diffing.

mod common;

use common::*;
use corpus_runner::prelude::*;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

mod directory_runs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_whole_corpus() {
        let corpus = sample_corpus();
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 4);

        let run = runner.run_dir("", false, None).unwrap();
        let counts = run.results.counts();

        // 8 files, the fixture is never reported
        assert_eq!(counts.total, 8);
        assert_eq!(counts.passed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.not_implemented, 1);
        assert_eq!(counts.crashed, 1);
        assert_eq!(counts.runner_errors, 1);
        assert_eq!(counts.skipped, 2);
        assert!(run.diff.is_none());
        assert_eq!(run.release_build, ReleaseBuild::NotRequested);
    }

    #[test]
    fn test_excluded_tests_are_skipped_not_run() {
        let corpus = sample_corpus();
        let executor = FileStatusExecutor::default();
        let runner = runner(&corpus, FakeBuilder::default(), executor, 2);

        let run = runner.run_dir("/", false, None).unwrap();
        assert_eq!(run.results.status_of("staging/new.js"), Some(TestStatus::Skip));
        assert_eq!(run.results.status_of("intl402/DateTimeFormat/a.js"), Some(TestStatus::Skip));
        assert_eq!(run.results.result("staging/new.js").unwrap().message, "skip");
        assert!(run.results.status_of("built-ins/Array/from/helper_FIXTURE.js").is_none());
    }

    #[test]
    fn test_subtree_only() {
        let corpus = sample_corpus();
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 3);

        let run = runner.run_dir("built-ins/Array/", false, None).unwrap();
        assert_eq!(run.dir, "built-ins/Array");
        assert_eq!(
            run.results.tree().list_files("", true).unwrap(),
            vec![
                "built-ins/Array/from/iter.js".to_string(),
                "built-ins/Array/from/proxy.js".to_string(),
                "built-ins/Array/length.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let corpus = sample_corpus();
        let builder = FakeBuilder::default();
        let debug_builds = Arc::clone(&builder.debug_builds);
        let runner = runner(&corpus, builder, FileStatusExecutor::default(), 3);

        let err = runner.run_dir("built-ins/Nope", true, None).unwrap_err();
        assert!(matches!(err, Error::DirectoryNotFound(_)));
        assert_eq!(debug_builds.load(Ordering::SeqCst), 0);
    }

    /// Corpus at `<tmp>/test` next to a sibling `<tmp>/secret`
    fn corpus_with_sibling() -> (TempCorpus, Runner<FakeBuilder, FileStatusExecutor>) {
        let tmp = TempCorpus::new(&[("test/language/a.js", "PASS"), ("secret/x.js", "FAIL")]);
        let runner = Runner::new(
            EngineManager::new(FakeBuilder::default(), DEBUG_ENGINE, RELEASE_ENGINE),
            FileStatusExecutor::default(),
            CorpusWalker::new(tmp.root().join("test")),
            WorkerPool::new(2),
        );
        (tmp, runner)
    }

    #[test]
    fn test_directories_outside_the_corpus_are_not_found() {
        let (_tmp, runner) = corpus_with_sibling();

        for dir in ["../secret", "language/../../secret", ".."] {
            let err = runner.run_dir(dir, false, None).unwrap_err();
            assert!(matches!(err, Error::DirectoryNotFound(_)), "{}: {:?}", dir, err);
        }
        assert_eq!(runner.executor().calls.load(Ordering::SeqCst), 0);

        let run = runner.run_dir("language/../language", false, None).unwrap();
        assert_eq!(run.results.statuses(), vec![("language/a.js", TestStatus::Pass)]);
    }

    #[test]
    fn test_prefixed_directory_paths() {
        let corpus = sample_corpus();
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 2);

        let run = runner.run_dir("/test262/test/language/types", false, None).unwrap();
        assert_eq!(run.dir, "language/types");
        assert_eq!(run.results.len(), 2);
    }

    #[test]
    fn test_panicking_executor_is_contained() {
        let corpus = TempCorpus::new(&[("a/ok.js", "PASS"), ("a/boom.js", "PANIC"), ("a/also-ok.js", "PASS")]);
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 2);

        let run = runner.run_dir("a", false, None).unwrap();
        assert_eq!(run.results.len(), 3);
        assert_eq!(run.results.status_of("a/boom.js"), Some(TestStatus::RunnerError));
        assert_eq!(run.results.counts().passed, 2);
    }
}

mod engine_builds {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_debug_build_failure_aborts_the_run() {
        let corpus = sample_corpus();
        let builder = FakeBuilder {
            fail_debug: true,
            ..Default::default()
        };
        let runner = runner(&corpus, builder, FileStatusExecutor::default(), 2);

        let err = runner.run_dir("", true, None).unwrap_err();
        assert!(matches!(err, Error::Build { profile: BuildProfile::Debug, .. }));
    }

    #[test]
    fn test_small_runs_use_the_debug_engine() {
        let corpus = sample_corpus();
        let builder = FakeBuilder::default();
        let release_builds = Arc::clone(&builder.release_builds);
        let r = runner(&corpus, builder, FileStatusExecutor::default(), 2);

        let run = r.run_dir("", true, None).unwrap();
        assert_eq!(run.release_build, ReleaseBuild::NotRequested);
        assert_eq!(release_builds.load(Ordering::SeqCst), 0);
    }

    fn low_threshold_runner(
        corpus: &TempCorpus,
        builder: FakeBuilder,
        executor: FileStatusExecutor,
    ) -> Runner<FakeBuilder, FileStatusExecutor> {
        Runner::new(
            EngineManager::new(builder, DEBUG_ENGINE, RELEASE_ENGINE).with_release_threshold(2),
            executor,
            CorpusWalker::new(corpus.root()),
            WorkerPool::new(1),
        )
    }

    #[test]
    fn test_release_build_switches_later_jobs() {
        let corpus = TempCorpus::new(&[("t/1.js", "PASS"), ("t/2.js", "PASS"), ("t/3.js", "FAIL"), ("t/4.js", "PASS")]);
        let builder = FakeBuilder::default();
        let executor = FileStatusExecutor {
            hold_first_until: Some(Arc::clone(&builder.release_done)),
            ..Default::default()
        };
        let runner = low_threshold_runner(&corpus, builder, executor);

        let run = runner.run_dir("t", true, None).unwrap();
        assert_eq!(run.release_build, ReleaseBuild::Ready);
        assert!(!run.is_degraded());
        assert_eq!(run.results.len(), 4);

        let engines = runner.executor().engines_used();
        assert_eq!(engines.len(), 4);
        assert_eq!(engines[0], PathBuf::from(DEBUG_ENGINE));
        assert_eq!(engines[3], PathBuf::from(RELEASE_ENGINE));
    }

    #[test]
    fn test_release_build_failure_degrades() {
        let corpus = TempCorpus::new(&[("t/1.js", "PASS"), ("t/2.js", "PASS"), ("t/3.js", "PASS")]);
        let builder = FakeBuilder {
            fail_release: true,
            ..Default::default()
        };
        let release_builds = Arc::clone(&builder.release_builds);
        let executor = FileStatusExecutor {
            hold_first_until: Some(Arc::clone(&builder.release_failed)),
            ..Default::default()
        };
        let runner = low_threshold_runner(&corpus, builder, executor);

        let run = runner.run_dir("t", true, None).unwrap();
        assert_eq!(release_builds.load(Ordering::SeqCst), 1);
        assert_eq!(run.release_build, ReleaseBuild::Failed);
        assert!(run.is_degraded());

        // every job still ran, on the debug engine
        assert_eq!(run.results.counts().passed, 3);
        assert_eq!(runner.executor().engines_used(), vec![PathBuf::from(DEBUG_ENGINE); 3]);
    }
}

mod comparisons {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_diff_against_previous_snapshot() {
        let corpus = sample_corpus();
        let previous = ReaderSnapshot::from_bytes(
            "previous",
            r#"[
                {"p": "built-ins/Array/length.js", "s": "F"},
                {"p": "built-ins/Array/from/iter.js", "s": "P"},
                {"p": "built-ins/Array/from/proxy.js", "s": "PF"},
                {"p": "built-ins/Array/removed.js", "s": "P"},
                {"p": "language/types/number.js", "s": "F"}
            ]"#,
        );
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 4);

        let run = runner.run_dir("built-ins", false, Some(&previous)).unwrap();
        let diff = run.diff.as_ref().unwrap();

        assert_eq!(diff.root(), "built-ins");
        assert_eq!(diff.num_changed(), 3);
        assert_eq!(diff.new_failures(), 1);
        assert_eq!(diff.regressions(), vec!["built-ins/Array/from/iter.js"]);
        assert_eq!(
            diff.paths(Transition::new(Some(TestStatus::Pass), None)),
            Some(&["built-ins/Array/removed.js".to_string()][..])
        );
        // language/ is outside the run and not part of the diff
        assert_eq!(
            diff.paths(Transition::new(Some(TestStatus::Fail), Some(TestStatus::Pass))),
            Some(&["built-ins/Array/length.js".to_string()][..])
        );

        let comparison = run.comparison.as_ref().unwrap();
        assert_eq!(comparison.total, -1);
        assert_eq!(run.new_failures(), 1);
    }

    #[test]
    fn test_directory_without_tests_diffs_as_empty() {
        let corpus = TempCorpus::new(&[("a/t.js", "PASS"), ("helpers/only_FIXTURE.js", "PASS")]);
        let previous = ReaderSnapshot::from_bytes("previous", r#"[{"p": "a/t.js", "s": "P"}]"#);
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 2);

        let run = runner.run_dir("helpers", false, Some(&previous)).unwrap();
        assert!(run.results.is_empty());
        assert!(run.diff.as_ref().unwrap().is_empty());
        assert_eq!(run.new_failures(), 0);
    }

    #[test]
    fn test_missing_snapshot_skips_the_diff() {
        let corpus = sample_corpus();
        let dir = tempfile::tempdir().unwrap();
        let previous = FileSnapshot::new(dir.path().join("results.json"));
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 2);

        let run = runner.run_dir("language", false, Some(&previous)).unwrap();
        assert!(run.diff.is_none());
        assert_eq!(run.new_failures(), 0);
    }

    #[test]
    fn test_corrupt_snapshot_fails_before_running() {
        let corpus = sample_corpus();
        let executor = FileStatusExecutor::default();
        let runner = runner(&corpus, FakeBuilder::default(), executor, 2);
        let previous = ReaderSnapshot::from_bytes("bad", "[{\"p\": 1}]");

        assert!(matches!(runner.run_dir("", false, Some(&previous)), Err(Error::Snapshot(_))));
    }

    #[test]
    fn test_saved_snapshot_round_trips_through_a_diff() {
        let corpus = sample_corpus();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("results.json");
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 2);

        let first = runner.run_dir("", false, None).unwrap();
        write_snapshot(&file, &first.results).unwrap();

        corpus.write("language/types/number.js", "TIMEOUT");
        let second = runner.run_dir("", false, Some(&FileSnapshot::new(&file))).unwrap();
        let diff = second.diff.unwrap();
        assert_eq!(diff.num_changed(), 1);
        assert_eq!(diff.regressions(), vec!["language/types/number.js"]);
    }
}

mod single_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_one_test() {
        let corpus = sample_corpus();
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 8);

        let result = runner.run_test("./language/types/crash.js", false).unwrap();
        assert_eq!(result.path, "language/types/crash.js");
        assert_eq!(result.status, TestStatus::Crash);
    }

    #[test]
    fn test_single_test_never_builds_release() {
        let corpus = sample_corpus();
        let builder = FakeBuilder::default();
        let debug_builds = Arc::clone(&builder.debug_builds);
        let release_builds = Arc::clone(&builder.release_builds);
        let runner = runner(&corpus, builder, FileStatusExecutor::default(), 1);

        runner.run_test("built-ins/Array/length.js", true).unwrap();
        assert_eq!(debug_builds.load(Ordering::SeqCst), 1);
        assert_eq!(release_builds.load(Ordering::SeqCst), 0);
        assert_eq!(runner.executor().engines_used(), vec![PathBuf::from(DEBUG_ENGINE)]);
    }

    #[test]
    fn test_unknown_test_is_not_found() {
        let corpus = sample_corpus();
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 1);

        assert!(matches!(runner.run_test("built-ins/Array/nope.js", false), Err(Error::TestNotFound(_))));
        assert!(matches!(runner.run_test("built-ins/Array", false), Err(Error::TestNotFound(_))));
    }

    #[test]
    fn test_tests_outside_the_corpus_are_not_found() {
        let tmp = TempCorpus::new(&[("test/language/a.js", "PASS"), ("secret/x.js", "FAIL")]);
        let runner = Runner::new(
            EngineManager::new(FakeBuilder::default(), DEBUG_ENGINE, RELEASE_ENGINE),
            FileStatusExecutor::default(),
            CorpusWalker::new(tmp.root().join("test")),
            WorkerPool::new(1),
        );

        for path in ["../secret/x.js", "language/../../secret/x.js"] {
            assert!(matches!(runner.run_test(path, false), Err(Error::TestNotFound(_))), "{}", path);
        }
        assert_eq!(runner.executor().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prefixed_test_paths() {
        let corpus = sample_corpus();
        let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 1);

        for path in ["/test262/test/language/types/crash.js", "test/language/types/crash.js"] {
            let result = runner.run_test(path, false).unwrap();
            assert_eq!(result.path, "language/types/crash.js");
            assert_eq!(result.status, TestStatus::Crash);
        }
    }

    #[test]
    fn test_executor_receives_the_corpus_root() {
        let corpus = sample_corpus();
        let seen = std::sync::Mutex::new(Vec::new());
        let executor = |rel: &str, full: &Path, _: &Path, root: &Path| {
            seen.lock().unwrap().push((full.to_path_buf(), root.to_path_buf()));
            TestResult::new(rel, TestStatus::Pass, "")
        };
        let runner = Runner::new(
            EngineManager::new(FakeBuilder::default(), DEBUG_ENGINE, RELEASE_ENGINE),
            executor,
            CorpusWalker::new(corpus.root()),
            WorkerPool::new(1),
        );

        runner.run_test("language/types/number.js", false).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, corpus.root().join("language/types/number.js"));
        assert_eq!(seen[0].1, corpus.root());
    }
}

#[test]
fn test_rerun_failed_is_unimplemented() {
    let corpus = sample_corpus();
    let runner = runner(&corpus, FakeBuilder::default(), FileStatusExecutor::default(), 1);
    let err = runner.rerun_failed_in_dir("built-ins", false).unwrap_err();
    assert!(matches!(err, Error::Unimplemented(_)));
}
