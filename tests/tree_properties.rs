//! Property tests for the status tree, diffing and the worker pool

use corpus_runner::prelude::*;
use corpus_runner::worker::Job;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn status() -> impl Strategy<Value = TestStatus> {
    prop::sample::select(TestStatus::ALL.to_vec())
}

fn segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-d]{1,2}", 1..5)
}

/// A file path, sometimes written with `./`, a leading `/` or a trailing `/`
fn messy_path() -> impl Strategy<Value = (String, String)> {
    (segments(), 0u8..4).prop_map(|(parts, style)| {
        let clean = parts.join("/");
        let messy = match style {
            0 => clean.clone(),
            1 => format!("./{}", clean),
            2 => format!("/{}", clean),
            _ => format!("{}/", clean),
        };
        (clean, messy)
    })
}

fn records() -> impl Strategy<Value = Vec<(String, TestStatus)>> {
    prop::collection::vec((segments().prop_map(|p| p.join("/")), status()), 0..60)
}

fn ancestors(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').collect();
    (0..parts.len()).map(|n| parts[..n].join("/")).collect()
}

fn descendants(tree: &StatusTree, dir: &str, out: &mut Vec<String>) {
    for child in tree.child_dirs(dir).unwrap() {
        descendants(tree, &child, out);
        out.push(child);
    }
}

proptest! {
    #[test]
    fn prop_every_ancestor_directory_exists(records in records()) {
        let tree = StatusTree::from_records(records.iter().map(|(p, s)| (p.as_str(), *s)));
        for (path, _) in &records {
            for dir in ancestors(path) {
                prop_assert!(tree.contains_dir(&dir), "missing {:?} for {:?}", dir, path);
            }
        }
    }

    #[test]
    fn prop_add_file_replaces(records in records(), (clean, messy) in messy_path(), first in status(), second in status()) {
        let mut tree = StatusTree::from_records(records.iter().map(|(p, s)| (p.as_str(), *s)));
        tree.add_file(&clean, first);
        let before = tree.num_tests();
        tree.add_file(&messy, second);

        prop_assert_eq!(tree.num_tests(), before);
        prop_assert_eq!(tree.status_of(&clean).unwrap(), second);
    }

    #[test]
    fn prop_recursive_count_is_sum_of_levels(records in records()) {
        let tree = StatusTree::from_records(records.iter().map(|(p, s)| (p.as_str(), *s)));
        let mut dirs = vec![String::new()];
        descendants(&tree, "", &mut dirs);

        for dir in &dirs {
            let mut below = Vec::new();
            descendants(&tree, dir, &mut below);
            let sum: usize = std::iter::once(dir)
                .chain(below.iter())
                .map(|d| tree.count_files(d, false).unwrap())
                .sum();
            prop_assert_eq!(tree.count_files(dir, true).unwrap(), sum);
        }
        prop_assert_eq!(tree.count_files("", true).unwrap(), tree.num_tests());
    }

    #[test]
    fn prop_normalize_is_idempotent((clean, messy) in messy_path()) {
        let once = normalize_path(&messy);
        prop_assert_eq!(&once, &clean);
        prop_assert_eq!(normalize_path(&once), once);
    }

    #[test]
    fn prop_self_diff_is_empty(records in records()) {
        let set = ResultSet::from_statuses(records);
        let diff = Diff::compute(&set, &set, "").unwrap();
        prop_assert!(diff.is_empty());
        prop_assert_eq!(diff.new_failures(), 0);
    }

    #[test]
    fn prop_new_failures_match_a_direct_count(previous in records(), current in records()) {
        let before: BTreeMap<String, TestStatus> = previous.iter().cloned().collect();
        let after: BTreeMap<String, TestStatus> = current.iter().cloned().collect();
        let expected = after
            .iter()
            .filter(|(path, status)| status.is_failing() && !before.get(*path).is_some_and(|s| s.is_failing()))
            .count();

        let diff = Diff::compute(&ResultSet::from_statuses(previous), &ResultSet::from_statuses(current), "").unwrap();
        prop_assert_eq!(diff.new_failures(), expected);
        prop_assert_eq!(diff.regressions().len(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_pool_yields_one_result_per_job(jobs in 0usize..300, workers in 1usize..16) {
        let engine = corpus_runner::engine::EngineLocation::new("/d", "/r");
        let exec = |rel: &str, _: &Path, _: &Path, _: &Path| TestResult::new(rel, TestStatus::Pass, "");

        let set = WorkerPool::new(workers)
            .run(&exec, &engine, Path::new("/corpus"), jobs, |sink| {
                for i in 0..jobs {
                    let relative_path = format!("d{}/t{}.js", i % 13, i);
                    sink.submit(Job {
                        full_path: PathBuf::from("/corpus").join(&relative_path),
                        relative_path,
                    })?;
                }
                Ok(())
            })
            .unwrap();

        prop_assert_eq!(set.len(), jobs);
        prop_assert_eq!(set.counts().total, jobs);
    }
}
