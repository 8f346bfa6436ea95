//! Corpus Runner CLI
//!
//! Runs single tests or whole corpus directories against the engine and
//! compares result snapshots.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corpus_runner::provider::{self, PageRequest};
use corpus_runner::{
    CorpusIndex, Diff, FileSnapshot, ResultSet, Runner, RunnerConfig, SnapshotSource, UrlSnapshot, VERSION,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Config file read when `--config` is not given
const DEFAULT_CONFIG_FILE: &str = "corpus-runner.toml";

#[derive(Parser)]
#[command(name = "corpus-runner")]
#[command(author, version, about = "Runs a conformance test corpus against an engine binary", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Engine repository root
    #[arg(long, value_name = "DIR", global = true)]
    repo: Option<PathBuf>,

    /// Corpus root directory
    #[arg(long, value_name = "DIR", global = true)]
    test_root: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single test
    Test {
        /// Corpus-relative test path
        path: String,
        /// Rebuild the engine first
        #[arg(long)]
        rebuild: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every test under a directory
    Dir {
        /// Corpus-relative directory ("" for the whole corpus)
        #[arg(default_value = "")]
        dir: String,
        /// Rebuild the engine first
        #[arg(long)]
        rebuild: bool,
        /// Snapshot to compare against
        #[arg(long, value_name = "FILE")]
        previous: Option<PathBuf>,
        /// Compare against a published snapshot instead
        #[arg(
            long,
            value_name = "URL",
            num_args = 0..=1,
            default_missing_value = provider::DEFAULT_RESULTS_URL,
            conflicts_with = "previous"
        )]
        previous_url: Option<String>,
        /// Write the results as a snapshot
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
        /// Exit with status 1 if any test started failing
        #[arg(long)]
        fail_on_regression: bool,
    },

    /// Rerun only the failing tests of a directory
    RerunFailed {
        dir: String,
        #[arg(long)]
        rebuild: bool,
    },

    /// Compare two snapshots
    Diff {
        previous: PathBuf,
        current: PathBuf,
        /// Only compare tests under this directory
        #[arg(long, default_value = "")]
        root: String,
        #[arg(long)]
        json: bool,
    },

    /// List tests of a snapshot or of the published status feed
    Query {
        /// Directory, e.g. /test262/test/built-ins/Array
        #[arg(default_value = "")]
        dir: String,
        /// Local snapshot to query
        #[arg(long, value_name = "FILE")]
        snapshot: Option<PathBuf>,
        /// Status feed used when no snapshot is given
        #[arg(long, value_name = "URL", default_value = provider::DEFAULT_RESULTS_URL)]
        url: String,
        /// Only tests with this status (any case)
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long)]
        recursive: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = provider::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    tracing::debug!(version = VERSION, "corpus-runner starting");

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Test { path, rebuild, json } => run_test(&config, &path, rebuild, json),
        Commands::Dir {
            dir,
            rebuild,
            previous,
            previous_url,
            save,
            json,
            fail_on_regression,
        } => {
            let previous = previous_source(&config, previous, previous_url);
            run_dir(&config, &dir, rebuild, previous.as_deref(), save.as_deref(), json, fail_on_regression)
        }
        Commands::RerunFailed { dir, rebuild } => {
            Runner::from_config(&config).rerun_failed_in_dir(&dir, rebuild)?;
            Ok(())
        }
        Commands::Diff {
            previous,
            current,
            root,
            json,
        } => diff_snapshots(&previous, &current, &root, json),
        Commands::Query {
            dir,
            snapshot,
            url,
            status,
            recursive,
            page,
            page_size,
        } => {
            let index = match snapshot {
                Some(file) => CorpusIndex::from_results(&load_snapshot(&file)?),
                None => CorpusIndex::from_source(&UrlSnapshot::new(&url))
                    .with_context(|| format!("failed to fetch status feed from {}", url))?,
            };
            query(&index, &dir, status.as_deref(), recursive, page, page_size)
        }
    }
}

fn setup_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let file = cli.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config =
        RunnerConfig::load(Some(file.as_path())).with_context(|| format!("failed to load config from {}", file.display()))?;

    if let Some(repo) = &cli.repo {
        config.repo_path = repo.clone();
    }
    if let Some(root) = &cli.test_root {
        config.test_root_dir = root.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn run_test(config: &RunnerConfig, path: &str, rebuild: bool, json: bool) -> Result<()> {
    let runner = Runner::from_config(config);
    let result = runner.run_test(path, rebuild)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}: {} ({:?})", result.path, result.status, result.duration);
        if !result.message.is_empty() {
            println!("{}", result.message);
        }
    }
    Ok(())
}

/// Previous results for `dir`: a file from the command line, a URL from the
/// command line, then the configured file
fn previous_source(
    config: &RunnerConfig,
    file: Option<PathBuf>,
    url: Option<String>,
) -> Option<Box<dyn SnapshotSource>> {
    match (file, url) {
        (Some(file), _) => Some(Box::new(FileSnapshot::new(file))),
        (None, Some(url)) => Some(Box::new(UrlSnapshot::new(url))),
        (None, None) => config
            .previous_results
            .clone()
            .map(|file| Box::new(FileSnapshot::new(file)) as Box<dyn SnapshotSource>),
    }
}

fn run_dir(
    config: &RunnerConfig,
    dir: &str,
    rebuild: bool,
    previous: Option<&dyn SnapshotSource>,
    save: Option<&Path>,
    json: bool,
    fail_on_regression: bool,
) -> Result<()> {
    let runner = Runner::from_config(config);
    let run = runner.run_dir(dir, rebuild, previous)?;

    if let Some(path) = save {
        provider::write_snapshot(path, &run.results)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
    }

    if json {
        let report = serde_json::json!({
            "dir": run.dir,
            "counts": run.results.counts(),
            "results": run.results.results(),
            "diff": run.diff,
            "comparison": run.comparison,
            "release_build": run.release_build,
            "elapsed_ms": run.elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if let Some(diff) = &run.diff {
            println!("<=== DIFF ===>");
            print!("{}", diff);
            println!();
        }
        println!("<=== Test Results ===>");
        print!("{}", run.results.format_summary());
        if let Some(comparison) = &run.comparison {
            println!();
            println!("<=== Comparison ===>");
            println!("{}", comparison);
        }
        if run.is_degraded() {
            println!("note: release build failed, tests ran on the debug engine");
        }
    }

    if fail_on_regression && run.new_failures() > 0 {
        eprintln!("{} tests started failing", run.new_failures());
        std::process::exit(1);
    }
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<ResultSet> {
    provider::load_result_set(&FileSnapshot::new(path))
        .with_context(|| format!("failed to read snapshot {}", path.display()))?
        .with_context(|| format!("snapshot {} does not exist", path.display()))
}

fn diff_snapshots(previous: &Path, current: &Path, root: &str, json: bool) -> Result<()> {
    let previous = load_snapshot(previous)?;
    let current = load_snapshot(current)?;
    let diff = Diff::compute(&previous, &current, &provider::resolve_path(root))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        print!("{}", diff);
    }
    Ok(())
}

fn query(index: &CorpusIndex, dir: &str, status: Option<&str>, recursive: bool, page: usize, page_size: usize) -> Result<()> {
    let request = PageRequest {
        page,
        page_size,
        max: 0,
    };
    let page = match status {
        Some(status) => index.with_status(dir, status, recursive, request)?,
        None => index.list(dir, recursive, request)?,
    };
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
