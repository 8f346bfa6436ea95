//! Corpus Runner: runs a conformance test corpus against an external engine
//!
//! The runner tracks the status of every file in a large test corpus, reruns
//! arbitrary subtrees of it in parallel against an engine binary, and compares
//! the results with a previous snapshot.
//!
//! # Quick Start
//!
//! ```no_run
//! use corpus_runner::{FileSnapshot, Runner, RunnerConfig};
//!
//! fn main() -> corpus_runner::Result<()> {
//!     let config = RunnerConfig::load(None)?;
//!     let runner = Runner::from_config(&config);
//!     let previous = FileSnapshot::new("results.json");
//!     let run = runner.run_dir("built-ins/Array", true, Some(&previous))?;
//!     println!("{}", run.results.format_summary());
//!     if let Some(diff) = &run.diff {
//!         println!("{}", diff);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! A directory run flows: [`worker::CorpusWalker`] → job queue → workers
//! ([`executor`] against the [`engine`]'s current binary) → result queue →
//! [`results::Aggregator`] → [`ResultSet`] → [`diff`]
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Index** | [`status`], [`tree`], [`results`] |
//! | **Execution** | [`engine`], [`executor`], [`worker`], [`runner`] |
//! | **Comparison** | [`diff`], [`provider`] |
//! | **Setup** | [`config`], [`error`](Error) |

pub mod config;
pub mod diff;
pub mod engine;
pub mod executor;
pub mod prelude;
pub mod provider;
pub mod results;
pub mod runner;
pub mod status;
pub mod tree;
pub mod worker;

mod error;
mod process;

pub use config::RunnerConfig;
pub use diff::{CountsDelta, Diff, DirectorySummaries, Transition};
pub use engine::{CancelToken, EngineBuilder, EngineManager, EngineSession, ReleaseBuild};
pub use error::{BuildProfile, Error, Result};
pub use executor::{ProcessExecutor, TestExecutor};
pub use provider::{CorpusIndex, FileSnapshot, ReaderSnapshot, SnapshotRecord, SnapshotSource, UrlSnapshot};
pub use results::{ResultSet, StatusCounts, TestResult};
pub use runner::{DirRun, Runner};
pub use status::TestStatus;
pub use tree::StatusTree;

/// Version of the corpus runner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
