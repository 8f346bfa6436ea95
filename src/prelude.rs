//! Prelude module for convenient imports
//!
//! ```no_run
//! use corpus_runner::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let runner = Runner::from_config(&RunnerConfig::load(None)?);
//!     let result = runner.run_test("language/types/number/S8.5_A1.js", false)?;
//!     println!("{}: {}", result.path, result.status);
//!     Ok(())
//! }
//! ```

// Statuses and the index
pub use crate::status::TestStatus;
pub use crate::tree::{normalize_path, StatusTree};

// Error handling
pub use crate::error::{BuildProfile, Error, Result};

// Results
pub use crate::results::{Aggregator, ResultSet, StatusCounts, TestResult};

// Running
pub use crate::config::RunnerConfig;
pub use crate::engine::{CancelToken, CargoBuilder, EngineBuilder, EngineManager, ReleaseBuild};
pub use crate::executor::{ProcessExecutor, TestExecutor};
pub use crate::runner::{DirRun, Runner};
pub use crate::worker::{CorpusWalker, WorkerPool};

// Comparison and queries
pub use crate::diff::{CountsDelta, Diff, DirectorySummaries, Transition};
pub use crate::provider::{
    load_result_set, write_snapshot, CorpusIndex, FileSnapshot, Page, PageRequest, ReaderSnapshot, SnapshotSource,
    UrlSnapshot,
};
