//! Runner configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! the environment. Command-line flags are applied last by the binary.

use crate::engine::RELEASE_BUILD_THRESHOLD;
use crate::error::{Error, Result};
use crate::executor::DEFAULT_JOB_TIMEOUT;
use crate::worker::{DEFAULT_EXCLUSIONS, DEFAULT_WORKERS};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default corpus location, relative to the working directory
pub const DEFAULT_TEST_ROOT: &str = "./test262/test";

/// Default engine binary name inside `target/{debug,release}`
pub const DEFAULT_ENGINE_BINARY: &str = "yavashark_test262";

pub const ENV_REPO_PATH: &str = "REPO_PATH";
pub const ENV_WORKERS: &str = "WORKERS";
pub const ENV_TEST_ROOT_DIR: &str = "TEST_ROOT_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Engine repository (where `cargo build` runs)
    pub repo_path: PathBuf,
    pub workers: usize,
    /// Corpus root
    pub test_root_dir: PathBuf,
    pub engine_binary: String,
    /// Corpus-relative directories that are skipped instead of run
    pub exclusions: Vec<String>,
    pub release_threshold: usize,
    /// 0 disables the per-job timeout
    pub job_timeout_secs: u64,
    /// Snapshot to diff directory runs against
    pub previous_results: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            workers: DEFAULT_WORKERS,
            test_root_dir: PathBuf::from(DEFAULT_TEST_ROOT),
            engine_binary: DEFAULT_ENGINE_BINARY.to_string(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            release_threshold: RELEASE_BUILD_THRESHOLD,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
            previous_results: None,
        }
    }
}

impl RunnerConfig {
    /// Defaults, overlaid with `file` (if given and present), then the
    /// process environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?.unwrap_or_default(),
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file. A missing file gives `Ok(None)`.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(Self::from_toml(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay environment variables read through `lookup`.
    /// A `WORKERS` value that is not a positive integer is ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(repo) = lookup(ENV_REPO_PATH).filter(|v| !v.is_empty()) {
            self.repo_path = PathBuf::from(repo);
        }
        if let Some(root) = lookup(ENV_TEST_ROOT_DIR).filter(|v| !v.is_empty()) {
            self.test_root_dir = PathBuf::from(root);
        }
        if let Some(raw) = lookup(ENV_WORKERS) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.workers = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", ENV_WORKERS),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.engine_binary.trim().is_empty() {
            return Err(Error::Config("engine_binary must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn debug_binary(&self) -> PathBuf {
        self.repo_path.join("target").join("debug").join(&self.engine_binary)
    }

    pub fn release_binary(&self) -> PathBuf {
        self.repo_path.join("target").join("release").join(&self.engine_binary)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.workers, 256);
        assert_eq!(config.release_threshold, 5000);
        assert_eq!(config.exclusions, vec!["intl402", "staging"]);
        assert_eq!(config.debug_binary(), PathBuf::from("./target/debug/yavashark_test262"));
        assert_eq!(config.release_binary(), PathBuf::from("./target/release/yavashark_test262"));
        assert_eq!(config.job_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_toml_overrides_only_what_it_names() {
        let config = RunnerConfig::from_toml(
            r#"
            repo_path = "/src/engine"
            workers = 16
            job_timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.repo_path, PathBuf::from("/src/engine"));
        assert_eq!(config.workers, 16);
        assert_eq!(config.job_timeout(), None);
        assert_eq!(config.test_root_dir, PathBuf::from(DEFAULT_TEST_ROOT));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(matches!(RunnerConfig::from_toml("workers = \"many\""), Err(Error::Config(_))));
        assert!(matches!(RunnerConfig::from_toml("wrokers = 3"), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunnerConfig::from_file(&dir.path().join("runner.toml")).unwrap().is_none());
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [("REPO_PATH", "/repo"), ("WORKERS", "12"), ("TEST_ROOT_DIR", "/corpus")].into();
        let mut config = RunnerConfig::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.repo_path, PathBuf::from("/repo"));
        assert_eq!(config.workers, 12);
        assert_eq!(config.test_root_dir, PathBuf::from("/corpus"));
    }

    #[test]
    fn test_bad_workers_env_is_ignored() {
        for bad in ["0", "-4", "lots", ""] {
            let mut config = RunnerConfig::default();
            config.apply_env_from(|k| (k == ENV_WORKERS).then(|| bad.to_string()));
            assert_eq!(config.workers, DEFAULT_WORKERS, "WORKERS={:?}", bad);
        }
    }
}
