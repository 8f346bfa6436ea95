//! Engine Manager
//!
//! Tracks where the engine binaries live and which one jobs should use.
//!
//! A run that asks for a rebuild first builds the debug binary synchronously;
//! if that fails the run is aborted. Large runs (more than
//! [`RELEASE_BUILD_THRESHOLD`] jobs) additionally start a release build in the
//! background. When it succeeds the shared [`EngineLocation`] flips to the
//! release binary, which affects only jobs dispatched after the flip. When it
//! fails the run keeps going on the debug binary and the session reports
//! [`ReleaseBuild::Failed`].

use crate::error::{BuildProfile, Error, Result};
use crate::process::{self, Termination};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Job count above which a background release build is started
pub const RELEASE_BUILD_THRESHOLD: usize = 5000;

/// Cooperative cancellation flag shared between threads
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Which binary jobs are currently dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    DebugActive,
    ReleaseActive,
}

/// Debug and release binary paths plus the selector between them.
///
/// The paths never change after construction. Workers read the selector
/// before every job; only the background release build writes it.
#[derive(Debug)]
pub struct EngineLocation {
    debug_path: PathBuf,
    release_path: PathBuf,
    release_active: AtomicBool,
}

impl EngineLocation {
    /// Create a location with the debug binary active
    pub fn new(debug_path: impl Into<PathBuf>, release_path: impl Into<PathBuf>) -> Self {
        Self {
            debug_path: debug_path.into(),
            release_path: release_path.into(),
            release_active: AtomicBool::new(false),
        }
    }

    /// Path of the binary the next job should use
    pub fn current_path(&self) -> &Path {
        match self.mode() {
            EngineMode::DebugActive => &self.debug_path,
            EngineMode::ReleaseActive => &self.release_path,
        }
    }

    pub fn mode(&self) -> EngineMode {
        if self.release_active.load(Ordering::Acquire) {
            EngineMode::ReleaseActive
        } else {
            EngineMode::DebugActive
        }
    }

    pub fn debug_path(&self) -> &Path {
        &self.debug_path
    }

    pub fn release_path(&self) -> &Path {
        &self.release_path
    }

    /// Switch subsequent jobs to the release binary
    pub(crate) fn promote_release(&self) {
        self.release_active.store(true, Ordering::Release);
    }
}

/// State of the background release build
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseBuild {
    /// No release build for this run (small run or no rebuild requested)
    NotRequested,
    Building,
    /// Release binary built; jobs now use it
    Ready,
    /// Release build failed; the run stays on the debug binary
    Failed,
    /// Abandoned before it finished
    Cancelled,
}

impl ReleaseBuild {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ReleaseBuild::Building,
            2 => ReleaseBuild::Ready,
            3 => ReleaseBuild::Failed,
            4 => ReleaseBuild::Cancelled,
            _ => ReleaseBuild::NotRequested,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ReleaseBuild::NotRequested => 0,
            ReleaseBuild::Building => 1,
            ReleaseBuild::Ready => 2,
            ReleaseBuild::Failed => 3,
            ReleaseBuild::Cancelled => 4,
        }
    }

    /// Running on the debug binary because the release build failed
    pub fn is_degraded(self) -> bool {
        self == ReleaseBuild::Failed
    }
}

#[derive(Debug)]
struct ReleaseState(AtomicU8);

impl ReleaseState {
    fn new(state: ReleaseBuild) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    fn get(&self) -> ReleaseBuild {
        ReleaseBuild::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ReleaseBuild) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// External build collaborator
pub trait EngineBuilder: Send + Sync + 'static {
    /// Build the debug binary, blocking until done
    fn build_debug(&self) -> Result<()>;

    /// Build the release binary. Must give up promptly once `cancel` fires,
    /// returning [`Error::Cancelled`].
    fn build_release(&self, cancel: &CancelToken) -> Result<()>;
}

/// Builds the engine with `cargo build` inside the engine repository
#[derive(Debug, Clone)]
pub struct CargoBuilder {
    repo_root: PathBuf,
}

impl CargoBuilder {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn cargo_build(&self, profile: BuildProfile, cancel: Option<&CancelToken>) -> Result<()> {
        let mut command = Command::new("cargo");
        command.arg("build").current_dir(&self.repo_root);
        if profile == BuildProfile::Release {
            command.arg("--release");
        }

        let output = process::run_supervised(command, None, cancel)
            .map_err(|e| Error::build(profile, format!("failed to start cargo: {}", e)))?;

        match output.termination {
            Termination::Exited(status) if status.success() => Ok(()),
            Termination::Exited(status) => Err(Error::build(
                profile,
                format!("cargo exited with {}\n{}", status, output.stderr_tail(20)),
            )),
            Termination::Cancelled => Err(Error::Cancelled(format!("{} build", profile))),
            Termination::TimedOut => Err(Error::build(profile, "timed out")),
        }
    }
}

impl EngineBuilder for CargoBuilder {
    fn build_debug(&self) -> Result<()> {
        self.cargo_build(BuildProfile::Debug, None)
    }

    fn build_release(&self, cancel: &CancelToken) -> Result<()> {
        self.cargo_build(BuildProfile::Release, Some(cancel))
    }
}

/// Prepares engine binaries for runs
pub struct EngineManager<B> {
    builder: Arc<B>,
    debug_path: PathBuf,
    release_path: PathBuf,
    release_threshold: usize,
}

impl<B: EngineBuilder> EngineManager<B> {
    pub fn new(builder: B, debug_path: impl Into<PathBuf>, release_path: impl Into<PathBuf>) -> Self {
        Self {
            builder: Arc::new(builder),
            debug_path: debug_path.into(),
            release_path: release_path.into(),
            release_threshold: RELEASE_BUILD_THRESHOLD,
        }
    }

    /// Use the cargo layout of `repo_root`: `target/{debug,release}/<binary>`
    pub fn for_repo(builder: B, repo_root: &Path, binary: &str) -> Self {
        Self::new(
            builder,
            repo_root.join("target").join("debug").join(binary),
            repo_root.join("target").join("release").join(binary),
        )
    }

    pub fn with_release_threshold(mut self, threshold: usize) -> Self {
        self.release_threshold = threshold;
        self
    }

    pub fn release_threshold(&self) -> usize {
        self.release_threshold
    }

    /// Get binaries ready for a run of about `estimated_jobs` jobs.
    ///
    /// Without `rebuild` nothing is built and the debug binary is used as is.
    pub fn prepare(&self, estimated_jobs: usize, rebuild: bool) -> Result<EngineSession> {
        let location = Arc::new(EngineLocation::new(&self.debug_path, &self.release_path));
        let cancel = CancelToken::new();

        if !rebuild {
            return Ok(EngineSession::new(location, cancel, ReleaseBuild::NotRequested, None));
        }

        tracing::info!(path = %self.debug_path.display(), "building debug engine");
        self.builder.build_debug()?;

        if estimated_jobs <= self.release_threshold {
            return Ok(EngineSession::new(location, cancel, ReleaseBuild::NotRequested, None));
        }

        tracing::info!(
            jobs = estimated_jobs,
            threshold = self.release_threshold,
            "starting background release build"
        );
        let mut session = EngineSession::new(location, cancel, ReleaseBuild::Building, None);
        let handle = spawn_release_build(
            Arc::clone(&self.builder),
            Arc::clone(&session.location),
            session.cancel.clone(),
            Arc::clone(&session.release),
        );
        session.handle = handle;
        Ok(session)
    }
}

fn spawn_release_build<B: EngineBuilder>(
    builder: Arc<B>,
    location: Arc<EngineLocation>,
    cancel: CancelToken,
    state: Arc<ReleaseState>,
) -> Option<JoinHandle<()>> {
    let shared = Arc::clone(&state);
    let spawned = thread::Builder::new()
        .name("release-build".to_string())
        .spawn(move || {
            let state = shared;
            match builder.build_release(&cancel) {
                Ok(()) => {
                    location.promote_release();
                    state.set(ReleaseBuild::Ready);
                    tracing::info!(path = %location.release_path().display(), "release engine ready, switching");
                }
                Err(Error::Cancelled(what)) => {
                    tracing::debug!(build = %what, "release build abandoned");
                    state.set(ReleaseBuild::Cancelled);
                }
                Err(e) => {
                    state.set(ReleaseBuild::Failed);
                    tracing::warn!(error = %e, "release build failed, continuing on debug engine");
                }
            }
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            state.set(ReleaseBuild::Failed);
            tracing::warn!(error = %e, "could not start release build, continuing on debug engine");
            None
        }
    }
}

/// Engine binaries for one run, plus the handle on any background build
///
/// Dropping the session cancels a pending release build without waiting.
#[derive(Debug)]
pub struct EngineSession {
    location: Arc<EngineLocation>,
    cancel: CancelToken,
    release: Arc<ReleaseState>,
    handle: Option<JoinHandle<()>>,
}

impl EngineSession {
    fn new(
        location: Arc<EngineLocation>,
        cancel: CancelToken,
        release: ReleaseBuild,
        handle: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            location,
            cancel,
            release: Arc::new(ReleaseState::new(release)),
            handle,
        }
    }

    pub fn location(&self) -> &EngineLocation {
        &self.location
    }

    pub fn current_path(&self) -> &Path {
        self.location.current_path()
    }

    pub fn mode(&self) -> EngineMode {
        self.location.mode()
    }

    pub fn release_build(&self) -> ReleaseBuild {
        self.release.get()
    }

    pub fn is_degraded(&self) -> bool {
        self.release_build().is_degraded()
    }

    /// Token that abandons the pending release build. Jobs are unaffected.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the background build to settle without cancelling it
    pub fn wait_for_release(&mut self) -> ReleaseBuild {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                self.release.set(ReleaseBuild::Failed);
                tracing::warn!("release build thread panicked");
            }
        }
        self.release_build()
    }

    /// End the session: abandon a pending release build and report its state
    pub fn finish(mut self) -> ReleaseBuild {
        self.cancel.cancel();
        self.wait_for_release()
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
