//! Snapshots and status queries
//!
//! A snapshot is a JSON array of compact `{"p": path, "s": code}` records.
//! Stored snapshots are the "previous" side of a diff; the corpus-wide
//! status feed has the same shape and seeds a [`CorpusIndex`].

use crate::error::{Error, Result};
use crate::results::ResultSet;
use crate::status::TestStatus;
use crate::tree::{normalize_path, StatusTree};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of items per page
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Published results of the engine's main branch, usable both as the
/// previous run and as the corpus-wide status feed
pub const DEFAULT_RESULTS_URL: &str =
    "https://raw.githubusercontent.com/Sharktheone/yavashark-data/main/results.json";

/// Largest response body accepted for a remote snapshot
const MAX_REMOTE_SNAPSHOT_BYTES: u64 = 256 * 1024 * 1024;

/// One path and its status in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "p", alias = "path")]
    pub path: String,
    #[serde(rename = "s", alias = "status", with = "status_code")]
    pub status: TestStatus,
}

impl SnapshotRecord {
    pub fn new(path: impl Into<String>, status: TestStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// Statuses are written as short codes and read with the feed expansion table
mod status_code {
    use crate::status::TestStatus;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &TestStatus, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(status.short_code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<TestStatus, D::Error> {
        let code = String::deserialize(d)?;
        Ok(TestStatus::from_code(&code))
    }
}

/// Where a snapshot comes from
pub trait SnapshotSource {
    /// Human-readable origin, for logs
    fn describe(&self) -> String;

    /// Load the records. `Ok(None)` means there is no snapshot, which is not
    /// an error: callers simply skip whatever needed it.
    fn load(&self) -> Result<Option<Vec<SnapshotRecord>>>;
}

/// Snapshot stored in a local file
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for FileSnapshot {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<Vec<SnapshotRecord>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no snapshot file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        decode(&bytes).map(Some)
    }
}

/// Snapshot read from any byte stream, e.g. a response body fetched by the caller
#[derive(Debug, Clone)]
pub struct ReaderSnapshot {
    origin: String,
    bytes: Vec<u8>,
}

impl ReaderSnapshot {
    pub fn from_reader(origin: impl Into<String>, mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self {
            origin: origin.into(),
            bytes,
        })
    }

    pub fn from_bytes(origin: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            origin: origin.into(),
            bytes: bytes.into(),
        }
    }
}

impl SnapshotSource for ReaderSnapshot {
    fn describe(&self) -> String {
        self.origin.clone()
    }

    fn load(&self) -> Result<Option<Vec<SnapshotRecord>>> {
        decode(&self.bytes).map(Some)
    }
}

/// Snapshot fetched over HTTP(S). A 404 means there is no snapshot.
#[derive(Debug, Clone)]
pub struct UrlSnapshot {
    url: String,
    timeout: Duration,
}

impl UrlSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Limit for the whole request, body included
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SnapshotSource for UrlSnapshot {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn load(&self) -> Result<Option<Vec<SnapshotRecord>>> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .into();

        tracing::debug!(url = %self.url, "fetching snapshot");
        let mut response = agent.get(&self.url).call()?;
        let status = response.status();
        if status.as_u16() == 404 {
            tracing::debug!(url = %self.url, "no remote snapshot");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned {}", self.url, status)));
        }

        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_REMOTE_SNAPSHOT_BYTES)
            .read_to_vec()?;
        decode(&bytes).map(Some)
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<SnapshotRecord>> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Load a snapshot as a status-only result set
pub fn load_result_set(source: &dyn SnapshotSource) -> Result<Option<ResultSet>> {
    let Some(records) = source.load()? else {
        return Ok(None);
    };
    tracing::info!(source = %source.describe(), records = records.len(), "loaded snapshot");
    Ok(Some(ResultSet::from_snapshot(records)))
}

/// Write `set` as a snapshot file
pub fn write_snapshot(path: &Path, set: &ResultSet) -> Result<()> {
    let json = serde_json::to_vec(&set.to_snapshot())?;
    fs::write(path, json)?;
    Ok(())
}

impl ResultSet {
    /// Snapshot records for every path, sorted
    pub fn to_snapshot(&self) -> Vec<SnapshotRecord> {
        self.statuses()
            .into_iter()
            .map(|(path, status)| SnapshotRecord::new(path, status))
            .collect()
    }

    pub fn from_snapshot(records: impl IntoIterator<Item = SnapshotRecord>) -> Self {
        Self::from_statuses(records.into_iter().map(|r| (r.path, r.status)))
    }
}

/// Turn a user-supplied corpus path into a tree key.
///
/// Accepts `/test262/test/<dir>`, `/test/<dir>` and `<dir>`; `test` on its
/// own is the corpus root.
pub fn resolve_path(input: &str) -> String {
    let path = input.trim();
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_prefix("test262/").unwrap_or(path);
    if path.trim_end_matches('/') == "test" {
        return String::new();
    }
    let path = path.strip_prefix("test/").unwrap_or(path);
    normalize_path(path)
}

/// Which slice of a listing to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    /// 1-based page number; 0 means the first page
    pub page: usize,
    /// Items per page; 0 means [`DEFAULT_PAGE_SIZE`]
    pub page_size: usize,
    /// Cap on the items considered across all pages; 0 means no cap
    pub max: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            max: 0,
        }
    }
}

impl PageRequest {
    pub fn page(page: usize) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub returned: usize,
    /// Items after this page (within `max`)
    pub remaining: usize,
    /// Items in the full listing, ignoring `max`
    pub total: usize,
}

/// Cut one page out of `items`
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let page = request.page.max(1);
    let page_size = if request.page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        request.page_size
    };

    let total = items.len();
    let limit = if request.max > 0 { request.max.min(total) } else { total };
    let start = (page - 1).saturating_mul(page_size).min(limit);
    let end = start.saturating_add(page_size).min(limit);

    let items: Vec<T> = items.into_iter().skip(start).take(end - start).collect();
    Page {
        returned: items.len(),
        items,
        page,
        page_size,
        remaining: limit - end,
        total,
    }
}

/// Read-only status index over the whole corpus
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    tree: StatusTree,
}

impl CorpusIndex {
    pub fn new(tree: StatusTree) -> Self {
        Self { tree }
    }

    pub fn from_records(records: impl IntoIterator<Item = SnapshotRecord>) -> Self {
        Self::new(StatusTree::from_records(records.into_iter().map(|r| (r.path, r.status))))
    }

    /// Seed from a status feed. A missing feed gives an empty index.
    pub fn from_source(source: &dyn SnapshotSource) -> Result<Self> {
        match source.load()? {
            Some(records) => {
                tracing::info!(source = %source.describe(), records = records.len(), "seeded status index");
                Ok(Self::from_records(records))
            }
            None => {
                tracing::warn!(source = %source.describe(), "status feed unavailable, index is empty");
                Ok(Self::default())
            }
        }
    }

    pub fn from_results(set: &ResultSet) -> Self {
        Self::new(set.tree().clone())
    }

    pub fn tree(&self) -> &StatusTree {
        &self.tree
    }

    pub fn num_tests(&self) -> usize {
        self.tree.num_tests()
    }

    pub fn status_of(&self, test: &str) -> Result<TestStatus> {
        self.tree.status_of(&resolve_path(test))
    }

    pub fn count(&self, dir: &str, recursive: bool) -> Result<usize> {
        self.tree.count_files(&resolve_path(dir), recursive)
    }

    pub fn list(&self, dir: &str, recursive: bool, request: PageRequest) -> Result<Page<String>> {
        Ok(paginate(self.tree.list_files(&resolve_path(dir), recursive)?, request))
    }

    /// Files with the given status name (any case)
    pub fn with_status(&self, dir: &str, status: &str, recursive: bool, request: PageRequest) -> Result<Page<String>> {
        let status = TestStatus::parse(status)?;
        Ok(paginate(
            self.tree.files_with_status(&resolve_path(dir), status, recursive)?,
            request,
        ))
    }

    pub fn failed(&self, dir: &str, recursive: bool, request: PageRequest) -> Result<Page<String>> {
        Ok(paginate(self.tree.failed_files(&resolve_path(dir), recursive)?, request))
    }

    /// Paths containing `query`, ignoring case
    pub fn search(&self, query: &str, request: PageRequest) -> Page<String> {
        paginate(self.tree.files_by_path_substring(query), request)
    }

    /// Immediate subdirectories of `dir`
    pub fn directories(&self, dir: &str) -> Result<Vec<String>> {
        self.tree.child_dirs(&resolve_path(dir))
    }

    /// Status of every test in `dir`, one page at a time
    pub fn statuses(&self, dir: &str, recursive: bool, request: PageRequest) -> Result<Page<(String, TestStatus)>> {
        let statuses = self.tree.statuses_in_dir(&resolve_path(dir), recursive)?;
        Ok(paginate(statuses.into_iter().collect(), request))
    }
}
