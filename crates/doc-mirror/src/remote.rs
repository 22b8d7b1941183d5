use std::collections::BTreeMap;
use std::sync::Arc;

use crate::entry::RemoteEntry;
use crate::error::RemoteError;
use crate::source::RepoLocation;

/// Case-insensitive HTTP header map. Keys are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Content plus the response headers it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub headers: Headers,
}

/// Result of a conditional blob fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server answered 304: the cached copy is still current.
    NotModified,
    Fetched(Blob),
}

/// Latest commit on a ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    Renamed,
}

/// One path changed between two commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    pub change: ChangeKind,
    /// Previous path, for renames.
    pub previous_path: Option<String>,
}

/// The remote repository capability the engine consumes.
///
/// Implementations own transport concerns: authentication, timeouts and
/// URL construction.
#[async_trait::async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Immediate children of `path` at the location's ref.
    async fn list_children(
        &self,
        location: &RepoLocation,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Fetch a file, honouring conditional request headers.
    async fn fetch_blob(
        &self,
        location: &RepoLocation,
        path: &str,
        headers: &Headers,
    ) -> Result<FetchOutcome, RemoteError>;

    async fn latest_commit(&self, location: &RepoLocation) -> Result<CommitInfo, RemoteError>;

    /// Paths changed between `base` and `head`.
    async fn compare_commits(
        &self,
        location: &RepoLocation,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, RemoteError>;
}

#[async_trait::async_trait]
impl<T: RemoteRepository + ?Sized> RemoteRepository for Arc<T> {
    async fn list_children(
        &self,
        location: &RepoLocation,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        (**self).list_children(location, path).await
    }

    async fn fetch_blob(
        &self,
        location: &RepoLocation,
        path: &str,
        headers: &Headers,
    ) -> Result<FetchOutcome, RemoteError> {
        (**self).fetch_blob(location, path, headers).await
    }

    async fn latest_commit(&self, location: &RepoLocation) -> Result<CommitInfo, RemoteError> {
        (**self).latest_commit(location).await
    }

    async fn compare_commits(
        &self,
        location: &RepoLocation,
        base: &str,
        head: &str,
    ) -> Result<Vec<ChangedFile>, RemoteError> {
        (**self).compare_commits(location, base, head).await
    }
}
