use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{ETAG, IF_NONE_MATCH, MetadataStore};
use crate::entry::{CacheRecord, EntryId, RemoteEntry, StoreEntry, SyncWatermark, digest};
use crate::error::{RemoteError, StoreError};
use crate::remote::{Blob, ChangedFile, CommitInfo, FetchOutcome, Headers, RemoteRepository};
use crate::source::RepoLocation;
use crate::store::ContentStore;

/// In-memory remote repository. Files are keyed by full path; directories
/// are implied by the paths. Etags are derived from content.
#[derive(Default)]
pub struct InMemoryRemote {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    commit: Mutex<Option<CommitInfo>>,
    changes: Mutex<Vec<ChangedFile>>,
    failing: Mutex<HashSet<String>>,
    send_validators: Mutex<bool>,
    fetches: AtomicUsize,
    listings: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            send_validators: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn add_file(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(crate::path::normalize(path), bytes.into());
    }

    pub fn add_text(&self, path: &str, text: &str) {
        self.add_file(path, text.as_bytes().to_vec());
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn set_commit(&self, sha: &str) {
        *self.commit.lock().unwrap() = Some(CommitInfo {
            sha: sha.to_owned(),
            date: Some("2024-10-01T10:00:00Z".to_owned()),
        });
    }

    pub fn clear_commit(&self) {
        *self.commit.lock().unwrap() = None;
    }

    pub fn set_changes(&self, changes: Vec<ChangedFile>) {
        *self.changes.lock().unwrap() = changes;
    }

    /// Make every fetch or listing of `path` fail with a network error.
    pub fn fail_path(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_owned());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Stop sending ETag headers on responses.
    pub fn without_validators(&self) {
        *self.send_validators.lock().unwrap() = false;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn check_failing(&self, path: &str) -> Result<(), RemoteError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(RemoteError::Network(format!("connection reset fetching {path}")));
        }
        Ok(())
    }

    fn etag(bytes: &[u8]) -> String {
        format!("\"{}\"", digest(&String::from_utf8_lossy(bytes)))
    }
}

#[async_trait::async_trait]
impl RemoteRepository for InMemoryRemote {
    async fn list_children(
        &self,
        _location: &RepoLocation,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.check_failing(path)?;

        let root = crate::path::normalize(path);
        let files = self.files.lock().unwrap();
        let mut dirs = BTreeSet::new();
        let mut children = Vec::new();

        for (file_path, bytes) in files.iter() {
            let Some(rest) = crate::path::relative_to_root(&root, file_path) else {
                continue;
            };
            if rest.is_empty() {
                // `path` names a file, not a directory.
                return Err(RemoteError::NotFound(format!("{path} is not a directory")));
            }
            match rest.split_once('/') {
                Some((dir, _)) => {
                    let dir_path = if root.is_empty() {
                        dir.to_owned()
                    } else {
                        format!("{root}/{dir}")
                    };
                    dirs.insert(dir_path);
                }
                None => children.push(RemoteEntry::file(
                    file_path.clone(),
                    Self::etag(bytes),
                    bytes.len() as u64,
                )),
            }
        }

        if children.is_empty() && dirs.is_empty() && !root.is_empty() {
            return Err(RemoteError::NotFound(path.to_owned()));
        }

        children.extend(
            dirs.into_iter()
                .map(|dir| RemoteEntry::directory(dir.clone(), format!("tree-{dir}"))),
        );
        Ok(children)
    }

    async fn fetch_blob(
        &self,
        _location: &RepoLocation,
        path: &str,
        headers: &Headers,
    ) -> Result<FetchOutcome, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failing(path)?;

        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(path.to_owned()))?;
        let etag = Self::etag(&bytes);

        if headers.get(IF_NONE_MATCH) == Some(etag.as_str()) {
            return Ok(FetchOutcome::NotModified);
        }

        let mut response_headers = Headers::new();
        if *self.send_validators.lock().unwrap() {
            response_headers.insert(ETAG, etag);
        }

        Ok(FetchOutcome::Fetched(Blob {
            bytes,
            headers: response_headers,
        }))
    }

    async fn latest_commit(&self, location: &RepoLocation) -> Result<CommitInfo, RemoteError> {
        self.commit.lock().unwrap().clone().ok_or_else(|| {
            RemoteError::NotFound(format!("no commits on {}", location.git_ref))
        })
    }

    async fn compare_commits(
        &self,
        _location: &RepoLocation,
        _base: &str,
        _head: &str,
    ) -> Result<Vec<ChangedFile>, RemoteError> {
        Ok(self.changes.lock().unwrap().clone())
    }
}

/// In-memory host content store that counts mutations.
#[derive(Default)]
pub struct InMemoryContentStore {
    entries: Mutex<HashMap<EntryId, StoreEntry>>,
    mutations: AtomicUsize,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of set/delete/clear calls that changed something.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot for comparisons in tests.
    pub fn snapshot(&self) -> Vec<StoreEntry> {
        let mut entries: Vec<StoreEntry> =
            self.entries.lock().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }
}

impl ContentStore for InMemoryContentStore {
    fn get(&self, id: &EntryId) -> Result<Option<StoreEntry>, StoreError> {
        Ok(self.entries.lock().unwrap().get(id).cloned())
    }

    fn set(&self, entry: StoreEntry) -> Result<(), StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(entry.id.clone(), entry);
        Ok(())
    }

    fn delete(&self, id: &EntryId) -> Result<bool, StoreError> {
        let removed = self.entries.lock().unwrap().remove(id).is_some();
        if removed {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<EntryId>, StoreError> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }

    fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Ok(self.entries.lock().unwrap().values().cloned().collect())
    }

    /// Holds the lock across delete and insert so no reader sees the gap.
    fn replace(&self, entry: StoreEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(&entry.id).is_some() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        entries.insert(entry.id.clone(), entry);
        Ok(())
    }
}

/// In-memory metadata store.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: Mutex<HashMap<EntryId, CacheRecord>>,
    watermarks: Mutex<HashMap<String, SyncWatermark>>,
    fail_watermark_writes: Mutex<bool>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_watermark_writes(&self) {
        *self.fail_watermark_writes.lock().unwrap() = true;
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn cache_record(&self, id: &EntryId) -> Result<Option<CacheRecord>, StoreError> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    fn put_cache_record(&self, id: &EntryId, record: &CacheRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap()
            .insert(id.clone(), record.clone());
        Ok(())
    }

    fn remove_cache_record(&self, id: &EntryId) -> Result<(), StoreError> {
        self.records.lock().unwrap().remove(id);
        Ok(())
    }

    fn watermark(&self, source_key: &str) -> Result<Option<SyncWatermark>, StoreError> {
        Ok(self.watermarks.lock().unwrap().get(source_key).cloned())
    }

    fn put_watermark(
        &self,
        source_key: &str,
        watermark: &SyncWatermark,
    ) -> Result<(), StoreError> {
        if *self.fail_watermark_writes.lock().unwrap() {
            return Err(StoreError::Database("watermark table is read-only".into()));
        }
        self.watermarks
            .lock()
            .unwrap()
            .insert(source_key.to_owned(), watermark.clone());
        Ok(())
    }
}
