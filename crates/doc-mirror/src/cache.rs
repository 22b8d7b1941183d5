//! Conditional-request cache.
//!
//! Per-entry HTTP validators live in a [`MetadataStore`] that is passed in
//! explicitly; the same store also keeps per-source sync watermarks.

use crate::entry::{CacheRecord, EntryId, SyncWatermark};
use crate::error::{RemoteError, StoreError, SyncError};
use crate::remote::{FetchOutcome, Headers, RemoteRepository};
use crate::source::RepoLocation;

pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const ETAG: &str = "ETag";
pub const LAST_MODIFIED: &str = "Last-Modified";

/// Engine-private persistent key-value metadata.
///
/// Implementations must survive across process invocations for incremental
/// sync and dry runs to mean anything. Writes are single-writer per key.
pub trait MetadataStore: Send + Sync {
    fn cache_record(&self, id: &EntryId) -> Result<Option<CacheRecord>, StoreError>;

    fn put_cache_record(&self, id: &EntryId, record: &CacheRecord) -> Result<(), StoreError>;

    /// Forget the validators for `id` so its next fetch is unconditional.
    fn remove_cache_record(&self, id: &EntryId) -> Result<(), StoreError>;

    fn watermark(&self, source_key: &str) -> Result<Option<SyncWatermark>, StoreError>;

    fn put_watermark(&self, source_key: &str, watermark: &SyncWatermark)
    -> Result<(), StoreError>;

    /// Persist buffered writes. Called once at the end of a run.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Merge caller headers with any stored validators for `id`.
/// No record means no conditional headers: an unconditional fetch.
pub fn get_headers(
    init: &Headers,
    cache: &dyn MetadataStore,
    id: &EntryId,
) -> Result<Headers, StoreError> {
    let mut headers = init.clone();

    if let Some(record) = cache.cache_record(id)? {
        if let Some(etag) = record.etag {
            headers.insert(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = record.last_modified {
            headers.insert(IF_MODIFIED_SINCE, last_modified);
        }
    }

    Ok(headers)
}

/// Remember the validators a response carried.
///
/// Overwrites any prior record. A response with neither validator leaves the
/// existing record untouched. Returns whether a record was written.
pub fn sync_headers(
    headers: &Headers,
    cache: &dyn MetadataStore,
    id: &EntryId,
) -> Result<bool, StoreError> {
    let record = CacheRecord {
        etag: headers.get(ETAG).map(str::to_owned),
        last_modified: headers.get(LAST_MODIFIED).map(str::to_owned),
    };

    if record.is_empty() {
        return Ok(false);
    }

    cache.put_cache_record(id, &record)?;
    Ok(true)
}

/// Fetch a blob through the cache gate, attaching any stored validators.
///
/// The response's validators are not recorded here. Callers commit them with
/// [`sync_headers`] once the entry has been fully processed, so a file that
/// fails downstream is fetched unconditionally on the next run.
pub async fn conditional_fetch(
    remote: &dyn RemoteRepository,
    cache: &dyn MetadataStore,
    location: &RepoLocation,
    remote_path: &str,
    id: &EntryId,
) -> Result<FetchOutcome, SyncError> {
    let headers = get_headers(&Headers::new(), cache, id)?;
    fetch_with(remote, location, remote_path, &headers).await
}

/// Fetch with exactly `headers`. An unusable URL is a configuration error.
pub async fn fetch_with(
    remote: &dyn RemoteRepository,
    location: &RepoLocation,
    remote_path: &str,
    headers: &Headers,
) -> Result<FetchOutcome, SyncError> {
    remote
        .fetch_blob(location, remote_path, headers)
        .await
        .map_err(|e| match e {
            RemoteError::InvalidUrl(msg) => SyncError::Configuration(msg),
            other => SyncError::Transport(other),
        })
}

#[cfg(test)]
mod tests {
    use crate::source::SourceConfig;
    use crate::test_support::{InMemoryMetadataStore, InMemoryRemote};

    use super::*;

    #[test]
    fn no_record_adds_no_conditional_headers() {
        let cache = InMemoryMetadataStore::new();
        let init = Headers::new().with("Accept", "application/json");
        let headers = get_headers(&init, &cache, &EntryId::new("a")).unwrap();
        assert_eq!(headers, init);
    }

    #[test]
    fn stored_validators_become_conditional_headers() {
        let cache = InMemoryMetadataStore::new();
        let id = EntryId::new("a");
        cache
            .put_cache_record(
                &id,
                &CacheRecord {
                    etag: Some("\"v1\"".into()),
                    last_modified: Some("Tue, 01 Oct 2024 10:00:00 GMT".into()),
                },
            )
            .unwrap();

        let headers = get_headers(&Headers::new(), &cache, &id).unwrap();
        assert_eq!(headers.get(IF_NONE_MATCH), Some("\"v1\""));
        assert_eq!(
            headers.get(IF_MODIFIED_SINCE),
            Some("Tue, 01 Oct 2024 10:00:00 GMT")
        );
    }

    #[test]
    fn sync_headers_overwrites_record() {
        let cache = InMemoryMetadataStore::new();
        let id = EntryId::new("a");

        sync_headers(&Headers::new().with(ETAG, "\"v1\""), &cache, &id).unwrap();
        sync_headers(&Headers::new().with(ETAG, "\"v2\""), &cache, &id).unwrap();

        let record = cache.cache_record(&id).unwrap().unwrap();
        assert_eq!(record.etag.as_deref(), Some("\"v2\""));
        assert_eq!(record.last_modified, None);
    }

    #[tokio::test]
    async fn conditional_fetch_sends_stored_etag() {
        let remote = InMemoryRemote::new();
        remote.add_text("docs/a.md", "# A\n");
        let cache = InMemoryMetadataStore::new();
        let source = SourceConfig::new("acme", "docs", "docs", "content");
        let id = EntryId::new("content/a");

        let first = conditional_fetch(&remote, &cache, &source.location(), "docs/a.md", &id)
            .await
            .unwrap();
        let FetchOutcome::Fetched(blob) = first else {
            panic!("first fetch should return content");
        };
        assert_eq!(cache.record_count(), 0);

        sync_headers(&blob.headers, &cache, &id).unwrap();
        let second = conditional_fetch(&remote, &cache, &source.location(), "docs/a.md", &id)
            .await
            .unwrap();
        assert_eq!(second, FetchOutcome::NotModified);
    }

    #[tokio::test]
    async fn invalid_url_is_a_configuration_error() {
        struct BadUrl;

        #[async_trait::async_trait]
        impl RemoteRepository for BadUrl {
            async fn list_children(
                &self,
                _: &RepoLocation,
                _: &str,
            ) -> Result<Vec<crate::entry::RemoteEntry>, RemoteError> {
                Err(RemoteError::InvalidUrl("bad".into()))
            }
            async fn fetch_blob(
                &self,
                _: &RepoLocation,
                path: &str,
                _: &Headers,
            ) -> Result<FetchOutcome, RemoteError> {
                Err(RemoteError::InvalidUrl(path.to_owned()))
            }
            async fn latest_commit(
                &self,
                _: &RepoLocation,
            ) -> Result<crate::remote::CommitInfo, RemoteError> {
                Err(RemoteError::InvalidUrl("bad".into()))
            }
            async fn compare_commits(
                &self,
                _: &RepoLocation,
                _: &str,
                _: &str,
            ) -> Result<Vec<crate::remote::ChangedFile>, RemoteError> {
                Err(RemoteError::InvalidUrl("bad".into()))
            }
        }

        let cache = InMemoryMetadataStore::new();
        let source = SourceConfig::new("acme", "docs", "docs", "content");
        let result =
            conditional_fetch(&BadUrl, &cache, &source.location(), "a b", &EntryId::new("x")).await;
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn response_without_validators_keeps_existing_record() {
        let cache = InMemoryMetadataStore::new();
        let id = EntryId::new("a");
        sync_headers(&Headers::new().with(ETAG, "\"v1\""), &cache, &id).unwrap();

        let written = sync_headers(&Headers::new(), &cache, &id).unwrap();
        assert!(!written);
        assert_eq!(
            cache.cache_record(&id).unwrap().unwrap().etag.as_deref(),
            Some("\"v1\"")
        );
    }
}
