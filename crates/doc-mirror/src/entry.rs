use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier for a mirrored entry.
/// Derived from the destination path; unique within the host store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this id equals `prefix` or lives below it as a path segment.
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || self
                .0
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node type reported by the remote tree listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symlinks, submodules and anything else we don't mirror.
    Other,
}

/// A remote file or directory discovered while walking a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub kind: EntryKind,
    pub sha: String,
    pub size: u64,
}

impl RemoteEntry {
    pub fn file(path: impl Into<String>, sha: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            sha: sha.into(),
            size,
        }
    }

    pub fn directory(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            sha: sha.into(),
            size: 0,
        }
    }
}

/// The result of processing one remote file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedFile {
    pub id: EntryId,
    pub source_path: String,
    pub local_path: String,
    pub content: String,
    pub digest: String,
}

impl ImportedFile {
    /// File extension of the destination path, without the dot.
    pub fn extension(&self) -> Option<&str> {
        crate::path::extension(&self.local_path)
    }
}

/// HTTP validators remembered for one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheRecord {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// The last fully-synced commit of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub last_synced_sha: String,
    pub synced_at: String,
    /// [`SourceConfig::fingerprint`](crate::SourceConfig::fingerprint) at sync time.
    #[serde(default)]
    pub config_digest: Option<String>,
}

/// The host store's unit of persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub id: EntryId,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub body: String,
    pub digest: String,
    pub file_path: String,
    pub rendered: Option<String>,
}

const DIGEST_PREFIX: &str = "sha256:";

/// Content digest in the canonical `sha256:<hex>` form.
pub fn digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{}{:x}", DIGEST_PREFIX, hasher.finalize())
}
