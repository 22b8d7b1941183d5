//! The synchronization engine.
//!
//! [`Engine`] drives sources one at a time. Per source, [`to_collection_entry`]
//! walks the remote tree and pushes each file through the conditional cache,
//! the transform pipeline, asset resolution and [`store_processed_file`].
//! [`cleanup_source`] and [`check_source`] are the selective-cleanup and
//! dry-run passes.

mod cleanup;
mod dry_run;
mod orchestrator;
mod walker;
mod writer;

use std::collections::BTreeSet;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::cache::MetadataStore;
use crate::entry::EntryId;
use crate::handler::EntryTypeRegistry;
use crate::remote::RemoteRepository;
use crate::store::ContentStore;

pub use cleanup::{CleanupReport, cleanup_source, collect_upstream_ids, source_prefix};
pub use dry_run::{DryRunReport, DryRunStatus, check_source, dry_run};
pub use orchestrator::{DEFAULT_SOURCE_DELAY, Engine, RunReport, SourceOutcome};
pub use walker::{Candidate, Discovery, discover, to_collection_entry};
pub use writer::{StoredFile, store_processed_file};

/// Everything one source's import needs, borrowed for the duration of a pass.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub remote: &'a dyn RemoteRepository,
    pub metadata: &'a dyn MetadataStore,
    pub store: &'a dyn ContentStore,
    pub registry: &'a EntryTypeRegistry,
    /// Destination paths are resolved against this directory.
    pub output_dir: &'a Path,
    pub cancel: &'a CancellationToken,
}

/// Switches for one import pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Delete-then-insert every entry, even when its digest is unchanged.
    pub clear: bool,
    /// Walk the tree even when the watermark matches the latest commit.
    pub force: bool,
    /// Run selective cleanup after a complete walk.
    pub cleanup: bool,
}

/// What happened while importing one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub source: String,
    /// Files whose content came back from the remote.
    pub fetched: usize,
    /// Files answered with not-modified, or whose digest matched the store.
    pub unchanged: usize,
    /// Store writes.
    pub stored: usize,
    /// Files excluded by the include filter, asset files and unsupported nodes.
    pub skipped: usize,
    /// Assets downloaded.
    pub assets: usize,
    /// Entries deleted by selective cleanup.
    pub removed: usize,
    /// `(path, error)` for every per-file failure.
    pub failures: Vec<(String, String)>,
    /// Every entry id discovered upstream, whether or not it was refetched.
    pub ids: BTreeSet<EntryId>,
    /// False when part of the tree could not be listed.
    pub complete: bool,
}

impl ImportReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            complete: true,
            ..Self::default()
        }
    }

    pub fn fail(&mut self, path: impl Into<String>, error: impl ToString) {
        self.failures.push((path.into(), error.to_string()));
    }
}
