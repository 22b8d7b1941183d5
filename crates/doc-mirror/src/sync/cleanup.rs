use std::collections::BTreeSet;

use crate::entry::EntryId;
use crate::error::{StoreError, SyncError};
use crate::path;
use crate::source::SourceConfig;

use super::SyncContext;
use super::walker::discover;

/// Entries removed by one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub source: String,
    pub removed: Vec<EntryId>,
}

/// Id prefix every entry of `source` lives under: the destination base with
/// the source's `replace` applied, as ids are derived.
pub fn source_prefix(source: &SourceConfig) -> String {
    let base = path::normalize(&source.base_path);
    match source.replace.as_deref().filter(|r| !r.is_empty()) {
        Some(replace) => path::normalize(&base.replacen(replace, "", 1)),
        None => base,
    }
}

/// Entry ids currently present upstream, from a listing-only walk.
///
/// Fails with a cleanup error when part of the tree could not be listed: an
/// incomplete set would make cleanup delete live entries.
pub async fn collect_upstream_ids(
    ctx: &SyncContext<'_>,
    source: &SourceConfig,
) -> Result<BTreeSet<EntryId>, SyncError> {
    let discovery = discover(ctx, source).await?;
    if !discovery.complete {
        return Err(SyncError::Cleanup(format!(
            "{}: tree listing incomplete, refusing to clean up",
            source.label()
        )));
    }
    Ok(discovery.files.into_iter().map(|file| file.id).collect())
}

/// Delete stored entries of `source` that are not in `current`.
///
/// Only entries whose id is under the source's prefix and whose file path is
/// under its destination base are considered. Their cache records are dropped
/// too, so a file that reappears upstream is imported again.
pub fn cleanup_source(
    ctx: &SyncContext<'_>,
    source: &SourceConfig,
    current: &BTreeSet<EntryId>,
) -> Result<CleanupReport, SyncError> {
    let cleanup_error = |e: StoreError| SyncError::Cleanup(format!("{}: {e}", source.label()));

    let prefix = source_prefix(source);
    let base = path::normalize(&source.base_path);
    if base.is_empty() {
        return Err(SyncError::Cleanup(format!(
            "{}: no destination base path",
            source.label()
        )));
    }

    let stale: Vec<EntryId> = ctx
        .store
        .entries()
        .map_err(cleanup_error)?
        .into_iter()
        .filter(|entry| {
            entry.id.is_under(&prefix) && path::relative_to_root(&base, &entry.file_path).is_some()
        })
        .filter(|entry| !current.contains(&entry.id))
        .map(|entry| entry.id)
        .collect();

    let mut report = CleanupReport {
        source: source.label(),
        removed: Vec::with_capacity(stale.len()),
    };

    for id in stale {
        if ctx.store.delete(&id).map_err(cleanup_error)? {
            tracing::info!(source = %report.source, id = %id, "removed stale entry");
            ctx.metadata.remove_cache_record(&id).map_err(cleanup_error)?;
            report.removed.push(id);
        }
    }

    Ok(report)
}
