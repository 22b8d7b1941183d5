use std::collections::HashMap;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::assets::{self, AssetResolver};
use crate::cache;
use crate::entry::{EntryId, EntryKind, ImportedFile, digest};
use crate::error::{RemoteError, SyncError};
use crate::links::{self, LinkRewriter};
use crate::path::{self, IdOptions, PathOptions};
use crate::remote::{Blob, FetchOutcome, Headers};
use crate::source::{RepoLocation, SourceConfig};
use crate::transform::{TransformContext, run_pipeline};

use super::writer::store_processed_file;
use super::{ImportOptions, ImportReport, SyncContext};

/// A remote file selected for import, with its resolved destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub remote_path: String,
    /// Path relative to the source root.
    pub relative_path: String,
    pub local_path: String,
    pub id: EntryId,
}

/// Every importable file under a source's root.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub files: Vec<Candidate>,
    pub skipped: usize,
    pub failures: Vec<(String, String)>,
    /// False when a subdirectory could not be listed.
    pub complete: bool,
}

fn include_filter(source: &SourceConfig) -> Result<Option<GlobSet>, SyncError> {
    if source.include.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in &source.include {
        let glob = Glob::new(pattern).map_err(|e| {
            SyncError::Configuration(format!("invalid include pattern `{pattern}`: {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| SyncError::Configuration(format!("invalid include patterns: {e}")))
}

fn root_error(source: &SourceConfig, error: RemoteError) -> SyncError {
    match error {
        RemoteError::InvalidUrl(msg) => SyncError::Configuration(format!(
            "source {} has an unusable root: {msg}",
            source.label()
        )),
        RemoteError::NotFound(_) => SyncError::Configuration(format!(
            "root path `{}` does not exist in {}/{}@{}",
            source.path, source.owner, source.repo, source.git_ref
        )),
        other => SyncError::Transport(other),
    }
}

/// List the source's tree and resolve a destination for every importable file.
///
/// Traversal is an explicit work-list; cancellation is checked before each
/// directory is listed. A failing root listing is fatal to the source, a
/// failing subdirectory is recorded and marks the discovery incomplete.
/// Two files resolving to the same entry id are a per-file failure for the
/// second one.
pub async fn discover(ctx: &SyncContext<'_>, source: &SourceConfig) -> Result<Discovery, SyncError> {
    let location = source.location();
    let root = path::normalize(&source.path);
    let include = include_filter(source)?;
    let path_options = PathOptions {
        base_path: &source.base_path,
        path_mappings: &source.path_mappings,
    };
    let asset_extensions = source.asset_extensions.as_deref();

    let mut discovery = Discovery {
        complete: true,
        ..Discovery::default()
    };
    let mut claimed: HashMap<EntryId, String> = HashMap::new();
    let mut pending = vec![root.clone()];

    while let Some(dir) = pending.pop() {
        if ctx.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let listing = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SyncError::Cancelled),
            listing = ctx.remote.list_children(&location, &dir) => listing,
        };

        let children = match listing {
            Ok(children) => children,
            Err(e) if dir == root => return Err(root_error(source, e)),
            Err(e) => {
                tracing::warn!(source = %source.label(), path = %dir, error = %e, "directory listing failed");
                discovery.failures.push((dir, e.to_string()));
                discovery.complete = false;
                continue;
            }
        };

        for child in children {
            let Some(relative) = path::relative_to_root(&root, &child.path) else {
                discovery.skipped += 1;
                continue;
            };
            if relative.is_empty() || path::is_hidden(&relative) {
                discovery.skipped += 1;
                continue;
            }

            match child.kind {
                EntryKind::Directory => pending.push(child.path),
                EntryKind::Other => discovery.skipped += 1,
                EntryKind::File => {
                    let included = match &include {
                        Some(set) => set.is_match(&relative),
                        None => path::extension(&relative).is_some_and(|e| ctx.registry.supports(e)),
                    };
                    if !included || assets::is_asset(&relative, asset_extensions) {
                        discovery.skipped += 1;
                        continue;
                    }

                    let local_path = path::generate_path(&path_options, Some(&relative));
                    if local_path.is_empty() {
                        tracing::warn!(source = %source.label(), path = %child.path, "no destination, skipping");
                        discovery.skipped += 1;
                        continue;
                    }

                    let id = path::generate_id(&IdOptions {
                        path: &local_path,
                        replace: source.replace.as_deref(),
                    });

                    if let Some(owner) = claimed.get(&id) {
                        tracing::warn!(source = %source.label(), path = %child.path, id = %id, "entry id collision");
                        discovery.failures.push((
                            child.path,
                            format!("entry id `{id}` is already used by {owner}"),
                        ));
                        continue;
                    }
                    claimed.insert(id.clone(), child.path.clone());

                    discovery.files.push(Candidate {
                        remote_path: child.path,
                        relative_path: relative,
                        local_path,
                        id,
                    });
                }
            }
        }
    }

    Ok(discovery)
}

/// Import every file of one source into the store.
///
/// Files are processed one at a time. A failing file is logged and recorded
/// in the report; its siblings carry on. Configuration errors and
/// cancellation abort the source.
pub async fn to_collection_entry(
    ctx: &SyncContext<'_>,
    source: &SourceConfig,
    options: &ImportOptions,
) -> Result<ImportReport, SyncError> {
    source.validate()?;

    let discovery = discover(ctx, source).await?;
    let rewriter = LinkRewriter::new(source)?;
    let resolver = AssetResolver::new(ctx.remote, source, ctx.output_dir, ctx.cancel);
    let location = source.location();

    let mut report = ImportReport::new(source.label());
    report.skipped = discovery.skipped;
    report.complete = discovery.complete;
    report.failures = discovery.failures;

    let importer = FileImport {
        ctx,
        source,
        location: &location,
        rewriter: &rewriter,
        resolver: resolver.as_ref(),
        clear: options.clear,
    };

    for candidate in &discovery.files {
        if ctx.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        report.ids.insert(candidate.id.clone());

        match importer.run(candidate, &mut report).await {
            Ok(()) => {}
            Err(e) if e.is_fatal_to_source() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    source = %source.label(),
                    path = %candidate.remote_path,
                    id = %candidate.id,
                    error = %e,
                    "file import failed"
                );
                report.fail(candidate.remote_path.clone(), e);
            }
        }
    }

    tracing::info!(
        source = %report.source,
        fetched = report.fetched,
        stored = report.stored,
        unchanged = report.unchanged,
        skipped = report.skipped,
        failures = report.failures.len(),
        "source imported"
    );

    Ok(report)
}

/// Shared state for processing the files of one source.
struct FileImport<'a> {
    ctx: &'a SyncContext<'a>,
    source: &'a SourceConfig,
    location: &'a RepoLocation,
    rewriter: &'a LinkRewriter<'a>,
    resolver: Option<&'a AssetResolver<'a>>,
    clear: bool,
}

impl FileImport<'_> {
    async fn run(&self, candidate: &Candidate, report: &mut ImportReport) -> Result<(), SyncError> {
        let ctx = self.ctx;

        // `clear` re-imports everything, so validators are not sent.
        let fetch = async {
            if self.clear {
                cache::fetch_with(ctx.remote, self.location, &candidate.remote_path, &Headers::new())
                    .await
            } else {
                cache::conditional_fetch(
                    ctx.remote,
                    ctx.metadata,
                    self.location,
                    &candidate.remote_path,
                    &candidate.id,
                )
                .await
            }
        };

        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SyncError::Cancelled),
            outcome = fetch => outcome?,
        };

        let Blob { bytes, headers } = match outcome {
            FetchOutcome::NotModified => {
                tracing::debug!(path = %candidate.remote_path, "not modified");
                report.unchanged += 1;
                return Ok(());
            }
            FetchOutcome::Fetched(blob) => blob,
        };
        report.fetched += 1;

        let raw = String::from_utf8(bytes).map_err(|e| {
            RemoteError::Parse(format!("{} is not valid UTF-8: {e}", candidate.remote_path))
        })?;

        let transform_ctx = TransformContext {
            source: self.source,
            remote_path: &candidate.remote_path,
            local_path: &candidate.local_path,
            id: &candidate.id,
        };
        let mut content = run_pipeline(&self.source.transforms, &raw, &transform_ctx)?;

        if self.source.rewrite_links && links::is_document(&candidate.local_path) {
            content = self.rewriter.rewrite(&content, &candidate.remote_path);
        }

        let mut assets_complete = true;
        if let Some(resolver) = self.resolver {
            let resolved = resolver.resolve(&content, &candidate.remote_path).await?;
            report.assets += resolved.downloaded;
            assets_complete = resolved.failures.is_empty();
            for (asset, error) in resolved.failures {
                report.fail(asset, error);
            }
            content = resolved.content;
        }

        let file = ImportedFile {
            id: candidate.id.clone(),
            source_path: candidate.remote_path.clone(),
            local_path: candidate.local_path.clone(),
            digest: digest(&content),
            content,
        };

        let stored = store_processed_file(&file, ctx, self.clear).await?;
        if stored.changed {
            report.stored += 1;
        } else {
            report.unchanged += 1;
        }

        // Validators are only remembered for fully processed files, so anything
        // that failed is fetched unconditionally next time.
        if assets_complete {
            cache::sync_headers(&headers, ctx.metadata, &candidate.id)?;
        }

        Ok(())
    }
}
