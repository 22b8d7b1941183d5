use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::cache::MetadataStore;
use crate::entry::SyncWatermark;
use crate::error::SyncError;
use crate::handler::EntryTypeRegistry;
use crate::remote::{CommitInfo, RemoteRepository};
use crate::source::SourceConfig;
use crate::store::ContentStore;

use super::cleanup::{CleanupReport, cleanup_source, collect_upstream_ids};
use super::dry_run::{DryRunReport, dry_run};
use super::walker::to_collection_entry;
use super::{ImportOptions, ImportReport, SyncContext};

/// Pause between consecutive sources.
pub const DEFAULT_SOURCE_DELAY: Duration = Duration::from_secs(1);

/// How one source fared in a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Imported(ImportReport),
    /// Disabled in configuration.
    Skipped { source: String },
    /// The watermark already matched the latest commit.
    Unchanged { source: String, sha: String },
    Failed { source: String, error: String },
}

impl SourceOutcome {
    pub fn source(&self) -> &str {
        match self {
            Self::Imported(report) => &report.source,
            Self::Skipped { source }
            | Self::Unchanged { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub sources: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s, SourceOutcome::Failed { .. }))
            .count()
    }
}

/// Runs sources through the engine, one after another.
///
/// Holds the capabilities a run needs. The metadata store is opened by the
/// caller and flushed once at the end of every run.
pub struct Engine {
    remote: Arc<dyn RemoteRepository>,
    metadata: Arc<dyn MetadataStore>,
    store: Arc<dyn ContentStore>,
    registry: EntryTypeRegistry,
    output_dir: PathBuf,
    source_delay: Duration,
}

impl Engine {
    pub fn new(
        remote: Arc<dyn RemoteRepository>,
        metadata: Arc<dyn MetadataStore>,
        store: Arc<dyn ContentStore>,
        registry: EntryTypeRegistry,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote,
            metadata,
            store,
            registry,
            output_dir: output_dir.into(),
            source_delay: DEFAULT_SOURCE_DELAY,
        }
    }

    pub fn with_source_delay(mut self, delay: Duration) -> Self {
        self.source_delay = delay;
        self
    }

    fn context<'a>(&'a self, cancel: &'a CancellationToken) -> SyncContext<'a> {
        SyncContext {
            remote: self.remote.as_ref(),
            metadata: self.metadata.as_ref(),
            store: self.store.as_ref(),
            registry: &self.registry,
            output_dir: &self.output_dir,
            cancel,
        }
    }

    /// Import every enabled source in order.
    ///
    /// A failing source is logged and reported; the loop moves on. Only an
    /// empty source list or cancellation ends the run with an error.
    pub async fn run(
        &self,
        sources: &[SourceConfig],
        options: &ImportOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SyncError> {
        if sources.is_empty() {
            return Err(SyncError::Configuration("no sources configured".into()));
        }

        let mut report = RunReport::default();
        let mut first = true;

        for source in sources {
            if !source.enabled {
                tracing::info!(source = %source.label(), "source disabled, skipping");
                report.sources.push(SourceOutcome::Skipped {
                    source: source.label(),
                });
                continue;
            }

            if !first {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(self.source_delay) => {}
                }
            }
            first = false;

            let outcome = match self.sync_source(source, options, cancel).await {
                Ok(outcome) => outcome,
                Err(SyncError::Cancelled) => {
                    self.flush();
                    return Err(SyncError::Cancelled);
                }
                Err(e) => {
                    tracing::error!(
                        source = %source.label(),
                        owner = %source.owner,
                        repo = %source.repo,
                        error = %e,
                        "source import failed"
                    );
                    SourceOutcome::Failed {
                        source: source.label(),
                        error: e.to_string(),
                    }
                }
            };
            report.sources.push(outcome);
        }

        self.flush();
        Ok(report)
    }

    /// Import one source, then record its watermark.
    ///
    /// The watermark only advances after a clean pass: any per-file failure
    /// or incomplete listing leaves it in place so the next run retries.
    pub async fn sync_source(
        &self,
        source: &SourceConfig,
        options: &ImportOptions,
        cancel: &CancellationToken,
    ) -> Result<SourceOutcome, SyncError> {
        source.validate()?;
        let ctx = self.context(cancel);
        let key = source.key();

        let latest = match self.remote.latest_commit(&source.location()).await {
            Ok(commit) => Some(commit),
            Err(e) => {
                let error = SyncError::StateTracking(format!("latest commit lookup failed: {e}"));
                tracing::debug!(source = %source.label(), error = %error, "continuing without commit");
                None
            }
        };

        let fingerprint = source.fingerprint();

        if !options.force && !options.clear {
            if let Some(commit) = &latest {
                if self.is_current(&key, commit, &fingerprint) {
                    tracing::info!(source = %source.label(), sha = %commit.sha, "unchanged since last sync");
                    return Ok(SourceOutcome::Unchanged {
                        source: source.label(),
                        sha: commit.sha.clone(),
                    });
                }
            }
        }

        let mut report = to_collection_entry(&ctx, source, options).await?;

        if options.cleanup {
            if report.complete {
                match cleanup_source(&ctx, source, &report.ids) {
                    Ok(cleanup) => report.removed = cleanup.removed.len(),
                    Err(e) => {
                        tracing::error!(source = %source.label(), error = %e, "cleanup failed");
                        report.fail(super::cleanup::source_prefix(source), e);
                    }
                }
            } else {
                tracing::warn!(source = %source.label(), "tree listing incomplete, skipping cleanup");
            }
        }

        match latest {
            Some(_) if !report.failures.is_empty() || !report.complete => tracing::info!(
                source = %source.label(),
                failures = report.failures.len(),
                complete = report.complete,
                "import incomplete, watermark held back for retry"
            ),
            Some(commit) => self.record_watermark(source, &key, &commit, fingerprint),
            None => tracing::debug!(source = %source.label(), "no commit known, watermark not updated"),
        }

        Ok(SourceOutcome::Imported(report))
    }

    fn is_current(&self, key: &str, commit: &CommitInfo, fingerprint: &str) -> bool {
        match self.metadata.watermark(key) {
            Ok(Some(watermark)) => {
                watermark.last_synced_sha == commit.sha
                    && watermark.config_digest.as_deref() == Some(fingerprint)
            }
            Ok(None) => false,
            Err(e) => {
                tracing::debug!(source_key = %key, error = %e, "watermark lookup failed");
                false
            }
        }
    }

    fn record_watermark(
        &self,
        source: &SourceConfig,
        key: &str,
        commit: &CommitInfo,
        fingerprint: String,
    ) {
        let watermark = SyncWatermark {
            last_synced_sha: commit.sha.clone(),
            synced_at: now_epoch_secs(),
            config_digest: Some(fingerprint),
        };
        if let Err(e) = self.metadata.put_watermark(key, &watermark) {
            let error = SyncError::StateTracking(e.to_string());
            tracing::debug!(source = %source.label(), error = %error, "watermark not updated");
        }
    }

    fn flush(&self) {
        if let Err(e) = self.metadata.flush() {
            tracing::warn!(error = %e, "failed to flush metadata store");
        }
    }

    /// Dry run over every source. Never writes.
    pub async fn check(&self, sources: &[SourceConfig], deep: bool) -> Vec<DryRunReport> {
        dry_run(
            self.remote.as_ref(),
            self.metadata.as_ref(),
            sources,
            deep,
        )
        .await
    }

    /// Selective cleanup of each enabled source against a fresh tree listing.
    pub async fn cleanup(
        &self,
        sources: &[SourceConfig],
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<CleanupReport, SyncError>>, SyncError> {
        let ctx = self.context(cancel);
        let mut results = Vec::with_capacity(sources.len());

        for source in sources.iter().filter(|s| s.enabled) {
            let result = async {
                source.validate()?;
                let current = collect_upstream_ids(&ctx, source).await?;
                cleanup_source(&ctx, source, &current)
            }
            .await;

            match result {
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::error!(source = %source.label(), error = %e, "cleanup failed");
                    results.push(Err(e));
                }
                Ok(report) => results.push(Ok(report)),
            }
        }

        self.flush();
        Ok(results)
    }

    /// The watermark recorded for `source`, if any.
    pub fn watermark(&self, source: &SourceConfig) -> Result<Option<SyncWatermark>, SyncError> {
        Ok(self.metadata.watermark(&source.key())?)
    }
}

fn now_epoch_secs() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}
