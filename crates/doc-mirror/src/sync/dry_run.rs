use crate::cache::MetadataStore;
use crate::error::SyncError;
use crate::path;
use crate::remote::{ChangedFile, RemoteRepository};
use crate::source::SourceConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRunStatus {
    /// The latest commit and the configuration both match the watermark.
    Unchanged,
    Changed,
    /// No watermark on record.
    NeverSynced,
    Disabled,
    /// The check itself failed; the message says why.
    Failed(String),
}

impl std::fmt::Display for DryRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => f.write_str("unchanged"),
            Self::Changed => f.write_str("changed"),
            Self::NeverSynced => f.write_str("never-synced"),
            Self::Disabled => f.write_str("disabled"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub source: String,
    pub status: DryRunStatus,
    pub sha: Option<String>,
    pub previous_sha: Option<String>,
    /// Paths under the source root changed since the watermark. Deep checks only.
    pub changes: Vec<ChangedFile>,
}

impl DryRunReport {
    fn new(source: &SourceConfig, status: DryRunStatus) -> Self {
        Self {
            source: source.label(),
            status,
            sha: None,
            previous_sha: None,
            changes: Vec::new(),
        }
    }
}

/// Compare a source's latest commit with its watermark. Reads only.
///
/// With `deep`, a changed source also lists the files that changed under its
/// root between the two commits.
pub async fn check_source(
    remote: &dyn RemoteRepository,
    metadata: &dyn MetadataStore,
    source: &SourceConfig,
    deep: bool,
) -> Result<DryRunReport, SyncError> {
    let location = source.location();
    let latest = remote.latest_commit(&location).await?;
    let previous = metadata.watermark(&source.key())?;

    let mut report = DryRunReport::new(source, DryRunStatus::NeverSynced);
    report.sha = Some(latest.sha.clone());

    let Some(previous) = previous else {
        return Ok(report);
    };
    report.previous_sha = Some(previous.last_synced_sha.clone());

    let same_config = previous.config_digest.as_deref() == Some(source.fingerprint().as_str());
    if previous.last_synced_sha == latest.sha && same_config {
        report.status = DryRunStatus::Unchanged;
        return Ok(report);
    }

    report.status = DryRunStatus::Changed;
    if deep {
        let root = path::normalize(&source.path);
        let under_root = |p: &str| path::relative_to_root(&root, p).is_some();

        report.changes = remote
            .compare_commits(&location, &previous.last_synced_sha, &latest.sha)
            .await?
            .into_iter()
            .filter(|change| {
                under_root(&change.path) || change.previous_path.as_deref().is_some_and(under_root)
            })
            .collect();
    }

    Ok(report)
}

/// Check every configured source. A failing check is reported, never raised.
pub async fn dry_run(
    remote: &dyn RemoteRepository,
    metadata: &dyn MetadataStore,
    sources: &[SourceConfig],
    deep: bool,
) -> Vec<DryRunReport> {
    let mut reports = Vec::with_capacity(sources.len());

    for source in sources {
        if !source.enabled {
            reports.push(DryRunReport::new(source, DryRunStatus::Disabled));
            continue;
        }

        let report = match check_source(remote, metadata, source, deep).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(source = %source.label(), error = %e, "dry run failed");
                DryRunReport::new(source, DryRunStatus::Failed(e.to_string()))
            }
        };
        reports.push(report);
    }

    reports
}

#[cfg(test)]
mod tests {
    use crate::entry::SyncWatermark;
    use crate::remote::ChangeKind;
    use crate::test_support::{InMemoryMetadataStore, InMemoryRemote};

    use super::*;

    fn source() -> SourceConfig {
        SourceConfig::new("acme", "handbook", "docs/features", "content/features")
    }

    fn watermark(metadata: &InMemoryMetadataStore, source: &SourceConfig, sha: &str) {
        metadata
            .put_watermark(
                &source.key(),
                &SyncWatermark {
                    last_synced_sha: sha.into(),
                    synced_at: "1727776800".into(),
                    config_digest: Some(source.fingerprint()),
                },
            )
            .unwrap();
    }

    fn changed(path: &str, change: ChangeKind) -> ChangedFile {
        ChangedFile {
            path: path.into(),
            change,
            previous_path: None,
        }
    }

    #[tokio::test]
    async fn reports_never_synced_without_watermark() {
        let remote = InMemoryRemote::new();
        remote.set_commit("abc");
        let metadata = InMemoryMetadataStore::new();

        let report = check_source(&remote, &metadata, &source(), false).await.unwrap();

        assert_eq!(report.status, DryRunStatus::NeverSynced);
        assert_eq!(report.sha.as_deref(), Some("abc"));
        assert_eq!(report.previous_sha, None);
    }

    #[tokio::test]
    async fn equal_watermark_is_unchanged() {
        let remote = InMemoryRemote::new();
        remote.set_commit("abc");
        let metadata = InMemoryMetadataStore::new();
        watermark(&metadata, &source(), "abc");

        let report = check_source(&remote, &metadata, &source(), true).await.unwrap();

        assert_eq!(report.status, DryRunStatus::Unchanged);
        assert!(report.changes.is_empty());
    }

    #[tokio::test]
    async fn changed_configuration_is_reported_as_changed() {
        let remote = InMemoryRemote::new();
        remote.set_commit("abc");
        let metadata = InMemoryMetadataStore::new();
        watermark(&metadata, &source(), "abc");

        let mut moved = source();
        moved.base_path = "content/moved".into();
        let report = check_source(&remote, &metadata, &moved, false).await.unwrap();

        assert_eq!(report.status, DryRunStatus::Changed);
        assert_eq!(report.previous_sha.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn deep_check_filters_changes_to_root() {
        let remote = InMemoryRemote::new();
        remote.set_commit("def");
        remote.set_changes(vec![
            changed("docs/features/tasks.md", ChangeKind::Modified),
            changed("docs/other/readme.md", ChangeKind::Added),
            ChangedFile {
                path: "archive/accounts.md".into(),
                change: ChangeKind::Renamed,
                previous_path: Some("docs/features/accounts.md".into()),
            },
        ]);
        let metadata = InMemoryMetadataStore::new();
        watermark(&metadata, &source(), "abc");

        let shallow = check_source(&remote, &metadata, &source(), false).await.unwrap();
        assert_eq!(shallow.status, DryRunStatus::Changed);
        assert!(shallow.changes.is_empty());

        let deep = check_source(&remote, &metadata, &source(), true).await.unwrap();
        assert_eq!(deep.previous_sha.as_deref(), Some("abc"));
        let paths: Vec<&str> = deep.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/features/tasks.md", "archive/accounts.md"]);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_source() {
        let remote = InMemoryRemote::new();
        let metadata = InMemoryMetadataStore::new();
        let sources = vec![source(), source().with_name("off").disabled()];

        let reports = dry_run(&remote, &metadata, &sources, false).await;

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].status, DryRunStatus::Failed(_)));
        assert_eq!(reports[1].status, DryRunStatus::Disabled);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let remote = InMemoryRemote::new();
        remote.set_commit("def");
        let metadata = InMemoryMetadataStore::new();
        watermark(&metadata, &source(), "abc");

        dry_run(&remote, &metadata, &[source()], true).await;

        assert_eq!(
            metadata.watermark(&source().key()).unwrap().unwrap().last_synced_sha,
            "abc"
        );
        assert_eq!(metadata.record_count(), 0);
        assert_eq!(remote.fetch_count(), 0);
    }
}
