use anyhow::{Context, Result};
use doc_mirror::MetadataStore;
use doc_mirror_store::{MirrorStore, SyncStatus};

use crate::config::ResolvedSources;

/// Print each source's watermark and how fresh it is.
pub fn run(store: &MirrorStore, resolved: &ResolvedSources) -> Result<()> {
    for source in &resolved.sources {
        let key = source.key();
        let watermark = store
            .watermark(&key)
            .with_context(|| format!("failed to read watermark for {}", source.label()))?;
        let status = store.sync_status(&key)?;

        let state = match (&watermark, status) {
            (Some(w), SyncStatus::Fresh { days_old }) => {
                format!("{} ({days_old} days ago)", w.last_synced_sha)
            }
            (Some(w), SyncStatus::Stale { days_old }) => {
                format!("{} ({days_old} days ago, stale)", w.last_synced_sha)
            }
            _ => "never synced".to_owned(),
        };

        let enabled = if source.enabled { "" } else { " [disabled]" };
        println!("[{}] {key}: {state}{enabled}", source.label());
    }

    for invalid in &resolved.invalid {
        println!("[{}] invalid configuration: {}", invalid.label, invalid.error);
    }

    println!("{} entries stored", store.entry_count()?);
    Ok(())
}
