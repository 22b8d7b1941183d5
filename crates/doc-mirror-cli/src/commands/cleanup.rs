use anyhow::Result;
use doc_mirror::{Engine, SyncError};
use tokio_util::sync::CancellationToken;

use crate::config::ResolvedSources;

/// Remove entries that vanished upstream, source by source. Sources whose
/// configuration did not resolve are reported and left untouched.
pub async fn run(
    engine: &Engine,
    resolved: &ResolvedSources,
    cancel: &CancellationToken,
) -> Result<()> {
    if resolved.is_empty() {
        anyhow::bail!("no sources configured");
    }

    let results = match engine.cleanup(&resolved.sources, cancel).await {
        Ok(results) => results,
        Err(SyncError::Cancelled) => anyhow::bail!("cleanup cancelled"),
        Err(e) => return Err(e.into()),
    };

    for result in results {
        match result {
            Ok(report) => {
                println!("[{}] removed {} entries", report.source, report.removed.len());
                for id in &report.removed {
                    println!("    {id}");
                }
            }
            Err(e) => println!("cleanup failed: {e}"),
        }
    }

    for invalid in &resolved.invalid {
        println!("[{}] failed: invalid configuration: {}", invalid.label, invalid.error);
    }

    Ok(())
}
