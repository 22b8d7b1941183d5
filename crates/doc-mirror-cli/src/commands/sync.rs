use anyhow::Result;
use doc_mirror::{Engine, ImportOptions, RunReport, SourceOutcome, SyncError};
use tokio_util::sync::CancellationToken;

use crate::config::{InvalidSource, ResolvedSources};

/// Run the import and print one line per source. Per-source failures,
/// including sources whose configuration did not resolve, are reported,
/// not returned.
pub async fn run(
    engine: &Engine,
    resolved: &ResolvedSources,
    options: &ImportOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    if resolved.is_empty() {
        anyhow::bail!("no sources configured");
    }

    let report = if resolved.sources.is_empty() {
        RunReport::default()
    } else {
        match engine.run(&resolved.sources, options, cancel).await {
            Ok(report) => report,
            Err(SyncError::Cancelled) => anyhow::bail!("sync cancelled"),
            Err(e) => return Err(e.into()),
        }
    };
    let report = with_invalid(report, &resolved.invalid);

    for outcome in &report.sources {
        println!("{}", describe(outcome));
        if let SourceOutcome::Imported(imported) = outcome {
            for (path, error) in &imported.failures {
                println!("    failed {path}: {error}");
            }
        }
    }

    let failed = report.failed();
    if failed > 0 {
        println!("{failed} of {} sources failed", report.sources.len());
    }

    Ok(())
}

/// Append a failed outcome for every source that never reached the engine.
fn with_invalid(mut report: RunReport, invalid: &[InvalidSource]) -> RunReport {
    report
        .sources
        .extend(invalid.iter().map(|source| SourceOutcome::Failed {
            source: source.label.clone(),
            error: format!("invalid configuration: {}", source.error),
        }));
    report
}

pub fn describe(outcome: &SourceOutcome) -> String {
    match outcome {
        SourceOutcome::Imported(r) => {
            let mut line = format!(
                "[{}] {} fetched, {} unchanged, {} stored, {} skipped, {} assets",
                r.source, r.fetched, r.unchanged, r.stored, r.skipped, r.assets
            );
            if r.removed > 0 {
                line.push_str(&format!(", {} removed", r.removed));
            }
            if !r.failures.is_empty() {
                line.push_str(&format!(", {} failed", r.failures.len()));
            }
            line
        }
        SourceOutcome::Skipped { source } => format!("[{source}] disabled"),
        SourceOutcome::Unchanged { source, sha } => format!("[{source}] unchanged at {sha}"),
        SourceOutcome::Failed { source, error } => format!("[{source}] failed: {error}"),
    }
}
