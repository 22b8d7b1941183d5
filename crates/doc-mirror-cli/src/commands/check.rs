use anyhow::Result;
use doc_mirror::{ChangeKind, DryRunReport, DryRunStatus, Engine};

use crate::config::{InvalidSource, ResolvedSources};

/// Print the dry-run status of every source. Never writes.
pub async fn run(engine: &Engine, resolved: &ResolvedSources, deep: bool) -> Result<()> {
    if resolved.is_empty() {
        anyhow::bail!("no sources configured");
    }

    let mut reports = engine.check(&resolved.sources, deep).await;
    reports.extend(resolved.invalid.iter().map(invalid_report));

    for report in reports {
        println!("{}", describe(&report));
        for change in &report.changes {
            let marker = match change.change {
                ChangeKind::Added => "A",
                ChangeKind::Modified => "M",
                ChangeKind::Removed => "D",
                ChangeKind::Renamed => "R",
            };
            match &change.previous_path {
                Some(previous) => println!("    {marker} {previous} -> {}", change.path),
                None => println!("    {marker} {}", change.path),
            }
        }
    }

    Ok(())
}

fn invalid_report(source: &InvalidSource) -> DryRunReport {
    DryRunReport {
        source: source.label.clone(),
        status: DryRunStatus::Failed(format!("invalid configuration: {}", source.error)),
        sha: None,
        previous_sha: None,
        changes: Vec::new(),
    }
}

pub fn describe(report: &DryRunReport) -> String {
    let mut line = format!("[{}] {}", report.source, report.status);
    match (&report.previous_sha, &report.sha) {
        (Some(previous), Some(sha)) if previous != sha => {
            line.push_str(&format!(" ({} -> {})", short(previous), short(sha)));
        }
        (_, Some(sha)) => line.push_str(&format!(" ({})", short(sha))),
        _ => {}
    }
    line
}

fn short(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
