//! Per-run JSON reports under `reports/<run_id>/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::SyncReport;

pub const REPORT_FILE_NAME: &str = "sync_report.json";

pub async fn write_run_report(reports_dir: &Path, report: &SyncReport) -> Result<PathBuf> {
    let run_dir = reports_dir.join(report.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let path = run_dir.join(REPORT_FILE_NAME);
    let bytes = serde_json::to_vec_pretty(report).context("serializing sync report")?;
    fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// One-line human summary, as printed by the CLI.
pub fn summary_line(report: &SyncReport) -> String {
    let result = &report.result;
    let mode = if result.dry_run { "dry-run" } else { "sync" };
    format!(
        "{mode} {partition}: read={read} created={created} updated={updated} unchanged={unchanged} errors={errors}",
        partition = report.partition_id,
        read = result.total_rows_read,
        created = result.created,
        updated = result.updated,
        unchanged = result.unchanged,
        errors = result.errors.len(),
    )
}
