//! Flight report files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::macros::format_description;
use tokio::fs;
use tracing::debug;

use fence_core::engine::TerminalOutcome;
use fence_proto::report::FlightReport;

pub fn check_report_dir(dir: &str) -> Result<()> {
    let p = Path::new(dir);
    if p.exists() {
        anyhow::ensure!(p.is_dir(), "report.dir is not a dir: {}", dir);
    }
    Ok(())
}

/// Writes `fly-{case}-{timestamp}.json` under the report directory and
/// returns the path.
pub async fn write_report(dir: &str, case_name: &str, outcome: &TerminalOutcome) -> Result<PathBuf> {
    let report = FlightReport::new(
        case_name,
        outcome.final_battery_pct(),
        outcome.traveled_distance_m(),
        outcome.crashed(),
    );

    let stamp = time::OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day]_[hour][minute][second]"))
        .context("format report timestamp")?;
    let path = Path::new(dir).join(format!("fly-{}-{}.json", case_name, stamp));

    fs::create_dir_all(dir).await?;
    let body = serde_json::to_vec_pretty(&report)?;
    fs::write(&path, body)
        .await
        .with_context(|| format!("write report {}", path.display()))?;
    debug!("report written to {}", path.display());
    Ok(path)
}
