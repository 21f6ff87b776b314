pub mod core;
pub mod errors;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod tasks;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use anyhow::Context;
use tracing::Instrument;

use crate::core::{config::Settings, telemetry};
use crate::repositories::InMemoryExams;
use crate::tasks::{repair_results, RepairOptions, RepairReport};

/// Command-line overrides for [`run_repair`].
#[derive(Debug, Default)]
pub struct RepairArgs {
    pub results_path: Option<PathBuf>,
    pub exams_path: Option<PathBuf>,
    pub dry_run: bool,
}

/// Maintenance entry point: re-grades the stored result set against the
/// current exam definitions and writes corrections back.
pub async fn run_repair(args: RepairArgs) -> anyhow::Result<RepairReport> {
    dotenvy::dotenv().ok();

    let settings =
        Settings::load()?.with_repair_overrides(args.results_path, args.exams_path, args.dry_run);
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let repair = settings.repair();
    tracing::info!(
        results = %repair.results_path.display(),
        exams = %repair.exams_path.display(),
        dry_run = repair.dry_run,
        environment = settings.runtime().environment.as_str(),
        "Starting result repair"
    );

    let exams = repositories::load_exams(&repair.exams_path)
        .await
        .context("Failed to load exam definitions")?;
    let catalog = InMemoryExams::new(exams);
    let mut results = repositories::load_results(&repair.results_path)
        .await
        .context("Failed to load stored results")?;

    let span = tracing::info_span!("result_repair", records = results.len(), dry_run = repair.dry_run);
    let report = repair_results(&mut results, &catalog, RepairOptions { dry_run: repair.dry_run })
        .instrument(span)
        .await;

    if !repair.dry_run && report.fixed > 0 {
        repositories::save_results(&repair.results_path, &results)
            .await
            .context("Failed to write repaired results")?;
        tracing::info!(fixed = report.fixed, "Repaired results written");
    }

    Ok(report)
}
