use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

/// Prometheus exposition text, if the recorder was installed.
pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("exam_attempts_started_total", "Exam sessions that entered InProgress");
    metrics::describe_counter!(
        "exam_attempts_submitted_total",
        "Exam attempts terminated with a result, labelled by submit reason"
    );
    metrics::describe_counter!("exam_attempts_abandoned_total", "Exam attempts discarded without a result");
    metrics::describe_counter!("scoring_runs_total", "Scoring passes over a frozen answer set");
    metrics::describe_counter!("results_repair_processed_total", "Stored results visited by the repair pass");
    metrics::describe_counter!("results_repaired_total", "Stored results whose score fields were corrected");
    metrics::describe_counter!(
        "results_repair_skipped_total",
        "Stored results the repair pass could not read or grade"
    );
}
