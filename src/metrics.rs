//! Pipeline metrics
//!
//! Counters and histograms for each stage of a run, recorded through the `metrics`
//! facade. Nothing is exported unless a recorder is installed; the CLI installs a
//! Prometheus recorder when asked to print metrics.

use std::time::Instant;

use crate::pipeline::Stage;

pub const RUNS_TOTAL: &str = "table_scraper_runs_total";
pub const RUN_FAILURES_TOTAL: &str = "table_scraper_run_failures_total";
pub const STAGE_DURATION_SECONDS: &str = "table_scraper_stage_duration_seconds";
pub const ROWS_EXTRACTED: &str = "table_scraper_rows_extracted";
pub const RECORDS_WRITTEN: &str = "table_scraper_records_written";
pub const OUTPUT_BYTES: &str = "table_scraper_output_bytes";

/// Records the elapsed time into the stage-duration histogram when dropped.
pub struct TimingGuard {
    start: Instant,
    stage: Stage,
}

impl TimingGuard {
    pub fn new(stage: Stage) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(STAGE_DURATION_SECONDS, "stage" => self.stage.as_str())
            .record(duration);
    }
}

pub fn time_stage(stage: Stage) -> TimingGuard {
    TimingGuard::new(stage)
}

pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_extracted(rows: usize) {
        ::metrics::histogram!(ROWS_EXTRACTED).record(rows as f64);
    }

    pub fn record_success(records: usize, bytes: usize) {
        ::metrics::counter!(RUNS_TOTAL).increment(1);
        ::metrics::counter!(RECORDS_WRITTEN).increment(records as u64);
        ::metrics::histogram!(OUTPUT_BYTES).record(bytes as f64);
    }

    pub fn record_failure(stage: Stage, error_kind: &'static str) {
        ::metrics::counter!(RUNS_TOTAL).increment(1);
        ::metrics::counter!(
            RUN_FAILURES_TOTAL,
            "stage" => stage.as_str(),
            "error" => error_kind
        )
        .increment(1);
    }
}
