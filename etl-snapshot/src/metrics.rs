use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const ETL_COPY_ERRORS_TOTAL: &str = "etl_copy_errors_total";
pub const ETL_COPY_PHASE_DURATION_SECONDS: &str = "etl_copy_phase_duration_seconds";
pub const ETL_ROWS_COPIED_TOTAL: &str = "etl_rows_copied_total";
pub const ETL_TABLES_PENDING: &str = "etl_tables_pending";
pub const ETL_REPLICATION_LAG_SECONDS: &str = "etl_replication_lag_seconds";

pub const CATEGORY: &str = "category";
pub const PHASE: &str = "phase";
pub const TABLE: &str = "table";

pub const COPY_ERROR: &str = "Copy";
pub const CATCHUP_ERROR: &str = "Catchup";
pub const STREAM_ROWS_ERROR: &str = "StreamRows";

pub const CATCHUP_PHASE: &str = "catchup";
pub const FAST_FORWARD_PHASE: &str = "fastforward";
pub const COPY_PHASE: &str = "copy";

/// Register metrics emitted by the copy. This should be called before starting a copy worker.
/// It is safe to call this method multiple times, the metrics are only registered once.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            ETL_COPY_ERRORS_TOTAL,
            Unit::Count,
            "Total number of errors that aborted a copy, by category"
        );

        describe_histogram!(
            ETL_COPY_PHASE_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken in seconds by a catch-up, fast-forward or table copy"
        );

        describe_counter!(
            ETL_ROWS_COPIED_TOTAL,
            Unit::Count,
            "Total number of snapshot rows emitted to the destination"
        );

        describe_gauge!(
            ETL_TABLES_PENDING,
            Unit::Count,
            "Number of tables left to copy"
        );

        describe_gauge!(
            ETL_REPLICATION_LAG_SECONDS,
            Unit::Seconds,
            "Estimated lag of the applied change log behind real time"
        );
    });
}
