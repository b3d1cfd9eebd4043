use metrics::{counter, gauge};
use tracing::{error, info};

use crate::destination::Destination;
use crate::error::EtlResult;
use crate::metrics::{
    CATCHUP_ERROR, CATEGORY, COPY_ERROR, ETL_COPY_ERRORS_TOTAL, ETL_TABLES_PENDING,
};
use crate::replication::CopyContext;
use crate::replication::catchup::{CatchupResult, catchup};
use crate::replication::copy_table::{CopyTableResult, copy_table};
use crate::source::{LogStreamer, SnapshotSource};
use crate::store::checkpoint::CheckpointStore;

/// Outcome of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyResult {
    /// Every pending table was copied.
    Completed,
    /// The copy was shut down, pending tables are resumed by the next copy.
    Stopped,
}

/// Copies the pending tables one at a time, in queue order, until the queue is empty.
///
/// The first error aborts the copy without retrying. Tables completed before it stay complete.
pub async fn run_copy<L, S, C, D>(ctx: &CopyContext<L, S, C, D>) -> EtlResult<CopyResult>
where
    L: LogStreamer,
    S: SnapshotSource,
    C: CheckpointStore,
    D: Destination + Clone + Send + Sync + 'static,
{
    loop {
        let pending_tables = ctx.tracker.pending_tables().await;
        gauge!(ETL_TABLES_PENDING).set(pending_tables.len() as f64);

        let Some(table_name) = pending_tables.into_iter().next() else {
            info!("no tables left to copy");

            return Ok(CopyResult::Completed);
        };

        match catchup_and_copy(ctx, &table_name).await {
            Ok(CopyTableResult::Completed) => {}
            Ok(CopyTableResult::Stopped) => {
                info!(%table_name, "copy stopped");

                return Ok(CopyResult::Stopped);
            }
            Err(err) => {
                counter!(ETL_COPY_ERRORS_TOTAL, CATEGORY => COPY_ERROR).increment(1);
                error!(
                    %table_name,
                    error = %err,
                    protocol_violation = err.kind().is_protocol_violation(),
                    "copy failed"
                );

                return Err(err);
            }
        }
    }
}

/// Catches up on the change log when resuming, then copies `table_name` from a fresh snapshot.
pub async fn catchup_and_copy<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    table_name: &str,
) -> EtlResult<CopyTableResult>
where
    L: LogStreamer,
    S: SnapshotSource,
    C: CheckpointStore,
    D: Destination + Clone + Send + Sync + 'static,
{
    info!(table_name, "starting catch-up and copy");

    if !ctx.tracker.position().await.is_zero() {
        match catchup(ctx).await {
            Ok(CatchupResult::CaughtUp) => {}
            Ok(CatchupResult::Stopped) => return Ok(CopyTableResult::Stopped),
            Err(err) => {
                counter!(ETL_COPY_ERRORS_TOTAL, CATEGORY => CATCHUP_ERROR).increment(1);
                info!(table_name, error = %err, "catch-up failed");

                return Err(err);
            }
        }
    }

    // Field descriptors are re-derived from the first batch of the new snapshot.
    ctx.tracker.reset_fields(table_name).await;

    copy_table(ctx, table_name).await
}
