use metrics::histogram;
use tokio::time::Instant;
use tracing::info;

use crate::concurrency::task::{StreamExit, StreamPhase};
use crate::destination::Destination;
use crate::error::EtlResult;
use crate::metrics::{ETL_COPY_PHASE_DURATION_SECONDS, FAST_FORWARD_PHASE, PHASE};
use crate::replication::CopyContext;
use crate::replication::stream::start_log_stream;
use crate::source::{LogStreamRequest, LogStreamer};
use crate::types::LogPosition;

/// Applies the change log from the tracked position up to `stop_position` and waits for the
/// stream to terminate.
///
/// The position the tracker lands on is not checked here, callers compare it with
/// `stop_position` themselves.
pub async fn fast_forward<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    stop_position: LogPosition,
) -> EtlResult<StreamExit>
where
    L: LogStreamer,
    D: Destination + Clone + Send + Sync + 'static,
{
    let started = Instant::now();

    let result = run_fast_forward(ctx, stop_position).await;

    ctx.tracker.set_stop_position(None).await;
    ctx.tracker.set_active_stream(None).await;
    histogram!(ETL_COPY_PHASE_DURATION_SECONDS, PHASE => FAST_FORWARD_PHASE)
        .record(started.elapsed().as_secs_f64());

    result
}

async fn run_fast_forward<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    stop_position: LogPosition,
) -> EtlResult<StreamExit>
where
    L: LogStreamer,
    D: Destination + Clone + Send + Sync + 'static,
{
    ctx.tracker.set_stop_position(Some(stop_position)).await;

    let start = ctx.tracker.position().await;
    info!(%start, stop = %stop_position, "starting fast-forward");

    let request = LogStreamRequest {
        start,
        stop: Some(stop_position),
        tables: ctx.table_names(),
    };
    let task = start_log_stream(
        StreamPhase::FastForward,
        &ctx.log_streamer,
        request,
        ctx.apply_handler(),
        ctx.shutdown_rx.clone(),
    )
    .await?;
    ctx.tracker.set_active_stream(Some(task.phase())).await;

    let exit = task.join().await?;
    let position = ctx.tracker.position().await;
    info!(?exit, %position, "fast-forward finished");

    Ok(exit)
}
