use metrics::histogram;
use tokio::time::Instant;
use tracing::info;

use crate::concurrency::shutdown::shutdown_signalled;
use crate::concurrency::task::{StreamExit, StreamPhase};
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::metrics::{CATCHUP_PHASE, ETL_COPY_PHASE_DURATION_SECONDS, PHASE};
use crate::replication::CopyContext;
use crate::replication::stream::start_log_stream;
use crate::source::{LogStreamRequest, LogStreamer};

/// Outcome of a catch-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchupResult {
    /// The lag dropped to the configured maximum and the log stream was stopped.
    CaughtUp,
    /// The copy was shut down before the lag was low enough.
    Stopped,
}

enum CatchupEvent {
    Shutdown,
    StreamExited(EtlResult<StreamExit>),
    Tick,
}

/// Applies the change log from the tracked position until the replication lag is at most the
/// configured maximum.
///
/// The log is applied by a background stream while this function polls the lag estimate every
/// catch-up interval. Whichever way catch-up ends, the background stream has terminated when
/// this function returns. A log stream that ends on its own is reported as an
/// [`ErrorKind::LogStreamEnded`] error.
pub async fn catchup<L, S, C, D>(ctx: &CopyContext<L, S, C, D>) -> EtlResult<CatchupResult>
where
    L: LogStreamer,
    D: Destination + Clone + Send + Sync + 'static,
{
    let started = Instant::now();

    let result = run_catchup(ctx).await;

    ctx.tracker.set_active_stream(None).await;
    histogram!(ETL_COPY_PHASE_DURATION_SECONDS, PHASE => CATCHUP_PHASE)
        .record(started.elapsed().as_secs_f64());

    result
}

async fn run_catchup<L, S, C, D>(ctx: &CopyContext<L, S, C, D>) -> EtlResult<CatchupResult>
where
    L: LogStreamer,
    D: Destination + Clone + Send + Sync + 'static,
{
    ctx.lag.reset();
    // A stop position can be left over from a previous fast-forward.
    ctx.tracker.set_stop_position(None).await;

    let start = ctx.tracker.position().await;
    info!(%start, "starting catch-up");

    let request = LogStreamRequest {
        start,
        stop: None,
        tables: ctx.table_names(),
    };
    let mut task = start_log_stream(
        StreamPhase::Catchup,
        &ctx.log_streamer,
        request,
        ctx.apply_handler(),
        ctx.shutdown_rx.clone(),
    )
    .await?;
    ctx.tracker.set_active_stream(Some(task.phase())).await;

    let period = ctx.config.catchup_retry_interval();
    let max_lag = ctx.config.max_replication_lag();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    let mut shutdown_rx = ctx.shutdown_rx.clone();

    loop {
        if ctx.lag.is_within(max_lag) {
            info!(
                lag = ctx.lag.seconds(),
                max_lag = max_lag.as_secs(),
                "replication lag is low enough, stopping catch-up"
            );

            task.cancel_and_join().await?;

            return Ok(CatchupResult::CaughtUp);
        }

        let event = tokio::select! {
            biased;

            _ = shutdown_signalled(&mut shutdown_rx) => CatchupEvent::Shutdown,
            result = task.wait() => CatchupEvent::StreamExited(result),
            _ = ticker.tick() => CatchupEvent::Tick,
        };

        match event {
            CatchupEvent::Shutdown => {
                info!("shutting down catch-up, waiting for the log stream to stop");
                task.join().await?;

                return Ok(CatchupResult::Stopped);
            }
            CatchupEvent::StreamExited(result) => {
                return match result? {
                    StreamExit::Cancelled => Ok(CatchupResult::Stopped),
                    StreamExit::Drained | StreamExit::StopReached => Err(etl_error!(
                        ErrorKind::LogStreamEnded,
                        "Log stream ended during catch-up",
                        format!(
                            "the catch-up log stream ended at {} before the lag was low enough",
                            ctx.tracker.position().await
                        )
                    )),
                };
            }
            CatchupEvent::Tick => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::etl_error;
    use crate::source::memory::{MemoryLog, MemorySnapshotSource};
    use crate::test_utils::context::test_context;
    use crate::test_utils::event::row_update;
    use crate::test_utils::source::ScriptedLog;
    use crate::types::{LogEntry, LogPosition};

    async fn stale_log(heartbeat: Option<Duration>) -> MemoryLog {
        let log = match heartbeat {
            Some(interval) => MemoryLog::new().with_heartbeat(interval),
            None => MemoryLog::new(),
        };
        let an_hour_ago = Utc::now() - TimeDelta::hours(1);
        for id in 1..=3 {
            log.append_with_timestamp(an_hour_ago, vec![row_update("items", id)])
                .await;
        }

        log
    }

    #[tokio::test]
    async fn catches_up_once_lag_is_low_and_stops_the_stream() {
        let log = stale_log(Some(Duration::from_millis(20))).await;
        let source = MemorySnapshotSource::new(log.clone());
        let (ctx, _shutdown_tx) = test_context(log.clone(), source, &["orders"], LogPosition::new(1));

        let result = catchup(&ctx).await.unwrap();

        assert_eq!(result, CatchupResult::CaughtUp);
        assert_eq!(ctx.tracker.position().await, LogPosition::new(3));
        assert_eq!(ctx.tracker.active_stream().await, None);
        assert_eq!(ctx.destination.writes().await.len(), 2);

        // The stream is gone, new entries are not applied anymore.
        log.append(vec![row_update("items", 4)]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ctx.tracker.position().await, LogPosition::new(3));
        assert_eq!(ctx.destination.writes().await.len(), 2);
    }

    #[tokio::test]
    async fn propagates_log_stream_errors() {
        let log = ScriptedLog::new(vec![Err(etl_error!(
            ErrorKind::LogStreamFailed,
            "Log stream broke"
        ))]);
        let source = MemorySnapshotSource::new(MemoryLog::new());
        let (ctx, _shutdown_tx) = test_context(log, source, &["orders"], LogPosition::new(1));

        let err = catchup(&ctx).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LogStreamFailed);
        assert_eq!(ctx.tracker.active_stream().await, None);
    }

    #[tokio::test]
    async fn drained_stream_is_an_error() {
        let log = ScriptedLog::new(vec![Ok(LogEntry::transaction(
            LogPosition::new(2),
            Utc::now() - TimeDelta::hours(1),
            vec![row_update("items", 1)],
        ))]);
        let source = MemorySnapshotSource::new(MemoryLog::new());
        let (ctx, _shutdown_tx) = test_context(log, source, &["orders"], LogPosition::new(1));

        let err = catchup(&ctx).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LogStreamEnded);
        assert_eq!(ctx.tracker.position().await, LogPosition::new(2));
    }

    #[tokio::test]
    async fn shutdown_stops_catch_up_after_joining_the_stream() {
        let log = stale_log(None).await;
        let source = MemorySnapshotSource::new(log.clone());
        let (ctx, shutdown_tx) = test_context(log.clone(), source, &["orders"], LogPosition::new(1));

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_tx.shutdown().unwrap();
        };
        let (result, _) = tokio::join!(catchup(&ctx), shutdown);

        assert_eq!(result.unwrap(), CatchupResult::Stopped);
        assert_eq!(ctx.tracker.active_stream().await, None);

        log.append(vec![row_update("items", 4)]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ctx.tracker.position().await, LogPosition::new(3));
    }
}
