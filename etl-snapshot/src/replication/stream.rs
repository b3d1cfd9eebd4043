use futures::StreamExt;
use tracing::{debug, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::concurrency::task::{StreamExit, StreamPhase, StreamTask};
use crate::destination::Destination;
use crate::error::EtlResult;
use crate::replication::apply::{ApplyHandler, ApplyOutcome};
use crate::source::{LogStreamRequest, LogStreamer};

/// Opens a change log stream and spawns a [`StreamTask`] applying its entries through `handler`.
///
/// The task ends when its scope is cancelled, when the stream ends, when the stop position is
/// reached or on the first error. An error opening the stream is returned directly and no task
/// is spawned.
pub async fn start_log_stream<L, D>(
    phase: StreamPhase,
    log_streamer: &L,
    request: LogStreamRequest,
    handler: ApplyHandler<D>,
    shutdown_rx: ShutdownRx,
) -> EtlResult<StreamTask>
where
    L: LogStreamer,
    D: Destination + Send + Sync + 'static,
{
    info!(
        %phase,
        start = %request.start,
        stop = ?request.stop.map(|stop| stop.to_string()),
        "starting log stream"
    );

    let mut stream = log_streamer.stream_log(request).await?;

    let task = StreamTask::spawn(phase, shutdown_rx, move |mut scope| async move {
        loop {
            tokio::select! {
                biased;

                _ = scope.cancelled() => {
                    info!("log stream cancelled");

                    return Ok(StreamExit::Cancelled);
                }

                entry = stream.next() => {
                    let Some(entry) = entry else {
                        info!("log stream ended");

                        return Ok(StreamExit::Drained);
                    };

                    let entry = entry?;
                    debug!(position = %entry.position, events = entry.events.len(), "applying log entry");

                    if handler.apply_entry(entry).await? == ApplyOutcome::StopReached {
                        info!("log stream reached its stop position");

                        return Ok(StreamExit::StopReached);
                    }
                }
            }
        }
    });

    Ok(task)
}
