use std::fmt;

use futures::Future;
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, error, info_span};

use crate::bail;
use crate::concurrency::shutdown::{
    ShutdownRx, ShutdownTx, create_shutdown_channel, shutdown_signalled,
};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// The purpose a background log stream was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Unbounded stream that runs until the lag is low enough.
    Catchup,
    /// Stream bounded by a stop position.
    FastForward,
}

impl StreamPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamPhase::Catchup => "catchup",
            StreamPhase::FastForward => "fastforward",
        }
    }
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a background log stream terminated without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// The stream's scope was cancelled.
    Cancelled,
    /// The log stream ended on its own.
    Drained,
    /// The stop position was reached.
    StopReached,
}

/// Cancellation scope handed to a [`StreamTask`].
///
/// The scope is cancelled either by its own task handle or by the parent shutdown signal.
#[derive(Debug)]
pub struct CancelScope {
    own_rx: ShutdownRx,
    parent_rx: ShutdownRx,
}

impl CancelScope {
    /// Resolves once the scope is cancelled.
    pub async fn cancelled(&mut self) {
        tokio::select! {
            _ = shutdown_signalled(&mut self.own_rx) => {}
            _ = shutdown_signalled(&mut self.parent_rx) => {}
        }
    }
}

/// Handle to a spawned log stream task.
///
/// A [`StreamTask`] must be joined before it goes out of scope. Dropping it while the task is
/// still running aborts the task and logs an error.
#[derive(Debug)]
pub struct StreamTask {
    phase: StreamPhase,
    cancel_tx: ShutdownTx,
    handle: Option<JoinHandle<EtlResult<StreamExit>>>,
}

impl StreamTask {
    /// Spawns the future built by `build` under a new [`CancelScope`] that is a child of
    /// `parent_rx`.
    pub fn spawn<F, Fut>(phase: StreamPhase, parent_rx: ShutdownRx, build: F) -> StreamTask
    where
        F: FnOnce(CancelScope) -> Fut,
        Fut: Future<Output = EtlResult<StreamExit>> + Send + 'static,
    {
        let (cancel_tx, own_rx) = create_shutdown_channel();
        let scope = CancelScope { own_rx, parent_rx };

        let span = info_span!("log_stream", phase = %phase);
        let handle = tokio::spawn(build(scope).instrument(span));

        StreamTask {
            phase,
            cancel_tx,
            handle: Some(handle),
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Cancels the task's scope. The task is not guaranteed to be stopped until it is joined.
    pub fn cancel(&self) {
        // The receiver lives as long as the task, a send error means the task already stopped.
        let _ = self.cancel_tx.shutdown();
    }

    /// Waits for the task to terminate.
    ///
    /// This method is cancel safe and can be used as a branch of `tokio::select!`.
    pub async fn wait(&mut self) -> EtlResult<StreamExit> {
        let Some(handle) = self.handle.as_mut() else {
            bail!(
                ErrorKind::InvalidState,
                "Log stream task was already joined",
                format!("the {} stream task was already joined", self.phase)
            );
        };

        let result = handle.await;
        self.handle = None;

        self.map_join_result(result)
    }

    /// Waits for the task to terminate, consuming the handle.
    pub async fn join(mut self) -> EtlResult<StreamExit> {
        self.wait().await
    }

    /// Cancels the task's scope and waits for the task to terminate.
    pub async fn cancel_and_join(self) -> EtlResult<StreamExit> {
        self.cancel();
        self.join().await
    }

    fn map_join_result(
        &self,
        result: Result<EtlResult<StreamExit>, JoinError>,
    ) -> EtlResult<StreamExit> {
        result.map_err(|err| -> EtlError {
            etl_error!(
                ErrorKind::StreamTaskPanic,
                "Log stream task terminated abnormally",
                format!("the {} stream task failed: {err}", self.phase)
            )
        })?
    }
}

impl Drop for StreamTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take()
            && !handle.is_finished()
        {
            error!(phase = %self.phase, "log stream task dropped without being joined, aborting it");
            handle.abort();
        }
    }
}
