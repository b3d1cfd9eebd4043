use std::collections::BTreeMap;
use std::sync::Arc;

use etl_config::shared::CopyConfig;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info};

use crate::concurrency::lag::LagEstimate;
use crate::concurrency::shutdown::ShutdownRx;
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::metrics::register_metrics;
use crate::replication::CopyContext;
use crate::replication::copy::{CopyResult, run_copy};
use crate::source::{LogStreamer, SnapshotSource};
use crate::state::table::{TableCopyRule, TableCopyState, build_pending_queue};
use crate::state::tracker::CopyTracker;
use crate::store::checkpoint::CheckpointStore;
use crate::types::ShardOrigin;
use crate::workers::base::{Worker, WorkerHandle};

#[derive(Debug)]
pub struct CopyWorkerHandle {
    state: CopyTracker,
    handle: Option<JoinHandle<EtlResult<CopyResult>>>,
}

impl WorkerHandle<CopyTracker> for CopyWorkerHandle {
    type Output = CopyResult;

    fn state(&self) -> CopyTracker {
        self.state.clone()
    }

    async fn wait(mut self) -> EtlResult<CopyResult> {
        let Some(handle) = self.handle.take() else {
            return Ok(CopyResult::Completed);
        };

        handle.await.map_err(|err| {
            etl_error!(
                ErrorKind::CopyWorkerPanic,
                "Copy worker terminated abnormally",
                err
            )
        })?
    }
}

/// Worker copying the snapshot of every table in its copy plan and stitching it to the change
/// log.
///
/// The worker resumes from the checkpoints found in its store: complete tables are skipped and
/// the table in progress continues after its last checkpoint.
#[derive(Debug)]
pub struct CopyWorker<L, S, C, D> {
    config: Arc<CopyConfig>,
    rules: Vec<TableCopyRule>,
    log_streamer: L,
    snapshot_source: S,
    store: C,
    destination: D,
    shutdown_rx: ShutdownRx,
}

impl<L, S, C, D> CopyWorker<L, S, C, D> {
    pub fn new(
        config: Arc<CopyConfig>,
        rules: Vec<TableCopyRule>,
        log_streamer: L,
        snapshot_source: S,
        store: C,
        destination: D,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            rules,
            log_streamer,
            snapshot_source,
            store,
            destination,
            shutdown_rx,
        }
    }
}

impl<L, S, C, D> Worker<CopyWorkerHandle, CopyTracker> for CopyWorker<L, S, C, D>
where
    L: LogStreamer + Send + Sync + 'static,
    S: SnapshotSource + Send + Sync + 'static,
    C: CheckpointStore + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    async fn start(self) -> EtlResult<CopyWorkerHandle> {
        info!("starting copy worker");

        register_metrics();
        self.config.validate()?;

        let checkpoints = self.store.load_checkpoints().await?;
        let rules = self
            .rules
            .into_iter()
            .map(|rule| (rule.table_name.clone(), rule))
            .collect::<BTreeMap<_, _>>();

        let pending = build_pending_queue(&rules, &checkpoints.tables);
        let tables = checkpoints
            .tables
            .iter()
            .map(|(table_name, checkpoint)| {
                (
                    table_name.clone(),
                    TableCopyState::from_checkpoint(checkpoint),
                )
            })
            .collect();
        info!(
            position = %checkpoints.position,
            pending_tables = pending.len(),
            "loaded copy checkpoints"
        );

        let tracker = CopyTracker::new(checkpoints.position, tables, pending);
        let ctx = CopyContext {
            origin: ShardOrigin::new(&self.config.keyspace, &self.config.shard),
            config: self.config,
            rules: Arc::new(rules),
            log_streamer: self.log_streamer,
            snapshot_source: self.snapshot_source,
            store: self.store,
            destination: self.destination,
            tracker: tracker.clone(),
            lag: LagEstimate::new(),
            shutdown_rx: self.shutdown_rx,
        };

        let copy_worker_span = tracing::info_span!("copy_worker");
        let copy_worker = async move {
            let result = run_copy(&ctx).await;
            match &result {
                Ok(result) => info!(?result, "copy worker terminated"),
                Err(err) => error!(error = %err, "copy worker failed"),
            }

            result
        }
        .instrument(copy_worker_span);

        let handle = tokio::spawn(copy_worker);

        Ok(CopyWorkerHandle {
            state: tracker,
            handle: Some(handle),
        })
    }
}
