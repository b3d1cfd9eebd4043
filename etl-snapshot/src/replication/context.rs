use std::collections::BTreeMap;
use std::sync::Arc;

use etl_config::shared::CopyConfig;

use crate::concurrency::lag::LagEstimate;
use crate::concurrency::shutdown::ShutdownRx;
use crate::destination::Destination;
use crate::replication::apply::ApplyHandler;
use crate::state::table::TableCopyRule;
use crate::state::tracker::CopyTracker;
use crate::types::ShardOrigin;

/// Everything a copy needs, shared by the orchestrator, the copier and the log streams.
#[derive(Clone)]
pub struct CopyContext<L, S, C, D> {
    pub config: Arc<CopyConfig>,
    pub rules: Arc<BTreeMap<String, TableCopyRule>>,
    pub origin: ShardOrigin,
    pub log_streamer: L,
    pub snapshot_source: S,
    pub store: C,
    pub destination: D,
    pub tracker: CopyTracker,
    pub lag: LagEstimate,
    pub shutdown_rx: ShutdownRx,
}

impl<L, S, C, D> CopyContext<L, S, C, D>
where
    D: Destination + Clone,
{
    /// Returns an [`ApplyHandler`] applying streamed entries to this copy's destination.
    pub fn apply_handler(&self) -> ApplyHandler<D> {
        ApplyHandler::new(
            self.destination.clone(),
            self.tracker.clone(),
            self.lag.clone(),
        )
    }

    /// Returns the names of every table in the copy plan, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }
}
