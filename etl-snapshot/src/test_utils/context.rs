use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use etl_config::shared::{BatchConfig, CopyConfig};

use crate::concurrency::lag::LagEstimate;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::destination::memory::MemoryDestination;
use crate::replication::CopyContext;
use crate::state::table::{PendingTableQueue, TableCopyRule, TableCopyState};
use crate::state::tracker::CopyTracker;
use crate::store::checkpoint::MemoryStore;
use crate::types::{LogPosition, ShardOrigin};

pub type TestCopyContext<L, S> = CopyContext<L, S, MemoryStore, MemoryDestination>;

pub fn test_config() -> CopyConfig {
    CopyConfig {
        keyspace: "commerce".to_string(),
        shard: "0".to_string(),
        catchup_retry_ms: 10,
        max_replication_lag_secs: 1,
        batch: BatchConfig::default(),
        emit_copy_markers: false,
    }
}

/// Table of every test copy plan that is already copied. Its changes pass through the apply path.
pub const COPIED_TABLE: &str = "items";

/// Builds a copy context over `pending` tables and the already copied [`COPIED_TABLE`], starting
/// at `position`, with in-memory checkpoints and destination.
pub fn test_context<L, S>(
    log_streamer: L,
    snapshot_source: S,
    pending: &[&str],
    position: LogPosition,
) -> (TestCopyContext<L, S>, ShutdownTx) {
    let config = test_config();
    let rules = pending
        .iter()
        .chain([&COPIED_TABLE])
        .map(|table_name| (table_name.to_string(), TableCopyRule::new(*table_name)))
        .collect::<BTreeMap<_, _>>();
    let queue = PendingTableQueue::from_sorted(pending.iter().map(ToString::to_string).collect())
        .expect("pending tables are sorted");
    let tables = HashMap::from([(
        COPIED_TABLE.to_string(),
        TableCopyState {
            complete: true,
            ..TableCopyState::default()
        },
    )]);
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let ctx = CopyContext {
        origin: ShardOrigin::new(&config.keyspace, &config.shard),
        config: Arc::new(config),
        rules: Arc::new(rules),
        log_streamer,
        snapshot_source,
        store: MemoryStore::new(),
        destination: MemoryDestination::new(),
        tracker: CopyTracker::new(position, tables, queue),
        lag: LagEstimate::new(),
        shutdown_rx,
    };

    (ctx, shutdown_tx)
}
