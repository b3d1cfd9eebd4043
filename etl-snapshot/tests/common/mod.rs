//! Shared helpers for the copy worker integration tests.
//!
//! Provides in-memory tables, copy configurations, destinations that fail on demand and helpers
//! to inspect the events a copy emitted.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use etl_config::shared::{BatchConfig, CopyConfig};
use etl_snapshot::concurrency::shutdown::ShutdownRx;
use etl_snapshot::destination::Destination;
use etl_snapshot::destination::memory::MemoryDestination;
use etl_snapshot::error::{ErrorKind, EtlError, EtlResult};
use etl_snapshot::source::memory::{MemoryLog, MemorySnapshotSource};
use etl_snapshot::source::{LogStreamer, RowStreamRequest, SnapshotSource, SnapshotStream};
use etl_snapshot::state::table::TableCopyRule;
use etl_snapshot::store::checkpoint::CheckpointStore;
use etl_snapshot::types::{
    Cell, ChangeEvent, ColumnType, Field, RowChange, RowEvent, ShardOrigin, TableRow,
};
use etl_snapshot::workers::base::Worker;
use etl_snapshot::workers::copy::{CopyWorker, CopyWorkerHandle};

pub const ORDERS: &str = "orders";
pub const USERS: &str = "users";

pub const ORDERS_COUNT: i64 = 2500;
pub const USERS_COUNT: i64 = 3;

/// Heartbeat interval of test logs, short enough for catch-ups to finish quickly.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(20);

pub fn copy_config(max_rows: usize) -> Arc<CopyConfig> {
    Arc::new(CopyConfig {
        keyspace: "commerce".to_string(),
        shard: "0".to_string(),
        catchup_retry_ms: 10,
        max_replication_lag_secs: 1,
        batch: BatchConfig {
            max_rows,
            ..BatchConfig::default()
        },
        emit_copy_markers: false,
    })
}

pub fn copy_rules() -> Vec<TableCopyRule> {
    vec![TableCopyRule::new(USERS), TableCopyRule::new(ORDERS)]
}

pub fn heartbeat_log() -> MemoryLog {
    MemoryLog::new().with_heartbeat(HEARTBEAT_INTERVAL)
}

pub fn order_row(id: i64) -> TableRow {
    TableRow::new(vec![Cell::I64(id), Cell::String(format!("order {id}"))])
}

pub fn user_row(id: i64) -> TableRow {
    TableRow::new(vec![Cell::I64(id), Cell::String(format!("user {id}"))])
}

/// Creates a snapshot source reading at the head of `log` with an `orders` and a `users` table.
///
/// Rows are inserted in reverse key order, the source sorts them.
pub async fn orders_and_users(log: &MemoryLog) -> MemorySnapshotSource {
    let source = MemorySnapshotSource::new(log.clone());

    source
        .create_table(
            ORDERS,
            vec![
                Field::new("id", ColumnType::Int64),
                Field::new("description", ColumnType::Text),
            ],
            &["id"],
        )
        .await
        .unwrap();
    source
        .insert_rows(ORDERS, (1..=ORDERS_COUNT).rev().map(order_row).collect())
        .await
        .unwrap();

    source
        .create_table(
            USERS,
            vec![
                Field::new("id", ColumnType::Int64),
                Field::new("name", ColumnType::Text),
            ],
            &["id"],
        )
        .await
        .unwrap();
    source
        .insert_rows(USERS, (1..=USERS_COUNT).map(user_row).collect())
        .await
        .unwrap();

    source
}

/// Builds a ROW event updating the order with key `id`.
pub fn order_update(id: i64) -> ChangeEvent {
    ChangeEvent::Row(RowEvent {
        origin: ShardOrigin::new("commerce", "0"),
        table_name: ORDERS.to_string(),
        changes: vec![RowChange::update(order_row(id), order_row(id))],
    })
}

pub async fn start_copy_worker<L, S, C, D>(
    config: Arc<CopyConfig>,
    log: L,
    source: S,
    store: C,
    destination: D,
    shutdown_rx: ShutdownRx,
) -> CopyWorkerHandle
where
    L: LogStreamer + Send + Sync + 'static,
    S: SnapshotSource + Send + Sync + 'static,
    C: CheckpointStore + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    CopyWorker::new(
        config,
        copy_rules(),
        log,
        source,
        store,
        destination,
        shutdown_rx,
    )
    .start()
    .await
    .unwrap()
}

/// Returns the rendered keys of every LASTPK event of `table_name`, in order.
pub fn last_keys(events: &[ChangeEvent], table_name: &str) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ChangeEvent::LastPk(last_pk) if last_pk.table_name == table_name => {
                Some(last_pk.last_key.to_string())
            }
            _ => None,
        })
        .collect()
}

/// Returns the table of every FIELD event, in order.
pub fn field_tables(events: &[ChangeEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ChangeEvent::Field(field) => Some(field.table_name.clone()),
            _ => None,
        })
        .collect()
}

/// Returns the keys of every row change of `table_name`, in order.
pub fn row_ids(events: &[ChangeEvent], table_name: &str) -> Vec<i64> {
    events
        .iter()
        .filter_map(|event| match event {
            ChangeEvent::Row(row) if row.table_name == table_name => Some(row),
            _ => None,
        })
        .flat_map(|row| row.changes.iter())
        .filter_map(|change| match change.identity()?.values.first()? {
            Cell::I64(id) => Some(*id),
            _ => None,
        })
        .collect()
}

/// A destination failing the `fail_on`-th write that carries a LASTPK event.
///
/// Writes before the failing one are recorded by the wrapped [`MemoryDestination`].
#[derive(Debug, Clone)]
pub struct FailingDestination {
    inner: MemoryDestination,
    fail_on: usize,
    row_groups: Arc<AtomicUsize>,
}

impl FailingDestination {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: MemoryDestination::new(),
            fail_on,
            row_groups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn events(&self) -> Vec<ChangeEvent> {
        self.inner.events().await
    }
}

impl Destination for FailingDestination {
    async fn write_events(&self, events: Vec<ChangeEvent>) -> EtlResult<()> {
        let is_row_group = events
            .iter()
            .any(|event| matches!(event, ChangeEvent::LastPk(_)));

        if is_row_group && self.row_groups.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(EtlError::from((
                ErrorKind::DestinationFailed,
                "Injected destination failure",
            )));
        }

        self.inner.write_events(events).await
    }
}

/// A snapshot source appending a transaction to the log right before reading `table_name`.
///
/// Simulates writes committed between the end of a catch-up and the snapshot read, which puts
/// the snapshot position ahead of the tracked one.
#[derive(Debug, Clone)]
pub struct AppendingSource {
    inner: MemorySnapshotSource,
    log: MemoryLog,
    table_name: String,
    events: Vec<ChangeEvent>,
}

impl AppendingSource {
    pub fn new(
        inner: MemorySnapshotSource,
        log: MemoryLog,
        table_name: &str,
        events: Vec<ChangeEvent>,
    ) -> Self {
        Self {
            inner,
            log,
            table_name: table_name.to_string(),
            events,
        }
    }
}

impl SnapshotSource for AppendingSource {
    async fn stream_rows(&self, request: RowStreamRequest) -> EtlResult<SnapshotStream> {
        if request.table_name == self.table_name {
            self.log.append(self.events.clone()).await;
        }

        self.inner.stream_rows(request).await
    }
}
