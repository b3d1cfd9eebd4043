//! In-memory change log and snapshot source.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{Mutex, Notify};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::{
    LogStream, LogStreamRequest, LogStreamer, RowStreamRequest, SnapshotSource, SnapshotStream,
};
use crate::types::{ChangeEvent, Field, LogEntry, LogPosition, SnapshotBatch, TableRow};

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<LogEntry>,
}

/// A change log kept in memory.
///
/// Streams opened without a stop position tail the log, waiting for new entries. With a
/// heartbeat interval configured, an idle stream yields a heartbeat entry every interval.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<LogInner>>,
    appended: Arc<Notify>,
    heartbeat: Option<Duration>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }

    /// Appends a transaction committed now right after the current head.
    pub async fn append(&self, events: Vec<ChangeEvent>) -> LogPosition {
        self.append_with_timestamp(Utc::now(), events).await
    }

    /// Appends a transaction committed at `timestamp` right after the current head.
    pub async fn append_with_timestamp(
        &self,
        timestamp: DateTime<Utc>,
        events: Vec<ChangeEvent>,
    ) -> LogPosition {
        let mut inner = self.inner.lock().await;
        let head = inner
            .entries
            .last()
            .map(|entry| entry.position)
            .unwrap_or(LogPosition::ZERO);
        let position = LogPosition::new(head.as_u64() + 1);

        inner
            .entries
            .push(LogEntry::transaction(position, timestamp, events));
        drop(inner);

        self.appended.notify_waiters();

        position
    }

    /// Appends an entry at an explicit position, which must be after the current head.
    pub async fn append_entry(&self, entry: LogEntry) -> EtlResult<LogPosition> {
        let mut inner = self.inner.lock().await;
        if let Some(last) = inner.entries.last()
            && last.position >= entry.position
        {
            bail!(
                ErrorKind::InvalidPosition,
                "Log entries must be appended in position order",
                format!(
                    "entry at {} is not after the head at {}",
                    entry.position, last.position
                )
            );
        }

        let position = entry.position;
        inner.entries.push(entry);
        drop(inner);

        self.appended.notify_waiters();

        Ok(position)
    }

    /// Returns the position of the last entry, [`LogPosition::ZERO`] for an empty log.
    pub async fn head_position(&self) -> LogPosition {
        self.inner
            .lock()
            .await
            .entries
            .last()
            .map(|entry| entry.position)
            .unwrap_or(LogPosition::ZERO)
    }

    async fn next_entry(&self, after: LogPosition) -> Option<LogEntry> {
        let inner = self.inner.lock().await;
        let index = inner
            .entries
            .partition_point(|entry| entry.position <= after);

        inner.entries.get(index).cloned()
    }
}

struct TailState {
    log: MemoryLog,
    last_position: LogPosition,
    stop: Option<LogPosition>,
    tables: Vec<String>,
    done: bool,
}

impl TailState {
    fn reached_stop(&self, position: LogPosition) -> bool {
        self.stop.is_some_and(|stop| position.at_least(&stop))
    }

    fn retain_tables(&self, entry: &mut LogEntry) {
        if self.tables.is_empty() {
            return;
        }

        entry.events.retain(|event| match event.table_name() {
            Some(table_name) => self.tables.iter().any(|table| table == table_name),
            None => true,
        });
    }
}

async fn tail(mut state: TailState) -> Option<(EtlResult<LogEntry>, TailState)> {
    if state.done || state.reached_stop(state.last_position) {
        return None;
    }

    let appended = state.log.appended.clone();
    loop {
        let notified = appended.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(mut entry) = state.log.next_entry(state.last_position).await {
            if state.stop.is_some_and(|stop| entry.position > stop) {
                return None;
            }

            state.last_position = entry.position;
            state.done = state.reached_stop(entry.position);
            state.retain_tables(&mut entry);

            return Some((Ok(entry), state));
        }

        match state.log.heartbeat {
            Some(interval) => {
                tokio::select! {
                    _ = &mut notified => {}
                    _ = tokio::time::sleep(interval) => {
                        let heartbeat = LogEntry::heartbeat(state.last_position, Utc::now());

                        return Some((Ok(heartbeat), state));
                    }
                }
            }
            None => notified.await,
        }
    }
}

impl LogStreamer for MemoryLog {
    async fn stream_log(&self, request: LogStreamRequest) -> EtlResult<LogStream> {
        let state = TailState {
            log: self.clone(),
            last_position: request.start,
            stop: request.stop,
            tables: request.tables,
            done: false,
        };

        Ok(futures::stream::unfold(state, tail).boxed())
    }
}

#[derive(Debug)]
struct MemoryTable {
    fields: Vec<Field>,
    key_ordinals: Vec<usize>,
    rows: Vec<TableRow>,
}

impl MemoryTable {
    fn key_of(&self, row: &TableRow) -> TableRow {
        TableRow::new(
            self.key_ordinals
                .iter()
                .filter_map(|ordinal| row.values.get(*ordinal).cloned())
                .collect(),
        )
    }

    fn compare_keys(&self, a: &TableRow, b: &TableRow) -> Ordering {
        for ordinal in &self.key_ordinals {
            let ordering = match (a.values.get(*ordinal), b.values.get(*ordinal)) {
                (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

#[derive(Debug, Default)]
struct SourceInner {
    tables: HashMap<String, MemoryTable>,
    requests: Vec<RowStreamRequest>,
}

/// A [`SnapshotSource`] over tables kept in memory.
///
/// Snapshots are read at the head position of the attached [`MemoryLog`]. Filters are recorded
/// but not interpreted.
#[derive(Debug, Clone)]
pub struct MemorySnapshotSource {
    inner: Arc<Mutex<SourceInner>>,
    log: MemoryLog,
}

impl MemorySnapshotSource {
    pub fn new(log: MemoryLog) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SourceInner::default())),
            log,
        }
    }

    /// Creates an empty table whose key is made of the `key_columns`, in order.
    pub async fn create_table(
        &self,
        table_name: &str,
        fields: Vec<Field>,
        key_columns: &[&str],
    ) -> EtlResult<()> {
        let mut key_ordinals = Vec::with_capacity(key_columns.len());
        for key_column in key_columns {
            let Some(ordinal) = fields.iter().position(|field| field.name == *key_column) else {
                bail!(
                    ErrorKind::MissingKeyColumn,
                    "Key column is not a field of the table",
                    format!("key column '{key_column}' not found in table '{table_name}'")
                );
            };
            key_ordinals.push(ordinal);
        }

        let table = MemoryTable {
            fields,
            key_ordinals,
            rows: Vec::new(),
        };
        self.inner
            .lock()
            .await
            .tables
            .insert(table_name.to_string(), table);

        Ok(())
    }

    pub async fn insert_rows(&self, table_name: &str, rows: Vec<TableRow>) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(table) = inner.tables.get_mut(table_name) else {
            bail!(
                ErrorKind::SnapshotSourceFailed,
                "Table does not exist in the snapshot source",
                format!("table '{table_name}' not found")
            );
        };
        table.rows.extend(rows);

        Ok(())
    }

    /// Returns every request received so far.
    pub async fn requests(&self) -> Vec<RowStreamRequest> {
        self.inner.lock().await.requests.clone()
    }
}

impl SnapshotSource for MemorySnapshotSource {
    async fn stream_rows(&self, request: RowStreamRequest) -> EtlResult<SnapshotStream> {
        let position = self.log.head_position().await.to_string();

        let mut inner = self.inner.lock().await;
        inner.requests.push(request.clone());

        let Some(table) = inner.tables.get(&request.table_name) else {
            bail!(
                ErrorKind::SnapshotSourceFailed,
                "Table does not exist in the snapshot source",
                format!("table '{}' not found", request.table_name)
            );
        };

        let mut rows = table.rows.clone();
        rows.sort_by(|a, b| table.compare_keys(a, b));
        if let Some(resume_after) = &request.resume_after {
            rows.retain(|row| {
                resume_after.compare_values(&table.key_of(row).values) == Some(Ordering::Greater)
            });
        }

        let mut chunks = Vec::new();
        let mut chunk = Vec::new();
        let mut chunk_bytes = 0;
        for row in rows {
            chunk_bytes += row.approximate_size();
            chunk.push(row);

            if chunk.len() >= request.batch.max_rows || chunk_bytes >= request.batch.max_bytes {
                chunks.push(std::mem::take(&mut chunk));
                chunk_bytes = 0;
            }
        }
        if !chunk.is_empty() || chunks.is_empty() {
            chunks.push(chunk);
        }

        let key_fields = table
            .key_ordinals
            .iter()
            .map(|ordinal| table.fields[*ordinal].clone())
            .collect::<Vec<_>>();

        let batches = chunks
            .into_iter()
            .enumerate()
            .map(|(i, rows)| {
                let last_key = rows.last().map(|row| table.key_of(row));
                let (fields, key_fields) = if i == 0 {
                    (table.fields.clone(), key_fields.clone())
                } else {
                    (Vec::new(), Vec::new())
                };

                Ok(SnapshotBatch {
                    fields,
                    key_fields,
                    rows,
                    last_key,
                    position: position.clone(),
                })
            })
            .collect::<Vec<EtlResult<SnapshotBatch>>>();

        Ok(futures::stream::iter(batches).boxed())
    }
}

#[cfg(test)]
mod tests {
    use etl_config::shared::BatchConfig;

    use super::*;
    use crate::types::{Cell, ColumnType, KeyColumn, TableKey};

    fn request(start: u64, stop: Option<u64>) -> LogStreamRequest {
        LogStreamRequest {
            start: LogPosition::new(start),
            stop: stop.map(LogPosition::new),
            tables: Vec::new(),
        }
    }

    #[tokio::test]
    async fn bounded_stream_ends_at_the_stop_position() {
        let log = MemoryLog::new();
        for _ in 0..5 {
            log.append(Vec::new()).await;
        }

        let stream = log.stream_log(request(1, Some(3))).await.unwrap();
        let positions = stream
            .map(|entry| entry.unwrap().position.as_u64())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(positions, vec![2, 3]);
    }

    #[tokio::test]
    async fn unbounded_stream_tails_new_entries() {
        let log = MemoryLog::new();
        let mut stream = log.stream_log(request(0, None)).await.unwrap();

        let appender = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            appender.append(Vec::new()).await;
        });

        let entry = stream.next().await.unwrap().unwrap();
        assert_eq!(entry.position, LogPosition::new(1));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_yields_heartbeats() {
        let log = MemoryLog::new().with_heartbeat(Duration::from_millis(100));
        log.append(Vec::new()).await;

        let mut stream = log.stream_log(request(0, None)).await.unwrap();
        assert!(!stream.next().await.unwrap().unwrap().is_heartbeat());

        let heartbeat = stream.next().await.unwrap().unwrap();
        assert!(heartbeat.is_heartbeat());
        assert_eq!(heartbeat.position, LogPosition::new(1));
    }

    #[tokio::test]
    async fn filtered_out_transaction_is_not_a_heartbeat() {
        let log = MemoryLog::new();
        log.append(vec![crate::test_utils::event::row_update("users", 1)])
            .await;

        let mut stream = log
            .stream_log(LogStreamRequest {
                tables: vec!["orders".to_string()],
                ..request(0, Some(1))
            })
            .await
            .unwrap();

        let entry = stream.next().await.unwrap().unwrap();
        assert!(entry.events.is_empty());
        assert!(!entry.is_heartbeat());
        assert_eq!(entry.position, LogPosition::new(1));
    }

    #[tokio::test]
    async fn entries_must_be_appended_in_order() {
        let log = MemoryLog::new();
        log.append(Vec::new()).await;

        let err = log
            .append_entry(LogEntry::transaction(
                LogPosition::new(1),
                Utc::now(),
                Vec::new(),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPosition);
    }

    #[tokio::test]
    async fn snapshot_batches_are_ordered_and_resumable() {
        let log = MemoryLog::new();
        log.append(Vec::new()).await;

        let source = MemorySnapshotSource::new(log);
        source
            .create_table(
                "items",
                vec![
                    Field::new("name", ColumnType::Text),
                    Field::new("id", ColumnType::Int64),
                ],
                &["id"],
            )
            .await
            .unwrap();
        let rows = [3, 1, 5, 2, 4]
            .into_iter()
            .map(|id| TableRow::new(vec![Cell::String(format!("item {id}")), Cell::I64(id)]))
            .collect();
        source.insert_rows("items", rows).await.unwrap();

        let resume_after = TableKey::new(vec![KeyColumn {
            field: Field::new("id", ColumnType::Int64),
            ordinal: 1,
            value: Cell::I64(1),
        }]);
        let stream = source
            .stream_rows(RowStreamRequest {
                table_name: "items".to_string(),
                filter: None,
                resume_after: Some(resume_after),
                batch: BatchConfig {
                    max_rows: 3,
                    max_bytes: 1024,
                },
            })
            .await
            .unwrap();
        let batches = stream
            .map(|batch| batch.unwrap())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(batches.len(), 2);
        assert!(batches[0].has_fields());
        assert_eq!(batches[0].key_fields, vec![Field::new("id", ColumnType::Int64)]);
        assert!(!batches[1].has_fields());
        assert_eq!(batches[0].rows.len(), 3);
        assert_eq!(
            batches[0].last_key,
            Some(TableRow::new(vec![Cell::I64(4)]))
        );
        assert_eq!(
            batches[1].last_key,
            Some(TableRow::new(vec![Cell::I64(5)]))
        );
        assert_eq!(batches[1].position, "0/1");
        assert_eq!(source.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_table_yields_a_single_field_batch() {
        let source = MemorySnapshotSource::new(MemoryLog::new());
        source
            .create_table("empty", vec![Field::new("id", ColumnType::Int64)], &["id"])
            .await
            .unwrap();

        let stream = source
            .stream_rows(RowStreamRequest {
                table_name: "empty".to_string(),
                filter: None,
                resume_after: None,
                batch: BatchConfig::default(),
            })
            .await
            .unwrap();
        let batches = stream.collect::<Vec<_>>().await;

        assert_eq!(batches.len(), 1);
        let batch = batches[0].as_ref().unwrap();
        assert!(batch.has_fields());
        assert!(batch.rows.is_empty());
        assert!(batch.last_key.is_none());
    }
}
