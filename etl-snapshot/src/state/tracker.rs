use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bail;
use crate::concurrency::task::StreamPhase;
use crate::error::{ErrorKind, EtlResult};
use crate::state::table::{PendingTableQueue, TableCopyState};
use crate::types::{Field, LogPosition, TableKey};

/// Copy progress of a table as seen by the apply path.
#[derive(Debug, Clone, PartialEq)]
pub enum TableProgress {
    /// The table is not part of the copy or its copy is complete.
    Untracked,
    /// The table is waiting to be copied and no row of it was copied yet.
    NotStarted,
    /// Rows up to and including the key were copied.
    InProgress(TableKey),
}

#[derive(Debug)]
struct Inner {
    position: LogPosition,
    stop_position: Option<LogPosition>,
    tables: HashMap<String, TableCopyState>,
    pending: PendingTableQueue,
    in_transaction: bool,
    active_stream: Option<StreamPhase>,
}

/// Shared log position and per table copy state of a copy.
#[derive(Debug, Clone)]
pub struct CopyTracker {
    inner: Arc<Mutex<Inner>>,
}

impl CopyTracker {
    pub fn new(
        position: LogPosition,
        tables: HashMap<String, TableCopyState>,
        pending: PendingTableQueue,
    ) -> Self {
        let inner = Inner {
            position,
            stop_position: None,
            tables,
            pending,
            in_transaction: false,
            active_stream: None,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub async fn position(&self) -> LogPosition {
        self.inner.lock().await.position
    }

    /// Sets the position, even if it moves backwards.
    pub async fn set_position(&self, position: LogPosition) {
        self.inner.lock().await.position = position;
    }

    /// Moves the position forward to `position`, returning the resulting position.
    pub async fn advance_position(&self, position: LogPosition) -> LogPosition {
        let mut inner = self.inner.lock().await;
        if position > inner.position {
            inner.position = position;
        }

        inner.position
    }

    pub async fn stop_position(&self) -> Option<LogPosition> {
        self.inner.lock().await.stop_position
    }

    pub async fn set_stop_position(&self, stop_position: Option<LogPosition>) {
        self.inner.lock().await.stop_position = stop_position;
    }

    pub async fn table_state(&self, table_name: &str) -> Option<TableCopyState> {
        self.inner.lock().await.tables.get(table_name).cloned()
    }

    pub async fn last_key(&self, table_name: &str) -> Option<TableKey> {
        self.inner
            .lock()
            .await
            .tables
            .get(table_name)
            .and_then(|state| state.last_key.clone())
    }

    pub async fn fields(&self, table_name: &str) -> Option<Vec<Field>> {
        self.inner
            .lock()
            .await
            .tables
            .get(table_name)
            .and_then(|state| state.fields.clone())
    }

    /// Forgets the cached field descriptors of `table_name`, so that the next snapshot batch is
    /// handled as a first batch.
    pub async fn reset_fields(&self, table_name: &str) {
        let mut inner = self.inner.lock().await;
        let state = inner.tables.entry(table_name.to_string()).or_default();
        state.fields = None;
        state.key_fields.clear();
    }

    pub async fn set_fields(&self, table_name: &str, fields: Vec<Field>, key_fields: Vec<Field>) {
        let mut inner = self.inner.lock().await;
        let state = inner.tables.entry(table_name.to_string()).or_default();
        state.fields = Some(fields);
        state.key_fields = key_fields;
    }

    pub async fn update_last_key(&self, table_name: &str, last_key: TableKey) {
        let mut inner = self.inner.lock().await;
        inner
            .tables
            .entry(table_name.to_string())
            .or_default()
            .last_key = Some(last_key);
    }

    /// Marks `table_name` as complete and removes it from the head of the pending queue.
    pub async fn mark_complete(&self, table_name: &str) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.pending.head() != Some(table_name) {
            bail!(
                ErrorKind::InvalidState,
                "Only the table at the head of the pending queue can complete",
                format!(
                    "table '{table_name}' completed but the head of the queue is {:?}",
                    inner.pending.head()
                )
            );
        }

        inner.pending.pop_head();
        inner
            .tables
            .entry(table_name.to_string())
            .or_default()
            .complete = true;

        Ok(())
    }

    pub async fn pending_head(&self) -> Option<String> {
        self.inner.lock().await.pending.head().map(str::to_string)
    }

    pub async fn pending_tables(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .pending
            .iter()
            .map(str::to_string)
            .collect()
    }

    /// Returns the copy progress of `table_name` for filtering streamed changes.
    pub async fn progress(&self, table_name: &str) -> TableProgress {
        let inner = self.inner.lock().await;
        if !inner.pending.contains(table_name) {
            return TableProgress::Untracked;
        }

        match inner
            .tables
            .get(table_name)
            .and_then(|state| state.last_key.clone())
        {
            Some(last_key) => TableProgress::InProgress(last_key),
            None => TableProgress::NotStarted,
        }
    }

    pub async fn in_transaction(&self) -> bool {
        self.inner.lock().await.in_transaction
    }

    pub async fn set_in_transaction(&self, in_transaction: bool) {
        self.inner.lock().await.in_transaction = in_transaction;
    }

    /// Returns the phase of the background log stream that is currently running, if any.
    pub async fn active_stream(&self) -> Option<StreamPhase> {
        self.inner.lock().await.active_stream
    }

    pub async fn set_active_stream(&self, phase: Option<StreamPhase>) {
        self.inner.lock().await.active_stream = phase;
    }
}
