use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::EtlResult;
use crate::store::checkpoint::{CheckpointStore, CopyCheckpoints};
use crate::types::{LogPosition, TableKey};

/// A [`CheckpointStore`] keeping checkpoints in memory.
///
/// Clones share the same checkpoints, so a store can outlive a copy worker and be handed to the
/// next one.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<CopyCheckpoints>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current checkpoints.
    pub async fn checkpoints(&self) -> CopyCheckpoints {
        self.inner.lock().await.clone()
    }
}

impl CheckpointStore for MemoryStore {
    async fn load_checkpoints(&self) -> EtlResult<CopyCheckpoints> {
        Ok(self.inner.lock().await.clone())
    }

    async fn store_checkpoint(
        &self,
        table_name: &str,
        last_key: TableKey,
        position: LogPosition,
    ) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.position = position;
        inner
            .tables
            .entry(table_name.to_string())
            .or_default()
            .last_key = Some(last_key);

        Ok(())
    }

    async fn mark_table_complete(&self, table_name: &str, position: LogPosition) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.position = position;
        inner
            .tables
            .entry(table_name.to_string())
            .or_default()
            .complete = true;

        Ok(())
    }
}
