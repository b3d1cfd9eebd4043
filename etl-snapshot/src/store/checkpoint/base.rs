use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::EtlResult;
use crate::types::{LogPosition, TableKey};

/// Durable copy progress of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCheckpoint {
    pub last_key: Option<TableKey>,
    pub complete: bool,
}

/// Every checkpoint of a copy, as loaded at the start of a copy attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyCheckpoints {
    /// Log position of the last persisted checkpoint, [`LogPosition::ZERO`] for a new copy.
    pub position: LogPosition,
    pub tables: HashMap<String, TableCheckpoint>,
}

/// Trait for storing and retrieving copy checkpoints.
///
/// A checkpoint is only written after the event group it refers to was accepted by the
/// destination, so that a restarted copy resumes at a batch boundary.
pub trait CheckpointStore {
    /// Loads all checkpoints. Called once at the start of a copy attempt.
    fn load_checkpoints(&self) -> impl Future<Output = EtlResult<CopyCheckpoints>> + Send;

    /// Stores `last_key` as the checkpoint of `table_name`, taken at `position`.
    fn store_checkpoint(
        &self,
        table_name: &str,
        last_key: TableKey,
        position: LogPosition,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Marks `table_name` as fully copied.
    fn mark_table_complete(
        &self,
        table_name: &str,
        position: LogPosition,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
