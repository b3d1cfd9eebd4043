use std::future::Future;

use etl_config::shared::BatchConfig;
use futures::stream::BoxStream;

use crate::error::EtlResult;
use crate::types::{SnapshotBatch, TableKey};

/// Stream of snapshot batches of one table read.
pub type SnapshotStream = BoxStream<'static, EtlResult<SnapshotBatch>>;

/// Parameters of a snapshot read.
#[derive(Debug, Clone, PartialEq)]
pub struct RowStreamRequest {
    pub table_name: String,
    pub filter: Option<String>,
    /// Only rows with a key strictly greater than this key are read.
    pub resume_after: Option<TableKey>,
    pub batch: BatchConfig,
}

/// Reads consistent snapshots of tables.
///
/// A read yields batches ordered by key, all read at the same log position. Only the first
/// batch carries the field descriptors. The stream ends when the table is exhausted, and the
/// read is stopped early by dropping the stream.
pub trait SnapshotSource {
    fn stream_rows(
        &self,
        request: RowStreamRequest,
    ) -> impl Future<Output = EtlResult<SnapshotStream>> + Send;
}
