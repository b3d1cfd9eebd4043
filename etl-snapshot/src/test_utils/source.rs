use futures::StreamExt;

use crate::error::EtlResult;
use crate::source::{
    LogStream, LogStreamRequest, LogStreamer, RowStreamRequest, SnapshotSource, SnapshotStream,
};
use crate::types::{LogEntry, SnapshotBatch};

/// A [`LogStreamer`] replaying the same scripted items on every stream, then ending.
#[derive(Debug, Clone)]
pub struct ScriptedLog {
    items: Vec<EtlResult<LogEntry>>,
}

impl ScriptedLog {
    pub fn new(items: Vec<EtlResult<LogEntry>>) -> Self {
        Self { items }
    }
}

impl LogStreamer for ScriptedLog {
    async fn stream_log(&self, _request: LogStreamRequest) -> EtlResult<LogStream> {
        Ok(futures::stream::iter(self.items.clone()).boxed())
    }
}

/// A [`SnapshotSource`] yielding the same scripted batches for every read.
#[derive(Debug, Clone)]
pub struct ScriptedSnapshot {
    batches: Vec<EtlResult<SnapshotBatch>>,
}

impl ScriptedSnapshot {
    pub fn new(batches: Vec<EtlResult<SnapshotBatch>>) -> Self {
        Self { batches }
    }
}

impl SnapshotSource for ScriptedSnapshot {
    async fn stream_rows(&self, _request: RowStreamRequest) -> EtlResult<SnapshotStream> {
        Ok(futures::stream::iter(self.batches.clone()).boxed())
    }
}
