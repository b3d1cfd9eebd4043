use std::future::Future;

use futures::stream::BoxStream;

use crate::error::EtlResult;
use crate::types::{LogEntry, LogPosition};

/// Stream of committed transactions read from the change log.
pub type LogStream = BoxStream<'static, EtlResult<LogEntry>>;

/// Parameters of a change log read.
#[derive(Debug, Clone, PartialEq)]
pub struct LogStreamRequest {
    /// The stream starts with the first entry after this position.
    pub start: LogPosition,
    /// The stream ends with the last entry not beyond this position. `None` tails the log.
    pub stop: Option<LogPosition>,
    /// Tables whose events are streamed.
    pub tables: Vec<String>,
}

/// Reads the change log.
///
/// The returned stream yields entries in position order. It ends when the log ends, or once the
/// stop position is reached, and is cancelled by dropping it.
pub trait LogStreamer {
    fn stream_log(
        &self,
        request: LogStreamRequest,
    ) -> impl Future<Output = EtlResult<LogStream>> + Send;
}
