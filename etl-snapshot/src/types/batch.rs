use chrono::{DateTime, Utc};

use crate::types::{ChangeEvent, Field, LogPosition, TableRow};

/// A bounded group of snapshot rows of one table.
///
/// Only the first batch of a read carries `fields` and `key_fields`. Every batch carries the
/// row of the last key it covers, which is where a later read resumes after, and the log
/// position the snapshot was read at in its canonical string form.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotBatch {
    pub fields: Vec<Field>,
    pub key_fields: Vec<Field>,
    pub rows: Vec<TableRow>,
    /// Values of the key fields of the last row covered by this batch, in key order.
    pub last_key: Option<TableRow>,
    pub position: String,
}

impl SnapshotBatch {
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEntryKind {
    /// A committed transaction, possibly without events left after table filtering.
    Transaction,
    /// A keepalive of an idle log. It only advances the position and the lag estimate.
    Heartbeat,
}

/// One entry read from the change log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub kind: LogEntryKind,
    pub position: LogPosition,
    pub timestamp: DateTime<Utc>,
    pub events: Vec<ChangeEvent>,
}

impl LogEntry {
    pub fn transaction(
        position: LogPosition,
        timestamp: DateTime<Utc>,
        events: Vec<ChangeEvent>,
    ) -> Self {
        Self {
            kind: LogEntryKind::Transaction,
            position,
            timestamp,
            events,
        }
    }

    pub fn heartbeat(position: LogPosition, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: LogEntryKind::Heartbeat,
            position,
            timestamp,
            events: Vec::new(),
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.kind == LogEntryKind::Heartbeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transaction_is_not_a_heartbeat() {
        let now = Utc::now();

        assert!(!LogEntry::transaction(LogPosition::new(1), now, Vec::new()).is_heartbeat());
        assert!(LogEntry::heartbeat(LogPosition::new(1), now).is_heartbeat());
    }
}
