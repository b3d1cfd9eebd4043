use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::store::checkpoint::TableCheckpoint;
use crate::types::{Field, TableKey};

/// Which rows of a table are copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCopyRule {
    pub table_name: String,
    /// Filter understood by the snapshot source, `None` copies every row.
    pub filter: Option<String>,
}

impl TableCopyRule {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Copy progress of a single table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableCopyState {
    /// Key of the last copied row, `None` when nothing was copied yet.
    pub last_key: Option<TableKey>,
    /// Field descriptors of the current snapshot read, `None` until its first batch arrives.
    pub fields: Option<Vec<Field>>,
    pub key_fields: Vec<Field>,
    pub complete: bool,
}

impl TableCopyState {
    pub fn from_checkpoint(checkpoint: &TableCheckpoint) -> Self {
        Self {
            last_key: checkpoint.last_key.clone(),
            fields: None,
            key_fields: Vec::new(),
            complete: checkpoint.complete,
        }
    }
}

/// Tables left to copy, in the order they are copied.
///
/// Every table before the head is fully copied, the head is the table being copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTableQueue {
    tables: VecDeque<String>,
}

impl PendingTableQueue {
    /// Builds a queue from table names that must already be sorted and unique.
    pub fn from_sorted(tables: Vec<String>) -> EtlResult<Self> {
        if let Some(window) = tables.windows(2).find(|window| window[0] >= window[1]) {
            bail!(
                ErrorKind::InvalidState,
                "Pending tables are not sorted",
                format!(
                    "table '{}' is listed before table '{}'",
                    window[0], window[1]
                )
            );
        }

        Ok(Self {
            tables: tables.into(),
        })
    }

    pub fn head(&self) -> Option<&str> {
        self.tables.front().map(String::as_str)
    }

    pub fn pop_head(&mut self) -> Option<String> {
        self.tables.pop_front()
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.tables.iter().any(|table| table == table_name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }
}

/// Builds the queue of tables to copy from the copy rules, skipping tables whose checkpoint is
/// marked complete.
pub fn build_pending_queue(
    rules: &BTreeMap<String, TableCopyRule>,
    checkpoints: &HashMap<String, TableCheckpoint>,
) -> PendingTableQueue {
    let tables = rules
        .keys()
        .filter(|table_name| {
            !checkpoints
                .get(*table_name)
                .is_some_and(|checkpoint| checkpoint.complete)
        })
        .cloned()
        .collect::<VecDeque<_>>();

    PendingTableQueue { tables }
}
