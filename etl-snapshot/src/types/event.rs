use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Field, TableKey, TableRow};

/// Keyspace and shard identity attached to every emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardOrigin {
    pub keyspace: String,
    pub shard: String,
}

impl ShardOrigin {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
        }
    }
}

/// Opens a transaction group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginEvent {
    pub origin: ShardOrigin,
}

/// Describes the columns of a table. Rows of that table which follow it are laid out by these
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEvent {
    pub origin: ShardOrigin,
    pub table_name: String,
    pub fields: Vec<Field>,
}

/// A before/after pair of row images.
///
/// Snapshot copies only ever carry an `after` image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub before: Option<TableRow>,
    pub after: Option<TableRow>,
}

impl RowChange {
    pub fn insert(row: TableRow) -> Self {
        Self {
            before: None,
            after: Some(row),
        }
    }

    pub fn update(before: TableRow, after: TableRow) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(row: TableRow) -> Self {
        Self {
            before: Some(row),
            after: None,
        }
    }

    /// Returns the image that identifies the changed row.
    pub fn identity(&self) -> Option<&TableRow> {
        self.after.as_ref().or(self.before.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowEvent {
    pub origin: ShardOrigin,
    pub table_name: String,
    pub changes: Vec<RowChange>,
}

/// Carries the checkpoint key a table copy can be resumed after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastPkEvent {
    pub origin: ShardOrigin,
    pub table_name: String,
    pub last_key: TableKey,
}

/// Closes a transaction group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub origin: ShardOrigin,
}

/// Diagnostic event without functional effect. Consumers ignore markers they don't recognize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEvent {
    pub origin: ShardOrigin,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    Begin(BeginEvent),
    Field(FieldEvent),
    Row(RowEvent),
    LastPk(LastPkEvent),
    Commit(CommitEvent),
    Marker(MarkerEvent),
}

impl ChangeEvent {
    pub fn event_type(&self) -> EventType {
        self.into()
    }

    pub fn origin(&self) -> &ShardOrigin {
        match self {
            ChangeEvent::Begin(event) => &event.origin,
            ChangeEvent::Field(event) => &event.origin,
            ChangeEvent::Row(event) => &event.origin,
            ChangeEvent::LastPk(event) => &event.origin,
            ChangeEvent::Commit(event) => &event.origin,
            ChangeEvent::Marker(event) => &event.origin,
        }
    }

    /// Returns the table the event belongs to, if any.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            ChangeEvent::Field(event) => Some(&event.table_name),
            ChangeEvent::Row(event) => Some(&event.table_name),
            ChangeEvent::LastPk(event) => Some(&event.table_name),
            ChangeEvent::Begin(_) | ChangeEvent::Commit(_) | ChangeEvent::Marker(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Begin,
    Field,
    Row,
    LastPk,
    Commit,
    Marker,
}

impl From<&ChangeEvent> for EventType {
    fn from(event: &ChangeEvent) -> Self {
        match event {
            ChangeEvent::Begin(_) => EventType::Begin,
            ChangeEvent::Field(_) => EventType::Field,
            ChangeEvent::Row(_) => EventType::Row,
            ChangeEvent::LastPk(_) => EventType::LastPk,
            ChangeEvent::Commit(_) => EventType::Commit,
            ChangeEvent::Marker(_) => EventType::Marker,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Begin => "BEGIN",
            EventType::Field => "FIELD",
            EventType::Row => "ROW",
            EventType::LastPk => "LASTPK",
            EventType::Commit => "COMMIT",
            EventType::Marker => "MARKER",
        };

        f.write_str(name)
    }
}
