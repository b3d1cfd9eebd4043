use crate::types::{
    Cell, ChangeEvent, ColumnType, EventType, Field, KeyColumn, RowChange, RowEvent, ShardOrigin,
    TableKey, TableRow,
};

pub fn id_fields() -> Vec<Field> {
    vec![
        Field::new("id", ColumnType::Int64),
        Field::new("description", ColumnType::Text),
    ]
}

pub fn id_row(id: i64) -> TableRow {
    TableRow::new(vec![Cell::I64(id), Cell::String(format!("row {id}"))])
}

pub fn id_key(id: i64) -> TableKey {
    TableKey::new(vec![KeyColumn {
        field: Field::new("id", ColumnType::Int64),
        ordinal: 0,
        value: Cell::I64(id),
    }])
}

/// Builds a ROW event updating the row with key `id` of `table_name`.
pub fn row_update(table_name: &str, id: i64) -> ChangeEvent {
    ChangeEvent::Row(RowEvent {
        origin: ShardOrigin::new("commerce", "0"),
        table_name: table_name.to_string(),
        changes: vec![RowChange::update(id_row(id), id_row(id))],
    })
}

pub fn event_types(events: &[ChangeEvent]) -> Vec<EventType> {
    events.iter().map(ChangeEvent::event_type).collect()
}
