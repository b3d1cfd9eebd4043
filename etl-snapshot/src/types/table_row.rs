use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Cell {
    /// Compares two cells of the same type, `Null` sorting first.
    ///
    /// Returns [`None`] for cells of different types and for NaN floats.
    pub fn compare(&self, other: &Cell) -> Option<Ordering> {
        match (self, other) {
            (Cell::Null, Cell::Null) => Some(Ordering::Equal),
            (Cell::Null, _) => Some(Ordering::Less),
            (_, Cell::Null) => Some(Ordering::Greater),
            (Cell::Bool(a), Cell::Bool(b)) => Some(a.cmp(b)),
            (Cell::I64(a), Cell::I64(b)) => Some(a.cmp(b)),
            (Cell::U64(a), Cell::U64(b)) => Some(a.cmp(b)),
            (Cell::F64(a), Cell::F64(b)) => a.partial_cmp(b),
            (Cell::String(a), Cell::String(b)) => Some(a.cmp(b)),
            (Cell::Bytes(a), Cell::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Approximate encoded size, used to bound batches by bytes.
    pub fn approximate_size(&self) -> usize {
        match self {
            Cell::Null => 1,
            Cell::Bool(_) => 1,
            Cell::I64(_) | Cell::U64(_) | Cell::F64(_) => 8,
            Cell::String(value) => value.len(),
            Cell::Bytes(value) => value.len(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::I64(value) => write!(f, "{value}"),
            Cell::U64(value) => write!(f, "{value}"),
            Cell::F64(value) => write!(f, "{value}"),
            Cell::String(value) => write!(f, "'{value}'"),
            Cell::Bytes(value) => {
                f.write_str("0x")?;
                for byte in value {
                    write!(f, "{byte:02x}")?;
                }

                Ok(())
            }
        }
    }
}

/// An ordered tuple of column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    pub fn approximate_size(&self) -> usize {
        self.values.iter().map(Cell::approximate_size).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int64,
    UInt64,
    Float64,
    Text,
    Bytes,
}

/// Descriptor of a column in a table's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub column_type: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// One column of a [`TableKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyColumn {
    pub field: Field,
    /// Position of the column inside a full table row.
    pub ordinal: usize,
    pub value: Cell,
}

/// The key of the last row copied for a table, which a copy resumes strictly after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableKey {
    pub columns: Vec<KeyColumn>,
}

impl TableKey {
    pub fn new(columns: Vec<KeyColumn>) -> Self {
        Self { columns }
    }

    pub fn values(&self) -> impl Iterator<Item = &Cell> {
        self.columns.iter().map(|column| &column.value)
    }

    /// Lexicographically compares the key of a full table `row` against this key.
    ///
    /// Returns [`None`] when the row is too short for the key ordinals or holds values that
    /// cannot be compared with the key.
    pub fn compare_row(&self, row: &TableRow) -> Option<Ordering> {
        let mut row_key = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            row_key.push(row.values.get(column.ordinal)?);
        }

        self.compare_values(row_key)
    }

    /// Lexicographically compares `values` against this key.
    pub fn compare_values<'a>(&self, values: impl IntoIterator<Item = &'a Cell>) -> Option<Ordering> {
        let mut values = values.into_iter();
        for column in &self.columns {
            let value = values.next()?;
            match value.compare(&column.value)? {
                Ordering::Equal => continue,
                ordering => return Some(ordering),
            }
        }

        Some(Ordering::Equal)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", column.field.name, column.value)?;
        }

        Ok(())
    }
}
