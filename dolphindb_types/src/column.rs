//! Storage-level columns and the columnar batches workers accumulate.

use std::fmt::Display;

use crate::{ColumnType, Schema, Storage};

#[derive(Debug, thiserror::Error)]
pub enum ColumnError {
    #[error("cannot store a {actual} cell in a {expected} column")]
    StorageMismatch { expected: Storage, actual: &'static str },

    #[error("cannot append a {actual} column to a {expected} column")]
    AppendMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("batch has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },

    #[error("columns have different lengths: {0:?}")]
    RaggedColumns(Vec<usize>),

    #[error("{0} is not a storable column type")]
    Unsupported(ColumnType),
}

/// A single converted value, laid out the way its column stores it.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Blob(Vec<u8>),
    I128(i128),
    /// One row of an array column; `None` is the null sequence.
    Array(Option<ColumnData>),
}

impl Cell {
    /// The null sentinel for a column of `column_type`.
    pub fn null_for(column_type: &ColumnType) -> Option<Self> {
        if column_type.is_array() {
            return Some(Self::Array(None));
        }
        let cell = match column_type.data_type().storage()? {
            Storage::I8 => Self::I8(i8::MIN),
            Storage::I16 => Self::I16(i16::MIN),
            Storage::I32 => Self::I32(i32::MIN),
            Storage::I64 => Self::I64(i64::MIN),
            Storage::F32 => Self::F32(-f32::MAX),
            Storage::F64 => Self::F64(-f64::MAX),
            Storage::Text => Self::Text(String::new()),
            Storage::Blob => Self::Blob(Vec::new()),
            Storage::I128 if column_type.data_type().is_decimal() => Self::I128(i128::MIN),
            Storage::I128 => Self::I128(0),
        };
        Some(cell)
    }

    /// Whether the cell holds its storage's null sentinel.
    ///
    /// 128-bit cells treat both zero (UUID, IPADDR, INT128) and `i128::MIN` (DECIMAL128) as null.
    pub fn is_null(&self) -> bool {
        match self {
            Self::I8(v) => *v == i8::MIN,
            Self::I16(v) => *v == i16::MIN,
            Self::I32(v) => *v == i32::MIN,
            Self::I64(v) => *v == i64::MIN,
            Self::F32(v) => *v == -f32::MAX,
            Self::F64(v) => *v == -f64::MAX,
            Self::Text(v) => v.is_empty(),
            Self::Blob(v) => v.is_empty(),
            Self::I128(v) => *v == 0 || *v == i128::MIN,
            Self::Array(v) => v.is_none(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::I128(_) => "i128",
            Self::Array(_) => "array",
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Self::I128(v) => write!(f, "{v}"),
            Self::Array(None) => write!(f, "null"),
            Self::Array(Some(values)) => write!(f, "<{} values>", values.len()),
        }
    }
}

/// The values of one column in storage layout.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Text(Vec<String>),
    Blob(Vec<Vec<u8>>),
    I128(Vec<i128>),
    Array(Vec<Option<ColumnData>>),
}

macro_rules! column_dispatch {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            ColumnData::I8($v) => $body,
            ColumnData::I16($v) => $body,
            ColumnData::I32($v) => $body,
            ColumnData::I64($v) => $body,
            ColumnData::F32($v) => $body,
            ColumnData::F64($v) => $body,
            ColumnData::Text($v) => $body,
            ColumnData::Blob($v) => $body,
            ColumnData::I128($v) => $body,
            ColumnData::Array($v) => $body,
        }
    };
}

impl ColumnData {
    /// An empty column laid out for `column_type`.
    pub fn with_capacity(column_type: &ColumnType, capacity: usize) -> Result<Self, ColumnError> {
        if column_type.is_array() {
            return Ok(Self::Array(Vec::with_capacity(capacity)));
        }
        let storage = column_type
            .data_type()
            .storage()
            .ok_or(ColumnError::Unsupported(*column_type))?;
        Ok(Self::for_storage(storage, capacity))
    }

    fn for_storage(storage: Storage, capacity: usize) -> Self {
        match storage {
            Storage::I8 => Self::I8(Vec::with_capacity(capacity)),
            Storage::I16 => Self::I16(Vec::with_capacity(capacity)),
            Storage::I32 => Self::I32(Vec::with_capacity(capacity)),
            Storage::I64 => Self::I64(Vec::with_capacity(capacity)),
            Storage::F32 => Self::F32(Vec::with_capacity(capacity)),
            Storage::F64 => Self::F64(Vec::with_capacity(capacity)),
            Storage::Text => Self::Text(Vec::with_capacity(capacity)),
            Storage::Blob => Self::Blob(Vec::with_capacity(capacity)),
            Storage::I128 => Self::I128(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        column_dispatch!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty column with the same layout.
    pub fn empty_like(&self) -> Self {
        match self {
            Self::I8(_) => Self::I8(Vec::new()),
            Self::I16(_) => Self::I16(Vec::new()),
            Self::I32(_) => Self::I32(Vec::new()),
            Self::I64(_) => Self::I64(Vec::new()),
            Self::F32(_) => Self::F32(Vec::new()),
            Self::F64(_) => Self::F64(Vec::new()),
            Self::Text(_) => Self::Text(Vec::new()),
            Self::Blob(_) => Self::Blob(Vec::new()),
            Self::I128(_) => Self::I128(Vec::new()),
            Self::Array(_) => Self::Array(Vec::new()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::I128(_) => "i128",
            Self::Array(_) => "array",
        }
    }

    fn storage(&self) -> Option<Storage> {
        let storage = match self {
            Self::I8(_) => Storage::I8,
            Self::I16(_) => Storage::I16,
            Self::I32(_) => Storage::I32,
            Self::I64(_) => Storage::I64,
            Self::F32(_) => Storage::F32,
            Self::F64(_) => Storage::F64,
            Self::Text(_) => Storage::Text,
            Self::Blob(_) => Storage::Blob,
            Self::I128(_) => Storage::I128,
            Self::Array(_) => return None,
        };
        Some(storage)
    }

    /// Whether this column's layout is the one `column_type` is stored in.
    pub fn matches(&self, column_type: &ColumnType) -> bool {
        if column_type.is_array() {
            return matches!(self, Self::Array(_));
        }
        self.storage().is_some() && self.storage() == column_type.data_type().storage()
    }

    pub fn push(&mut self, cell: Cell) -> Result<(), ColumnError> {
        match (self, cell) {
            (Self::I8(col), Cell::I8(v)) => col.push(v),
            (Self::I16(col), Cell::I16(v)) => col.push(v),
            (Self::I32(col), Cell::I32(v)) => col.push(v),
            (Self::I64(col), Cell::I64(v)) => col.push(v),
            (Self::F32(col), Cell::F32(v)) => col.push(v),
            (Self::F64(col), Cell::F64(v)) => col.push(v),
            (Self::Text(col), Cell::Text(v)) => col.push(v),
            (Self::Blob(col), Cell::Blob(v)) => col.push(v),
            (Self::I128(col), Cell::I128(v)) => col.push(v),
            (Self::Array(col), Cell::Array(v)) => col.push(v),
            (col, cell) => {
                return Err(match col.storage() {
                    Some(expected) => ColumnError::StorageMismatch {
                        expected,
                        actual: cell.kind(),
                    },
                    None => ColumnError::AppendMismatch {
                        expected: col.kind(),
                        actual: cell.kind(),
                    },
                });
            }
        }
        Ok(())
    }

    /// The value at row `index`.
    pub fn cell(&self, index: usize) -> Option<Cell> {
        let cell = match self {
            Self::I8(v) => Cell::I8(*v.get(index)?),
            Self::I16(v) => Cell::I16(*v.get(index)?),
            Self::I32(v) => Cell::I32(*v.get(index)?),
            Self::I64(v) => Cell::I64(*v.get(index)?),
            Self::F32(v) => Cell::F32(*v.get(index)?),
            Self::F64(v) => Cell::F64(*v.get(index)?),
            Self::Text(v) => Cell::Text(v.get(index)?.clone()),
            Self::Blob(v) => Cell::Blob(v.get(index)?.clone()),
            Self::I128(v) => Cell::I128(*v.get(index)?),
            Self::Array(v) => Cell::Array(v.get(index)?.clone()),
        };
        Some(cell)
    }

    /// Move all rows of `other` onto the end of this column.
    pub fn append(&mut self, other: Self) -> Result<(), ColumnError> {
        match (self, other) {
            (Self::I8(a), Self::I8(mut b)) => a.append(&mut b),
            (Self::I16(a), Self::I16(mut b)) => a.append(&mut b),
            (Self::I32(a), Self::I32(mut b)) => a.append(&mut b),
            (Self::I64(a), Self::I64(mut b)) => a.append(&mut b),
            (Self::F32(a), Self::F32(mut b)) => a.append(&mut b),
            (Self::F64(a), Self::F64(mut b)) => a.append(&mut b),
            (Self::Text(a), Self::Text(mut b)) => a.append(&mut b),
            (Self::Blob(a), Self::Blob(mut b)) => a.append(&mut b),
            (Self::I128(a), Self::I128(mut b)) => a.append(&mut b),
            (Self::Array(a), Self::Array(mut b)) => a.append(&mut b),
            (a, b) => {
                return Err(ColumnError::AppendMismatch {
                    expected: a.kind(),
                    actual: b.kind(),
                });
            }
        }
        Ok(())
    }

    /// A new column holding the rows at `indexes`, in that order.
    pub fn select(&self, indexes: &[usize]) -> Self {
        fn pick<T: Clone>(values: &[T], indexes: &[usize]) -> Vec<T> {
            indexes
                .iter()
                .filter_map(|&i| values.get(i).cloned())
                .collect()
        }
        match self {
            Self::I8(v) => Self::I8(pick(v, indexes)),
            Self::I16(v) => Self::I16(pick(v, indexes)),
            Self::I32(v) => Self::I32(pick(v, indexes)),
            Self::I64(v) => Self::I64(pick(v, indexes)),
            Self::F32(v) => Self::F32(pick(v, indexes)),
            Self::F64(v) => Self::F64(pick(v, indexes)),
            Self::Text(v) => Self::Text(pick(v, indexes)),
            Self::Blob(v) => Self::Blob(pick(v, indexes)),
            Self::I128(v) => Self::I128(pick(v, indexes)),
            Self::Array(v) => Self::Array(pick(v, indexes)),
        }
    }
}

/// Rows of a table stored column by column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnarBatch {
    columns: Vec<ColumnData>,
}

impl ColumnarBatch {
    /// Wrap pre-built columns, which must all have the same length.
    pub fn new(columns: Vec<ColumnData>) -> Result<Self, ColumnError> {
        if let Some(first) = columns.first() {
            if columns.iter().any(|c| c.len() != first.len()) {
                return Err(ColumnError::RaggedColumns(
                    columns.iter().map(ColumnData::len).collect(),
                ));
            }
        }
        Ok(Self { columns })
    }

    /// An empty batch laid out for `schema`.
    pub fn empty_for(schema: &Schema, capacity: usize) -> Result<Self, ColumnError> {
        let columns = schema
            .types()
            .map(|t| ColumnData::with_capacity(t, capacity))
            .collect::<Result<_, _>>()?;
        Ok(Self { columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(ColumnData::len).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<ColumnData> {
        self.columns
    }

    /// Append one row. On error the batch is left unchanged.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), ColumnError> {
        if row.len() != self.columns.len() {
            return Err(ColumnError::ColumnCount {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        for (column, cell) in self.columns.iter().zip(&row) {
            let fits = match (column, cell) {
                (ColumnData::Array(_), Cell::Array(_)) => true,
                (ColumnData::Array(_), _) | (_, Cell::Array(_)) => false,
                (column, cell) => column.storage() == cell_storage(cell),
            };
            if !fits {
                return Err(match column.storage() {
                    Some(expected) => ColumnError::StorageMismatch {
                        expected,
                        actual: cell.kind(),
                    },
                    None => ColumnError::AppendMismatch {
                        expected: column.kind(),
                        actual: cell.kind(),
                    },
                });
            }
        }
        for (column, cell) in self.columns.iter_mut().zip(row) {
            column.push(cell)?;
        }
        Ok(())
    }

    /// Move every row of `other` onto the end of this batch.
    pub fn append(&mut self, other: Self) -> Result<(), ColumnError> {
        if other.columns.is_empty() {
            return Ok(());
        }
        if self.columns.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.columns.len() != self.columns.len() {
            return Err(ColumnError::ColumnCount {
                expected: self.columns.len(),
                actual: other.columns.len(),
            });
        }
        for (a, b) in self.columns.iter().zip(&other.columns) {
            if a.kind() != b.kind() {
                return Err(ColumnError::AppendMismatch {
                    expected: a.kind(),
                    actual: b.kind(),
                });
            }
        }
        for (a, b) in self.columns.iter_mut().zip(other.columns) {
            a.append(b)?;
        }
        Ok(())
    }

    /// Take every row, leaving an empty batch with the same layout.
    pub fn take(&mut self) -> Self {
        let empty = self.columns.iter().map(ColumnData::empty_like).collect();
        Self {
            columns: std::mem::replace(&mut self.columns, empty),
        }
    }

    /// A new batch holding the rows at `indexes`, in that order.
    pub fn select(&self, indexes: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.select(indexes)).collect(),
        }
    }

    /// The cells of row `index`.
    pub fn row(&self, index: usize) -> Option<Vec<Cell>> {
        self.columns.iter().map(|c| c.cell(index)).collect()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnData> {
        self.columns.get(index)
    }
}

fn cell_storage(cell: &Cell) -> Option<Storage> {
    let storage = match cell {
        Cell::I8(_) => Storage::I8,
        Cell::I16(_) => Storage::I16,
        Cell::I32(_) => Storage::I32,
        Cell::I64(_) => Storage::I64,
        Cell::F32(_) => Storage::F32,
        Cell::F64(_) => Storage::F64,
        Cell::Text(_) => Storage::Text,
        Cell::Blob(_) => Storage::Blob,
        Cell::I128(_) => Storage::I128,
        Cell::Array(_) => return None,
    };
    Some(storage)
}
