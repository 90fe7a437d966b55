//! The DolphinDB value system as the writer sees it.
//!
//! Applications describe a row as a list of [`Value`]s. Once a value has been checked against the
//! declared [`ColumnType`] of its column it becomes a [`Cell`] in the column's storage layout,
//! and cells are accumulated column by column in a [`ColumnarBatch`].

mod column;
mod data_type;
pub mod hash;
pub mod temporal;
mod value;

pub use column::{Cell, ColumnData, ColumnError, ColumnarBatch};
pub use data_type::{
    ARRAY_TYPE_OFFSET, Category, ColumnDef, ColumnType, DataType, DataTypeError, Schema, Storage,
};
pub use value::{Decimal, Value};
