//! Server data types, their categories and the column/schema definitions built from them.

use std::fmt::Display;

/// Type ids at or above this offset denote an array column of `id - ARRAY_TYPE_OFFSET`.
pub const ARRAY_TYPE_OFFSET: i32 = 64;

/// Largest scale accepted for each decimal width.
const MAX_DECIMAL32_SCALE: u32 = 9;
const MAX_DECIMAL64_SCALE: u32 = 18;
const MAX_DECIMAL128_SCALE: u32 = 38;

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum DataTypeError {
    #[error("unknown data type id {0}")]
    UnknownTypeId(i32),

    #[error("decimal scale {scale} is out of range for {data_type} (max {max})")]
    DecimalScale {
        data_type: DataType,
        scale: u32,
        max: u32,
    },

    #[error("{0} columns require a decimal scale")]
    MissingScale(DataType),
}

/// A data type as numbered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataType {
    Void = 0,
    Bool = 1,
    Char = 2,
    Short = 3,
    Int = 4,
    Long = 5,
    Date = 6,
    Month = 7,
    Time = 8,
    Minute = 9,
    Second = 10,
    Datetime = 11,
    Timestamp = 12,
    NanoTime = 13,
    NanoTimestamp = 14,
    Float = 15,
    Double = 16,
    Symbol = 17,
    String = 18,
    Uuid = 19,
    Any = 25,
    DateHour = 28,
    DateMinute = 29,
    Ip = 30,
    Int128 = 31,
    Blob = 32,
    Complex = 34,
    Point = 35,
    Duration = 36,
    Decimal32 = 37,
    Decimal64 = 38,
    Decimal128 = 39,
}

impl DataType {
    /// The server's numeric id for this type.
    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn category(self) -> Category {
        match self {
            Self::Void => Category::Nothing,
            Self::Bool => Category::Logical,
            Self::Char | Self::Short | Self::Int | Self::Long => Category::Integral,
            Self::Date
            | Self::Month
            | Self::Time
            | Self::Minute
            | Self::Second
            | Self::Datetime
            | Self::Timestamp
            | Self::NanoTime
            | Self::NanoTimestamp
            | Self::DateHour
            | Self::DateMinute => Category::Temporal,
            Self::Float | Self::Double | Self::Complex | Self::Point => Category::Floating,
            Self::Symbol | Self::String => Category::Literal,
            Self::Uuid | Self::Ip | Self::Int128 | Self::Blob => Category::Binary,
            Self::Decimal32 | Self::Decimal64 | Self::Decimal128 => Category::Denary,
            Self::Any | Self::Duration => Category::Mixed,
        }
    }

    /// How values of this type are laid out in a column, or `None` for types the writer cannot
    /// carry.
    pub fn storage(self) -> Option<Storage> {
        let storage = match self {
            Self::Bool | Self::Char => Storage::I8,
            Self::Short => Storage::I16,
            Self::Int
            | Self::Date
            | Self::Month
            | Self::Time
            | Self::Minute
            | Self::Second
            | Self::Datetime
            | Self::DateHour
            | Self::DateMinute
            | Self::Decimal32 => Storage::I32,
            Self::Long
            | Self::Timestamp
            | Self::NanoTime
            | Self::NanoTimestamp
            | Self::Decimal64 => Storage::I64,
            Self::Float => Storage::F32,
            Self::Double => Storage::F64,
            Self::Symbol | Self::String => Storage::Text,
            Self::Blob => Storage::Blob,
            Self::Uuid | Self::Ip | Self::Int128 | Self::Decimal128 => Storage::I128,
            Self::Void | Self::Any | Self::Complex | Self::Point | Self::Duration => return None,
        };
        Some(storage)
    }

    pub fn is_temporal(self) -> bool {
        self.category() == Category::Temporal
    }

    pub fn is_decimal(self) -> bool {
        self.category() == Category::Denary
    }

    fn max_decimal_scale(self) -> Option<u32> {
        match self {
            Self::Decimal32 => Some(MAX_DECIMAL32_SCALE),
            Self::Decimal64 => Some(MAX_DECIMAL64_SCALE),
            Self::Decimal128 => Some(MAX_DECIMAL128_SCALE),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Void => "VOID",
            Self::Bool => "BOOL",
            Self::Char => "CHAR",
            Self::Short => "SHORT",
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Date => "DATE",
            Self::Month => "MONTH",
            Self::Time => "TIME",
            Self::Minute => "MINUTE",
            Self::Second => "SECOND",
            Self::Datetime => "DATETIME",
            Self::Timestamp => "TIMESTAMP",
            Self::NanoTime => "NANOTIME",
            Self::NanoTimestamp => "NANOTIMESTAMP",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Symbol => "SYMBOL",
            Self::String => "STRING",
            Self::Uuid => "UUID",
            Self::Any => "ANY",
            Self::DateHour => "DATEHOUR",
            Self::DateMinute => "DATEMINUTE",
            Self::Ip => "IPADDR",
            Self::Int128 => "INT128",
            Self::Blob => "BLOB",
            Self::Complex => "COMPLEX",
            Self::Point => "POINT",
            Self::Duration => "DURATION",
            Self::Decimal32 => "DECIMAL32",
            Self::Decimal64 => "DECIMAL64",
            Self::Decimal128 => "DECIMAL128",
        }
    }
}

impl TryFrom<i32> for DataType {
    type Error = DataTypeError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        let data_type = match id {
            0 => Self::Void,
            1 => Self::Bool,
            2 => Self::Char,
            3 => Self::Short,
            4 => Self::Int,
            5 => Self::Long,
            6 => Self::Date,
            7 => Self::Month,
            8 => Self::Time,
            9 => Self::Minute,
            10 => Self::Second,
            11 => Self::Datetime,
            12 => Self::Timestamp,
            13 => Self::NanoTime,
            14 => Self::NanoTimestamp,
            15 => Self::Float,
            16 => Self::Double,
            17 => Self::Symbol,
            18 => Self::String,
            19 => Self::Uuid,
            25 => Self::Any,
            28 => Self::DateHour,
            29 => Self::DateMinute,
            30 => Self::Ip,
            31 => Self::Int128,
            32 => Self::Blob,
            34 => Self::Complex,
            35 => Self::Point,
            36 => Self::Duration,
            37 => Self::Decimal32,
            38 => Self::Decimal64,
            39 => Self::Decimal128,
            other => return Err(DataTypeError::UnknownTypeId(other)),
        };
        Ok(data_type)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Type categories; partition values are only comparable within one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Nothing,
    Logical,
    Integral,
    Floating,
    Temporal,
    Literal,
    Binary,
    Denary,
    Mixed,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Nothing => "NOTHING",
            Self::Logical => "LOGICAL",
            Self::Integral => "INTEGRAL",
            Self::Floating => "FLOATING",
            Self::Temporal => "TEMPORAL",
            Self::Literal => "LITERAL",
            Self::Binary => "BINARY",
            Self::Denary => "DENARY",
            Self::Mixed => "MIXED",
        };
        f.write_str(name)
    }
}

/// Physical layout of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    Blob,
    I128,
}

impl Display for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::I128 => "i128",
        };
        f.write_str(name)
    }
}

/// The declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnType {
    data_type: DataType,
    is_array: bool,
    scale: Option<u32>,
}

impl ColumnType {
    /// A scalar column of `data_type`. Decimal types need [`ColumnType::decimal`].
    pub fn scalar(data_type: DataType) -> Self {
        Self {
            data_type,
            is_array: false,
            scale: None,
        }
    }

    /// An array column whose elements are `data_type`.
    pub fn array(data_type: DataType) -> Self {
        Self {
            data_type,
            is_array: true,
            scale: None,
        }
    }

    /// A decimal column with the given scale.
    pub fn decimal(data_type: DataType, scale: u32) -> Result<Self, DataTypeError> {
        let Some(max) = data_type.max_decimal_scale() else {
            return Ok(Self::scalar(data_type));
        };
        if scale > max {
            return Err(DataTypeError::DecimalScale {
                data_type,
                scale,
                max,
            });
        }
        Ok(Self {
            data_type,
            is_array: false,
            scale: Some(scale),
        })
    }

    /// Build a column type from the id and extra (decimal scale) reported by the server.
    pub fn from_type_id(id: i32, scale: Option<u32>) -> Result<Self, DataTypeError> {
        let (base, is_array) = if id >= ARRAY_TYPE_OFFSET {
            (id - ARRAY_TYPE_OFFSET, true)
        } else {
            (id, false)
        };
        let data_type = DataType::try_from(base)?;
        let scale = match (data_type.max_decimal_scale(), scale) {
            (None, _) => None,
            (Some(max), Some(scale)) if scale <= max => Some(scale),
            (Some(max), Some(scale)) => {
                return Err(DataTypeError::DecimalScale {
                    data_type,
                    scale,
                    max,
                });
            }
            (Some(_), None) => return Err(DataTypeError::MissingScale(data_type)),
        };
        Ok(Self {
            data_type,
            is_array,
            scale,
        })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Decimal scale, `None` for non-decimal columns.
    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    /// The type of a single element: the column itself for scalar columns.
    pub fn element(&self) -> Self {
        Self {
            is_array: false,
            ..*self
        }
    }

    pub fn type_id(&self) -> i32 {
        if self.is_array {
            self.data_type.id() + ARRAY_TYPE_OFFSET
        } else {
            self.data_type.id()
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scale {
            Some(scale) => write!(f, "{}({scale})", self.data_type)?,
            None => write!(f, "{}", self.data_type)?,
        }
        if self.is_array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// A named column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// The ordered column definitions of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    /// Position of the column called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn types(&self) -> impl Iterator<Item = &ColumnType> {
        self.columns.iter().map(|c| &c.column_type)
    }
}

impl FromIterator<ColumnDef> for Schema {
    fn from_iter<T: IntoIterator<Item = ColumnDef>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
