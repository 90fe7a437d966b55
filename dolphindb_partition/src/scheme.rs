//! Server-side partition schemes and the rule each uses to place a value in a partition.

use std::collections::BTreeMap;

use dolphindb_types::{Category, Cell, DataType, Storage, hash::hash_bucket, temporal};

#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error("a {0} partition scheme needs at least one value")]
    Empty(&'static str),

    #[error("a RANGE partition scheme needs at least two boundaries, got {0}")]
    TooFewBoundaries(usize),

    #[error("RANGE boundaries must be strictly increasing (boundary {0} is out of order)")]
    Unsorted(usize),

    #[error("a HASH partition scheme needs at least one bucket")]
    ZeroBuckets,

    #[error("{0} values cannot partition a table")]
    UnsupportedType(DataType),

    #[error("partition value {value} of a {scheme} scheme is not a {data_type} value")]
    InvalidValue {
        scheme: &'static str,
        data_type: DataType,
        value: String,
    },

    #[error("partition value {0} appears more than once")]
    DuplicateValue(String),

    #[error("a COMPOSITE partition scheme needs at least two levels, got {0}")]
    CompositeLevels(usize),

    #[error("COMPOSITE partition levels cannot themselves be composite")]
    NestedComposite,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("data category incompatible: {actual} value for a {expected} partition scheme")]
    IncompatibleCategory { expected: Category, actual: Category },

    #[error("can't convert type from {from} to {to}")]
    Cast { from: DataType, to: DataType },

    #[error("{value} is not in any partition of the {scheme} scheme")]
    NoPartition { scheme: &'static str, value: String },

    #[error("a {0} value cannot be used as a partition key")]
    UnsupportedValue(DataType),
}

/// A partition value normalised for ordering and lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PartitionKey {
    Int(i64),
    Int128(i128),
    Text(String),
}

impl PartitionKey {
    fn from_cell(cell: &Cell) -> Option<Self> {
        let key = match cell {
            Cell::I8(v) => Self::Int(i64::from(*v)),
            Cell::I16(v) => Self::Int(i64::from(*v)),
            Cell::I32(v) => Self::Int(i64::from(*v)),
            Cell::I64(v) => Self::Int(*v),
            Cell::I128(v) => Self::Int128(*v),
            Cell::Text(v) => Self::Text(v.clone()),
            Cell::F32(_) | Cell::F64(_) | Cell::Blob(_) | Cell::Array(_) => return None,
        };
        Some(key)
    }
}

fn check_type(data_type: DataType) -> Result<(), SchemeError> {
    match data_type.category() {
        Category::Integral | Category::Temporal | Category::Literal => Ok(()),
        Category::Binary if data_type != DataType::Blob => Ok(()),
        _ => Err(SchemeError::UnsupportedType(data_type)),
    }
}

fn keys_for(
    scheme: &'static str,
    data_type: DataType,
    cells: &[Cell],
) -> Result<Vec<PartitionKey>, SchemeError> {
    cells
        .iter()
        .map(|cell| {
            PartitionKey::from_cell(cell)
                .filter(|_| !cell.is_null())
                .ok_or_else(|| SchemeError::InvalidValue {
                    scheme,
                    data_type,
                    value: cell.to_string(),
                })
        })
        .collect()
}

/// VALUE partitioning: one partition per listed value.
#[derive(Debug, Clone)]
pub struct ValueScheme {
    data_type: DataType,
    positions: BTreeMap<PartitionKey, usize>,
}

impl ValueScheme {
    pub fn new(data_type: DataType, values: &[Cell]) -> Result<Self, SchemeError> {
        check_type(data_type)?;
        if values.is_empty() {
            return Err(SchemeError::Empty("VALUE"));
        }
        let mut positions = BTreeMap::new();
        for (position, key) in keys_for("VALUE", data_type, values)?.into_iter().enumerate() {
            if positions.insert(key, position).is_some() {
                return Err(SchemeError::DuplicateValue(values[position].to_string()));
            }
        }
        Ok(Self {
            data_type,
            positions,
        })
    }

    fn partition_of(&self, key: &PartitionKey) -> Option<usize> {
        self.positions.get(key).copied()
    }
}

/// RANGE partitioning: `n` sorted boundaries describe `n - 1` half-open intervals.
#[derive(Debug, Clone)]
pub struct RangeScheme {
    data_type: DataType,
    boundaries: Vec<PartitionKey>,
}

impl RangeScheme {
    pub fn new(data_type: DataType, boundaries: &[Cell]) -> Result<Self, SchemeError> {
        check_type(data_type)?;
        if boundaries.len() < 2 {
            return Err(SchemeError::TooFewBoundaries(boundaries.len()));
        }
        let boundaries = keys_for("RANGE", data_type, boundaries)?;
        if let Some(i) = boundaries.windows(2).position(|w| w[0] >= w[1]) {
            return Err(SchemeError::Unsorted(i + 1));
        }
        Ok(Self {
            data_type,
            boundaries,
        })
    }

    fn partition_of(&self, key: &PartitionKey) -> Option<usize> {
        // number of boundaries <= key; the interval index is one less
        let at_or_below = self.boundaries.partition_point(|b| b <= key);
        let index = at_or_below.checked_sub(1)?;
        (index < self.boundaries.len() - 1).then_some(index)
    }
}

/// HASH partitioning: the server's bucket function over a fixed number of buckets.
#[derive(Debug, Clone, Copy)]
pub struct HashScheme {
    data_type: DataType,
    buckets: usize,
}

impl HashScheme {
    pub fn new(data_type: DataType, buckets: usize) -> Result<Self, SchemeError> {
        check_type(data_type)?;
        if buckets == 0 {
            return Err(SchemeError::ZeroBuckets);
        }
        Ok(Self { data_type, buckets })
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }
}

/// LIST partitioning: each partition is an explicit group of values.
#[derive(Debug, Clone)]
pub struct ListScheme {
    data_type: DataType,
    groups: usize,
    group_of: BTreeMap<PartitionKey, usize>,
}

impl ListScheme {
    pub fn new(data_type: DataType, groups: &[Vec<Cell>]) -> Result<Self, SchemeError> {
        check_type(data_type)?;
        if groups.is_empty() || groups.iter().any(Vec::is_empty) {
            return Err(SchemeError::Empty("LIST"));
        }
        let mut group_of = BTreeMap::new();
        for (index, group) in groups.iter().enumerate() {
            for (key, cell) in keys_for("LIST", data_type, group)?.into_iter().zip(group) {
                if group_of.insert(key, index).is_some() {
                    return Err(SchemeError::DuplicateValue(cell.to_string()));
                }
            }
        }
        Ok(Self {
            data_type,
            groups: groups.len(),
            group_of,
        })
    }

    fn partition_of(&self, key: &PartitionKey) -> Option<usize> {
        self.group_of.get(key).copied()
    }
}

/// How the server distributes a table's rows over partitions.
#[derive(Debug, Clone)]
pub enum PartitionScheme {
    Value(ValueScheme),
    Range(RangeScheme),
    Hash(HashScheme),
    List(ListScheme),
    /// Nested levels, outermost first, one per partitioning column.
    Composite(Vec<PartitionScheme>),
}

impl PartitionScheme {
    pub fn composite(levels: Vec<Self>) -> Result<Self, SchemeError> {
        if levels.len() < 2 {
            return Err(SchemeError::CompositeLevels(levels.len()));
        }
        if levels.iter().any(|l| matches!(l, Self::Composite(_))) {
            return Err(SchemeError::NestedComposite);
        }
        Ok(Self::Composite(levels))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Value(_) => "VALUE",
            Self::Range(_) => "RANGE",
            Self::Hash(_) => "HASH",
            Self::List(_) => "LIST",
            Self::Composite(_) => "COMPO",
        }
    }

    /// The type partition values are compared as. `None` for composite schemes.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Value(s) => Some(s.data_type),
            Self::Range(s) => Some(s.data_type),
            Self::Hash(s) => Some(s.data_type),
            Self::List(s) => Some(s.data_type),
            Self::Composite(_) => None,
        }
    }

    /// Number of partitions; for composite schemes the product over all levels.
    pub fn partition_count(&self) -> usize {
        match self {
            Self::Value(s) => s.positions.len(),
            Self::Range(s) => s.boundaries.len() - 1,
            Self::Hash(s) => s.buckets,
            Self::List(s) => s.groups,
            Self::Composite(levels) => levels
                .iter()
                .map(Self::partition_count)
                .fold(1_usize, usize::saturating_mul),
        }
    }

    /// The scheme of one composite level; a non-composite scheme is its own only level.
    pub fn level(&self, index: usize) -> Option<&Self> {
        match self {
            Self::Composite(levels) => levels.get(index),
            scheme if index == 0 => Some(scheme),
            _ => None,
        }
    }

    pub fn levels(&self) -> usize {
        match self {
            Self::Composite(levels) => levels.len(),
            _ => 1,
        }
    }

    /// The partition index of `cell`, a non-null value of `value_type`.
    ///
    /// Temporal values of another temporal type are cast to the scheme's type first. Composite
    /// schemes must be resolved to a single [`level`](Self::level) before routing.
    pub fn partition_of(&self, cell: &Cell, value_type: DataType) -> Result<usize, RoutingError> {
        let Some(scheme_type) = self.data_type() else {
            return Err(RoutingError::UnsupportedValue(value_type));
        };
        if scheme_type.category() != value_type.category() {
            return Err(RoutingError::IncompatibleCategory {
                expected: scheme_type.category(),
                actual: value_type.category(),
            });
        }

        let (cell, effective_type) = if scheme_type.is_temporal() && scheme_type != value_type {
            (cast_cell(cell, value_type, scheme_type)?, scheme_type)
        } else {
            (cell.clone(), value_type)
        };

        let found = match self {
            Self::Hash(s) => {
                // unhashable values share the first bucket
                return Ok(hash_bucket(effective_type, &cell, s.buckets).unwrap_or(0));
            }
            Self::Value(s) => s.partition_of(&key_of(&cell, value_type)?),
            Self::Range(s) => s.partition_of(&key_of(&cell, value_type)?),
            Self::List(s) => s.partition_of(&key_of(&cell, value_type)?),
            Self::Composite(_) => return Err(RoutingError::UnsupportedValue(value_type)),
        };

        found.ok_or_else(|| RoutingError::NoPartition {
            scheme: self.name(),
            value: cell.to_string(),
        })
    }
}

fn key_of(cell: &Cell, value_type: DataType) -> Result<PartitionKey, RoutingError> {
    PartitionKey::from_cell(cell).ok_or(RoutingError::UnsupportedValue(value_type))
}

fn cast_cell(cell: &Cell, from: DataType, to: DataType) -> Result<Cell, RoutingError> {
    let err = || RoutingError::Cast { from, to };
    let raw = match cell {
        Cell::I32(v) => i64::from(*v),
        Cell::I64(v) => *v,
        _ => return Err(err()),
    };
    let cast = temporal::cast(from, to, raw).ok_or_else(err)?;
    match to.storage() {
        Some(Storage::I32) => {
            i32::try_from(cast).map(Cell::I32).map_err(|_| err())
        }
        Some(Storage::I64) => Ok(Cell::I64(cast)),
        _ => Err(err()),
    }
}
