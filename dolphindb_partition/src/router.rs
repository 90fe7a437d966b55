//! Mapping rows to writer workers.

use dolphindb_types::{Category, Cell, ColumnType, DataType, Schema, hash::hash_bucket};

use crate::{PartitionScheme, RoutingError, SchemeError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("the worker count must be greater than or equal to 1")]
    ZeroWorkers,

    #[error(
        "the worker count must be 1 for a table that is not partitioned inside a database, got {0}"
    )]
    DimensionTableParallelism(usize),

    #[error("a partition column must be specified when the worker count is greater than 1")]
    PartitionColumnRequired,

    #[error("the table has no column named {0}")]
    UnknownColumn(String),

    #[error("column {0} is not a partitioning column of the table")]
    NotPartitioningColumn(String),

    #[error("column {column} has a single partition and cannot spread rows over {workers} workers")]
    SinglePartition { column: String, workers: usize },

    #[error("column {column} of type {column_type} cannot be used to route rows")]
    UnsupportedColumnType {
        column: String,
        column_type: ColumnType,
    },

    #[error("column {column} of type {column_type} is incompatible with its {scheme} partition scheme")]
    IncompatibleColumn {
        column: String,
        column_type: ColumnType,
        scheme: &'static str,
    },
}

/// The partitioning of a table inside a database: the partitioning columns, outermost first, and
/// the scheme that applies to them.
#[derive(Debug, Clone)]
pub struct Partitioning {
    column_names: Vec<String>,
    scheme: PartitionScheme,
}

impl Partitioning {
    /// `column_names` must name one column per scheme level.
    pub fn new(
        column_names: impl IntoIterator<Item = impl Into<String>>,
        scheme: PartitionScheme,
    ) -> Result<Self, SchemeError> {
        let column_names: Vec<String> = column_names.into_iter().map(Into::into).collect();
        if column_names.len() != scheme.levels() {
            return Err(SchemeError::CompositeLevels(column_names.len()));
        }
        Ok(Self {
            column_names,
            scheme,
        })
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn scheme(&self) -> &PartitionScheme {
        &self.scheme
    }

    /// The scheme level that partitions `column`.
    fn level_for(&self, column: &str) -> Option<&PartitionScheme> {
        let index = self.column_names.iter().position(|c| c == column)?;
        self.scheme.level(index)
    }
}

/// What kind of table the writer appends to.
#[derive(Debug, Clone)]
pub enum TableKind {
    /// A partitioned table inside a database.
    Partitioned(Partitioning),
    /// A table inside a database that is not partitioned.
    Dimension,
    /// A shared in-memory table, outside any database.
    InMemory,
}

#[derive(Debug)]
enum Strategy {
    Single,
    Scheme {
        column: usize,
        value_type: DataType,
        scheme: PartitionScheme,
    },
    Hash {
        column: usize,
        value_type: DataType,
    },
}

/// Maps each row to the worker that writes it.
///
/// Rows whose partition value lands in the same server partition always map to the same worker,
/// so that a partition is only ever written through one connection and its rows arrive in
/// insertion order. The mapping is fixed when the router is built.
#[derive(Debug)]
pub struct PartitionRouter {
    worker_count: usize,
    strategy: Strategy,
}

impl PartitionRouter {
    pub fn new(
        schema: &Schema,
        kind: &TableKind,
        partition_column: Option<&str>,
        worker_count: usize,
    ) -> Result<Self, RouterError> {
        if worker_count == 0 {
            return Err(RouterError::ZeroWorkers);
        }
        if let Some(name) = partition_column {
            if schema.index_of(name).is_none() {
                return Err(RouterError::UnknownColumn(name.to_string()));
            }
        }

        let strategy = match kind {
            TableKind::Dimension if worker_count > 1 => {
                return Err(RouterError::DimensionTableParallelism(worker_count));
            }
            TableKind::Dimension => Strategy::Single,
            TableKind::InMemory => match (partition_column, worker_count) {
                (_, 1) => Strategy::Single,
                (None, _) => return Err(RouterError::PartitionColumnRequired),
                (Some(name), _) => {
                    let (column, column_type) = routable_column(schema, name)?;
                    Strategy::Hash {
                        column,
                        value_type: column_type.data_type(),
                    }
                }
            },
            TableKind::Partitioned(partitioning) => match partition_column {
                None if worker_count > 1 => return Err(RouterError::PartitionColumnRequired),
                None => Strategy::Single,
                Some(name) => {
                    let (column, column_type) = routable_column(schema, name)?;
                    let scheme = partitioning
                        .level_for(name)
                        .ok_or_else(|| RouterError::NotPartitioningColumn(name.to_string()))?;
                    if scheme
                        .data_type()
                        .is_some_and(|t| t.category() != column_type.data_type().category())
                    {
                        return Err(RouterError::IncompatibleColumn {
                            column: name.to_string(),
                            column_type,
                            scheme: scheme.name(),
                        });
                    }
                    if worker_count == 1 {
                        Strategy::Single
                    } else if scheme.partition_count() <= 1 {
                        return Err(RouterError::SinglePartition {
                            column: name.to_string(),
                            workers: worker_count,
                        });
                    } else {
                        Strategy::Scheme {
                            column,
                            value_type: column_type.data_type(),
                            scheme: scheme.clone(),
                        }
                    }
                }
            },
        };

        Ok(Self {
            worker_count,
            strategy,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Index of the column rows are routed by, if any.
    pub fn column(&self) -> Option<usize> {
        match &self.strategy {
            Strategy::Single => None,
            Strategy::Scheme { column, .. } | Strategy::Hash { column, .. } => Some(*column),
        }
    }

    /// The worker for a checked row.
    pub fn route(&self, row: &[Cell]) -> Result<usize, RoutingError> {
        match self.column().and_then(|c| row.get(c)) {
            Some(cell) => self.route_value(cell),
            None => Ok(0),
        }
    }

    /// The worker for a partition column value. Null values go to the first worker.
    pub fn route_value(&self, cell: &Cell) -> Result<usize, RoutingError> {
        if cell.is_null() {
            return Ok(0);
        }
        let worker = match &self.strategy {
            Strategy::Single => 0,
            Strategy::Scheme {
                value_type, scheme, ..
            } => scheme.partition_of(cell, *value_type)? % self.worker_count,
            Strategy::Hash { value_type, .. } => {
                hash_bucket(*value_type, cell, self.worker_count).unwrap_or(0)
            }
        };
        Ok(worker)
    }
}

fn routable_column(schema: &Schema, name: &str) -> Result<(usize, ColumnType), RouterError> {
    let index = schema
        .index_of(name)
        .ok_or_else(|| RouterError::UnknownColumn(name.to_string()))?;
    let column_type = schema.columns()[index].column_type;
    let routable = !column_type.is_array()
        && match column_type.data_type().category() {
            Category::Integral | Category::Temporal | Category::Literal => true,
            Category::Binary => column_type.data_type() != DataType::Blob,
            _ => false,
        };
    if !routable {
        return Err(RouterError::UnsupportedColumnType {
            column: name.to_string(),
            column_type,
        });
    }
    Ok((index, column_type))
}

#[cfg(test)]
mod tests {
    use dolphindb_types::ColumnDef;

    use super::*;
    use crate::{HashScheme, ValueScheme};

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("sym", ColumnType::scalar(DataType::Symbol)),
            ColumnDef::new("id", ColumnType::scalar(DataType::Int)),
            ColumnDef::new("price", ColumnType::scalar(DataType::Double)),
        ])
    }

    fn hashed_by_id(buckets: usize) -> TableKind {
        let scheme = PartitionScheme::Hash(HashScheme::new(DataType::Int, buckets).unwrap());
        TableKind::Partitioned(Partitioning::new(["id"], scheme).unwrap())
    }

    #[test]
    fn validation() {
        let schema = schema();
        let kind = hashed_by_id(4);
        assert!(matches!(
            PartitionRouter::new(&schema, &kind, Some("id"), 0),
            Err(RouterError::ZeroWorkers)
        ));
        assert!(matches!(
            PartitionRouter::new(&schema, &kind, None, 2),
            Err(RouterError::PartitionColumnRequired)
        ));
        assert!(matches!(
            PartitionRouter::new(&schema, &kind, Some("qty"), 2),
            Err(RouterError::UnknownColumn(c)) if c == "qty"
        ));
        assert!(matches!(
            PartitionRouter::new(&schema, &kind, Some("sym"), 2),
            Err(RouterError::NotPartitioningColumn(c)) if c == "sym"
        ));
        assert!(matches!(
            PartitionRouter::new(&schema, &TableKind::Dimension, None, 3),
            Err(RouterError::DimensionTableParallelism(3))
        ));
        assert!(matches!(
            PartitionRouter::new(&schema, &hashed_by_id(1), Some("id"), 2),
            Err(RouterError::SinglePartition { workers: 2, .. })
        ));
        assert!(matches!(
            PartitionRouter::new(&schema, &TableKind::InMemory, Some("price"), 2),
            Err(RouterError::UnsupportedColumnType { .. })
        ));
    }

    #[test]
    fn partition_column_must_exist_whatever_the_table_kind() {
        for kind in [TableKind::Dimension, TableKind::InMemory, hashed_by_id(4)] {
            assert!(matches!(
                PartitionRouter::new(&schema(), &kind, Some("no_such_column"), 1),
                Err(RouterError::UnknownColumn(c)) if c == "no_such_column"
            ));
        }
        // a single worker needs no routable type
        let router =
            PartitionRouter::new(&schema(), &TableKind::Dimension, Some("price"), 1).unwrap();
        assert_eq!(router.column(), None);
    }

    #[test]
    fn incompatible_scheme_is_rejected_up_front() {
        let scheme = PartitionScheme::Value(
            ValueScheme::new(DataType::Symbol, &[Cell::Text("a".into()), Cell::Text("b".into())])
                .unwrap(),
        );
        let kind = TableKind::Partitioned(Partitioning::new(["id"], scheme).unwrap());
        assert!(matches!(
            PartitionRouter::new(&schema(), &kind, Some("id"), 2),
            Err(RouterError::IncompatibleColumn { scheme: "VALUE", .. })
        ));
    }

    #[test]
    fn single_worker_routes_everything_to_zero() {
        let router = PartitionRouter::new(&schema(), &TableKind::Dimension, None, 1).unwrap();
        assert_eq!(router.column(), None);
        let row = [Cell::Text("a".into()), Cell::I32(7), Cell::F64(1.0)];
        assert_eq!(router.route(&row), Ok(0));
    }

    #[test]
    fn partition_index_modulo_worker_count() {
        let router = PartitionRouter::new(&schema(), &hashed_by_id(6), Some("id"), 4).unwrap();
        assert_eq!(router.column(), Some(1));
        for id in 0..24 {
            let expected = (id as usize % 6) % 4;
            assert_eq!(router.route_value(&Cell::I32(id)), Ok(expected), "id {id}");
        }
        assert_eq!(router.route_value(&Cell::I32(i32::MIN)), Ok(0));
    }

    #[test]
    fn in_memory_tables_hash_by_worker_count() {
        let router =
            PartitionRouter::new(&schema(), &TableKind::InMemory, Some("id"), 3).unwrap();
        assert_eq!(router.route_value(&Cell::I32(7)), Ok(1));
        assert_eq!(router.route_value(&Cell::I32(-12)), Ok((4_294_967_284_usize) % 3));
        assert!(matches!(
            PartitionRouter::new(&schema(), &TableKind::InMemory, None, 3),
            Err(RouterError::PartitionColumnRequired)
        ));
    }

    #[test]
    fn composite_routes_by_the_configured_level() {
        let outer = PartitionScheme::Value(
            ValueScheme::new(DataType::Symbol, &[Cell::Text("a".into()), Cell::Text("b".into())])
                .unwrap(),
        );
        let inner = PartitionScheme::Hash(HashScheme::new(DataType::Int, 8).unwrap());
        let scheme = PartitionScheme::composite(vec![outer, inner]).unwrap();
        let kind = TableKind::Partitioned(Partitioning::new(["sym", "id"], scheme).unwrap());

        let by_sym = PartitionRouter::new(&schema(), &kind, Some("sym"), 2).unwrap();
        assert_eq!(by_sym.route_value(&Cell::Text("b".into())), Ok(1));
        assert!(by_sym.route_value(&Cell::Text("c".into())).is_err());

        let by_id = PartitionRouter::new(&schema(), &kind, Some("id"), 3).unwrap();
        assert_eq!(by_id.route_value(&Cell::I32(13)), Ok(5 % 3));
    }
}
