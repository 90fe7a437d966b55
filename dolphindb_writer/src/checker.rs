//! Converting application values into the storage cells of their declared column types.

use std::{net::IpAddr, sync::Arc};

use dolphindb_types::{
    Cell, ColumnData, ColumnType, ColumnarBatch, DataType, Decimal, Schema, Value, temporal,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("row has {actual} values but the table has {expected} columns")]
    Arity { expected: usize, actual: usize },

    #[error("column {column} expects {expected} for type {declared}, got {actual}")]
    TypeMismatch {
        column: usize,
        expected: &'static str,
        declared: ColumnType,
        actual: &'static str,
    },

    #[error("value {value} of column {column} is out of range for type {declared}")]
    OutOfRange {
        column: usize,
        declared: ColumnType,
        value: String,
    },

    #[error("batch has {actual} columns but the table has {expected}")]
    ColumnCount { expected: usize, actual: usize },

    #[error("column {column} of the batch is not laid out as {declared}")]
    ColumnStorage { column: usize, declared: ColumnType },

    #[error("column {column} of the batch has {actual} rows, expected {expected}")]
    ColumnLength {
        column: usize,
        expected: usize,
        actual: usize,
    },
}

/// Checks rows and batches against a table schema.
#[derive(Debug, Clone)]
pub struct RowTypeChecker {
    schema: Arc<Schema>,
}

impl RowTypeChecker {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Convert one row, value by value, into the cells of the table's columns.
    ///
    /// Fails on the first value whose representation does not match its column; nothing is
    /// converted when the row has the wrong number of values.
    pub fn check_row(&self, row: Vec<Value>) -> Result<Vec<Cell>, TypeError> {
        if row.len() != self.schema.len() {
            return Err(TypeError::Arity {
                expected: self.schema.len(),
                actual: row.len(),
            });
        }
        row.into_iter()
            .zip(self.schema.types())
            .enumerate()
            .map(|(column, (value, column_type))| convert(column, column_type, value))
            .collect()
    }

    /// Check that a pre-shaped batch can be appended to the table as is.
    pub fn check_batch(&self, batch: &ColumnarBatch) -> Result<(), TypeError> {
        if batch.num_columns() != self.schema.len() {
            return Err(TypeError::ColumnCount {
                expected: self.schema.len(),
                actual: batch.num_columns(),
            });
        }
        let expected = batch.num_rows();
        for (column, (data, column_type)) in
            batch.columns().iter().zip(self.schema.types()).enumerate()
        {
            if !data.matches(column_type) || !array_elements_match(data, column_type) {
                return Err(TypeError::ColumnStorage {
                    column,
                    declared: *column_type,
                });
            }
            if data.len() != expected {
                return Err(TypeError::ColumnLength {
                    column,
                    expected,
                    actual: data.len(),
                });
            }
        }
        Ok(())
    }
}

fn array_elements_match(data: &ColumnData, column_type: &ColumnType) -> bool {
    match data {
        ColumnData::Array(rows) => {
            let element = column_type.element();
            rows.iter()
                .flatten()
                .all(|values| values.matches(&element))
        }
        _ => true,
    }
}

fn convert(column: usize, column_type: &ColumnType, value: Value) -> Result<Cell, TypeError> {
    if !column_type.is_array() {
        return convert_scalar(column, column_type, value);
    }
    match value {
        Value::Null => Ok(Cell::Array(None)),
        Value::Array(values) => {
            let element = column_type.element();
            let mismatch = || TypeError::TypeMismatch {
                column,
                expected: "array of values",
                declared: *column_type,
                actual: "array",
            };
            let mut data =
                ColumnData::with_capacity(&element, values.len()).map_err(|_| mismatch())?;
            for value in values {
                let cell = convert_scalar(column, &element, value)?;
                data.push(cell).map_err(|_| mismatch())?;
            }
            Ok(Cell::Array(Some(data)))
        }
        other => Err(TypeError::TypeMismatch {
            column,
            expected: "array",
            declared: *column_type,
            actual: other.kind(),
        }),
    }
}

fn convert_scalar(column: usize, column_type: &ColumnType, value: Value) -> Result<Cell, TypeError> {
    let data_type = column_type.data_type();

    if value.is_null() {
        return Cell::null_for(column_type).ok_or(TypeError::TypeMismatch {
            column,
            expected: "a storable type",
            declared: *column_type,
            actual: value.kind(),
        });
    }

    let mismatch = |expected: &'static str, value: &Value| TypeError::TypeMismatch {
        column,
        expected,
        declared: *column_type,
        actual: value.kind(),
    };
    let out_of_range = |value: String| TypeError::OutOfRange {
        column,
        declared: *column_type,
        value,
    };

    let cell = match (data_type, value) {
        (DataType::Bool, Value::Bool(v)) => Cell::I8(i8::from(v)),
        (DataType::Char, Value::Char(v)) => Cell::I8(v),
        (DataType::Short, Value::Short(v)) => Cell::I16(v),
        (DataType::Int, Value::Int(v)) => Cell::I32(v),
        (DataType::Long, Value::Long(v)) => Cell::I64(v),
        (DataType::Float, Value::Float(v)) => Cell::F32(v),
        (DataType::Double, Value::Double(v)) => Cell::F64(v),
        (DataType::Symbol | DataType::String, Value::String(v)) => Cell::Text(v),
        (DataType::Blob, Value::Blob(v)) => Cell::Blob(v),
        (
            DataType::Date
            | DataType::Month
            | DataType::Time
            | DataType::Minute
            | DataType::Second
            | DataType::Datetime
            | DataType::DateHour
            | DataType::DateMinute,
            Value::Temporal(v),
        ) => {
            let encoded = temporal::encode(data_type, &v)
                .and_then(|e| i32::try_from(e).ok())
                .ok_or_else(|| out_of_range(v.to_string()))?;
            Cell::I32(encoded)
        }
        (
            DataType::Timestamp | DataType::NanoTime | DataType::NanoTimestamp,
            Value::Temporal(v),
        ) => Cell::I64(temporal::encode(data_type, &v).ok_or_else(|| out_of_range(v.to_string()))?),
        (DataType::Uuid, Value::Uuid(v)) => Cell::I128(v.as_u128() as i128),
        (DataType::Ip, Value::Ip(IpAddr::V4(v))) => Cell::I128(i128::from(u32::from(v))),
        (DataType::Ip, Value::Ip(IpAddr::V6(v))) => Cell::I128(u128::from(v) as i128),
        (DataType::Int128, Value::Int128(v)) => Cell::I128(v),
        (DataType::Decimal32 | DataType::Decimal64 | DataType::Decimal128, Value::Decimal(v)) => {
            decimal_cell(data_type, column_type.scale().unwrap_or(0), v)
                .ok_or_else(|| out_of_range(v.to_string()))?
        }
        (_, other) => return Err(mismatch(expected_representation(data_type), &other)),
    };
    Ok(cell)
}

/// Rescale `value` to `scale` and fit it into the storage of `data_type`, keeping clear of the
/// null sentinel.
fn decimal_cell(data_type: DataType, scale: u32, value: Decimal) -> Option<Cell> {
    let unscaled = value.rescale(scale)?;
    let cell = match data_type {
        DataType::Decimal32 => Cell::I32(i32::try_from(unscaled).ok().filter(|v| *v != i32::MIN)?),
        DataType::Decimal64 => Cell::I64(i64::try_from(unscaled).ok().filter(|v| *v != i64::MIN)?),
        DataType::Decimal128 => Cell::I128(Some(unscaled).filter(|v| *v != i128::MIN)?),
        _ => return None,
    };
    Some(cell)
}

fn expected_representation(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Bool => "bool",
        DataType::Char => "char",
        DataType::Short => "short",
        DataType::Int => "int",
        DataType::Long => "long",
        DataType::Float => "float",
        DataType::Double => "double",
        DataType::Symbol | DataType::String => "string",
        DataType::Blob => "blob",
        DataType::Uuid => "uuid",
        DataType::Ip => "ip address",
        DataType::Int128 => "int128",
        DataType::Decimal32 | DataType::Decimal64 | DataType::Decimal128 => "decimal",
        t if t.is_temporal() => "temporal",
        _ => "a storable type",
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use dolphindb_types::ColumnDef;

    fn checker(columns: Vec<(&str, ColumnType)>) -> RowTypeChecker {
        RowTypeChecker::new(Arc::new(Schema::new(
            columns
                .into_iter()
                .map(|(name, t)| ColumnDef::new(name, t))
                .collect(),
        )))
    }

    fn scalar(data_type: DataType) -> ColumnType {
        ColumnType::scalar(data_type)
    }

    #[test]
    fn arity_is_checked_first() {
        let checker = checker(vec![("a", scalar(DataType::Int)), ("b", scalar(DataType::Int))]);
        assert_eq!(
            checker.check_row(vec![Value::String("not even an int".into())]),
            Err(TypeError::Arity {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn converts_each_representation() {
        let ts = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_milli_opt(13, 45, 30, 123)
            .unwrap();
        let checker = checker(vec![
            ("flag", scalar(DataType::Bool)),
            ("sym", scalar(DataType::Symbol)),
            ("day", scalar(DataType::Date)),
            ("month", scalar(DataType::Month)),
            ("ts", scalar(DataType::Timestamp)),
            ("ip4", scalar(DataType::Ip)),
            ("ip6", scalar(DataType::Ip)),
            ("price", ColumnType::decimal(DataType::Decimal64, 2).unwrap()),
            ("qty", scalar(DataType::Long)),
        ]);
        let cells = checker
            .check_row(vec![
                Value::Bool(true),
                Value::from("IBM"),
                Value::Temporal(ts),
                Value::Temporal(ts),
                Value::Temporal(ts),
                Value::from(Ipv4Addr::new(192, 168, 1, 1)),
                Value::from(Ipv6Addr::LOCALHOST),
                Value::Decimal(Decimal::new(123_456, 4)),
                Value::Null,
            ])
            .unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::I8(1),
                Cell::Text("IBM".into()),
                Cell::I32(18_993),
                Cell::I32(24_264),
                Cell::I64(1_641_044_730_123),
                Cell::I128(0xc0a8_0101),
                Cell::I128(1),
                Cell::I64(1_234),
                Cell::I64(i64::MIN),
            ]
        );
    }

    #[test]
    fn mismatches_name_the_column_and_type() {
        let checker = checker(vec![("id", scalar(DataType::Int)), ("sym", scalar(DataType::Symbol))]);
        assert_eq!(
            checker.check_row(vec![Value::Int(1), Value::Int(2)]),
            Err(TypeError::TypeMismatch {
                column: 1,
                expected: "string",
                declared: scalar(DataType::Symbol),
                actual: "int",
            })
        );
        assert!(matches!(
            checker.check_row(vec![Value::Long(1), Value::from("a")]),
            Err(TypeError::TypeMismatch { column: 0, .. })
        ));
    }

    #[test]
    fn out_of_range_values() {
        let far = NaiveDate::from_ymd_opt(2200, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let checker = checker(vec![
            ("t", scalar(DataType::Datetime)),
            ("d", ColumnType::decimal(DataType::Decimal32, 4).unwrap()),
        ]);
        assert!(matches!(
            checker.check_row(vec![Value::Temporal(far), Value::Null]),
            Err(TypeError::OutOfRange { column: 0, .. })
        ));
        assert!(matches!(
            checker.check_row(vec![Value::Null, Value::Decimal(Decimal::new(1_000_000, 0))]),
            Err(TypeError::OutOfRange { column: 1, .. })
        ));
    }

    #[test]
    fn decimals_finer_than_any_scale_truncate_to_zero() {
        let checker = checker(vec![("d", ColumnType::decimal(DataType::Decimal64, 4).unwrap())]);
        assert_eq!(
            checker.check_row(vec![Value::Decimal(Decimal::new(123_456_789, 40))]),
            Ok(vec![Cell::I64(0)])
        );
    }

    #[test]
    fn array_columns() {
        let checker = checker(vec![("ticks", ColumnType::array(DataType::Int))]);
        assert_eq!(
            checker.check_row(vec![Value::Array(vec![Value::Int(1), Value::Null])]),
            Ok(vec![Cell::Array(Some(ColumnData::I32(vec![1, i32::MIN])))])
        );
        assert_eq!(
            checker.check_row(vec![Value::Null]),
            Ok(vec![Cell::Array(None)])
        );
        assert_eq!(
            checker.check_row(vec![Value::Array(vec![])]),
            Ok(vec![Cell::Array(Some(ColumnData::I32(vec![])))])
        );
        assert!(matches!(
            checker.check_row(vec![Value::Int(1)]),
            Err(TypeError::TypeMismatch { expected: "array", .. })
        ));
        assert!(matches!(
            checker.check_row(vec![Value::Array(vec![Value::Long(1)])]),
            Err(TypeError::TypeMismatch { expected: "int", .. })
        ));
    }

    #[test]
    fn batches() {
        let checker = checker(vec![
            ("id", scalar(DataType::Int)),
            ("ts", scalar(DataType::Timestamp)),
        ]);
        let good = ColumnarBatch::new(vec![ColumnData::I32(vec![1]), ColumnData::I64(vec![2])])
            .unwrap();
        assert_eq!(checker.check_batch(&good), Ok(()));

        let narrow = ColumnarBatch::new(vec![ColumnData::I32(vec![1]), ColumnData::I32(vec![2])])
            .unwrap();
        assert_eq!(
            checker.check_batch(&narrow),
            Err(TypeError::ColumnStorage {
                column: 1,
                declared: scalar(DataType::Timestamp)
            })
        );

        let short = ColumnarBatch::new(vec![ColumnData::I32(vec![1])]).unwrap();
        assert_eq!(
            checker.check_batch(&short),
            Err(TypeError::ColumnCount {
                expected: 2,
                actual: 1
            })
        );
    }

    proptest::proptest! {
        #[test]
        fn decimals_rescale_by_truncation(unscaled in -1_000_000_000_i64..1_000_000_000, scale in 0_u32..8) {
            let checker = checker(vec![("d", ColumnType::decimal(DataType::Decimal64, 4).unwrap())]);
            let cells = checker
                .check_row(vec![Value::Decimal(Decimal::new(i128::from(unscaled), scale))])
                .unwrap();
            let expected = if scale <= 4 {
                unscaled * 10_i64.pow(4 - scale)
            } else {
                unscaled / 10_i64.pow(scale - 4)
            };
            proptest::prop_assert_eq!(cells, vec![Cell::I64(expected)]);
        }
    }
}
