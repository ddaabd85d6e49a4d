//! Deterministic mapping from DuckDB type strings to Arrow types, and the
//! fixed shape of the `column_statistics` reply batch.

use std::sync::Arc;

use arrow::array::{new_null_array, ArrayRef, BooleanArray, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};

use crate::catalog::ColumnStats;
use crate::error::AirportError;

/// Map a DuckDB type string onto the Arrow type used on the wire.
///
/// The accepted set is closed; anything else is an invalid argument.
pub fn duckdb_type_to_arrow(name: &str) -> Result<DataType, AirportError> {
    let arrow_type = match name.trim().to_uppercase().as_str() {
        "BOOLEAN" | "BOOL" => DataType::Boolean,
        "TINYINT" => DataType::Int8,
        "SMALLINT" => DataType::Int16,
        "INTEGER" | "INT" => DataType::Int32,
        "BIGINT" => DataType::Int64,
        "UTINYINT" => DataType::UInt8,
        "USMALLINT" => DataType::UInt16,
        "UINTEGER" => DataType::UInt32,
        "UBIGINT" => DataType::UInt64,
        "FLOAT" | "REAL" => DataType::Float32,
        "DOUBLE" => DataType::Float64,
        "VARCHAR" | "TEXT" | "STRING" => DataType::Utf8,
        "BLOB" | "BYTEA" => DataType::Binary,
        "DATE" => DataType::Date32,
        "TIMESTAMP" => DataType::Timestamp(TimeUnit::Microsecond, None),
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => {
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        }
        other => {
            return Err(AirportError::invalid_argument(format!(
                "unsupported DuckDB type '{other}'"
            )))
        }
    };
    Ok(arrow_type)
}

/// Schema of the single-row statistics reply: `min`/`max` are typed to the
/// inspected column, everything else is fixed.
pub fn column_stats_schema(column_type: &DataType) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("has_not_null", DataType::Boolean, true),
        Field::new("has_null", DataType::Boolean, true),
        Field::new("distinct_count", DataType::Int64, true),
        Field::new("min", column_type.clone(), true),
        Field::new("max", column_type.clone(), true),
        Field::new("max_string_length", DataType::Int64, true),
        Field::new("contains_unicode", DataType::Boolean, true),
    ]))
}

/// Build the single-row reply batch for `column_statistics`.
pub fn column_stats_batch(
    column_type: &DataType,
    stats: &ColumnStats,
) -> Result<RecordBatch, AirportError> {
    let schema = column_stats_schema(column_type);

    let min = typed_stat_array(column_type, &stats.min, "min")?;
    let max = typed_stat_array(column_type, &stats.max, "max")?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(BooleanArray::from(vec![stats.has_not_null])),
        Arc::new(BooleanArray::from(vec![stats.has_null])),
        Arc::new(Int64Array::from(vec![stats.distinct_count])),
        min,
        max,
        Arc::new(Int64Array::from(vec![stats.max_string_length])),
        Arc::new(BooleanArray::from(vec![stats.contains_unicode])),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn typed_stat_array(
    column_type: &DataType,
    value: &Option<ArrayRef>,
    label: &str,
) -> Result<ArrayRef, AirportError> {
    match value {
        None => Ok(new_null_array(column_type, 1)),
        Some(array) => {
            if array.data_type() != column_type {
                return Err(AirportError::internal(format!(
                    "statistics {label} has type {} but the column is {}",
                    array.data_type(),
                    column_type
                )));
            }
            if array.len() != 1 {
                return Err(AirportError::internal(format!(
                    "statistics {label} must be a single value, got {} rows",
                    array.len()
                )));
            }
            Ok(Arc::clone(array))
        }
    }
}
