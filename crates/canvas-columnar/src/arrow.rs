#![forbid(unsafe_code)]

//! Arrow IPC decoding.
//!
//! The host serializes tables as an Arrow IPC stream; the IPC file format (`ARROW1` magic) is
//! accepted as well. Column types are fixed once from the Arrow schema, and every cell is
//! converted to a [`Value`] up front so queries never inspect Arrow types.

use crate::table::{Column, Table, TableOptions};
use crate::types::{ColumnType, Value};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Date64Type, Decimal128Type, Float16Type, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, RecordBatch};
use arrow_ipc::reader::{FileReader, StreamReader};
use arrow_schema::{ArrowError, DataType, SchemaRef, TimeUnit};
use std::io::Cursor;
use std::sync::Arc;

const FILE_MAGIC: &[u8] = b"ARROW1";
const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed Arrow IPC buffer: {0}")]
    Arrow(#[source] Arc<ArrowError>),

    #[error("column {column} has unsupported Arrow type {data_type}")]
    UnsupportedType { column: String, data_type: DataType },
}

impl From<ArrowError> for DecodeError {
    fn from(err: ArrowError) -> Self {
        DecodeError::Arrow(Arc::new(err))
    }
}

/// Decode an Arrow IPC buffer with default [`TableOptions`].
pub fn decode_ipc(buffer: &[u8]) -> Result<Table, DecodeError> {
    decode_ipc_with_options(buffer, TableOptions::default())
}

/// Decode an Arrow IPC buffer (stream or file format).
///
/// An empty buffer is an empty table, not an error.
pub fn decode_ipc_with_options(buffer: &[u8], options: TableOptions) -> Result<Table, DecodeError> {
    if buffer.is_empty() {
        return Ok(Table::empty().with_options(options));
    }

    let (schema, batches) = if buffer.starts_with(FILE_MAGIC) {
        let reader = FileReader::try_new(Cursor::new(buffer), None)?;
        let schema = reader.schema();
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        (schema, batches)
    } else {
        let reader = StreamReader::try_new(buffer, None)?;
        let schema = reader.schema();
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        (schema, batches)
    };

    record_batches_to_table(&schema, &batches, options)
}

/// Convert already-decoded record batches into a [`Table`].
pub fn record_batches_to_table(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    options: TableOptions,
) -> Result<Table, DecodeError> {
    let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    let mut columns = Vec::with_capacity(schema.fields().len());

    for (idx, field) in schema.fields().iter().enumerate() {
        let column_type = column_type_for(field.data_type()).ok_or_else(|| {
            DecodeError::UnsupportedType {
                column: field.name().clone(),
                data_type: field.data_type().clone(),
            }
        })?;

        let mut values = Vec::with_capacity(total_rows);
        for batch in batches {
            values.extend(decode_array(batch.column(idx).as_ref(), field.name())?);
        }
        columns.push(Column::with_type(field.name().clone(), column_type, values));
    }

    Table::from_columns_with_options(columns, options).map_err(|err| {
        DecodeError::Arrow(Arc::new(ArrowError::InvalidArgumentError(err.to_string())))
    })
}

/// The column type an Arrow type decodes to, or `None` when it cannot be decoded.
pub fn column_type_for(data_type: &DataType) -> Option<ColumnType> {
    Some(match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _) => ColumnType::Number,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => ColumnType::String,
        DataType::Boolean => ColumnType::Boolean,
        DataType::List(_)
        | DataType::LargeList(_)
        | DataType::FixedSizeList(_, _)
        | DataType::Binary
        | DataType::LargeBinary => ColumnType::Array,
        DataType::Struct(_)
        | DataType::Date32
        | DataType::Date64
        | DataType::Timestamp(_, _)
        | DataType::Null => ColumnType::Object,
        DataType::Dictionary(_, value) => return column_type_for(value),
        _ => return None,
    })
}

macro_rules! numbers {
    ($array:expr, $ty:ty) => {{
        let array = $array.as_primitive::<$ty>();
        (0..array.len())
            .map(|row| {
                if array.is_null(row) {
                    Value::Null
                } else {
                    Value::number(array.value(row) as f64)
                }
            })
            .collect()
    }};
}

macro_rules! mapped {
    ($cast:expr, $map:expr) => {{
        let array = $cast;
        (0..array.len())
            .map(|row| {
                if array.is_null(row) {
                    Value::Null
                } else {
                    $map(array.value(row))
                }
            })
            .collect()
    }};
}

fn decode_array(array: &dyn Array, column: &str) -> Result<Vec<Value>, DecodeError> {
    let values: Vec<Value> = match array.data_type() {
        DataType::Null => vec![Value::Null; array.len()],
        DataType::Int8 => numbers!(array, Int8Type),
        DataType::Int16 => numbers!(array, Int16Type),
        DataType::Int32 => numbers!(array, Int32Type),
        DataType::Int64 => mapped!(array.as_primitive::<Int64Type>(), Value::from),
        DataType::UInt8 => numbers!(array, UInt8Type),
        DataType::UInt16 => numbers!(array, UInt16Type),
        DataType::UInt32 => numbers!(array, UInt32Type),
        DataType::UInt64 => mapped!(array.as_primitive::<UInt64Type>(), Value::from),
        DataType::Float32 => numbers!(array, Float32Type),
        DataType::Float64 => numbers!(array, Float64Type),
        DataType::Float16 => mapped!(array.as_primitive::<Float16Type>(), |v: half::f16| {
            Value::number(v.to_f64())
        }),
        DataType::Decimal128(_, scale) => {
            let divisor = 10f64.powi(i32::from(*scale));
            mapped!(array.as_primitive::<Decimal128Type>(), |v: i128| {
                Value::number(v as f64 / divisor)
            })
        }
        DataType::Utf8 => mapped!(array.as_string::<i32>(), Value::string),
        DataType::LargeUtf8 => mapped!(array.as_string::<i64>(), Value::string),
        DataType::Utf8View => mapped!(array.as_string_view(), Value::string),
        DataType::Boolean => mapped!(array.as_boolean(), Value::Boolean),
        DataType::Binary => mapped!(array.as_binary::<i32>(), bytes_value),
        DataType::LargeBinary => mapped!(array.as_binary::<i64>(), bytes_value),
        DataType::Date32 => mapped!(array.as_primitive::<Date32Type>(), |d: i32| {
            Value::DateTime(i64::from(d) * MS_PER_DAY)
        }),
        DataType::Date64 => mapped!(array.as_primitive::<Date64Type>(), Value::DateTime),
        DataType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => {
                mapped!(array.as_primitive::<TimestampSecondType>(), |v: i64| {
                    Value::DateTime(v.saturating_mul(1_000))
                })
            }
            TimeUnit::Millisecond => mapped!(
                array.as_primitive::<TimestampMillisecondType>(),
                Value::DateTime
            ),
            TimeUnit::Microsecond => {
                mapped!(array.as_primitive::<TimestampMicrosecondType>(), |v: i64| {
                    Value::DateTime(v.div_euclid(1_000))
                })
            }
            TimeUnit::Nanosecond => {
                mapped!(array.as_primitive::<TimestampNanosecondType>(), |v: i64| {
                    Value::DateTime(v.div_euclid(1_000_000))
                })
            }
        },
        DataType::List(_) => {
            let list = array.as_list::<i32>();
            nested(list.len(), |row| list.is_null(row), |row| list.value(row), column)?
        }
        DataType::LargeList(_) => {
            let list = array.as_list::<i64>();
            nested(list.len(), |row| list.is_null(row), |row| list.value(row), column)?
        }
        DataType::FixedSizeList(_, _) => {
            let list = array.as_fixed_size_list();
            nested(list.len(), |row| list.is_null(row), |row| list.value(row), column)?
        }
        DataType::Struct(fields) => {
            let array = array.as_struct();
            let children = array
                .columns()
                .iter()
                .map(|child| decode_array(child.as_ref(), column))
                .collect::<Result<Vec<_>, _>>()?;
            let names: Vec<Arc<str>> = fields.iter().map(|f| Arc::from(f.name().as_str())).collect();
            (0..array.len())
                .map(|row| {
                    if array.is_null(row) {
                        return Value::Null;
                    }
                    let fields: Vec<(Arc<str>, Value)> = names
                        .iter()
                        .zip(&children)
                        .map(|(name, values)| (name.clone(), values[row].clone()))
                        .collect();
                    Value::Object(fields.into())
                })
                .collect()
        }
        DataType::Dictionary(_, _) => {
            let dict = array.as_any_dictionary();
            let dictionary = decode_array(dict.values().as_ref(), column)?;
            let keys = dict.normalized_keys();
            keys.into_iter()
                .enumerate()
                .map(|(row, key)| {
                    if array.is_null(row) {
                        Value::Null
                    } else {
                        dictionary.get(key).cloned().unwrap_or(Value::Null)
                    }
                })
                .collect()
        }
        other => {
            return Err(DecodeError::UnsupportedType {
                column: column.to_owned(),
                data_type: other.clone(),
            })
        }
    };
    Ok(values)
}

fn bytes_value(bytes: &[u8]) -> Value {
    let items: Vec<Value> = bytes.iter().map(|&b| Value::number(f64::from(b))).collect();
    Value::Array(items.into())
}

fn nested(
    len: usize,
    is_null: impl Fn(usize) -> bool,
    value: impl Fn(usize) -> arrow_array::ArrayRef,
    column: &str,
) -> Result<Vec<Value>, DecodeError> {
    (0..len)
        .map(|row| {
            if is_null(row) {
                return Ok(Value::Null);
            }
            let items = decode_array(value(row).as_ref(), column)?;
            Ok(Value::Array(items.into()))
        })
        .collect()
}
