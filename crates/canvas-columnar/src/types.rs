#![forbid(unsafe_code)]

use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

/// Largest magnitude up to which every integer is exactly representable as `f64`.
const MAX_EXACT_INTEGER: u128 = 1 << 53;

/// Logical type of a column, fixed once when the table is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Integers, floats and decimals.
    #[default]
    Number,
    String,
    Boolean,
    /// Lists, fixed-size lists and binary blobs.
    Array,
    /// Structs, dates/timestamps and all-null columns.
    Object,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Number => "number",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
            ColumnType::Array => "array",
            ColumnType::Object => "object",
        }
    }

    /// Infer a column type from its values: the first non-null value decides.
    ///
    /// Columns with no non-null values are `Object`.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        values
            .into_iter()
            .find(|v| !v.is_null())
            .map(Value::column_type)
            .unwrap_or(ColumnType::Object)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value.
///
/// Numbers are stored as [`OrderedFloat`] so values can be hashed and ordered; this is what lets
/// distinct-value scans and group-by use them as map keys directly.
///
/// Integers that `f64` cannot hold exactly are kept as [`Value::BigInt`]. Build integers through
/// [`Value::integer`] so every integer has exactly one representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(OrderedFloat<f64>),
    /// An integer with magnitude above 2^53.
    BigInt(i128),
    String(Arc<str>),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Array(Arc<[Value]>),
    /// Struct fields in schema order.
    Object(Arc<[(Arc<str>, Value)]>),
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(OrderedFloat(n))
    }

    /// `Number` when `f64` represents `n` exactly, `BigInt` otherwise.
    pub fn integer(n: i128) -> Self {
        if n.unsigned_abs() <= MAX_EXACT_INTEGER {
            Value::number(n as f64)
        } else {
            Value::BigInt(n)
        }
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value as a float. Big integers are rounded to the nearest `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            Value::BigInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The column type a column would get if this were its first non-null value.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Number(_) | Value::BigInt(_) => ColumnType::Number,
            Value::String(_) => ColumnType::String,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Array(_) => ColumnType::Array,
            Value::Null | Value::DateTime(_) | Value::Object(_) => ColumnType::Object,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::integer(i128::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::integer(i128::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => {
                let n = n.0;
                if n.is_nan() {
                    f.write_str("NaN")
                } else if n.is_infinite() {
                    f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
                } else {
                    write!(f, "{n}")
                }
            }
            Value::BigInt(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::DateTime(ms) => write!(f, "{ms}"),
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Object(fields) => {
                f.write_str("{")?;
                for (idx, (name, value)) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}
