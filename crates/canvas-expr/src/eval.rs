//! Compilation and evaluation of filter expressions.
//!
//! An [`Expr`] is compiled against a table before any row is visited: column names are resolved to
//! indices and function names/arity are checked, so those mistakes surface as errors even on an
//! empty table. What remains at evaluation time is type errors from functions that require strings
//! or numbers.

use crate::parser::{parse, BinaryOp, Expr, LogicalOp, UnaryOp, MAX_NESTING_DEPTH};
use canvas_columnar::{Table, Value};
use log::trace;
use std::cmp::Ordering;
use std::sync::Arc;

pub type ExprResult<T> = Result<T, ExprError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unknown function: op.{0}")]
    UnknownFunction(String),

    #[error("op.{function} expects {expected} argument(s), got {actual}")]
    Arity {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("type error: {0}")]
    Type(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Function {
    Includes,
    StartsWith,
    EndsWith,
    Lower,
    Upper,
    Trim,
    Length,
    Abs,
    Round,
    Floor,
    Ceil,
    IsNan,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "includes" => Function::Includes,
            "startswith" => Function::StartsWith,
            "endswith" => Function::EndsWith,
            "lower" => Function::Lower,
            "upper" => Function::Upper,
            "trim" => Function::Trim,
            "length" => Function::Length,
            "abs" => Function::Abs,
            "round" => Function::Round,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "is_nan" | "isnan" => Function::IsNan,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Function::Includes => "includes",
            Function::StartsWith => "startswith",
            Function::EndsWith => "endswith",
            Function::Lower => "lower",
            Function::Upper => "upper",
            Function::Trim => "trim",
            Function::Length => "length",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::IsNan => "is_nan",
        }
    }

    fn arity(self) -> usize {
        match self {
            Function::Includes | Function::StartsWith | Function::EndsWith => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug)]
enum Compiled {
    Literal(Value),
    Column(usize),
    Call(Function, Vec<Compiled>),
    Unary(UnaryOp, Box<Compiled>),
    Binary(BinaryOp, Box<Compiled>, Box<Compiled>),
    Logical(LogicalOp, Vec<Compiled>),
}

/// Resolve `expr` against `table`. `depth` bounds recursion for hand-built trees deeper than the
/// parser would produce.
fn compile(expr: &Expr, table: &Table, depth: usize) -> ExprResult<Compiled> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ExprError::Parse(format!(
            "expression nested too deeply (limit {MAX_NESTING_DEPTH})"
        )));
    }
    let depth = depth + 1;
    Ok(match expr {
        Expr::Number(n) => Compiled::Literal(Value::number(*n)),
        Expr::BigInt(n) => Compiled::Literal(Value::integer(*n)),
        Expr::Text(s) => Compiled::Literal(Value::string(s)),
        Expr::Boolean(b) => Compiled::Literal(Value::Boolean(*b)),
        Expr::Null => Compiled::Literal(Value::Null),
        Expr::Column(name) => Compiled::Column(
            table
                .column_index(name)
                .ok_or_else(|| ExprError::UnknownColumn(name.clone()))?,
        ),
        Expr::Call { name, args } => {
            let function =
                Function::lookup(name).ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
            if args.len() != function.arity() {
                return Err(ExprError::Arity {
                    function: function.name(),
                    expected: function.arity(),
                    actual: args.len(),
                });
            }
            let args = args
                .iter()
                .map(|arg| compile(arg, table, depth))
                .collect::<ExprResult<Vec<_>>>()?;
            Compiled::Call(function, args)
        }
        Expr::UnaryOp { op, expr } => {
            Compiled::Unary(*op, Box::new(compile(expr, table, depth)?))
        }
        Expr::BinaryOp { op, left, right } => Compiled::Binary(
            *op,
            Box::new(compile(left, table, depth)?),
            Box::new(compile(right, table, depth)?),
        ),
        Expr::Logical { op, operands } => Compiled::Logical(
            *op,
            operands
                .iter()
                .map(|operand| compile(operand, table, depth))
                .collect::<ExprResult<Vec<_>>>()?,
        ),
    })
}

/// JS-style truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Number(n) => n.0 != 0.0 && !n.0.is_nan(),
        Value::BigInt(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::DateTime(_) | Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Boolean(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.0,
        Value::BigInt(n) => *n as f64,
        Value::DateTime(ms) => *ms as f64,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Exact ordering of a float against a big integer; `None` for `NaN`.
fn cmp_float_int(float: f64, int: i128) -> Option<Ordering> {
    match float.partial_cmp(&(int as f64))? {
        // Floats this large are integral, so the cast is exact.
        Ordering::Equal => Some((float as i128).cmp(&int)),
        other => Some(other),
    }
}

/// Ordering between two numbers, exact for big integers.
fn cmp_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.0.partial_cmp(&b.0),
        (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::BigInt(b)) => cmp_float_int(a.0, *b),
        (Value::BigInt(a), Value::Number(b)) => cmp_float_int(b.0, *a).map(Ordering::reverse),
        _ => None,
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::BigInt(_))
}

/// Strict equality: same type and same value. `NaN` is not equal to itself.
fn strict_equals(left: &Value, right: &Value) -> bool {
    if is_numeric(left) && is_numeric(right) {
        return cmp_numbers(left, right) == Some(Ordering::Equal);
    }
    left == right
}

/// Ordering for `<`/`>`; `None` for mismatched types, nulls and `NaN`.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if is_numeric(left) && is_numeric(right) {
        return cmp_numbers(left, right);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Boolean(_) => "boolean",
        Value::Number(_) | Value::BigInt(_) => "number",
        Value::String(_) => "string",
        Value::DateTime(_) => "date",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expect_str<'v>(function: Function, value: &'v Value) -> ExprResult<&'v str> {
    value.as_str().ok_or_else(|| {
        ExprError::Type(format!(
            "op.{} expects a string, got {}",
            function.name(),
            type_name(value)
        ))
    })
}

fn expect_number(function: Function, value: &Value) -> ExprResult<f64> {
    value.as_f64().ok_or_else(|| {
        ExprError::Type(format!(
            "op.{} expects a number, got {}",
            function.name(),
            type_name(value)
        ))
    })
}

fn call(function: Function, args: &[Value]) -> ExprResult<Value> {
    let first = &args[0];
    if first.is_null() && function != Function::IsNan {
        return Ok(Value::Null);
    }

    Ok(match function {
        Function::Includes => match first {
            Value::Array(items) => {
                Value::Boolean(items.iter().any(|item| strict_equals(item, &args[1])))
            }
            _ => {
                let haystack = expect_str(function, first)?;
                Value::Boolean(haystack.contains(&*args[1].to_string()))
            }
        },
        Function::StartsWith => Value::Boolean(
            expect_str(function, first)?.starts_with(expect_str(function, &args[1])?),
        ),
        Function::EndsWith => Value::Boolean(
            expect_str(function, first)?.ends_with(expect_str(function, &args[1])?),
        ),
        Function::Lower => Value::string(expect_str(function, first)?.to_lowercase()),
        Function::Upper => Value::string(expect_str(function, first)?.to_uppercase()),
        Function::Trim => Value::string(expect_str(function, first)?.trim()),
        Function::Length => match first {
            Value::Array(items) => Value::from(items.len() as i64),
            _ => Value::from(expect_str(function, first)?.chars().count() as i64),
        },
        Function::Abs => Value::number(expect_number(function, first)?.abs()),
        Function::Round => Value::number((expect_number(function, first)? + 0.5).floor()),
        Function::Floor => Value::number(expect_number(function, first)?.floor()),
        Function::Ceil => Value::number(expect_number(function, first)?.ceil()),
        Function::IsNan => Value::Boolean(matches!(first, Value::Number(n) if n.0.is_nan())),
    })
}

impl Compiled {
    fn eval(&self, table: &Table, row: usize) -> ExprResult<Value> {
        match self {
            Compiled::Literal(value) => Ok(value.clone()),
            Compiled::Column(idx) => Ok(table.get_cell(row, *idx)),
            Compiled::Call(function, args) => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(table, row))
                    .collect::<ExprResult<Vec<_>>>()?;
                call(*function, &args)
            }
            Compiled::Unary(op, expr) => {
                let value = expr.eval(table, row)?;
                Ok(match op {
                    UnaryOp::Not => Value::Boolean(!truthy(&value)),
                    UnaryOp::Negate => match value {
                        Value::BigInt(n) => Value::integer(-n),
                        other => Value::number(-to_number(&other)),
                    },
                })
            }
            Compiled::Logical(op, operands) => {
                // Yields the first operand that decides the result, else the last one.
                let mut value = Value::Null;
                for operand in operands {
                    value = operand.eval(table, row)?;
                    let decided = match op {
                        LogicalOp::And => !truthy(&value),
                        LogicalOp::Or => truthy(&value),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(value)
            }
            Compiled::Binary(op, left, right) => {
                let left = left.eval(table, row)?;
                let right = right.eval(table, row)?;
                Ok(binary(*op, &left, &right))
            }
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::String(Arc::from(format!("{left}{right}")))
            } else {
                Value::number(to_number(left) + to_number(right))
            }
        }
        BinaryOp::Subtract => Value::number(to_number(left) - to_number(right)),
        BinaryOp::Multiply => Value::number(to_number(left) * to_number(right)),
        BinaryOp::Divide => Value::number(to_number(left) / to_number(right)),
        BinaryOp::Remainder => Value::number(to_number(left) % to_number(right)),
        BinaryOp::Equals => Value::Boolean(strict_equals(left, right)),
        BinaryOp::NotEquals => Value::Boolean(!strict_equals(left, right)),
        BinaryOp::Less => Value::Boolean(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::LessEquals => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Greater => Value::Boolean(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::GreaterEquals => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    }
}

/// A filter expression resolved against one table's schema.
#[derive(Clone, Debug)]
pub struct RowPredicate {
    compiled: Compiled,
}

impl RowPredicate {
    pub fn new(expr: &Expr, table: &Table) -> ExprResult<Self> {
        Ok(Self {
            compiled: compile(expr, table, 0)?,
        })
    }

    /// Parse `source` and resolve it against `table`.
    pub fn compile(source: &str, table: &Table) -> ExprResult<Self> {
        Self::new(&parse(source)?, table)
    }

    /// Evaluate the expression for one row of the table it was compiled against.
    pub fn eval(&self, table: &Table, row: usize) -> ExprResult<Value> {
        self.compiled.eval(table, row)
    }

    pub fn matches(&self, table: &Table, row: usize) -> ExprResult<bool> {
        Ok(truthy(&self.eval(table, row)?))
    }

    /// Indices of all matching rows, in row order. The first evaluation error aborts the scan.
    pub fn select_rows(&self, table: &Table) -> ExprResult<Vec<usize>> {
        let mut rows = Vec::new();
        for chunk in table.chunks() {
            trace!("predicate scan: rows {}..{}", chunk.start, chunk.end);
            for row in chunk {
                if self.matches(table, row)? {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }
}

/// Parse, resolve and evaluate `source` over every row of `table`.
pub fn filter_rows(table: &Table, source: &str) -> ExprResult<Vec<usize>> {
    RowPredicate::compile(source, table)?.select_rows(table)
}

/// Evaluate a column-free expression (literals and functions only).
pub fn eval_constant(source: &str) -> ExprResult<Value> {
    let table = Table::empty();
    RowPredicate::compile(source, &table)?.eval(&table, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_columnar::Column;
    use pretty_assertions::assert_eq;

    fn people() -> Table {
        Table::from_columns(vec![
            Column::new("name", vec!["Ann".into(), "bob".into(), Value::Null]),
            Column::new("age", vec![30.into(), 8.into(), 15.into()]),
            Column::new(
                "first name",
                vec!["A".into(), "B".into(), "C".into()],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn selects_matching_rows() {
        let table = people();
        assert_eq!(filter_rows(&table, "d.age > 10").unwrap(), vec![0, 2]);
        assert_eq!(
            filter_rows(&table, "d => d.age > 10 && d.name != null").unwrap(),
            vec![0]
        );
        assert_eq!(filter_rows(&table, "d['first name'] === 'B'").unwrap(), vec![1]);
        assert_eq!(
            filter_rows(&table, "op.startswith(op.lower(d.name), 'a')").unwrap(),
            vec![0]
        );
        assert_eq!(filter_rows(&table, "d.name").unwrap(), vec![0, 1]);
    }

    #[test]
    fn resolution_errors_surface_without_rows() {
        let empty = Table::empty();
        assert_eq!(
            filter_rows(&empty, "d.age > 1").unwrap_err(),
            ExprError::UnknownColumn("age".into())
        );
        assert_eq!(
            filter_rows(&people(), "op.nope(d.age)").unwrap_err(),
            ExprError::UnknownFunction("nope".into())
        );
        assert_eq!(
            filter_rows(&people(), "op.lower(d.name, 1)").unwrap_err(),
            ExprError::Arity {
                function: "lower",
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn string_functions_reject_numbers() {
        let err = filter_rows(&people(), "op.upper(d.age) == '30'").unwrap_err();
        assert!(matches!(err, ExprError::Type(_)), "{err:?}");
        assert_eq!(err.to_string(), "type error: op.upper expects a string, got number");
    }

    #[test]
    fn js_like_operators() {
        assert_eq!(eval_constant("1 + '2'").unwrap(), Value::from("12"));
        assert_eq!(eval_constant("1 + 2 * 3 % 4").unwrap(), Value::from(3));
        assert_eq!(eval_constant("0 || 'x'").unwrap(), Value::from("x"));
        assert_eq!(eval_constant("1 == '1'").unwrap(), Value::Boolean(false));
        assert_eq!(eval_constant("null == null").unwrap(), Value::Boolean(true));
        assert_eq!(eval_constant("NaN == NaN").unwrap(), Value::Boolean(false));
        assert_eq!(eval_constant("'a' < 'b'").unwrap(), Value::Boolean(true));
        assert_eq!(eval_constant("1 < 'b'").unwrap(), Value::Boolean(false));
        assert_eq!(eval_constant("op.round(2.5)").unwrap(), Value::from(3));
        assert_eq!(eval_constant("op.round(-2.5)").unwrap(), Value::from(-2));
        assert_eq!(eval_constant("op.length('héllo')").unwrap(), Value::from(5));
        assert_eq!(eval_constant("op.trim(null)").unwrap(), Value::Null);
        assert_eq!(eval_constant("op.is_nan(0 / 0)").unwrap(), Value::Boolean(true));
        assert_eq!(eval_constant("-'4'").unwrap(), Value::from(-4));
    }

    #[test]
    fn big_integers_compare_exactly() {
        let edge = 1_i64 << 53;
        let table = Table::from_columns(vec![Column::new(
            "id",
            vec![Value::from(edge), Value::from(edge + 1), Value::from(-edge - 1)],
        )])
        .unwrap();
        assert_eq!(filter_rows(&table, "d.id == 9007199254740993").unwrap(), vec![1]);
        assert_eq!(filter_rows(&table, "d.id == 9007199254740992").unwrap(), vec![0]);
        assert_eq!(filter_rows(&table, "d.id > 9007199254740992").unwrap(), vec![1]);
        assert_eq!(filter_rows(&table, "d.id === -9007199254740993").unwrap(), vec![2]);
        assert_eq!(filter_rows(&table, "d.id < 0").unwrap(), vec![2]);
        assert_eq!(
            eval_constant("9007199254740993 == 9007199254740992.0").unwrap(),
            Value::Boolean(false)
        );
    }
}
