use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;
use crate::field_value::{FieldValue, Record};

use super::functions::ExprFunction;

/// Runtime value of an evaluated expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// A symbol that resolved to nothing. Behaves as NaN in arithmetic.
    Missing,
}

impl Value {
    pub(crate) fn as_boolean(&self, function: &ExprFunction) -> Result<bool, CoreError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(CoreError::Evaluation(format!(
                "'{}' expects boolean operands, got {other}",
                function.id()
            ))),
        }
    }

    pub(crate) fn as_number(&self, function: &ExprFunction) -> Result<f64, CoreError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Missing => Ok(f64::NAN),
            other => Err(CoreError::Evaluation(format!(
                "'{}' expects numeric operands, got {other}",
                function.id()
            ))),
        }
    }

    pub(crate) fn value_eq(&self, other: &Value) -> Result<bool, CoreError> {
        match (self.numeric_or_self(), other.numeric_or_self()) {
            (Value::Number(a), Value::Number(b)) => Ok(a == b),
            (Value::Text(a), Value::Text(b)) => Ok(a == b),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a == b),
            (a, b) => Err(CoreError::Evaluation(format!("cannot compare {a} with {b}"))),
        }
    }

    fn numeric_or_self(&self) -> Value {
        match self {
            Value::Missing => Value::Number(f64::NAN),
            other => other.clone(),
        }
    }

    /// Converts a stored field value to an expression operand. Types with no
    /// scalar meaning resolve to `Missing`.
    pub fn from_field_value(value: &FieldValue) -> Value {
        match value {
            FieldValue::Quantity { value, .. } => Value::Number(*value),
            FieldValue::Year(year) => Value::Number(f64::from(*year)),
            FieldValue::Boolean(b) => Value::Boolean(*b),
            FieldValue::Text(s) | FieldValue::Barcode(s) | FieldValue::Narrative(s) => {
                Value::Text(s.clone())
            }
            FieldValue::Enum(ids) | FieldValue::Reference(ids) if ids.len() == 1 => {
                Value::Text(ids[0].to_string())
            }
            _ => Value::Missing,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "\"{s}\""),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Missing => f.write_str("missing"),
        }
    }
}

/// Resolves symbol paths (`a`, `a.b`) during evaluation.
pub trait EvalContext {
    fn resolve(&self, path: &[String]) -> Option<Value>;
}

/// Context with no bindings; every symbol is missing.
pub struct EmptyContext;

impl EvalContext for EmptyContext {
    fn resolve(&self, _path: &[String]) -> Option<Value> {
        None
    }
}

impl EvalContext for BTreeMap<String, Value> {
    fn resolve(&self, path: &[String]) -> Option<Value> {
        self.get(&path.join(".")).cloned()
    }
}

/// Binds symbols to a record's fields; dotted paths descend into nested records.
impl EvalContext for Record {
    fn resolve(&self, path: &[String]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut record = self;
        for key in parents {
            record = record.get_record(key)?;
        }
        record.get(last).map(Value::from_field_value)
    }
}
