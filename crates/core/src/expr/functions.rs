use crate::error::CoreError;

use super::value::Value;

/// Built-in functions an expression may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprFunction {
    And,
    Or,
    Not,
    Equal,
    NotEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Negate,
}

const REGISTRY: &[ExprFunction] = &[
    ExprFunction::And,
    ExprFunction::Or,
    ExprFunction::Not,
    ExprFunction::Equal,
    ExprFunction::NotEqual,
    ExprFunction::Plus,
    ExprFunction::Minus,
    ExprFunction::Multiply,
    ExprFunction::Divide,
    ExprFunction::Negate,
];

impl ExprFunction {
    /// Operator spelling, as it appears infix.
    pub fn id(&self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Plus => "+",
            Self::Minus | Self::Negate => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }

    /// Name used with call syntax, e.g. `and(a, b)`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Equal => "equal",
            Self::NotEqual => "notequal",
            Self::Plus => "sum",
            Self::Minus => "minus",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Negate => "negate",
        }
    }

    pub fn binary_operator(op: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .copied()
            .filter(|f| !matches!(f, Self::Not | Self::Negate))
            .find(|f| f.id() == op)
    }

    pub fn by_name(name: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn accepts_arity(&self, n: usize) -> bool {
        match self {
            Self::Not | Self::Negate => n == 1,
            Self::NotEqual | Self::Minus | Self::Divide => n == 2,
            Self::And | Self::Or | Self::Equal | Self::Plus | Self::Multiply => n >= 2,
        }
    }

    pub fn apply(&self, args: &[Value]) -> Result<Value, CoreError> {
        match self {
            Self::And => {
                let mut result = true;
                for arg in args {
                    result &= arg.as_boolean(self)?;
                }
                Ok(Value::Boolean(result))
            }
            Self::Or => {
                let mut result = false;
                for arg in args {
                    result |= arg.as_boolean(self)?;
                }
                Ok(Value::Boolean(result))
            }
            Self::Not => Ok(Value::Boolean(!single(args)?.as_boolean(self)?)),
            Self::Equal => {
                let (first, rest) = args
                    .split_first()
                    .ok_or_else(|| arity_error(self, 0))?;
                for other in rest {
                    if !first.value_eq(other)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            Self::NotEqual => match args {
                [a, b] => Ok(Value::Boolean(!a.value_eq(b)?)),
                _ => Err(arity_error(self, args.len())),
            },
            Self::Plus => fold_numbers(self, args, |a, b| a + b),
            Self::Minus => fold_numbers(self, args, |a, b| a - b),
            Self::Multiply => fold_numbers(self, args, |a, b| a * b),
            Self::Divide => fold_numbers(self, args, |a, b| a / b),
            Self::Negate => Ok(Value::Number(-single(args)?.as_number(self)?)),
        }
    }
}

fn single(args: &[Value]) -> Result<&Value, CoreError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(CoreError::Evaluation(format!(
            "expected one argument, got {}",
            args.len()
        ))),
    }
}

fn fold_numbers(
    function: &ExprFunction,
    args: &[Value],
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value, CoreError> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| arity_error(function, 0))?;
    let mut acc = first.as_number(function)?;
    for arg in rest {
        acc = op(acc, arg.as_number(function)?);
    }
    Ok(Value::Number(acc))
}

fn arity_error(function: &ExprFunction, n: usize) -> CoreError {
    CoreError::Evaluation(format!(
        "function '{}' cannot take {n} arguments",
        function.id()
    ))
}
