use std::fmt;

use crate::error::CoreError;

use super::functions::ExprFunction;
use super::value::{EvalContext, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    Constant(Value),
    /// Field reference; more than one element for dotted paths.
    Symbol(Vec<String>),
    Apply {
        function: ExprFunction,
        args: Vec<ExprNode>,
    },
}

impl ExprNode {
    pub fn evaluate(&self, ctx: &dyn EvalContext) -> Result<Value, CoreError> {
        match self {
            ExprNode::Constant(value) => Ok(value.clone()),
            ExprNode::Symbol(path) => Ok(ctx.resolve(path).unwrap_or(Value::Missing)),
            ExprNode::Apply { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                function.apply(&values)
            }
        }
    }

    /// Symbols referenced anywhere in the tree, as dotted paths.
    pub fn symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut Vec<String>) {
        match self {
            ExprNode::Constant(_) => {}
            ExprNode::Symbol(path) => out.push(path.join(".")),
            ExprNode::Apply { args, .. } => {
                for arg in args {
                    arg.collect_symbols(out);
                }
            }
        }
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprNode::Constant(value) => write!(f, "{value}"),
            ExprNode::Symbol(path) => write!(f, "{}", path.join(".")),
            ExprNode::Apply { function, args } if args.len() == 1 => {
                write!(f, "{}({})", function.id(), args[0])
            }
            ExprNode::Apply { function, args } => {
                f.write_str("(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", function.id())?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
