//! A small boolean and arithmetic expression language over field references.
//!
//! Used for calculated fields (evaluated against an instance's record) and
//! for access-rule conditions.

mod functions;
mod lexer;
mod node;
mod parser;
mod value;

pub use functions::ExprFunction;
pub use lexer::{ExprLexer, Token, TokenType};
pub use node::ExprNode;
pub use parser::ExprParser;
pub use value::{EmptyContext, EvalContext, Value};

use crate::error::CoreError;

pub fn parse(source: &str) -> Result<ExprNode, CoreError> {
    ExprParser::new(source)?.parse()
}

pub fn evaluate(source: &str, ctx: &dyn EvalContext) -> Result<Value, CoreError> {
    parse(source)?.evaluate(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_value::{FieldValue, Record};

    #[test]
    fn evaluates_against_record_fields() {
        let record = Record::new()
            .with("beneficiaries", FieldValue::quantity(12.0))
            .with("open", FieldValue::Boolean(true))
            .with(
                "address",
                FieldValue::Record(Record::new().with("city", FieldValue::Text("Goma".into()))),
            );
        assert_eq!(
            evaluate("beneficiaries * 2", &record).unwrap(),
            Value::Number(24.0)
        );
        assert_eq!(
            evaluate("open && address.city == \"Goma\"", &record).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn evaluation_is_repeatable() {
        let record = Record::new().with("q", FieldValue::quantity(3.0));
        let node = parse("q / 2 + 1").unwrap();
        let first = node.evaluate(&record).unwrap();
        let second = node.evaluate(&record).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Value::Number(2.5));
    }

    #[test]
    fn display_renders_tree() {
        let node = parse("a + b == 3").unwrap();
        assert_eq!(node.to_string(), "((a + b) == 3)");
        assert_eq!(node.symbols(), vec!["a".to_string(), "b".to_string()]);
    }
}
