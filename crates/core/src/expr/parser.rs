use crate::error::CoreError;

use super::functions::ExprFunction;
use super::lexer::{ExprLexer, Token, TokenType};
use super::node::ExprNode;
use super::value::Value;

/// Recursive-descent parser over the lexer's token stream.
///
/// Precedence, lowest first: `||`, `&&`, `==`/`!=`, `+`/`-`, `*`/`/`,
/// unary `!`/`-`, then primaries (literals, symbols, calls, parentheses).
pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    source_len: usize,
}

impl ExprParser {
    pub fn new(source: &str) -> Result<Self, CoreError> {
        let tokens = ExprLexer::new(source)
            .read_all()?
            .into_iter()
            .filter(|t| t.token_type != TokenType::Whitespace)
            .collect();
        Ok(Self {
            tokens,
            pos: 0,
            source_len: source.chars().count(),
        })
    }

    pub fn parse(mut self) -> Result<ExprNode, CoreError> {
        let node = self.parse_or()?;
        if let Some(token) = self.peek() {
            return Err(CoreError::syntax(
                format!("unexpected '{}'", token.text),
                token.position,
            ));
        }
        Ok(node)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_operator(&self) -> Option<&str> {
        self.peek()
            .filter(|t| t.token_type == TokenType::Operator)
            .map(|t| t.text.as_str())
    }

    fn next_is(&self, token_type: TokenType) -> bool {
        self.peek().is_some_and(|t| t.token_type == token_type)
    }

    fn expect(&mut self, token_type: TokenType, what: &str) -> Result<Token, CoreError> {
        match self.advance() {
            Some(token) if token.token_type == token_type => Ok(token),
            Some(token) => Err(CoreError::syntax(
                format!("expected {what}, found '{}'", token.text),
                token.position,
            )),
            None => Err(self.end_of_input(what)),
        }
    }

    fn end_of_input(&self, what: &str) -> CoreError {
        CoreError::syntax(format!("expected {what}, found end of input"), self.source_len)
    }

    /// Operators this parser does not know are rejected where they appear.
    fn check_operator(&self) -> Result<(), CoreError> {
        if let Some(token) = self.peek()
            && token.token_type == TokenType::Operator
            && ExprFunction::binary_operator(&token.text).is_none()
        {
            return Err(CoreError::syntax(
                format!("unknown operator '{}'", token.text),
                token.position,
            ));
        }
        Ok(())
    }

    fn parse_variadic(
        &mut self,
        function: ExprFunction,
        operand: fn(&mut Self) -> Result<ExprNode, CoreError>,
    ) -> Result<ExprNode, CoreError> {
        let mut args = vec![operand(self)?];
        while self.peek_operator() == Some(function.id()) {
            self.advance();
            args.push(operand(self)?);
        }
        Ok(match args.len() {
            1 => args.remove(0),
            _ => ExprNode::Apply { function, args },
        })
    }

    fn parse_or(&mut self) -> Result<ExprNode, CoreError> {
        self.parse_variadic(ExprFunction::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<ExprNode, CoreError> {
        self.parse_variadic(ExprFunction::And, Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<ExprNode, CoreError> {
        let mut left = self.parse_additive()?;
        loop {
            match self.peek_operator() {
                Some("==") => {
                    let mut args = vec![left];
                    while self.peek_operator() == Some("==") {
                        self.advance();
                        args.push(self.parse_additive()?);
                    }
                    left = ExprNode::Apply {
                        function: ExprFunction::Equal,
                        args,
                    };
                }
                Some("!=") => {
                    self.advance();
                    let right = self.parse_additive()?;
                    left = ExprNode::Apply {
                        function: ExprFunction::NotEqual,
                        args: vec![left, right],
                    };
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_binary_left(
        &mut self,
        operators: &[ExprFunction],
        operand: fn(&mut Self) -> Result<ExprNode, CoreError>,
    ) -> Result<ExprNode, CoreError> {
        let mut left = operand(self)?;
        loop {
            self.check_operator()?;
            let Some(function) = self
                .peek_operator()
                .and_then(|op| operators.iter().copied().find(|f| f.id() == op))
            else {
                return Ok(left);
            };
            self.advance();
            let right = operand(self)?;
            left = ExprNode::Apply {
                function,
                args: vec![left, right],
            };
        }
    }

    fn parse_additive(&mut self) -> Result<ExprNode, CoreError> {
        self.parse_binary_left(
            &[ExprFunction::Plus, ExprFunction::Minus],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<ExprNode, CoreError> {
        self.parse_binary_left(
            &[ExprFunction::Multiply, ExprFunction::Divide],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<ExprNode, CoreError> {
        let function = match self.peek_operator() {
            Some("!") => ExprFunction::Not,
            Some("-") => ExprFunction::Negate,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(ExprNode::Apply {
            function,
            args: vec![operand],
        })
    }

    fn parse_primary(&mut self) -> Result<ExprNode, CoreError> {
        let token = self.advance().ok_or_else(|| self.end_of_input("an operand"))?;
        match token.token_type {
            TokenType::Number => token
                .text
                .parse::<f64>()
                .map(|n| ExprNode::Constant(Value::Number(n)))
                .map_err(|_| {
                    CoreError::syntax(format!("invalid number '{}'", token.text), token.position)
                }),
            TokenType::StringLiteral => Ok(ExprNode::Constant(Value::Text(token.text))),
            TokenType::BooleanLiteral => Ok(ExprNode::Constant(Value::Boolean(
                token.text.eq_ignore_ascii_case("true"),
            ))),
            TokenType::ParenStart => {
                let inner = self.parse_or()?;
                self.expect(TokenType::ParenEnd, "')'")?;
                Ok(inner)
            }
            TokenType::Symbol if self.next_is(TokenType::ParenStart) => self.parse_call(token),
            TokenType::Symbol => {
                let mut path = vec![token.text];
                while self.next_is(TokenType::Dot) {
                    self.advance();
                    path.push(self.expect(TokenType::Symbol, "a field name")?.text);
                }
                Ok(ExprNode::Symbol(path))
            }
            _ => Err(CoreError::syntax(
                format!("unexpected '{}'", token.text),
                token.position,
            )),
        }
    }

    fn parse_call(&mut self, name: Token) -> Result<ExprNode, CoreError> {
        let function = ExprFunction::by_name(&name.text).ok_or_else(|| {
            CoreError::syntax(format!("unknown function '{}'", name.text), name.position)
        })?;
        self.expect(TokenType::ParenStart, "'('")?;
        let mut args = Vec::new();
        if !self.next_is(TokenType::ParenEnd) {
            loop {
                args.push(self.parse_or()?);
                if self.next_is(TokenType::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenType::ParenEnd, "')'")?;
        if !function.accepts_arity(args.len()) {
            return Err(CoreError::syntax(
                format!("'{}' cannot take {} arguments", name.text, args.len()),
                name.position,
            ));
        }
        Ok(ExprNode::Apply { function, args })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::expr::value::EmptyContext;

    fn parse(source: &str) -> ExprNode {
        ExprParser::new(source).unwrap().parse().unwrap()
    }

    fn eval(source: &str) -> Value {
        parse(source).evaluate(&EmptyContext).unwrap()
    }

    #[test]
    fn arithmetic_binds_tighter_than_comparison() {
        assert_eq!(eval("1 + 2 * 3 == 7"), Value::Boolean(true));
        assert_eq!(eval("(1 + 2) * 3"), Value::Number(9.0));
        assert_eq!(eval("10 - 4 - 3"), Value::Number(3.0));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(eval("true || false && false"), Value::Boolean(true));
        assert_eq!(eval("(true || false) && false"), Value::Boolean(false));
        assert_eq!(eval("!false && TRUE"), Value::Boolean(true));
    }

    #[test]
    fn equality_chain_is_one_variadic_node() {
        match parse("a == b == c") {
            ExprNode::Apply { function, args } => {
                assert_eq!(function, ExprFunction::Equal);
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected tree {other:?}"),
        }
        assert_eq!(eval("2 == 2 == 2"), Value::Boolean(true));
        assert_eq!(eval("2 != 3"), Value::Boolean(true));
    }

    #[test]
    fn symbols_resolve_from_context() {
        let mut ctx = BTreeMap::new();
        ctx.insert("A".to_string(), Value::Number(1.5));
        ctx.insert("B".to_string(), Value::Number(2.0));
        ctx.insert("site.name".to_string(), Value::Text("north".into()));
        let node = parse("A+B==3.5");
        assert_eq!(node.evaluate(&ctx).unwrap(), Value::Boolean(true));
        assert_eq!(
            parse("site.name == 'north'").evaluate(&ctx).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(parse("{A} * [B]").evaluate(&ctx).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn missing_symbol_is_nan_in_arithmetic() {
        match parse("x + 1").evaluate(&EmptyContext).unwrap() {
            Value::Number(n) => assert!(n.is_nan()),
            other => panic!("expected NaN, got {other:?}"),
        }
    }

    #[test]
    fn call_syntax_uses_registry_names() {
        assert_eq!(eval("not(false)"), Value::Boolean(true));
        assert_eq!(eval("and(true, true, false)"), Value::Boolean(false));
        assert_eq!(eval("-sum(1, 2)"), Value::Number(-3.0));
    }

    #[test]
    fn unknown_function_is_a_syntax_error() {
        let err = ExprParser::new("sqrt(4)").unwrap().parse().unwrap_err();
        assert!(matches!(err, CoreError::Syntax { position: 0, .. }));
        let err = ExprParser::new("not(true, false)").unwrap().parse().unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn unknown_operator_is_a_syntax_error() {
        let err = ExprParser::new("a =! b").unwrap().parse().unwrap_err();
        assert!(matches!(err, CoreError::Syntax { position: 2, .. }));
        // greedy lexing makes `*-` one operator
        let err = ExprParser::new("a *-1").unwrap().parse().unwrap_err();
        assert!(matches!(err, CoreError::Syntax { position: 2, .. }));
    }

    #[test]
    fn truncated_input_reports_end_position() {
        let err = ExprParser::new("1 +").unwrap().parse().unwrap_err();
        assert!(matches!(err, CoreError::Syntax { position: 3, .. }));
        let err = ExprParser::new("(a && b").unwrap().parse().unwrap_err();
        assert!(matches!(err, CoreError::Syntax { position: 7, .. }));
    }

    #[test]
    fn type_mismatch_fails_evaluation() {
        let node = parse("'a' + 1");
        assert!(matches!(
            node.evaluate(&EmptyContext),
            Err(CoreError::Evaluation(_))
        ));
    }
}
