use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    ParenStart,
    ParenEnd,
    Comma,
    Dot,
    Symbol,
    StringLiteral,
    Whitespace,
    Number,
    Operator,
    BooleanLiteral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    /// Character offset of the token's first character in the source.
    pub position: usize,
    /// Token text. Quoted tokens carry their content without the quotes.
    pub text: String,
}

impl Token {
    pub fn is_operator(&self, op: &str) -> bool {
        self.token_type == TokenType::Operator && self.text == op
    }
}

const OPERATOR_CHARS: &str = "+-/*&|=!";

/// Splits an expression string into tokens. Whitespace is kept as tokens;
/// the parser discards it.
pub struct ExprLexer {
    chars: Vec<char>,
    current: usize,
    token_start: usize,
}

impl ExprLexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            token_start: 0,
        }
    }

    pub fn read_all(mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();
        while !self.is_end_of_input() {
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn is_end_of_input(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.current).copied()
    }

    fn finish(&mut self, token_type: TokenType) -> Token {
        let text = self.chars[self.token_start..self.current].iter().collect();
        self.finish_with(token_type, text)
    }

    fn finish_with(&mut self, token_type: TokenType, text: String) -> Token {
        let token = Token {
            token_type,
            position: self.token_start,
            text,
        };
        self.token_start = self.current;
        token
    }

    fn consume_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek_char()
            && pred(c)
        {
            self.current += 1;
        }
    }

    fn next_token(&mut self) -> Result<Token, CoreError> {
        let c = self.chars[self.current];
        self.current += 1;
        let token = match c {
            '(' => self.finish(TokenType::ParenStart),
            ')' => self.finish(TokenType::ParenEnd),
            '{' => self.read_quoted(TokenType::Symbol, '}')?,
            '[' => self.read_quoted(TokenType::Symbol, ']')?,
            ',' => self.finish(TokenType::Comma),
            '.' => self.finish(TokenType::Dot),
            '"' => self.read_quoted(TokenType::StringLiteral, '"')?,
            '\'' => self.read_quoted(TokenType::StringLiteral, '\'')?,
            c if c.is_whitespace() => {
                self.consume_while(char::is_whitespace);
                self.finish(TokenType::Whitespace)
            }
            c if is_number_part(c) => {
                self.consume_while(is_number_part);
                self.finish(TokenType::Number)
            }
            c if is_operator(c) => {
                self.consume_while(is_operator);
                self.finish(TokenType::Operator)
            }
            c if is_symbol_start(c) => match self.boolean_literal_len(c) {
                Some(len) => {
                    self.current = self.token_start + len;
                    self.finish(TokenType::BooleanLiteral)
                }
                None => {
                    self.consume_while(is_symbol_char);
                    self.finish(TokenType::Symbol)
                }
            },
            other => {
                return Err(CoreError::syntax(
                    format!("unsupported character '{other}'"),
                    self.token_start,
                ));
            }
        };
        Ok(token)
    }

    /// Length of a `true`/`false` literal (any case) starting at the current
    /// token, provided the literal is not the prefix of a longer symbol.
    fn boolean_literal_len(&self, c: char) -> Option<usize> {
        let literal = match c {
            't' | 'T' => "true",
            'f' | 'F' => "false",
            _ => return None,
        };
        let end = self.token_start + literal.len();
        if end > self.chars.len() {
            return None;
        }
        let candidate: String = self.chars[self.token_start..end].iter().collect();
        if !candidate.eq_ignore_ascii_case(literal) {
            return None;
        }
        match self.chars.get(end) {
            Some(&next) if is_symbol_char(next) => None,
            _ => Some(literal.len()),
        }
    }

    fn read_quoted(&mut self, token_type: TokenType, closing: char) -> Result<Token, CoreError> {
        loop {
            let Some(c) = self.peek_char() else {
                return Err(CoreError::syntax(
                    format!("end of input reached while looking for closing '{closing}'"),
                    self.token_start,
                ));
            };
            self.current += 1;
            if c == closing {
                let text = self.chars[self.token_start + 1..self.current - 1]
                    .iter()
                    .collect();
                return Ok(self.finish_with(token_type, text));
            }
        }
    }
}

fn is_operator(c: char) -> bool {
    OPERATOR_CHARS.contains(c)
}

fn is_number_part(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_symbol_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_symbol_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}
