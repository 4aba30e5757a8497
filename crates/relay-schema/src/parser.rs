//! Validation DSL parser
//!
//! Parses dotted call chains such as `string.email.required` or
//! `number.min(3).max(10)` into an ordered list of segments.
//!
//! ```text
//! chain   := segment ('.' segment)*
//! segment := IDENT ('(' [literal (',' literal)*] ')')?
//! literal := STRING | NUMBER | true | false | null
//! ```
//!
//! Strings may use single or double quotes with backslash escapes.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::Value;

use crate::error::SchemaError;

/// A literal call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl Literal {
    /// Convert to a JSON value for comparisons and defaults.
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Str(s) => Value::String(s.clone()),
            Literal::Num(n) => number_value(*n),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "'{}'", s),
            Literal::Num(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

/// Integral numbers become JSON integers, everything else a float.
pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// One link of a call chain: `name` or `name(args...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub args: Vec<Literal>,
}

/// Parse a DSL expression into its segments, in textual order.
pub fn parse(input: &str) -> Result<Vec<Segment>, SchemaError> {
    Parser::new(input).chain()
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&mut self, message: impl Into<String>) -> SchemaError {
        SchemaError::Parse {
            input: self.input.to_string(),
            position: self.position(),
            message: message.into(),
        }
    }

    fn chain(mut self) -> Result<Vec<Segment>, SchemaError> {
        let mut segments = Vec::new();

        self.skip_whitespace();
        segments.push(self.segment()?);

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('.') => {
                    self.bump();
                    self.skip_whitespace();
                    segments.push(self.segment()?);
                }
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            }
        }

        Ok(segments)
    }

    fn segment(&mut self) -> Result<Segment, SchemaError> {
        let name = self.identifier()?;
        self.skip_whitespace();

        let args = if self.peek() == Some('(') {
            self.bump();
            self.arguments()?
        } else {
            Vec::new()
        };

        Ok(Segment { name, args })
    }

    fn identifier(&mut self) -> Result<String, SchemaError> {
        let mut name = String::new();

        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
            Some(c) => return Err(self.error(format!("expected identifier, found '{}'", c))),
            None => return Err(self.error("expected identifier, found end of input")),
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }

        Ok(name)
    }

    fn arguments(&mut self) -> Result<Vec<Literal>, SchemaError> {
        let mut args = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(args);
        }

        loop {
            self.skip_whitespace();
            args.push(self.literal()?);
            self.skip_whitespace();

            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                Some(c) => {
                    return Err(self.error(format!("expected ',' or ')', found '{}'", c)));
                }
                None => return Err(self.error("unclosed argument list")),
            }
        }

        Ok(args)
    }

    fn literal(&mut self) -> Result<Literal, SchemaError> {
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.bump();
                self.string(quote)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.identifier()?;
                match word.as_str() {
                    "true" => Ok(Literal::Bool(true)),
                    "false" => Ok(Literal::Bool(false)),
                    "null" => Ok(Literal::Null),
                    other => Err(self.error(format!(
                        "arguments must be literals, found identifier '{}'",
                        other
                    ))),
                }
            }
            Some(c) => Err(self.error(format!("expected literal, found '{}'", c))),
            None => Err(self.error("expected literal, found end of input")),
        }
    }

    fn string(&mut self, quote: char) -> Result<Literal, SchemaError> {
        let mut value = String::new();

        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(c) => value.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if c == quote => break,
                Some(c) => value.push(c),
            }
        }

        Ok(Literal::Str(value))
    }

    fn number(&mut self) -> Result<Literal, SchemaError> {
        let start = self.position();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Literal::Num(n)),
            _ => Err(SchemaError::Parse {
                input: self.input.to_string(),
                position: start,
                message: format!("invalid number '{}'", text),
            }),
        }
    }
}
