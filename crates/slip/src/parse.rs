//! Source text to value graph.
//!
//! The grammar is small: atoms (integers, reals, symbols), strings, the three
//! list kinds, and the three prefix operators `'` (some), `@` (error), and
//! `#` (datum). `;` starts a line comment. Children are parsed and written to
//! the arena before their containing record, which is what keeps the graph
//! acyclic by construction.

use std::fmt;

use crate::value::{ArenaBuilder, Value};
use crate::arena::Kind;

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnclosedParenList,
    UnclosedBracketList,
    UnclosedBraceList,
    UnclosedString,
    MalformedNumericLiteral,
    OperatorRequiresObject,
}

impl ParseErrorKind {
    fn message(self) -> &'static str {
        match self {
            Self::UnclosedParenList => "unclosed paren list",
            Self::UnclosedBracketList => "unclosed bracket list",
            Self::UnclosedBraceList => "unclosed brace list",
            Self::UnclosedString => "unclosed string",
            Self::MalformedNumericLiteral => "malformed numeric literal",
            Self::OperatorRequiresObject => "operator requires an object",
        }
    }
}

/// A parse failure with the byte position it was detected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: usize,
}

impl ParseError {
    fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { kind, position }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.kind.message(), self.position)
    }
}

impl std::error::Error for ParseError {}

/// Parses one object from `source`.
///
/// Trailing whitespace and comments after the object are ignored. An input
/// containing no object at all is an error.
pub fn parse(source: &str) -> Result<Value, ParseError> {
    let mut parser = Parser::new(source);
    match parser.parse_object()? {
        Some(root) => Ok(parser.builder.finish(root)),
        None => Err(ParseError::new(ParseErrorKind::OperatorRequiresObject, 0)),
    }
}

struct Parser<'src> {
    source: &'src str,
    pos: usize,
    builder: ArenaBuilder,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            builder: ArenaBuilder::new(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn current(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(c) = self.current() {
                if c.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.current() == Some(';') {
                while let Some(c) = self.current() {
                    self.advance();
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn parse_object(&mut self) -> Result<Option<usize>, ParseError> {
        self.skip_whitespace_and_comments();

        let Some(c) = self.current() else {
            return Ok(None);
        };

        match c {
            '\'' => self.parse_prefixed(Kind::Some),
            '@' => self.parse_prefixed(Kind::Error),
            '#' => self.parse_prefixed(Kind::Datum),
            '(' => self.parse_list(')', Kind::ParenList, ParseErrorKind::UnclosedParenList),
            '[' => self.parse_list(']', Kind::BracketList, ParseErrorKind::UnclosedBracketList),
            '{' => self.parse_list('}', Kind::BraceList, ParseErrorKind::UnclosedBraceList),
            '"' => self.parse_string(),
            _ => self.parse_atom(),
        }
    }

    fn parse_prefixed(&mut self, kind: Kind) -> Result<Option<usize>, ParseError> {
        self.advance();
        let inner = self.parse_object()?;
        let Some(inner_offset) = inner else {
            return Err(ParseError::new(ParseErrorKind::OperatorRequiresObject, self.pos));
        };
        Ok(Some(self.builder.push_wrapper(kind, inner_offset)))
    }

    fn parse_list(
        &mut self,
        close: char,
        kind: Kind,
        unclosed: ParseErrorKind,
    ) -> Result<Option<usize>, ParseError> {
        let start_pos = self.pos;
        self.advance();

        let mut element_offsets = Vec::new();
        loop {
            self.skip_whitespace_and_comments();

            if self.at_end() {
                return Err(ParseError::new(unclosed, start_pos));
            }
            if self.current() == Some(close) {
                self.advance();
                break;
            }

            match self.parse_object()? {
                Some(offset) => element_offsets.push(offset),
                // A stray closer of the wrong kind produces an empty atom;
                // report the enclosing list as unclosed at its opener.
                None => return Err(ParseError::new(unclosed, start_pos)),
            }
        }

        Ok(Some(self.builder.push_list(kind, &element_offsets)))
    }

    fn parse_string(&mut self) -> Result<Option<usize>, ParseError> {
        let start_pos = self.pos;
        self.advance();

        let mut runes = Vec::new();
        loop {
            let Some(c) = self.current() else {
                return Err(ParseError::new(ParseErrorKind::UnclosedString, start_pos));
            };
            if c == '"' {
                self.advance();
                break;
            }
            let rune = if c == '\\' {
                self.advance();
                match self.current() {
                    Some(escaped) => escaped,
                    None => return Err(ParseError::new(ParseErrorKind::UnclosedString, start_pos)),
                }
            } else {
                c
            };
            runes.push(self.builder.push_rune(rune));
            self.advance();
        }

        Ok(Some(self.builder.push_list(Kind::Str, &runes)))
    }

    fn parse_atom(&mut self) -> Result<Option<usize>, ParseError> {
        let start_pos = self.pos;
        let mut atom = String::new();

        while let Some(c) = self.current() {
            if c.is_whitespace() || matches!(c, ')' | ']' | '}' | ';') {
                break;
            }
            atom.push(c);
            self.advance();
        }

        if atom.is_empty() {
            return Ok(None);
        }

        if matches_numeric_grammar(&atom) {
            return if atom.contains(['.', 'e', 'E']) {
                match atom.parse::<f64>() {
                    Ok(value) => Ok(Some(self.builder.push_real(value))),
                    Err(_) => Err(ParseError::new(
                        ParseErrorKind::MalformedNumericLiteral,
                        start_pos,
                    )),
                }
            } else {
                match atom.parse::<i64>() {
                    Ok(value) => Ok(Some(self.builder.push_int(value))),
                    Err(_) => Err(ParseError::new(
                        ParseErrorKind::MalformedNumericLiteral,
                        start_pos,
                    )),
                }
            };
        }

        Ok(Some(self.builder.push_symbol(&atom)))
    }
}

/// Checks a token against the numeric grammar: optional sign, decimal digits,
/// at most one `.`, optional `e`/`E` exponent with optional sign. A lone sign
/// is a symbol.
fn matches_numeric_grammar(atom: &str) -> bool {
    let bytes = atom.as_bytes();
    let mut i = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    if i >= bytes.len() || !(bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        return false;
    }

    let mut has_decimal = false;
    let mut has_exponent = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => i += 1,
            b'.' if !has_decimal && !has_exponent => {
                has_decimal = true;
                i += 1;
            }
            b'e' | b'E' if !has_exponent => {
                has_exponent = true;
                i += 1;
                if matches!(bytes.get(i), Some(b'+' | b'-')) {
                    i += 1;
                }
            }
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_grammar_classification() {
        assert!(matches_numeric_grammar("42"));
        assert!(matches_numeric_grammar("-42"));
        assert!(matches_numeric_grammar("+4.25"));
        assert!(matches_numeric_grammar("1e9"));
        assert!(matches_numeric_grammar("1E-9"));
        assert!(!matches_numeric_grammar("+"));
        assert!(!matches_numeric_grammar("-"));
        assert!(!matches_numeric_grammar("1.2.3"));
        assert!(!matches_numeric_grammar("12abc"));
        assert!(!matches_numeric_grammar("name"));
    }
}
