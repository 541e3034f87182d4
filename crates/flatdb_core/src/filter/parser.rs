//! Recursive-descent parser for filter strings.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr    := term ((AND | OR) term)*
//! term    := '(' expr ')' | atom
//! atom    := [~] name [NOT] op rhs
//! name    := '[' anychars ']' | ident
//! op      := '=' | '!=' | '<>' | '~=' | '<' | '<=' | '>' | '>=' | IN | REGEX | CONTAINS
//! rhs     := literal | '(' literal (',' literal)* ')'
//! literal := quoted-string | number | NULL
//! ```
//!
//! A leading `~` on a name or the `~=` operator selects case-insensitive
//! matching. `!=` and `<>` parse as equality with `negated` set. Quoted
//! strings use single quotes with `''` escaping a literal quote. Numeric
//! and `NULL` literals are kept textual and coerced to the field's type
//! when the filter is prepared against a schema.

use super::ast::{BoolOp, Filter, FilterAtom, FilterGroup, FilterNode, MatchMode, Op, Rhs};
use crate::error::{DbError, DbResult};
use flatdb_codec::Value;

/// Parses a filter string into an AST.
pub(crate) fn parse(input: &str) -> DbResult<Filter> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.parse_expr()?;
    if let Some((_, at)) = parser.peek() {
        return Err(DbError::invalid_filter(at, "unexpected trailing input"));
    }
    Ok(Filter { root })
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LParen,
    RParen,
    Comma,
    Tilde,
    Eq,
    NotEq,
    TildeEq,
    Lt,
    Le,
    Gt,
    Ge,
    Ident(String),
    Str(String),
    Number(String),
}

fn tokenize(input: &str) -> DbResult<Vec<(Tok, usize)>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'(' => {
                tokens.push((Tok::LParen, i));
                i += 1;
            }
            b')' => {
                tokens.push((Tok::RParen, i));
                i += 1;
            }
            b',' => {
                tokens.push((Tok::Comma, i));
                i += 1;
            }
            b'=' => {
                tokens.push((Tok::Eq, i));
                i += 1;
            }
            b'~' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Tok::TildeEq, i));
                    i += 2;
                } else {
                    tokens.push((Tok::Tilde, i));
                    i += 1;
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Tok::NotEq, i));
                    i += 2;
                } else {
                    return Err(DbError::invalid_filter(i, "expected '=' after '!'"));
                }
            }
            b'<' => match bytes.get(i + 1) {
                Some(&b'=') => {
                    tokens.push((Tok::Le, i));
                    i += 2;
                }
                Some(&b'>') => {
                    tokens.push((Tok::NotEq, i));
                    i += 2;
                }
                _ => {
                    tokens.push((Tok::Lt, i));
                    i += 1;
                }
            },
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Tok::Ge, i));
                    i += 2;
                } else {
                    tokens.push((Tok::Gt, i));
                    i += 1;
                }
            }
            b'\'' => {
                let start = i;
                i += 1;
                let mut text = String::new();
                loop {
                    match bytes.get(i) {
                        None => {
                            return Err(DbError::invalid_filter(start, "unterminated string"));
                        }
                        Some(&b'\'') => {
                            // '' escapes a literal quote
                            if bytes.get(i + 1) == Some(&b'\'') {
                                text.push('\'');
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(_) => {
                            // Consume one UTF-8 scalar
                            let rest = &input[i..];
                            let ch = rest.chars().next().unwrap_or('\u{FFFD}');
                            text.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                tokens.push((Tok::Str(text), start));
            }
            b'[' => {
                let start = i;
                i += 1;
                let name_start = i;
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(DbError::invalid_filter(start, "unterminated '[' name"));
                }
                tokens.push((Tok::Ident(input[name_start..i].to_string()), start));
                i += 1;
            }
            b'0'..=b'9' | b'-' | b'+' | b'.' => {
                let start = i;
                if (c == b'-' || c == b'+')
                    && !bytes
                        .get(i + 1)
                        .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
                {
                    return Err(DbError::invalid_filter(i, "expected a number"));
                }
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit()
                        || bytes[i] == b'.'
                        || bytes[i] == b'e'
                        || bytes[i] == b'E'
                        || ((bytes[i] == b'-' || bytes[i] == b'+')
                            && matches!(bytes[i - 1], b'e' | b'E')))
                {
                    i += 1;
                }
                tokens.push((Tok::Number(input[start..i].to_string()), start));
            }
            _ if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((Tok::Ident(input[start..i].to_string()), start));
            }
            _ => {
                return Err(DbError::invalid_filter(
                    i,
                    format!("unexpected character {:?}", input[i..].chars().next()),
                ));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(&Tok, usize)> {
        self.tokens.get(self.pos).map(|(t, at)| (t, *at))
    }

    fn next(&mut self) -> Option<(Tok, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(_, at)| *at)
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> DbResult<()> {
        match self.next() {
            Some((t, _)) if &t == tok => Ok(()),
            Some((_, at)) => Err(DbError::invalid_filter(at, format!("expected {what}"))),
            None => Err(DbError::invalid_filter(self.at(), format!("expected {what}"))),
        }
    }

    fn peek_keyword(&self) -> Option<String> {
        match self.peek() {
            Some((Tok::Ident(word), _)) => Some(word.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn parse_expr(&mut self) -> DbResult<FilterNode> {
        let first = self.parse_term()?;
        let mut rest = Vec::new();

        while let Some(word) = self.peek_keyword() {
            let bool_op = match word.as_str() {
                "and" => BoolOp::And,
                "or" => BoolOp::Or,
                _ => break,
            };
            self.next();
            rest.push((bool_op, self.parse_term()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(FilterNode::Group(FilterGroup {
                first: Box::new(first),
                rest,
            }))
        }
    }

    fn parse_term(&mut self) -> DbResult<FilterNode> {
        if let Some((Tok::LParen, _)) = self.peek() {
            self.next();
            let node = self.parse_expr()?;
            self.expect(&Tok::RParen, "')'")?;
            Ok(node)
        } else {
            self.parse_atom()
        }
    }

    fn parse_atom(&mut self) -> DbResult<FilterNode> {
        let mut match_mode = MatchMode::CaseSensitive;
        if let Some((Tok::Tilde, _)) = self.peek() {
            self.next();
            match_mode = MatchMode::CaseInsensitive;
        }

        let field = match self.next() {
            Some((Tok::Ident(name), _)) => name,
            Some((_, at)) => return Err(DbError::invalid_filter(at, "expected a field name")),
            None => return Err(DbError::invalid_filter(self.at(), "expected a field name")),
        };

        let mut negated = false;
        if self.peek_keyword().as_deref() == Some("not") {
            self.next();
            negated = true;
        }

        let op = self.parse_op(&mut match_mode, &mut negated)?;

        let rhs = if op == Op::In {
            self.expect(&Tok::LParen, "'(' after IN")?;
            let mut values = vec![self.parse_literal()?];
            while let Some((Tok::Comma, _)) = self.peek() {
                self.next();
                values.push(self.parse_literal()?);
            }
            self.expect(&Tok::RParen, "')' after IN list")?;
            Rhs::List(values)
        } else {
            Rhs::Value(self.parse_literal()?)
        };

        Ok(FilterNode::Atom(FilterAtom {
            field,
            op,
            rhs,
            match_mode,
            negated,
        }))
    }

    fn parse_op(&mut self, match_mode: &mut MatchMode, negated: &mut bool) -> DbResult<Op> {
        match self.next() {
            Some((Tok::Eq, _)) => Ok(Op::Equal),
            Some((Tok::NotEq, _)) => {
                // '!=' and '<>' are sugar for negated equality
                *negated = !*negated;
                Ok(Op::Equal)
            }
            Some((Tok::TildeEq, _)) => {
                *match_mode = MatchMode::CaseInsensitive;
                Ok(Op::Equal)
            }
            Some((Tok::Lt, _)) => Ok(Op::LessThan),
            Some((Tok::Le, _)) => Ok(Op::LessThanOrEqual),
            Some((Tok::Gt, _)) => Ok(Op::GreaterThan),
            Some((Tok::Ge, _)) => Ok(Op::GreaterThanOrEqual),
            Some((Tok::Ident(word), at)) => match word.to_ascii_lowercase().as_str() {
                "in" => Ok(Op::In),
                "regex" => Ok(Op::Regex),
                "contains" => Ok(Op::Contains),
                _ => Err(DbError::invalid_filter(at, format!("unknown operator {word:?}"))),
            },
            Some((_, at)) => Err(DbError::invalid_filter(at, "expected an operator")),
            None => Err(DbError::invalid_filter(self.at(), "expected an operator")),
        }
    }

    /// Literals stay textual; the evaluator coerces them to the field's
    /// type once, when the filter is prepared against the schema.
    fn parse_literal(&mut self) -> DbResult<Value> {
        match self.next() {
            Some((Tok::Str(text), _)) => Ok(Value::Text(text)),
            Some((Tok::Number(raw), _)) => Ok(Value::Text(raw)),
            Some((Tok::Ident(word), at)) => {
                if word.eq_ignore_ascii_case("null") {
                    Ok(Value::Null)
                } else {
                    Err(DbError::invalid_filter(
                        at,
                        format!("expected a literal, got {word:?}"),
                    ))
                }
            }
            Some((_, at)) => Err(DbError::invalid_filter(at, "expected a literal")),
            None => Err(DbError::invalid_filter(self.at(), "expected a literal")),
        }
    }
}
