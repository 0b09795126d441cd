//! Parsing of string templates and the small expression language inside `${ }`.
//!
//! A configuration string is literal text with `${expr}` interpolations;
//! `$${` produces a literal `${`. Inside an interpolation the grammar is:
//!
//! ```text
//! expr      := literal | list | call | traversal
//! literal   := NUMBER | STRING | "true" | "false" | "null"
//! list      := "[" (expr ("," expr)* ","?)? "]"
//! call      := IDENT "(" (expr ("," expr)*)? ")"
//! traversal := IDENT ("." IDENT | "." NUMBER | "[" NUMBER "]")*
//! ```
//!
//! A string consisting of exactly one interpolation evaluates to the
//! interpolated value itself, not its string form.

use super::expr::{ExprKind, Expression, Step, TemplatePart, Traversal};
use crate::value::{MarkedValue, SourceRange};
use thiserror::Error;

/// A syntax error in a template or interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte {offset})")]
pub struct TemplateError {
    /// What went wrong.
    pub message: String,
    /// Byte offset in the template text.
    pub offset: usize,
}

impl TemplateError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Parses a configuration string into an expression.
///
/// # Errors
///
/// Returns an error for unterminated interpolations or malformed expressions.
pub fn parse_template(text: &str, range: &SourceRange) -> Result<Expression, TemplateError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        if rest.starts_with("$${") {
            literal.push_str("${");
            i += 3;
        } else if rest.starts_with("${") {
            let start = i + 2;
            let end = find_closing_brace(text, start)?;
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            let expr = parse_expression(&text[start..end], start, range)?;
            parts.push(TemplatePart::Interpolation(expr));
            i = end + 1;
        } else if let Some(ch) = rest.chars().next() {
            literal.push(ch);
            i += ch.len_utf8();
        }
    }

    if parts.is_empty() {
        return Ok(Expression::new(
            ExprKind::Literal(MarkedValue::string(literal)),
            range.span(0, text.len()),
        ));
    }
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    if parts.len() == 1
        && let Some(TemplatePart::Interpolation(expr)) = parts.pop()
    {
        return Ok(expr);
    }
    Ok(Expression::new(
        ExprKind::Template(parts),
        range.span(0, text.len()),
    ))
}

/// Parses a bare expression such as a `depends_on` entry.
///
/// # Errors
///
/// Returns an error when `text` is not a single well-formed expression.
pub fn parse_expression(
    text: &str,
    base: usize,
    range: &SourceRange,
) -> Result<Expression, TemplateError> {
    let tokens = tokenize(text, base)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        range,
    };
    let expr = parser.expression()?;
    let trailing = parser.peek();
    if trailing.tok != Tok::Eof {
        return Err(TemplateError::new(
            "Extra characters after interpolation expression",
            trailing.start,
        ));
    }
    Ok(expr)
}

fn find_closing_brace(text: &str, start: usize) -> Result<usize, TemplateError> {
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' if depth == 0 => return Ok(start + offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    Err(TemplateError::new(
        "Unterminated template interpolation; expected a closing \"}\"",
        start - 2,
    ))
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(f64),
    Str(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    start: usize,
    end: usize,
}

fn tokenize(text: &str, base: usize) -> Result<Vec<Token>, TemplateError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let offset_of = |idx: usize| chars.get(idx).map_or(text.len(), |(o, _)| *o) + base;

    while i < chars.len() {
        let (_, ch) = chars[i];
        let start = offset_of(i);
        let single = match ch {
            '.' => Some(Tok::Dot),
            ',' => Some(Tok::Comma),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            '[' => Some(Tok::LBracket),
            ']' => Some(Tok::RBracket),
            _ => None,
        };
        if let Some(tok) = single {
            tokens.push(Token {
                tok,
                start,
                end: start + 1,
            });
            i += 1;
            continue;
        }
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        if ch == '"' {
            let mut value = String::new();
            let mut j = i + 1;
            let mut closed = false;
            while j < chars.len() {
                match chars[j].1 {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => {
                        j += 1;
                        match chars.get(j).map(|(_, c)| *c) {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(other) => value.push(other),
                            None => break,
                        }
                    }
                    other => value.push(other),
                }
                j += 1;
            }
            if !closed {
                return Err(TemplateError::new("Unterminated string literal", start));
            }
            tokens.push(Token {
                tok: Tok::Str(value),
                start,
                end: offset_of(j + 1),
            });
            i = j + 1;
            continue;
        }
        if ch.is_ascii_digit() || (ch == '-' && chars.get(i + 1).is_some_and(|(_, c)| c.is_ascii_digit())) {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_ascii_digit() {
                j += 1;
            }
            if j + 1 < chars.len() && chars[j].1 == '.' && chars[j + 1].1.is_ascii_digit() {
                j += 1;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
            }
            let end = offset_of(j);
            let literal = &text[start - base..end - base];
            let number = literal
                .parse::<f64>()
                .map_err(|_| TemplateError::new(format!("Invalid number {literal:?}"), start))?;
            tokens.push(Token {
                tok: Tok::Number(number),
                start,
                end,
            });
            i = j;
            continue;
        }
        if ch.is_alphabetic() || ch == '_' {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].1.is_alphanumeric() || matches!(chars[j].1, '_' | '-')) {
                j += 1;
            }
            let end = offset_of(j);
            tokens.push(Token {
                tok: Tok::Ident(text[start - base..end - base].to_string()),
                start,
                end,
            });
            i = j;
            continue;
        }
        return Err(TemplateError::new(
            format!("Invalid character {ch:?} in expression"),
            start,
        ));
    }

    let end = base + text.len();
    tokens.push(Token {
        tok: Tok::Eof,
        start: end,
        end,
    });
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    range: &'a SourceRange,
}

impl Parser<'_> {
    fn peek(&self) -> Token {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .cloned()
            .unwrap_or(Token {
                tok: Tok::Eof,
                start: 0,
                end: 0,
            })
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<Token, TemplateError> {
        let token = self.advance();
        if &token.tok == tok {
            Ok(token)
        } else {
            Err(TemplateError::new(format!("Expected {what}"), token.start))
        }
    }

    fn expression(&mut self) -> Result<Expression, TemplateError> {
        let token = self.advance();
        match token.tok {
            Tok::Number(n) => Ok(self.literal(MarkedValue::number(n), token.start, token.end)),
            Tok::Str(s) => Ok(self.literal(MarkedValue::string(s), token.start, token.end)),
            Tok::LBracket => self.list(token.start),
            Tok::Ident(name) => match name.as_str() {
                "true" => Ok(self.literal(MarkedValue::bool(true), token.start, token.end)),
                "false" => Ok(self.literal(MarkedValue::bool(false), token.start, token.end)),
                "null" => Ok(self.literal(MarkedValue::null(), token.start, token.end)),
                _ if self.peek().tok == Tok::LParen => self.call(name, token.start),
                _ => self.traversal(name, token.start, token.end),
            },
            _ => Err(TemplateError::new("Expected an expression", token.start)),
        }
    }

    fn literal(&self, value: MarkedValue, start: usize, end: usize) -> Expression {
        Expression::new(ExprKind::Literal(value), self.range.span(start, end))
    }

    fn list(&mut self, start: usize) -> Result<Expression, TemplateError> {
        let mut items = Vec::new();
        loop {
            if self.peek().tok == Tok::RBracket {
                break;
            }
            items.push(self.expression()?);
            if self.peek().tok == Tok::Comma {
                self.advance();
            } else {
                break;
            }
        }
        let close = self.expect(&Tok::RBracket, "\"]\" to close the list")?;
        Ok(Expression::new(
            ExprKind::List(items),
            self.range.span(start, close.end),
        ))
    }

    fn call(&mut self, name: String, start: usize) -> Result<Expression, TemplateError> {
        self.expect(&Tok::LParen, "\"(\"")?;
        let mut args = Vec::new();
        if self.peek().tok != Tok::RParen {
            loop {
                args.push(self.expression()?);
                if self.peek().tok == Tok::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let close = self.expect(&Tok::RParen, "\")\" to close the function call")?;
        Ok(Expression::new(
            ExprKind::Call { name, args },
            self.range.span(start, close.end),
        ))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn traversal(&mut self, root: String, start: usize, mut end: usize) -> Result<Expression, TemplateError> {
        let mut steps = Vec::new();
        loop {
            match self.peek().tok {
                Tok::Dot => {
                    self.advance();
                    let token = self.advance();
                    match token.tok {
                        Tok::Ident(name) => steps.push(Step::Attr(name)),
                        Tok::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                            steps.push(Step::Index(n as usize));
                        }
                        _ => {
                            return Err(TemplateError::new(
                                "Expected an attribute name after \".\"",
                                token.start,
                            ));
                        }
                    }
                    end = token.end;
                }
                Tok::LBracket => {
                    self.advance();
                    let token = self.advance();
                    match token.tok {
                        Tok::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                            steps.push(Step::Index(n as usize));
                        }
                        _ => {
                            return Err(TemplateError::new(
                                "Index must be a non-negative whole number",
                                token.start,
                            ));
                        }
                    }
                    end = self.expect(&Tok::RBracket, "\"]\" to close the index")?.end;
                }
                _ => break,
            }
        }
        Ok(Expression::new(
            ExprKind::Traversal(Traversal { root, steps }),
            self.range.span(start, end),
        ))
    }
}
