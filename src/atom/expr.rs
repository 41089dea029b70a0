// src/atom/expr.rs

//! Dependency expressions
//!
//! Two spellings are understood:
//! - legacy or-dependencies, `app-misc/a;app-misc/b?`: alternatives joined
//!   by `;` and terminated by `?`
//! - boolean expressions, `( app-misc/a & app-misc/b ) | app-misc/c`
//!
//! Both produce the same tree. Parentheses inside USE brackets
//! (`flag(+)`) belong to the atom, not to the expression.

use super::Atom;
use crate::error::{Error, Result};
use std::fmt;

/// Separator between legacy or-dependency alternatives
pub const OR_SEPARATOR: char = ';';

/// Terminator of a legacy or-dependency
pub const OR_TERMINATOR: char = '?';

/// A dependency expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepExpr {
    Atom(Atom),
    /// First satisfied alternative wins
    AnyOf(Vec<DepExpr>),
    /// Every operand must be satisfied
    AllOf(Vec<DepExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Leaf(String),
}

impl DepExpr {
    pub fn parse(s: &str) -> Result<Self> {
        let text = s.trim();
        if text.is_empty() {
            return Err(Error::ParseError("Empty dependency".to_string()));
        }
        if is_boolean(text) {
            let tokens = tokenize(text)?;
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.expression()?;
            if parser.pos != parser.tokens.len() {
                return Err(Error::ParseError(format!(
                    "Unexpected ')' in dependency: {text}"
                )));
            }
            Ok(expr)
        } else {
            parse_leaf(text)
        }
    }

    /// All atoms of the tree, left to right
    pub fn atoms(&self) -> Vec<&Atom> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a Atom>) {
        match self {
            DepExpr::Atom(atom) => out.push(atom),
            DepExpr::AnyOf(items) | DepExpr::AllOf(items) => {
                for item in items {
                    item.collect_atoms(out);
                }
            }
        }
    }
}

impl fmt::Display for DepExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, items: &[DepExpr], op: &str| -> fmt::Result {
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, ")")
        };
        match self {
            DepExpr::Atom(atom) => write!(f, "{atom}"),
            DepExpr::AnyOf(items) => join(f, items, "|"),
            DepExpr::AllOf(items) => join(f, items, "&"),
        }
    }
}

/// A single atom or a legacy `a;b?` alternative list
fn parse_leaf(text: &str) -> Result<DepExpr> {
    match text.strip_suffix(OR_TERMINATOR) {
        Some(body) => {
            let alternatives = body
                .split(OR_SEPARATOR)
                .map(|alt| {
                    if alt.is_empty() {
                        Err(Error::ParseError(format!(
                            "Empty alternative in or-dependency: {text}"
                        )))
                    } else {
                        Atom::parse(alt).map(DepExpr::Atom)
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(DepExpr::AnyOf(alternatives))
        }
        None => {
            if text.contains(OR_SEPARATOR) {
                return Err(Error::ParseError(format!(
                    "Or-dependency without '{OR_TERMINATOR}' terminator: {text}"
                )));
            }
            Atom::parse(text).map(DepExpr::Atom)
        }
    }
}

/// True when the text uses `&`, `|` or grouping outside USE brackets
fn is_boolean(text: &str) -> bool {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '(' | ')' | '&' | '|' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut leaf = String::new();
    let mut depth = 0usize;

    let flush = |leaf: &mut String, tokens: &mut Vec<Token>| {
        if !leaf.is_empty() {
            tokens.push(Token::Leaf(std::mem::take(leaf)));
        }
    };

    for c in text.chars() {
        if depth > 0 {
            if c == ']' {
                depth -= 1;
            }
            leaf.push(c);
            continue;
        }
        match c {
            '[' => {
                depth += 1;
                leaf.push(c);
            }
            '(' => {
                flush(&mut leaf, &mut tokens);
                tokens.push(Token::Open);
            }
            ')' => {
                flush(&mut leaf, &mut tokens);
                tokens.push(Token::Close);
            }
            '&' => {
                flush(&mut leaf, &mut tokens);
                tokens.push(Token::And);
            }
            '|' => {
                flush(&mut leaf, &mut tokens);
                tokens.push(Token::Or);
            }
            c if c.is_whitespace() => flush(&mut leaf, &mut tokens),
            c => leaf.push(c),
        }
    }
    if depth > 0 {
        return Err(Error::ParseError(format!("Unclosed '[' in dependency: {text}")));
    }
    flush(&mut leaf, &mut tokens);
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// operand (op operand)*, with a single operator kind per level
    fn expression(&mut self) -> Result<DepExpr> {
        let mut operands = vec![self.operand()?];
        let mut operator: Option<Token> = None;

        while let Some(token) = self.peek().cloned() {
            match token {
                Token::And | Token::Or => {
                    if let Some(existing) = &operator {
                        if *existing != token {
                            return Err(Error::ParseError(
                                "Mixed '&' and '|' without parentheses".to_string(),
                            ));
                        }
                    }
                    operator = Some(token);
                    self.pos += 1;
                    operands.push(self.operand()?);
                }
                Token::Close => break,
                Token::Open | Token::Leaf(_) => {
                    return Err(Error::ParseError(
                        "Missing operator between dependency operands".to_string(),
                    ));
                }
            }
        }

        Ok(match operator {
            None => operands.remove(0),
            Some(Token::And) => DepExpr::AllOf(operands),
            Some(_) => DepExpr::AnyOf(operands),
        })
    }

    fn operand(&mut self) -> Result<DepExpr> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Open) => {
                self.pos += 1;
                if self.peek() == Some(&Token::Close) {
                    return Err(Error::ParseError("Empty group in dependency".to_string()));
                }
                let inner = self.expression()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(Error::ParseError("Unclosed '(' in dependency".to_string()));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(Token::Leaf(text)) => {
                self.pos += 1;
                parse_leaf(&text)
            }
            Some(_) => Err(Error::ParseError(
                "Expected an atom or '(' in dependency".to_string(),
            )),
            None => Err(Error::ParseError("Truncated dependency".to_string())),
        }
    }
}
