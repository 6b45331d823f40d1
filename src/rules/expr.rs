//! Boolean rule expressions over tag membership.
//!
//! Grammar, loosest binding first (`not` binds looser than `|`, and `|`
//! looser than `&`):
//!
//! ```text
//! expr    := "not" expr | "only" expr | or_expr
//! or_expr := and_expr ( "|" and_expr )*
//! and_expr:= atom ( "&" atom )*
//! atom    := QUOTED_TAG | "(" expr ")"
//! ```
//!
//! Tags are single- or double-quoted literals and may contain any other
//! character, including `&`, `|`, parentheses and the word `only`.

use std::collections::BTreeSet;
use thiserror::Error;

/// Parse failure with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Parsed rule expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// True when the entity carries this tag.
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// True when the inner expression holds and the entity carries no tag
    /// the inner expression does not mention.
    Only(Box<Expr>),
}

impl Expr {
    /// Parse an expression string.
    pub fn parse(text: &str) -> Result<Expr, SyntaxError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: text.len(),
        };
        let expr = parser.expr()?;
        if let Some((_, offset)) = parser.peek_with_offset() {
            return Err(SyntaxError::new("unexpected trailing input", offset));
        }
        Ok(expr)
    }

    /// Tag literals mentioned anywhere in the expression.
    pub fn mentioned_tags(&self) -> BTreeSet<&str> {
        let mut tags = BTreeSet::new();
        self.collect_tags(&mut tags);
        tags
    }

    fn collect_tags<'a>(&'a self, tags: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Tag(name) => {
                tags.insert(name.as_str());
            }
            Expr::Not(inner) | Expr::Only(inner) => inner.collect_tags(tags),
            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.collect_tags(tags);
                rhs.collect_tags(tags);
            }
        }
    }
}

/// Expression with tags resolved to membership-vector positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compiled {
    Var(usize),
    Const(bool),
    Not(Box<Compiled>),
    And(Box<Compiled>, Box<Compiled>),
    Or(Box<Compiled>, Box<Compiled>),
}

impl Compiled {
    /// Evaluate against one entity's membership vector.
    pub fn eval(&self, membership: &[bool]) -> bool {
        match self {
            Compiled::Var(i) => membership[*i],
            Compiled::Const(b) => *b,
            Compiled::Not(inner) => !inner.eval(membership),
            Compiled::And(lhs, rhs) => lhs.eval(membership) && rhs.eval(membership),
            Compiled::Or(lhs, rhs) => lhs.eval(membership) || rhs.eval(membership),
        }
    }

    /// Disjunction of the given variables; `false` when there are none.
    pub fn any_of(vars: impl IntoIterator<Item = usize>) -> Compiled {
        vars.into_iter()
            .map(Compiled::Var)
            .reduce(|acc, var| Compiled::Or(Box::new(acc), Box::new(var)))
            .unwrap_or(Compiled::Const(false))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    And,
    Or,
    Not,
    Only,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '&' => {
                chars.next();
                tokens.push((Token::And, offset));
            }
            '|' => {
                chars.next();
                tokens.push((Token::Or, offset));
            }
            '(' => {
                chars.next();
                tokens.push((Token::LParen, offset));
            }
            ')' => {
                chars.next();
                tokens.push((Token::RParen, offset));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(SyntaxError::new("unterminated tag literal", offset));
                }
                if name.is_empty() {
                    return Err(SyntaxError::new("empty tag literal", offset));
                }
                tokens.push((Token::Tag(name), offset));
            }
            c if c.is_alphabetic() => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !c.is_alphanumeric() && c != '_' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                match word.as_str() {
                    "not" => tokens.push((Token::Not, offset)),
                    "only" => tokens.push((Token::Only, offset)),
                    _ => {
                        return Err(SyntaxError::new(
                            format!("unexpected word '{}' (tags must be quoted)", word),
                            offset,
                        ))
                    }
                }
            }
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{}'", other),
                    offset,
                ))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_with_offset(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, o)| (t, *o))
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.expr()?)))
            }
            Some(Token::Only) => {
                self.pos += 1;
                Ok(Expr::Only(Box::new(self.expr()?)))
            }
            _ => self.or_expr(),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and_expr()?;
        while let Some(Token::Or) = self.peek() {
            self.pos += 1;
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.atom()?;
        while let Some(Token::And) = self.peek() {
            self.pos += 1;
            let rhs = self.atom()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let offset = self.offset();
        match self.tokens.get(self.pos).map(|(t, _)| t.clone()) {
            Some(Token::Tag(name)) => {
                self.pos += 1;
                Ok(Expr::Tag(name))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(SyntaxError::new("expected ')'", self.offset())),
                }
            }
            Some(Token::Not) | Some(Token::Only) => Err(SyntaxError::new(
                "'not'/'only' must start an expression; wrap it in parentheses",
                offset,
            )),
            Some(token) => Err(SyntaxError::new(
                format!("expected a tag or '(' but found {:?}", token),
                offset,
            )),
            None => Err(SyntaxError::new("unexpected end of expression", offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> Box<Expr> {
        Box::new(Expr::Tag(name.to_string()))
    }

    #[test]
    fn test_parse_single_tag() {
        assert_eq!(
            Expr::parse("'Northwestern Press'").unwrap(),
            Expr::Tag("Northwestern Press".to_string())
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = Expr::parse("'a' | 'b' & 'c'").unwrap();
        assert_eq!(expr, Expr::Or(tag("a"), Box::new(Expr::And(tag("b"), tag("c")))));
    }

    #[test]
    fn test_not_binds_looser_than_or() {
        let expr = Expr::parse("not 'a' | 'b'").unwrap();
        assert_eq!(expr, Expr::Not(Box::new(Expr::Or(tag("a"), tag("b")))));
    }

    #[test]
    fn test_only_prefix() {
        let expr = Expr::parse("only ('a' | 'b')").unwrap();
        assert_eq!(expr, Expr::Only(Box::new(Expr::Or(tag("a"), tag("b")))));
    }

    #[test]
    fn test_tag_names_with_operators_and_keywords() {
        let expr = Expr::parse("'Life & Death of Stars' & \"only (maybe) | not\"").unwrap();
        let tags: Vec<&str> = expr.mentioned_tags().into_iter().collect();
        assert_eq!(tags, vec!["Life & Death of Stars", "only (maybe) | not"]);
    }

    #[test]
    fn test_mentioned_tags_deduplicates() {
        let expr =
            Expr::parse("'Northwestern Press' | ( 'Northwestern Press' & 'CIERA Press')").unwrap();
        assert_eq!(expr.mentioned_tags().len(), 2);
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "",
            "'a' &",
            "('a' | 'b'",
            "'a' 'b'",
            "'unterminated",
            "a",
            "'a' & not 'b'",
            "'a' ^ 'b'",
            "''",
            ")",
        ] {
            assert!(Expr::parse(bad).is_err(), "expected error for {:?}", bad);
        }
    }

    #[test]
    fn test_error_offset() {
        let err = Expr::parse("'a' & 'b' )").unwrap_err();
        assert_eq!(err.offset, 10);
    }

    #[test]
    fn test_compiled_eval() {
        let program = Compiled::And(
            Box::new(Compiled::Var(0)),
            Box::new(Compiled::Not(Box::new(Compiled::any_of([1, 2])))),
        );
        assert!(program.eval(&[true, false, false]));
        assert!(!program.eval(&[true, false, true]));
        assert!(!program.eval(&[false, false, false]));
        assert_eq!(Compiled::any_of(Vec::new()), Compiled::Const(false));
    }
}
