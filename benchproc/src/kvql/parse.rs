//! Recursive-descent parser for the query language.
//!
//! ```text
//! expr    = and_expr {"OR" and_expr}
//! and_expr = phrase {"AND" phrase}
//! phrase  = match {match}
//! match   = "(" expr ")"
//!         | "-" match
//!         | "*"
//!         | word ":" (word | "(" {word} ")")
//! ```
//!
//! Every rule takes the index of its first token and returns the index of
//! the token after it. On error the parser records the error with the
//! smallest offset seen so far and jumps to the end-of-input token, which
//! unwinds every rule without further errors being preferred.

use super::query::{Pattern, Query};
use super::token::{Token, TokenKind, tokenize};
use crate::error::SyntaxError;

/// Parses a query string into a [`Query`] tree.
///
/// Adjacent matches form an implicit AND that binds tighter than the `AND`
/// and `OR` keywords, so `a:b c:d OR e:f` is `(a:b AND c:d) OR e:f`.
/// `key:(v1 v2)` is shorthand for `(key:v1 OR key:v2)`. Values are regular
/// expressions that must match the whole value.
///
/// # Errors
///
/// Returns a [`SyntaxError`] for malformed input, including invalid regular
/// expressions.
///
/// # Examples
///
/// ```rust
/// use benchproc::kvql::parse;
///
/// let q = parse("a:b AND c:d OR e:f")?;
/// assert_eq!(q.to_string(), "((a:b AND c:d) OR e:f)");
/// # Ok::<(), benchproc::error::SyntaxError>(())
/// ```
pub fn parse(query: &str) -> Result<Query, SyntaxError> {
    let toks = tokenize(query)?;
    let mut p = Parser {
        query,
        toks: &toks,
        err: None,
    };

    let (q, i) = p.expr(0);
    if p.kind(i) != TokenKind::Eof {
        let msg = format!("unexpected {:?}", p.toks[i].text);
        p.error(i, msg);
    }
    match (p.err, q) {
        (Some(err), _) => Err(err),
        (None, Some(q)) => Ok(q),
        // Every path that yields no query also records an error.
        (None, None) => Err(SyntaxError::new(query, 0, "nothing to match")),
    }
}

type Parsed = (Option<Query>, usize);

struct Parser<'a> {
    query: &'a str,
    toks: &'a [Token],
    err: Option<SyntaxError>,
}

impl Parser<'_> {
    /// Records an error at token `i`, keeping the earliest error, and
    /// returns the index of the end-of-input token.
    fn error(&mut self, i: usize, msg: impl Into<String>) -> usize {
        let offset = self.toks[i].offset;
        if self.err.as_ref().is_none_or(|e| offset < e.offset) {
            self.err = Some(SyntaxError::new(self.query, offset, msg));
        }
        self.toks.len() - 1
    }

    fn fail(&mut self, i: usize, msg: impl Into<String>) -> Parsed {
        (None, self.error(i, msg))
    }

    fn kind(&self, i: usize) -> TokenKind {
        self.toks[i].kind
    }

    /// Whether token `i` is the unquoted keyword `kw`.
    fn is_keyword(&self, i: usize, kw: &str) -> bool {
        let tok = &self.toks[i];
        tok.kind == TokenKind::Word && tok.text == kw
    }

    /// Whether token `i` is usable as a key or value.
    fn is_word(&self, i: usize) -> bool {
        self.kind(i).is_word() && !self.is_keyword(i, "AND") && !self.is_keyword(i, "OR")
    }

    fn expr(&mut self, i: usize) -> Parsed {
        self.or_expr(i)
    }

    fn or_expr(&mut self, i: usize) -> Parsed {
        self.binary(i, "OR", Self::and_expr, Query::or)
    }

    fn and_expr(&mut self, i: usize) -> Parsed {
        self.binary(i, "AND", Self::phrase, Query::and)
    }

    fn binary(
        &mut self,
        i: usize,
        kw: &str,
        operand: fn(&mut Self, usize) -> Parsed,
        combine: fn(Vec<Query>) -> Query,
    ) -> Parsed {
        let (first, mut i) = operand(self, i);
        if !self.is_keyword(i, kw) {
            return (first, i);
        }
        let mut terms: Vec<Query> = first.into_iter().collect();
        while self.is_keyword(i, kw) {
            let (q, next) = operand(self, i + 1);
            terms.extend(q);
            i = next;
        }
        (Some(combine(terms)), i)
    }

    fn phrase(&mut self, mut i: usize) -> Parsed {
        let mut terms = Vec::new();
        loop {
            match self.kind(i) {
                TokenKind::RParen | TokenKind::Eof => break,
                _ if self.is_keyword(i, "AND") || self.is_keyword(i, "OR") => break,
                TokenKind::LParen | TokenKind::Minus | TokenKind::Star => {}
                k if k.is_word() => {}
                _ => {
                    let msg = format!("unexpected {:?}", self.toks[i].text);
                    return self.fail(i, msg);
                }
            }
            let (q, next) = self.match_term(i);
            terms.extend(q);
            i = next;
        }
        match terms.len() {
            0 => self.fail(i, "nothing to match"),
            1 => (terms.pop(), i),
            _ => (Some(Query::and(terms)), i),
        }
    }

    fn match_term(&mut self, i: usize) -> Parsed {
        match self.kind(i) {
            TokenKind::LParen => {
                let (q, i) = self.expr(i + 1);
                if self.kind(i) != TokenKind::RParen {
                    return self.fail(i, "missing \")\"");
                }
                (q, i + 1)
            }
            TokenKind::Minus => {
                let (q, i) = self.match_term(i + 1);
                (q.map(Query::not), i)
            }
            TokenKind::Star => (Some(Query::all()), i + 1),
            _ if self.is_word(i) => self.key_match(i),
            _ => self.fail(i, "expected key:value or subexpression"),
        }
    }

    fn key_match(&mut self, i: usize) -> Parsed {
        let toks = self.toks;
        let offset = toks[i].offset;
        let key = toks[i].text.as_str();
        if self.kind(i + 1) != TokenKind::Colon {
            return self.fail(i, "expected key:value");
        }

        if self.is_word(i + 2) {
            return self.value(i + 2, offset, key);
        }
        if self.kind(i + 2) != TokenKind::LParen {
            return self.fail(i, "expected key:value");
        }

        let open = i + 2;
        let mut i = open + 1;
        let mut terms = Vec::new();
        while self.is_word(i) {
            let (q, next) = self.value(i, offset, key);
            terms.extend(q);
            i = next;
        }
        match self.kind(i) {
            TokenKind::RParen if terms.is_empty() => self.fail(i, "nothing to match"),
            TokenKind::RParen => (Some(Query::or(terms)), i + 1),
            TokenKind::Eof => self.fail(open, "missing \")\""),
            _ => self.fail(i, "expected value"),
        }
    }

    fn value(&mut self, i: usize, offset: usize, key: &str) -> Parsed {
        match Pattern::new(&self.toks[i].text) {
            Ok(pattern) => (
                Some(Query::Match {
                    offset,
                    key: key.to_string(),
                    pattern,
                }),
                i + 1,
            ),
            Err(err) => self.fail(i, err.to_string()),
        }
    }
}
