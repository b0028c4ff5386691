//! Tokenizer shared by the query language and projection expressions.

use std::fmt;

use crate::error::SyntaxError;

/// The category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// An unquoted word.
    Word,
    /// A double-quoted word, with the quotes stripped.
    Quoted,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `:`
    Colon,
    /// `@`
    At,
    /// `,`
    Comma,
    /// `-` at the start of a word.
    Minus,
    /// `*` at the start of a word.
    Star,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Whether this token is a word, quoted or not.
    pub fn is_word(self) -> bool {
        matches!(self, Self::Word | Self::Quoted)
    }

    fn from_op(c: char) -> Option<Self> {
        match c {
            '(' => Some(Self::LParen),
            ')' => Some(Self::RParen),
            ':' => Some(Self::Colon),
            '@' => Some(Self::At),
            ',' => Some(Self::Comma),
            _ => None,
        }
    }
}

/// A single token of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// Byte offset of the start of the token in the input.
    pub offset: usize,
    /// The literal token text. Quoted words exclude their quotes.
    pub text: String,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("end of input"),
            TokenKind::Quoted => write!(f, "{:?}", self.text),
            _ => f.write_str(&self.text),
        }
    }
}

/// Splits `input` into tokens.
///
/// Words run until whitespace or one of `( ) : @ ,`. A `-` or `*` is an
/// operator only where a new token would start, so `foo-bar` is one word
/// while `-foo` is `-` followed by `foo`. Quoted words are delimited by
/// `"` and have no escape sequences.
///
/// The result always ends with an [`TokenKind::Eof`] token whose offset is
/// the length of the input.
///
/// # Errors
///
/// Returns a [`SyntaxError`] at the opening quote if a quoted word is not
/// terminated.
///
/// # Examples
///
/// ```rust
/// use benchproc::kvql::{TokenKind, tokenize};
///
/// let toks = tokenize("-goos:linux")?;
/// let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
/// assert_eq!(
///     kinds,
///     [TokenKind::Minus, TokenKind::Word, TokenKind::Colon, TokenKind::Word, TokenKind::Eof]
/// );
/// # Ok::<(), benchproc::error::SyntaxError>(())
/// ```
pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut toks = Vec::new();
    let mut pos = 0;

    while let Some(c) = input[pos..].chars().next() {
        let op = TokenKind::from_op(c).or(match c {
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            _ => None,
        });
        if let Some(kind) = op {
            toks.push(Token {
                kind,
                offset: pos,
                text: c.to_string(),
            });
            pos += c.len_utf8();
        } else if c.is_whitespace() {
            pos += c.len_utf8();
        } else if c == '"' {
            let body = &input[pos + 1..];
            let Some(end) = body.find('"') else {
                return Err(SyntaxError::new(input, pos, "missing end quote"));
            };
            toks.push(Token {
                kind: TokenKind::Quoted,
                offset: pos,
                text: body[..end].to_string(),
            });
            pos += end + 2;
        } else {
            let rest = &input[pos..];
            let end = rest
                .find(|c: char| c.is_whitespace() || TokenKind::from_op(c).is_some())
                .unwrap_or(rest.len());
            toks.push(Token {
                kind: TokenKind::Word,
                offset: pos,
                text: rest[..end].to_string(),
            });
            pos += end;
        }
    }

    toks.push(Token {
        kind: TokenKind::Eof,
        offset: input.len(),
        text: String::new(),
    });
    Ok(toks)
}
