//! The query tree produced by [`parse`](super::parse).

use std::fmt;

use regex::Regex;

/// A boolean operator in a [`Query`] tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// True if every child is true. True with no children.
    And,
    /// True if any child is true. False with no children.
    Or,
    /// Negates its single child.
    Not,
}

/// A value pattern: a regular expression that must match a whole value.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles `source` as a pattern anchored at both ends.
    ///
    /// # Errors
    ///
    /// Returns the regex error if `source` is not a valid expression.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        // Check the pattern as written so errors refer to the user's text
        // rather than the anchored wrapper.
        Regex::new(source)?;
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The pattern as written in the query.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern matches all of `value`.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

/// A node in a parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// A leaf testing one key against a value pattern.
    Match {
        /// Byte offset of the key in the original query.
        offset: usize,
        /// The key to extract from each record.
        key: String,
        /// The pattern the extracted value must match.
        pattern: Pattern,
    },
    /// A boolean combination of subqueries. [`Op::Not`] always has exactly
    /// one child.
    Op {
        /// The operator.
        op: Op,
        /// The operands.
        exprs: Vec<Query>,
    },
}

impl Query {
    /// The query that matches everything: `*`.
    pub fn all() -> Self {
        Self::Op {
            op: Op::And,
            exprs: Vec::new(),
        }
    }

    /// The conjunction of `exprs`.
    pub fn and(exprs: Vec<Query>) -> Self {
        Self::Op { op: Op::And, exprs }
    }

    /// The disjunction of `exprs`.
    pub fn or(exprs: Vec<Query>) -> Self {
        Self::Op { op: Op::Or, exprs }
    }

    /// The negation of `expr`.
    pub fn not(expr: Query) -> Self {
        Self::Op {
            op: Op::Not,
            exprs: vec![expr],
        }
    }

    /// Calls `f` on every [`Query::Match`] leaf, in order.
    pub fn for_each_match<'q>(&'q self, f: &mut impl FnMut(&'q str, &'q Pattern, usize)) {
        match self {
            Self::Match {
                offset,
                key,
                pattern,
            } => f(key, pattern, *offset),
            Self::Op { exprs, .. } => {
                for e in exprs {
                    e.for_each_match(f);
                }
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match { key, pattern, .. } => {
                write!(
                    f,
                    "{}:{}",
                    Quoted { text: key, pattern: false },
                    Quoted {
                        text: pattern.as_str(),
                        pattern: true,
                    }
                )
            }
            Self::Op { op: Op::Not, exprs } => match exprs.first() {
                Some(e) => write!(f, "-{e}"),
                None => f.write_str("-*"),
            },
            Self::Op { op: Op::And, exprs } if exprs.is_empty() => f.write_str("*"),
            Self::Op { op: Op::Or, exprs } if exprs.is_empty() => f.write_str("-*"),
            Self::Op { op, exprs } => {
                let sep = if *op == Op::And { " AND " } else { " OR " };
                f.write_str("(")?;
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Formats a key or value, quoting it when it would not re-tokenize as a
/// single word.
///
/// Quoted words cannot contain `"`. A word that only has `"` after its
/// first character stays unquoted; a pattern that must be quoted spells
/// each `"` as the regex escape `\x22`.
struct Quoted<'a> {
    text: &'a str,
    pattern: bool,
}

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.text;
        let needs_quotes = s.is_empty()
            || s == "AND"
            || s == "OR"
            || s.starts_with(['-', '*', '"'])
            || s.chars()
                .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ':' | '@' | ','));
        if !needs_quotes {
            return f.write_str(s);
        }
        if !self.pattern || !s.contains('"') {
            return write!(f, "\"{s}\"");
        }

        f.write_str("\"")?;
        let mut escaped = false;
        for c in s.chars() {
            match c {
                '"' if escaped => f.write_str("x22")?,
                '"' => f.write_str("\\x22")?,
                _ => write!(f, "{c}")?,
            }
            escaped = c == '\\' && !escaped;
        }
        f.write_str("\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: &str, pat: &str) -> Query {
        Query::Match {
            offset: 0,
            key: key.to_string(),
            pattern: Pattern::new(pat).unwrap(),
        }
    }

    #[test]
    fn test_pattern_is_anchored() {
        let p = Pattern::new("ns/op|B/op").unwrap();
        assert!(p.is_match("ns/op"));
        assert!(p.is_match("B/op"));
        assert!(!p.is_match("allocs/op"));
        assert!(!p.is_match("xns/op"));
        assert_eq!(p.as_str(), "ns/op|B/op");
    }

    #[test]
    fn test_pattern_error_refers_to_source() {
        let err = Pattern::new("a(").unwrap_err();
        assert!(!err.to_string().contains("^(?:"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Query::all().to_string(), "*");
        assert_eq!(Query::or(vec![]).to_string(), "-*");
        assert_eq!(Query::not(Query::all()).to_string(), "-*");
        let q = Query::and(vec![leaf("a", "b"), Query::not(leaf("c", "d"))]);
        assert_eq!(q.to_string(), "(a:b AND -c:d)");
        let q = Query::or(vec![leaf("a", "b c"), leaf("OR", "-1")]);
        assert_eq!(q.to_string(), r#"(a:"b c" OR "OR":"-1")"#);
        assert_eq!(leaf("a", "").to_string(), r#"a:"""#);
    }

    #[test]
    fn test_display_embedded_quote_reparses() {
        let q = leaf("a", "x\"y");
        assert_eq!(q.to_string(), r#"a:x"y"#);
        assert_eq!(crate::kvql::parse(&q.to_string()).unwrap().to_string(), r#"a:x"y"#);

        let q = leaf("a", "x\" y");
        assert_eq!(q.to_string(), r#"a:"x\x22 y""#);
        let Query::Match { pattern, .. } = crate::kvql::parse(&q.to_string()).unwrap() else {
            panic!("expected a match");
        };
        assert!(pattern.is_match("x\" y"));

        let q = leaf("a", r#""y"#);
        assert_eq!(q.to_string(), r#"a:"\x22y""#);
    }

    #[test]
    fn test_for_each_match() {
        let q = Query::and(vec![leaf("a", "1"), Query::or(vec![leaf("b", "2"), leaf("a", "3")])]);
        let mut keys = Vec::new();
        q.for_each_match(&mut |key, _, _| keys.push(key));
        assert_eq!(keys, ["a", "b", "a"]);
    }
}
