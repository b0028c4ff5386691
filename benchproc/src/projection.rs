//! Parsing projection expressions into [`Schema`]s.
//!
//! A projection expression is a comma-separated list of keys, each with an
//! optional sort order or exact value list:
//!
//! ```text
//! tuple      = [projection {"," projection}]
//! projection = "(" tuple ")" | key ["@" order | ":" "(" value {value} ")"]
//! order      = "first" | "alpha" | "numeric"
//! ```
//!
//! Keys are those accepted by [`Extractor::new`], plus:
//!
//! - `.config`, a group of every file configuration key
//! - `.unit`, the per-measurement unit (see [`Schema::project_values`])
//!
//! `key:(v1 v2)` orders `key` by the listed values and rejects records with
//! any other value. Parenthesized sub-tuples become nested tuples in
//! [`Schema::to_config`].

use tracing::debug;

use crate::error::{ExtractorError, SyntaxError};
use crate::extract::Extractor;
use crate::kvql::{Token, TokenKind, tokenize};
use crate::schema::{Order, Schema, SharedExclusions, UNIT_KEY};

/// Parses projection expressions that share one key space.
///
/// The schemas produced by one parser are mutually exclusive: a specific
/// key in any projection is excluded from the `.config` and `.fullname`
/// group keys, whether it was parsed before or after the group. Given the
/// projections `.config` and `commit`, the `.config` group skips the
/// `commit` key.
///
/// Finish parsing before projecting records. `.config` checks its
/// exclusions when it first sees a key, and `.fullname` fixes its
/// exclusions when the first record is projected.
#[derive(Debug, Default)]
pub struct ProjectionParser {
    exclusions: SharedExclusions,
    have_config: bool,
    have_fullname: bool,
}

/// Why a single projection was rejected.
enum ProjectionError {
    UnknownOrder(String),
    ExactNotAllowed(&'static str),
    DuplicateUnit,
    Extractor(ExtractorError),
}

impl ProjectionError {
    fn message(&self) -> String {
        match self {
            Self::UnknownOrder(order) => format!("unknown order {order:?}"),
            Self::ExactNotAllowed(key) => format!("exact order not allowed for {key}"),
            Self::DuplicateUnit => format!("{UNIT_KEY} projected more than once"),
            Self::Extractor(err) => err.to_string(),
        }
    }
}

impl ProjectionParser {
    /// Creates a parser with no keys projected yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a single projection expression.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] if the expression is malformed, names an
    /// invalid key or order, or projects `.unit` twice.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use benchproc::projection::ProjectionParser;
    /// use benchproc::record::Record;
    ///
    /// let mut schema = ProjectionParser::new().parse("goos,/size@numeric")?;
    /// let names: Vec<_> = schema.fields().iter().map(|f| f.name().to_string()).collect();
    /// assert_eq!(names, ["goos", "/size"]);
    ///
    /// let row = schema.project(&Record::new("BenchmarkA/size=2")).unwrap();
    /// assert_eq!(schema.display_row(row).to_string(), "/size:2");
    /// # Ok::<(), benchproc::error::SyntaxError>(())
    /// ```
    pub fn parse(&mut self, proj: &str) -> Result<Schema, SyntaxError> {
        let toks = tokenize(proj)?;
        let mut schema = Schema::with_exclusions(self.exclusions.clone());
        let root = schema.root();
        let mut cx = Context {
            proj,
            toks: &toks,
            schema: &mut schema,
        };
        let end = self.tuple(&mut cx, 0, root, TokenKind::Eof)?;
        debug_assert_eq!(toks[end].kind, TokenKind::Eof);

        debug!(projection = proj, fields = schema.num_fields(), "parsed projection");
        Ok(schema)
    }

    /// Parses several projections whose keys exclude each other regardless
    /// of order.
    ///
    /// # Errors
    ///
    /// Returns the first [`SyntaxError`] from any projection.
    pub fn parse_all<S: AsRef<str>>(&mut self, projs: &[S]) -> Result<Vec<Schema>, SyntaxError> {
        projs.iter().map(|proj| self.parse(proj.as_ref())).collect()
    }

    /// Returns a schema for every key not projected by this parser so far:
    /// `.config` and `.fullname`, minus any group already projected and any
    /// specific keys.
    ///
    /// The resulting schema has no meaningful order.
    pub fn remainder(&self) -> Schema {
        let mut schema = Schema::with_exclusions(self.exclusions.clone());
        let root = schema.root();
        if !self.have_config {
            schema.add_file_config(root, Order::First);
        }
        if !self.have_fullname {
            schema.add_full_name(root, &Order::First);
        }
        schema
    }

    fn tuple(
        &mut self,
        cx: &mut Context<'_>,
        mut i: usize,
        group: usize,
        end: TokenKind,
    ) -> Result<usize, SyntaxError> {
        if cx.toks[i].kind == end {
            return Ok(i);
        }
        loop {
            i = self.projection(cx, i, group)?;
            match cx.toks[i].kind {
                TokenKind::Comma => i += 1,
                kind if kind == end => return Ok(i),
                _ if end == TokenKind::RParen => return Err(cx.error(i, "expected )")),
                _ => return Err(cx.error(i, "expected ,")),
            }
        }
    }

    fn projection(
        &mut self,
        cx: &mut Context<'_>,
        i: usize,
        group: usize,
    ) -> Result<usize, SyntaxError> {
        let toks = cx.toks;
        let tok = &toks[i];
        if tok.kind == TokenKind::LParen {
            let sub = cx.schema.add_group(group, "()", true);
            let close = self.tuple(cx, i + 1, sub, TokenKind::RParen)?;
            return Ok(close + 1);
        }
        if !tok.kind.is_word() {
            return Err(cx.error(i, "expected key"));
        }
        let key = tok;

        let mut i = i + 1;
        let mut order = Order::First;
        match toks[i].kind {
            TokenKind::At => {
                let name = &toks[i + 1];
                if !name.kind.is_word() {
                    return Err(cx.error(i + 1, "expected sort order"));
                }
                order = Order::from_name(&name.text).ok_or_else(|| {
                    cx.error(i + 1, ProjectionError::UnknownOrder(name.text.clone()).message())
                })?;
                i += 2;
            }
            TokenKind::Colon => {
                if toks[i + 1].kind != TokenKind::LParen {
                    return Err(cx.error(i + 1, "expected ("));
                }
                let open = i + 1;
                i += 2;
                let mut exact = Vec::new();
                while toks[i].kind.is_word() {
                    exact.push(toks[i].text.clone());
                    i += 1;
                }
                if toks[i].kind != TokenKind::RParen {
                    return Err(cx.error(i, "expected )"));
                }
                if exact.is_empty() {
                    return Err(cx.error(open, "nothing to match"));
                }
                order = Order::Exact(exact);
                i += 1;
            }
            _ => {}
        }

        self.make_projection(cx.schema, group, &key.text, order)
            .map_err(|err| SyntaxError::new(cx.proj, key.offset, err.message()))?;
        Ok(i)
    }

    fn make_projection(
        &mut self,
        schema: &mut Schema,
        group: usize,
        key: &str,
        order: Order,
    ) -> Result<(), ProjectionError> {
        let exact = matches!(order, Order::Exact(_));
        match key {
            ".config" => {
                if exact {
                    return Err(ProjectionError::ExactNotAllowed(".config"));
                }
                self.have_config = true;
                schema.add_file_config(group, order);
            }
            ".fullname" => {
                self.have_fullname = true;
                schema.add_full_name(group, &order);
            }
            UNIT_KEY => {
                if exact {
                    return Err(ProjectionError::ExactNotAllowed(UNIT_KEY));
                }
                schema
                    .add_unit(group, &order)
                    .ok_or(ProjectionError::DuplicateUnit)?;
            }
            _ => {
                let extractor = Extractor::new(key).map_err(ProjectionError::Extractor)?;
                let mut exclusions = self.exclusions.lock();
                if key == ".name" || key.starts_with('/') {
                    if !exclusions.name_keys.iter().any(|k| k == key) {
                        exclusions.name_keys.push(key.to_string());
                    }
                } else {
                    exclusions.config_keys.insert(key.to_string());
                }
                drop(exclusions);
                schema.add_key(group, key, extractor, &order);
            }
        }
        Ok(())
    }
}

/// The input being parsed and the schema being built.
struct Context<'a> {
    proj: &'a str,
    toks: &'a [Token],
    schema: &'a mut Schema,
}

impl Context<'_> {
    fn error(&self, i: usize, msg: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.proj, self.toks[i].offset, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn field_names(schema: &Schema) -> Vec<String> {
        schema.fields().iter().map(|f| f.name().to_string()).collect()
    }

    fn check_err(proj: &str, msg: &str, offset: usize) {
        match ProjectionParser::new().parse(proj) {
            Ok(_) => panic!("parsing {proj:?}: want error"),
            Err(err) => {
                assert_eq!(err.message, msg, "parsing {proj:?}");
                assert_eq!(err.offset, offset, "parsing {proj:?}");
            }
        }
    }

    #[test]
    fn test_parse_keys() {
        let s = ProjectionParser::new()
            .parse(".name,/size@numeric,goos@alpha,.fullname")
            .unwrap();
        assert_eq!(field_names(&s), [".name", "/size", "goos", ".fullname"]);
    }

    #[test]
    fn test_parse_empty() {
        let s = ProjectionParser::new().parse("").unwrap();
        assert!(s.fields().is_empty());
    }

    #[test]
    fn test_file_key_left_empty() {
        let mut s = ProjectionParser::new().parse("benchmark,/size").unwrap();
        let row = s.project(&Record::new("BenchmarkFoo/size=10")).unwrap();
        let mut cs = crate::config::ConfigSet::new();
        let cfg = s.to_config(row, &mut cs);
        assert_eq!(cs.display(cfg).to_string(), "(benchmark:, /size:10)");
    }

    #[test]
    fn test_name_and_size_config() {
        let mut s = ProjectionParser::new().parse(".name,/size").unwrap();
        let row = s.project(&Record::new("BenchmarkFoo/size=10")).unwrap();
        let mut cs = crate::config::ConfigSet::new();
        let cfg = s.to_config(row, &mut cs);
        assert_eq!(cs.tuple_len(cfg), 2);

        let name = cs.key_val(".name", "BenchmarkFoo");
        let size = cs.key_val("/size", "10");
        assert_eq!(cs.tuple(&[name, size]), cfg);
        assert_eq!(cs.display(cfg).to_string(), "(.name:BenchmarkFoo, /size:10)");
    }

    #[test]
    fn test_exact_values_filter() {
        let mut s = ProjectionParser::new().parse("goos:(linux darwin)").unwrap();
        let linux = Record::new("BenchmarkA").with_file_config("goos", "linux");
        let darwin = Record::new("BenchmarkA").with_file_config("goos", "darwin");
        let plan9 = Record::new("BenchmarkA").with_file_config("goos", "plan9");
        let l = s.project(&linux).unwrap();
        let d = s.project(&darwin).unwrap();
        assert_eq!(s.project(&plan9), None);
        assert!(s.less(l, d));
    }

    #[test]
    fn test_config_excludes_specific_keys() {
        let mut p = ProjectionParser::new();
        let mut s = p.parse(".config,commit").unwrap();
        let r = Record::new("BenchmarkA")
            .with_file_config("goos", "linux")
            .with_file_config("commit", "abc");
        s.project(&r).unwrap();
        assert_eq!(field_names(&s), ["goos", "commit"]);
    }

    #[test]
    fn test_parse_all_excludes_across_projections() {
        let mut p = ProjectionParser::new();
        let mut schemas = p.parse_all(&[".config,.fullname", "commit,/size"]).unwrap();
        let r = Record::new("BenchmarkA/size=1/mode=x-4")
            .with_file_config("goos", "linux")
            .with_file_config("commit", "abc");
        let row = schemas[0].project(&r).unwrap();
        assert_eq!(
            schemas[0].display_row(row).to_string(),
            "goos:linux .fullname:BenchmarkA/size=*/mode=x-4"
        );
        let row = schemas[1].project(&r).unwrap();
        assert_eq!(schemas[1].display_row(row).to_string(), "commit:abc /size:1");
    }

    #[test]
    fn test_later_parse_excludes_keys() {
        let mut p = ProjectionParser::new();
        let mut group = p.parse(".config,.fullname").unwrap();
        let mut specific = p.parse("commit,/size").unwrap();
        let r = Record::new("BenchmarkA/size=2")
            .with_file_config("commit", "abc")
            .with_file_config("goos", "linux");

        let row = group.project(&r).unwrap();
        assert_eq!(
            group.display_row(row).to_string(),
            "goos:linux .fullname:BenchmarkA/size=*"
        );
        assert_eq!(field_names(&group), ["goos", ".fullname"]);

        let row = specific.project(&r).unwrap();
        assert_eq!(specific.display_row(row).to_string(), "commit:abc /size:2");
    }

    #[test]
    fn test_remainder_sees_later_keys() {
        let mut p = ProjectionParser::new();
        p.parse("goos").unwrap();
        let mut rest = p.remainder();
        p.parse("commit").unwrap();
        let r = Record::new("BenchmarkA")
            .with_file_config("goos", "linux")
            .with_file_config("commit", "abc")
            .with_file_config("goarch", "amd64");
        let row = rest.project(&r).unwrap();
        assert_eq!(
            rest.display_row(row).to_string(),
            "goarch:amd64 .fullname:BenchmarkA"
        );
    }

    #[test]
    fn test_remainder() {
        let mut p = ProjectionParser::new();
        p.parse("goos,/size").unwrap();
        let mut rest = p.remainder();
        let r = Record::new("BenchmarkA/size=1")
            .with_file_config("goos", "linux")
            .with_file_config("goarch", "amd64");
        let row = rest.project(&r).unwrap();
        assert_eq!(
            rest.display_row(row).to_string(),
            "goarch:amd64 .fullname:BenchmarkA/size=*"
        );

        let mut p = ProjectionParser::new();
        p.parse(".config,.fullname").unwrap();
        assert!(p.remainder().fields().is_empty());
    }

    #[test]
    fn test_nested_tuples() {
        let mut s = ProjectionParser::new()
            .parse(".name,(goos,(/size)),.unit")
            .unwrap();
        assert_eq!(field_names(&s), [".name", "goos", "/size", ".unit"]);
        assert!(s.unit_field().is_some());

        let r = Record::new("BenchmarkA/size=2")
            .with_file_config("goos", "linux")
            .with_value(1.0, "ns/op");
        let rows = s.project_values(&r).unwrap();
        let mut cs = crate::config::ConfigSet::new();
        let cfg = s.to_config(rows[0], &mut cs);
        assert_eq!(
            cs.display(cfg).to_string(),
            "(.name:BenchmarkA, (goos:linux, (/size:2)), .unit:ns/op)"
        );
    }

    #[test]
    fn test_errors() {
        check_err(",", "expected key", 0);
        check_err("a,", "expected key", 2);
        check_err("a b", "expected ,", 2);
        check_err("a@", "expected sort order", 2);
        check_err("a@bogus", "unknown order \"bogus\"", 2);
        check_err("a:b", "expected (", 2);
        check_err("a:(b", "expected )", 4);
        check_err("a:()", "nothing to match", 2);
        check_err(".config:(a)", "exact order not allowed for .config", 0);
        check_err(".unit,.unit", ".unit projected more than once", 6);
        check_err("x,.bogus", "unknown special key: .bogus", 2);
        check_err("Goos", "expected .name, .fullname, /key, or file key: Goos", 0);
        check_err("(a", "expected )", 2);
        check_err("(a b)", "expected )", 3);
        check_err("a \"b", "missing end quote", 2);
    }
}
