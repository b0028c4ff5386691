//! Compact headers over sequences of rows.

use crate::schema::{Row, Schema};

/// One cell of a row header.
///
/// Given rows `rows` and a header cell `h`, the rows
/// `rows[h.start..h.start + h.len]` are equal in every field before
/// `h.field` and all have `h.value` in field `h.field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Index into [`Schema::fields`] of the field this cell describes.
    pub field: usize,
    /// Index of the first row covered by this cell.
    pub start: usize,
    /// Number of rows covered by this cell, which is also its span.
    pub len: usize,
    /// The value every covered row has for `field`.
    pub value: String,
}

/// Combines a sequence of rows by common prefixes.
///
/// This is meant for presenting rows compactly, such as in a header over
/// table columns keyed by rows. The result has one level per field of
/// `schema`. The cells of each level partition `rows`, and each level
/// subdivides the level above it, so adjacent rows share a cell only if
/// they also share every cell above it.
///
/// # Panics
///
/// Panics if any row belongs to a different schema.
///
/// # Examples
///
/// ```rust
/// use benchproc::header::config_header;
/// use benchproc::projection::ProjectionParser;
/// use benchproc::record::Record;
///
/// let mut schema = ProjectionParser::new().parse("goos,goarch")?;
/// let mut project = |os: &str, arch: &str| {
///     let r = Record::new("BenchmarkA")
///         .with_file_config("goos", os)
///         .with_file_config("goarch", arch);
///     schema.project(&r).unwrap()
/// };
/// let rows = [project("linux", "amd64"), project("linux", "arm64")];
///
/// let levels = config_header(&schema, &rows);
/// assert_eq!(levels[0].len(), 1);
/// assert_eq!(levels[0][0].len, 2);
/// assert_eq!(levels[1].len(), 2);
/// # Ok::<(), benchproc::error::SyntaxError>(())
/// ```
pub fn config_header(schema: &Schema, rows: &[Row]) -> Vec<Vec<Header>> {
    if rows.is_empty() {
        return Vec::new();
    }

    let fields = schema.fields();
    let mut levels: Vec<Vec<Header>> = Vec::with_capacity(fields.len());
    let mut parents = vec![(0, rows.len())];
    for (level, field) in fields.iter().enumerate() {
        let mut cells: Vec<Header> = Vec::new();
        for &(start, len) in &parents {
            let first = cells.len();
            for (j, &row) in rows[start..start + len].iter().enumerate() {
                let value = schema.get(row, field);
                let extend = cells.len() > first;
                match cells.last_mut() {
                    Some(cell) if extend && cell.value == value => cell.len += 1,
                    _ => cells.push(Header {
                        field: level,
                        start: start + j,
                        len: 1,
                        value: value.to_string(),
                    }),
                }
            }
        }
        parents = cells.iter().map(|c| (c.start, c.len)).collect();
        levels.push(cells);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionParser;
    use crate::record::Record;

    fn config_rows(schema: &mut Schema, configs: &[&[(&str, &str)]]) -> Vec<Row> {
        configs
            .iter()
            .map(|pairs| {
                let mut r = Record::new("Name");
                for (k, v) in *pairs {
                    r.set_file_config(k, v);
                }
                schema.project(&r).unwrap()
            })
            .collect()
    }

    /// Renders one line per level, with `--` continuing a spanning cell.
    fn render(levels: &[Vec<Header>]) -> String {
        let mut out = String::new();
        for level in levels {
            out.push('\n');
            let cells: Vec<String> = level
                .iter()
                .map(|c| {
                    let mut s = c.value.clone();
                    for _ in 1..c.len {
                        s.push_str(" --");
                    }
                    s
                })
                .collect();
            out.push_str(&cells.join(" "));
        }
        out
    }

    fn check_structure(levels: &[Vec<Header>], width: usize) {
        for (i, level) in levels.iter().enumerate() {
            let mut end = 0;
            for cell in level {
                assert_eq!(cell.field, i);
                assert_eq!(cell.start, end);
                end = cell.start + cell.len;
            }
            assert_eq!(end, width);
        }
    }

    #[test]
    fn test_merges_common_prefix() {
        let mut s = ProjectionParser::new().parse(".config").unwrap();
        let rows = config_rows(&mut s, &[&[("a", "a1"), ("b", "b1")], &[("a", "a1"), ("b", "b2")]]);
        let levels = config_header(&s, &rows);
        check_structure(&levels, 2);
        assert_eq!(render(&levels), "\na1 --\nb1 b2");
    }

    #[test]
    fn test_higher_level_difference_prevents_merge() {
        let mut s = ProjectionParser::new().parse(".config").unwrap();
        let rows = config_rows(&mut s, &[&[("a", "a1"), ("b", "b1")], &[("a", "a2"), ("b", "b1")]]);
        let levels = config_header(&s, &rows);
        check_structure(&levels, 2);
        assert_eq!(render(&levels), "\na1 a2\nb1 b1");
    }

    #[test]
    fn test_missing_values() {
        let mut s = ProjectionParser::new().parse(".config").unwrap();
        let rows = config_rows(
            &mut s,
            &[
                &[("a", "a1")],
                &[("a", "a1"), ("b", "b1")],
                &[("a", "a1"), ("b", "b1"), ("c", "c1")],
            ],
        );
        let levels = config_header(&s, &rows);
        check_structure(&levels, 3);
        assert_eq!(render(&levels), "\na1 -- --\n b1 --\n  c1");
    }

    #[test]
    fn test_no_rows() {
        let s = ProjectionParser::new().parse(".config").unwrap();
        assert!(config_header(&s, &[]).is_empty());
    }

    #[test]
    fn test_no_fields() {
        let mut s = ProjectionParser::new().parse(".config").unwrap();
        let rows = config_rows(&mut s, &[&[], &[]]);
        assert_eq!(rows[0], rows[1]);
        assert!(config_header(&s, &rows).is_empty());
    }
}
