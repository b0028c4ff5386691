//! Filtering records and individual measurements with a query.
//!
//! A [`Filter`] compiles a [`kvql`](crate::kvql) query against the record
//! key vocabulary (see [`Extractor`]). Matching a record produces a
//! [`Match`]: one bit per measurement. Every key except `.unit` depends only
//! on the record, so most queries match all of a record's measurements or
//! none of them; `.unit` is the one key that can select individual
//! measurements.
//!
//! # Example
//!
//! ```rust
//! use benchproc::filter::Filter;
//! use benchproc::record::Record;
//!
//! let filter = Filter::new("goos:linux .unit:(ns/op B/op)")?;
//! let mut r = Record::new("BenchmarkEncode")
//!     .with_file_config("goos", "linux")
//!     .with_value(10.0, "ns/op")
//!     .with_value(3.0, "allocs/op");
//!
//! let m = filter.match_record(&r);
//! assert!(m.test(0));
//! assert!(!m.test(1));
//! assert!(m.apply(&mut r));
//! assert_eq!(r.values.len(), 1);
//! # Ok::<(), benchproc::error::SyntaxError>(())
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::error::SyntaxError;
use crate::extract::Extractor;
use crate::kvql::{self, Op, Query};
use crate::record::Record;
use crate::schema::UNIT_KEY;

/// An invalid key in the `leaf`th match of a query.
struct KeyError {
    leaf: usize,
    offset: usize,
    message: String,
}

/// The offset of the `n`th match of `query`.
fn leaf_offset(query: &Query, n: usize) -> Option<usize> {
    let mut i = 0;
    let mut found = None;
    query.for_each_match(&mut |_, _, offset| {
        if i == n {
            found = Some(offset);
        }
        i += 1;
    });
    found
}

/// A compiled query that selects records and measurements.
#[derive(Debug, Clone)]
pub struct Filter {
    query: Query,
    /// One extractor per distinct non-unit key in `query`.
    extractors: HashMap<String, Extractor>,
    /// Whether the result may differ between measurements of one record.
    uses_units: bool,
}

impl Filter {
    /// Parses and compiles a query.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] if the query is malformed or names an
    /// invalid key. Errors are reported here rather than when matching.
    pub fn new(query: &str) -> Result<Self, SyntaxError> {
        let q = kvql::parse(query)?;
        Self::compile(q).map_err(|e| SyntaxError::new(query, e.offset, e.message))
    }

    /// Compiles an already parsed query.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] against the query's rendered text if it
    /// names an invalid key.
    pub fn from_query(query: Query) -> Result<Self, SyntaxError> {
        let text = query.to_string();
        Self::compile(query).map_err(|e| {
            // The query's own offsets need not refer to its rendering.
            let offset = kvql::parse(&text)
                .ok()
                .and_then(|q| leaf_offset(&q, e.leaf))
                .unwrap_or(0);
            SyntaxError::new(&text, offset, e.message)
        })
    }

    fn compile(query: Query) -> Result<Self, KeyError> {
        let mut extractors = HashMap::new();
        let mut uses_units = false;
        let mut err = None;
        let mut leaf = 0;
        query.for_each_match(&mut |key, _, offset| {
            leaf += 1;
            if err.is_some() || extractors.contains_key(key) {
                return;
            }
            if key == UNIT_KEY {
                uses_units = true;
                return;
            }
            match Extractor::new(key) {
                Ok(ext) => {
                    extractors.insert(key.to_string(), ext);
                }
                Err(e) => {
                    err = Some(KeyError {
                        leaf: leaf - 1,
                        offset,
                        message: e.to_string(),
                    });
                }
            }
        });
        if let Some(err) = err {
            return Err(err);
        }

        debug!(
            query = %query,
            extractors = extractors.len(),
            uses_units,
            "compiled filter"
        );
        Ok(Self {
            query,
            extractors,
            uses_units,
        })
    }

    /// The parsed query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Whether this filter can select individual measurements of a record
    /// rather than all or none of them.
    pub fn uses_units(&self) -> bool {
        self.uses_units
    }

    /// Matches `record`, returning which of its measurements satisfy the
    /// query.
    pub fn match_record(&self, record: &Record) -> Match {
        let n = record.values.len();
        let bits = self.eval(record, &self.query, n);
        bits.finish(!self.uses_units, n)
    }

    fn eval(&self, record: &Record, node: &Query, n: usize) -> MatchBuilder {
        match node {
            Query::Op { op, exprs } => {
                let Some((first, rest)) = exprs.split_first() else {
                    let mut m = self.builder(n);
                    if *op == Op::And {
                        m.set_all();
                    }
                    return m;
                };
                let mut m = self.eval(record, first, n);
                match op {
                    Op::Not => m.invert(),
                    Op::And => {
                        for sub in rest {
                            m.and(&self.eval(record, sub, n));
                        }
                    }
                    Op::Or => {
                        for sub in rest {
                            m.or(&self.eval(record, sub, n));
                        }
                    }
                }
                m
            }
            Query::Match { key, pattern, .. } => {
                let mut m = self.builder(n);
                if self.uses_units && key == UNIT_KEY {
                    for (i, value) in record.values.iter().enumerate() {
                        if pattern.is_match(&value.unit) {
                            m.set(i);
                        }
                    }
                } else if let Some(ext) = self.extractors.get(key)
                    && pattern.is_match(&ext.extract(record))
                {
                    m.set_all();
                }
                m
            }
        }
    }

    fn builder(&self, n: usize) -> MatchBuilder {
        if self.uses_units {
            MatchBuilder::new(n)
        } else {
            // Only bit 0 is meaningful; it is broadcast at the end.
            MatchBuilder::new(1)
        }
    }
}

/// Bit vector under construction. Bit `i` lives in `head` for `i < 64`
/// and in `rest[i / 64 - 1]` otherwise.
#[derive(Debug, Clone, Default)]
struct MatchBuilder {
    head: u64,
    rest: Vec<u64>,
}

impl MatchBuilder {
    fn new(n: usize) -> Self {
        Self {
            head: 0,
            rest: vec![0; n.div_ceil(64).saturating_sub(1)],
        }
    }

    fn set(&mut self, i: usize) {
        if i < 64 {
            self.head |= 1 << i;
        } else {
            self.rest[i / 64 - 1] |= 1 << (i % 64);
        }
    }

    fn set_all(&mut self) {
        self.head = u64::MAX;
        self.rest.fill(u64::MAX);
    }

    fn invert(&mut self) {
        self.head = !self.head;
        for w in &mut self.rest {
            *w = !*w;
        }
    }

    fn and(&mut self, other: &Self) {
        self.head &= other.head;
        for (w, o) in self.rest.iter_mut().zip(&other.rest) {
            *w &= o;
        }
    }

    fn or(&mut self, other: &Self) {
        self.head |= other.head;
        for (w, o) in self.rest.iter_mut().zip(&other.rest) {
            *w |= o;
        }
    }

    fn finish(self, broadcast: bool, n: usize) -> Match {
        let mut m = Match {
            n,
            all_equal: broadcast,
            head: self.head,
            rest: self.rest,
        };
        if !broadcast {
            let b0 = m.head & 1 != 0;
            m.all_equal = (1..n).all(|i| m.test(i) == b0);
        }
        if m.all_equal {
            m.head &= 1;
            m.rest = Vec::new();
        }
        m
    }
}

/// The measurements of one record that matched a [`Filter`].
///
/// When every measurement has the same result, as it does for any query
/// that does not use `.unit`, the match is stored as a single bit and
/// [`all`](Self::all) and [`any`](Self::any) are O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Number of measurements.
    n: usize,
    /// Bit 0 holds the result for every measurement.
    all_equal: bool,
    head: u64,
    rest: Vec<u64>,
}

impl Match {
    /// Whether every measurement matched. A record with no measurements
    /// reports the record-level result.
    pub fn all(&self) -> bool {
        self.all_equal && self.head & 1 != 0
    }

    /// Whether any measurement matched.
    pub fn any(&self) -> bool {
        !self.all_equal || self.head & 1 != 0
    }

    /// Whether measurement `i` matched. Out of range indexes never match.
    pub fn test(&self, i: usize) -> bool {
        if i >= self.n {
            false
        } else if self.all_equal {
            self.head & 1 != 0
        } else if i < 64 {
            self.head & (1 << i) != 0
        } else {
            self.rest[i / 64 - 1] & (1 << (i % 64)) != 0
        }
    }

    /// The number of measurements this match covers.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether this match covers no measurements.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Removes the measurements of `record` that did not match, keeping the
    /// rest in order. Returns whether any measurement remains.
    ///
    /// `record` must be the record this match was computed for.
    pub fn apply(&self, record: &mut Record) -> bool {
        if self.all() {
            return true;
        }
        if !self.any() {
            record.values.clear();
            return false;
        }
        let mut i = 0;
        record.values.retain(|_| {
            let keep = self.test(i);
            i += 1;
            keep
        });
        !record.values.is_empty()
    }
}
