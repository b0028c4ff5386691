//! Benchmark unit classification and normalization.
//!
//! Benchmarks commonly report pre-scaled units such as `ns/op` or `MB/s`.
//! Normalizing them to base units (`sec/op`, `B/s`) before scaling values
//! for display avoids nonsense like "megananoseconds". Only the numerator
//! of a unit is rewritten.

use std::collections::HashMap;
use std::fmt;

use crate::record::Record;

/// How values of a unit should be scaled for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitClass {
    /// Powers of 1000 with SI prefixes.
    Si,
    /// Powers of 1024 with IEC binary prefixes.
    Iec,
}

impl fmt::Display for UnitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Si => write!(f, "SI"),
            Self::Iec => write!(f, "IEC"),
        }
    }
}

/// Classifies `unit`. Units measuring bytes in the numerator are
/// [`UnitClass::Iec`]; everything else is [`UnitClass::Si`].
///
/// # Examples
///
/// ```rust
/// use benchproc::units::{UnitClass, unit_class_of};
///
/// assert_eq!(unit_class_of("B/op"), UnitClass::Iec);
/// assert_eq!(unit_class_of("ns/B"), UnitClass::Si);
/// ```
pub fn unit_class_of(unit: &str) -> UnitClass {
    let numerator_bytes = UnitTokens::new(unit)
        .any(|t| !t.denom && matches!(t.text, "B" | "MB" | "bytes"));
    if numerator_bytes {
        UnitClass::Iec
    } else {
        UnitClass::Si
    }
}

/// A cache of tidied units.
///
/// Tidying a unit that is not one of the common `testing` package units
/// requires parsing it, so results are memoized per distinct unit string.
#[derive(Debug, Default)]
pub struct TidyCache {
    entries: HashMap<String, (String, f64)>,
}

impl TidyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tidied form of `unit` and the factor converting a value
    /// in `unit` into a value in the tidied unit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use benchproc::units::TidyCache;
    ///
    /// let mut cache = TidyCache::new();
    /// assert_eq!(cache.tidy_unit("ns/op"), ("sec/op", 1e-9));
    /// assert_eq!(cache.tidy_unit("MB*ns/op"), ("B*sec/op", 1e-3));
    /// ```
    pub fn tidy_unit<'a>(&'a mut self, unit: &'a str) -> (&'a str, f64) {
        match unit {
            "ns/op" => return ("sec/op", 1e-9),
            "MB/s" => return ("B/s", 1e6),
            "B/op" | "allocs/op" => return (unit, 1.0),
            _ => {}
        }
        if !unit.contains("ns") && !unit.contains("MB") {
            return (unit, 1.0);
        }

        if !self.entries.contains_key(unit) {
            self.entries.insert(unit.to_string(), tidy(unit));
        }
        match self.entries.get(unit) {
            Some((tidied, factor)) => (tidied.as_str(), *factor),
            None => (unit, 1.0),
        }
    }

    /// Rewrites the measurements of `record` into tidied units.
    pub fn tidy(&mut self, record: &mut Record) {
        for value in &mut record.values {
            let (tidied, factor) = self.tidy_unit(&value.unit);
            if factor != 1.0 {
                let tidied = tidied.to_string();
                value.value *= factor;
                value.unit = tidied;
            }
        }
    }

    /// The number of cached units.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no units have been cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn tidy(unit: &str) -> (String, f64) {
    let mut factor = 1.0;
    let mut out = String::with_capacity(unit.len() + 2);
    let mut copied = 0;
    for tok in UnitTokens::new(unit).filter(|t| !t.denom) {
        let replace = match tok.text {
            "ns" => {
                factor /= 1e9;
                "sec"
            }
            "MB" => {
                factor *= 1e6;
                "B"
            }
            _ => continue,
        };
        out.push_str(&unit[copied..tok.pos]);
        out.push_str(replace);
        copied = tok.pos + tok.text.len();
    }
    out.push_str(&unit[copied..]);
    (out, factor)
}

/// One component of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UnitToken<'a> {
    text: &'a str,
    /// Byte offset of `text` in the unit.
    pos: usize,
    /// Whether the token follows a `/` with no intervening `*`.
    denom: bool,
}

/// Splits a unit on `*`, `/`, `-` and whitespace.
struct UnitTokens<'a> {
    unit: &'a str,
    pos: usize,
    denom: bool,
}

impl<'a> UnitTokens<'a> {
    fn new(unit: &'a str) -> Self {
        Self {
            unit,
            pos: 0,
            denom: false,
        }
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '*' | '/' | '-') || c.is_whitespace()
}

impl<'a> Iterator for UnitTokens<'a> {
    type Item = UnitToken<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.unit[self.pos..];
        let mut start = None;
        for (i, c) in rest.char_indices() {
            match c {
                '*' => self.denom = false,
                '/' => self.denom = true,
                c if is_separator(c) => {}
                _ => {
                    start = Some(i);
                    break;
                }
            }
        }
        let Some(start) = start else {
            self.pos = self.unit.len();
            return None;
        };

        let rest = &rest[start..];
        let len = rest.find(is_separator).unwrap_or(rest.len());
        let tok = UnitToken {
            text: &rest[..len],
            pos: self.pos + start,
            denom: self.denom,
        };
        self.pos = tok.pos + len;
        Some(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(unit: &str) -> Vec<(&str, bool)> {
        UnitTokens::new(unit).map(|t| (t.text, t.denom)).collect()
    }

    #[test]
    fn test_tokenize_unit() {
        assert_eq!(tokens("ns/op"), vec![("ns", false), ("op", true)]);
        assert_eq!(
            tokens("B*ns/op*sec"),
            vec![("B", false), ("ns", false), ("op", true), ("sec", false)]
        );
        assert_eq!(tokens(" a -b "), vec![("a", false), ("b", false)]);
        assert!(tokens("").is_empty());
        assert!(tokens("*/").is_empty());
    }

    #[test]
    fn test_token_positions() {
        let pos: Vec<usize> = UnitTokens::new("MB / ns").map(|t| t.pos).collect();
        assert_eq!(pos, vec![0, 5]);
    }

    #[test]
    fn test_unit_class() {
        assert_eq!(unit_class_of("B/op"), UnitClass::Iec);
        assert_eq!(unit_class_of("MB/s"), UnitClass::Iec);
        assert_eq!(unit_class_of("bytes"), UnitClass::Iec);
        assert_eq!(unit_class_of("sec/B"), UnitClass::Si);
        assert_eq!(unit_class_of("ns/op"), UnitClass::Si);
        assert_eq!(unit_class_of("Bytes"), UnitClass::Si);
        assert_eq!(UnitClass::Iec.to_string(), "IEC");
    }

    #[test]
    fn test_tidy_fast_paths() {
        let mut cache = TidyCache::new();
        assert_eq!(cache.tidy_unit("ns/op"), ("sec/op", 1e-9));
        assert_eq!(cache.tidy_unit("MB/s"), ("B/s", 1e6));
        assert_eq!(cache.tidy_unit("B/op"), ("B/op", 1.0));
        assert_eq!(cache.tidy_unit("allocs/op"), ("allocs/op", 1.0));
        assert_eq!(cache.tidy_unit("sec/op"), ("sec/op", 1.0));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tidy_numerator_only() {
        let mut cache = TidyCache::new();
        assert_eq!(cache.tidy_unit("ns/MB"), ("sec/MB", 1e-9));
        assert_eq!(cache.tidy_unit("op/ns"), ("op/ns", 1.0));
        assert_eq!(cache.tidy_unit("MB*ns/op"), ("B*sec/op", 1e-3));
        assert_eq!(cache.tidy_unit("nsec"), ("nsec", 1.0));
        assert_eq!(cache.len(), 4);

        // Cached results are stable.
        assert_eq!(cache.tidy_unit("ns/MB"), ("sec/MB", 1e-9));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_tidy_record() {
        let mut cache = TidyCache::new();
        let mut r = Record::new("BenchmarkA")
            .with_value(2000.0, "ns/op")
            .with_value(3.0, "MB/s")
            .with_value(16.0, "B/op");
        cache.tidy(&mut r);

        assert_eq!(r.values[0].unit, "sec/op");
        assert!((r.values[0].value - 2e-6).abs() < 1e-18);
        assert_eq!(r.values[1].unit, "B/s");
        assert!((r.values[1].value - 3e6).abs() < 1e-6);
        assert_eq!(r.values[2].unit, "B/op");
        assert!((r.values[2].value - 16.0).abs() < f64::EPSILON);
    }
}
