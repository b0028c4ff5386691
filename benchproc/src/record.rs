//! The benchmark record consumed by projections and filters.
//!
//! A [`Record`] is one benchmark result: the file-level configuration in
//! effect when it was produced, its full name (which encodes per-benchmark
//! configuration), and its measurements. Records are produced by a format
//! reader outside this crate; the serde derives let callers exchange them as
//! JSON.
//!
//! # File configuration
//!
//! File configuration keys are insertion ordered and updated in place. A
//! key is deleted by setting its value to `""`, but the key keeps its
//! position so consumers can rely on stable indexes.
//!
//! # Names
//!
//! A full name such as `BenchmarkEncode/size=1024/fast-8` splits into the
//! base name `BenchmarkEncode` and the parts `/size=1024`, `/fast` and
//! `-8`. A trailing `-<digits>` part records GOMAXPROCS. The split is
//! computed once per record and cached until the name changes.

use std::collections::HashMap;
use std::iter::FusedIterator;
use std::slice::Windows;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// A single file-level key/value configuration pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// The configuration key.
    pub key: String,
    /// The configuration value. Empty means the key was deleted.
    pub value: String,
}

/// A single measurement and its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// The measured value.
    pub value: f64,
    /// The unit of `value`, such as `ns/op`.
    pub unit: String,
}

impl Value {
    /// Creates a new measurement.
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

/// Byte offsets where each part of a full name starts, followed by the
/// name's length. Always equal to any other, so records compare by content.
#[derive(Debug, Clone, Default)]
struct NameBounds(OnceLock<Vec<usize>>);

impl PartialEq for NameBounds {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// One benchmark result and all of its measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRecord", into = "RawRecord")]
pub struct Record {
    file_config: Vec<FileConfig>,
    /// Position of each key in `file_config`.
    config_pos: HashMap<String, usize>,

    full_name: String,
    name_bounds: NameBounds,

    /// The number of iterations the measurements were averaged over.
    pub iters: u64,

    /// The measurements of this result, in order.
    pub values: Vec<Value>,
}

impl Record {
    /// Creates a record with the given full name and no configuration or
    /// measurements.
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    /// Sets a file configuration key, updating it in place if it exists and
    /// appending it otherwise. An empty value marks the key deleted.
    pub fn set_file_config(&mut self, key: &str, value: &str) {
        if let Some(&pos) = self.config_pos.get(key) {
            value.clone_into(&mut self.file_config[pos].value);
            return;
        }
        self.config_pos.insert(key.to_string(), self.file_config.len());
        self.file_config.push(FileConfig {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// Builder-style variant of [`set_file_config`](Self::set_file_config).
    #[must_use]
    pub fn with_file_config(mut self, key: &str, value: &str) -> Self {
        self.set_file_config(key, value);
        self
    }

    /// Appends a measurement.
    pub fn push_value(&mut self, value: f64, unit: &str) {
        self.values.push(Value::new(value, unit));
    }

    /// Builder-style variant of [`push_value`](Self::push_value).
    #[must_use]
    pub fn with_value(mut self, value: f64, unit: &str) -> Self {
        self.push_value(value, unit);
        self
    }

    /// The full benchmark name, including sub-benchmark configuration.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Replaces the full benchmark name.
    pub fn set_full_name(&mut self, full_name: impl Into<String>) {
        self.full_name = full_name.into();
        self.name_bounds = NameBounds::default();
    }

    /// The file configuration in insertion order.
    pub fn file_config(&self) -> &[FileConfig] {
        &self.file_config
    }

    /// The index of `key` in [`file_config`](Self::file_config).
    pub fn file_config_index(&self, key: &str) -> Option<usize> {
        self.config_pos.get(key).copied()
    }

    /// The value of file configuration `key`, or `""` if it is absent or
    /// deleted.
    pub fn file_config_value(&self, key: &str) -> &str {
        self.file_config_index(key)
            .map_or("", |pos| self.file_config[pos].value.as_str())
    }

    /// Splits the full name into its base name and configuration parts.
    ///
    /// Each part is one of `/key=value`, `/positional`, or a trailing
    /// `-gomaxprocs`. Concatenating the base and the parts reconstructs the
    /// full name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use benchproc::record::Record;
    ///
    /// let r = Record::new("BenchmarkFoo/size=10/fast-8");
    /// let (base, parts) = r.name_parts();
    /// assert_eq!(base, "BenchmarkFoo");
    /// assert_eq!(parts.collect::<Vec<_>>(), ["/size=10", "/fast", "-8"]);
    /// ```
    pub fn name_parts(&self) -> (&str, NameParts<'_>) {
        let bounds = self.name_bounds.0.get_or_init(|| split_name(&self.full_name));
        let base = &self.full_name[bounds[0]..bounds[1]];
        let parts = NameParts {
            name: &self.full_name,
            bounds: bounds[1..].windows(2),
        };
        (base, parts)
    }

    /// The benchmark name without sub-benchmark configuration.
    pub fn base_name(&self) -> &str {
        self.name_parts().0
    }
}

/// Iterator over the configuration parts of a full name, returned by
/// [`Record::name_parts`].
#[derive(Debug, Clone)]
pub struct NameParts<'a> {
    name: &'a str,
    bounds: Windows<'a, usize>,
}

impl<'a> Iterator for NameParts<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.bounds.next().map(|w| &self.name[w[0]..w[1]])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.bounds.size_hint()
    }
}

impl DoubleEndedIterator for NameParts<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.bounds.next_back().map(|w| &self.name[w[0]..w[1]])
    }
}

impl ExactSizeIterator for NameParts<'_> {}

impl FusedIterator for NameParts<'_> {}

/// Computes the start of each part of `name`, then its length.
fn split_name(name: &str) -> Vec<usize> {
    let rest = gomaxprocs_start(name).unwrap_or(name.len());
    let mut bounds = vec![0];
    bounds.extend(
        name[..rest]
            .char_indices()
            .filter(|&(_, c)| c == '/')
            .map(|(i, _)| i),
    );
    if rest < name.len() {
        bounds.push(rest);
    }
    bounds.push(name.len());
    bounds
}

/// The offset of a trailing `-<digits>` suffix of `name`.
fn gomaxprocs_start(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    for i in (0..bytes.len()).rev() {
        if bytes[i] == b'-' && i < bytes.len() - 1 {
            return Some(i);
        }
        if !bytes[i].is_ascii_digit() {
            break;
        }
    }
    None
}

/// Wire form of [`Record`], without the derived key index.
#[derive(Serialize, Deserialize)]
struct RawRecord {
    #[serde(default)]
    file_config: Vec<FileConfig>,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    iters: u64,
    #[serde(default)]
    values: Vec<Value>,
}

impl From<RawRecord> for Record {
    fn from(raw: RawRecord) -> Self {
        let mut record = Record {
            full_name: raw.full_name,
            iters: raw.iters,
            values: raw.values,
            ..Record::default()
        };
        for cfg in &raw.file_config {
            record.set_file_config(&cfg.key, &cfg.value);
        }
        record
    }
}

impl From<Record> for RawRecord {
    fn from(record: Record) -> Self {
        Self {
            file_config: record.file_config,
            full_name: record.full_name,
            iters: record.iters,
            values: record.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_file_config_updates_in_place() {
        let mut r = Record::new("BenchmarkX");
        r.set_file_config("goos", "linux");
        r.set_file_config("goarch", "amd64");
        r.set_file_config("goos", "");
        assert_eq!(r.file_config().len(), 2);
        assert_eq!(r.file_config()[0].key, "goos");
        assert_eq!(r.file_config_value("goos"), "");
        assert_eq!(r.file_config_value("goarch"), "amd64");
        assert_eq!(r.file_config_value("missing"), "");
        assert_eq!(r.file_config_index("goarch"), Some(1));
    }

    #[test]
    fn test_name_parts() {
        fn split(name: &str) -> (String, Vec<String>) {
            let r = Record::new(name);
            let (base, parts) = r.name_parts();
            (base.to_string(), parts.map(str::to_string).collect())
        }

        let (base, parts) = split("Name/a=1/b-2/c=3-4");
        assert_eq!(base, "Name");
        assert_eq!(parts, ["/a=1", "/b-2", "/c=3", "-4"]);

        assert_eq!(split("Name"), ("Name".to_string(), vec![]));

        // A trailing dash with no digits is part of the name.
        assert_eq!(split("Name/x-"), ("Name".to_string(), vec!["/x-".to_string()]));

        // A suffix that is not all digits is not GOMAXPROCS.
        assert_eq!(split("Name-4x"), ("Name-4x".to_string(), vec![]));

        // A leading slash starts a part, leaving the base empty.
        let (base, parts) = split("/x/y-2");
        assert_eq!(base, "");
        assert_eq!(parts, ["/x", "/y", "-2"]);
        assert_eq!(split(""), (String::new(), vec![]));
    }

    #[test]
    fn test_name_parts_follow_renames() {
        let mut r = Record::new("BenchmarkA/size=1-8");
        assert_eq!(r.base_name(), "BenchmarkA");
        assert_eq!(r.name_parts().1.len(), 2);

        r.set_full_name("BenchmarkB/mode=x");
        assert_eq!(r.full_name(), "BenchmarkB/mode=x");
        let (base, parts) = r.name_parts();
        assert_eq!(base, "BenchmarkB");
        assert_eq!(parts.collect::<Vec<_>>(), ["/mode=x"]);

        // The cached split does not affect equality.
        assert_eq!(r, Record::new("BenchmarkB/mode=x"));
    }

    #[test]
    fn test_base_name_with_gomaxprocs() {
        let r = Record::new("BenchmarkFoo-16");
        assert_eq!(r.base_name(), "BenchmarkFoo");
    }

    #[test]
    fn test_json_round_trip_rebuilds_index() {
        let r = Record::new("BenchmarkFoo/size=10")
            .with_file_config("goos", "linux")
            .with_value(12.5, "ns/op");
        let json = serde_json::to_string(&r).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.file_config_index("goos"), Some(0));
    }

    #[test]
    fn test_json_defaults() {
        let r: Record = serde_json::from_str(r#"{"full_name":"BenchmarkA"}"#).unwrap();
        assert_eq!(r.full_name(), "BenchmarkA");
        assert!(r.values.is_empty());
        assert!(r.file_config().is_empty());
    }
}
