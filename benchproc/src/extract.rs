//! Key extraction from records.
//!
//! Both the query language and projections name record components with the
//! same key vocabulary:
//!
//! - `.name` — the base benchmark name, without sub-benchmark configuration
//! - `.fullname` — the full benchmark name
//! - `/key` — a sub-benchmark configuration key in the name; `/gomaxprocs`
//!   also reads the trailing `-N` suffix
//! - anything else — a file configuration key
//!
//! `.unit` and `.config` are not extractor keys: `.unit` varies per
//! measurement and `.config` is a group of keys. Filters and projections
//! handle them directly.

use std::borrow::Cow;

use crate::error::ExtractorError;
use crate::record::Record;

/// Extracts one string component from a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    /// The base benchmark name.
    Name,
    /// The full benchmark name, with some name keys normalized away.
    FullName {
        /// `/key=` prefixes whose values are replaced with `*`.
        exclude: Vec<String>,
        /// Whether a trailing GOMAXPROCS suffix is replaced with `-*`.
        exclude_gomaxprocs: bool,
    },
    /// A sub-benchmark name key.
    NameKey {
        /// The `/key=` prefix to search for.
        prefix: String,
        /// Whether this is `/gomaxprocs`.
        gomaxprocs: bool,
    },
    /// A file configuration key.
    FileKey(String),
}

impl Extractor {
    /// Returns an extractor for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractorError`] if the key is empty, is an unknown special
    /// key, or is not a valid file configuration key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use benchproc::extract::Extractor;
    /// use benchproc::record::Record;
    ///
    /// let r = Record::new("BenchmarkFoo/size=10-8").with_file_config("goos", "linux");
    /// assert_eq!(Extractor::new(".name")?.extract(&r), "BenchmarkFoo");
    /// assert_eq!(Extractor::new("/size")?.extract(&r), "10");
    /// assert_eq!(Extractor::new("/gomaxprocs")?.extract(&r), "8");
    /// assert_eq!(Extractor::new("goos")?.extract(&r), "linux");
    /// # Ok::<(), benchproc::error::ExtractorError>(())
    /// ```
    pub fn new(key: &str) -> Result<Self, ExtractorError> {
        match key.chars().next() {
            None => Err(ExtractorError::EmptyKey),
            Some('.') => match key {
                ".name" => Ok(Self::Name),
                ".fullname" => Ok(Self::full()),
                _ => Err(ExtractorError::UnknownSpecialKey {
                    key: key.to_string(),
                }),
            },
            Some('/') => Ok(Self::NameKey {
                prefix: format!("{key}="),
                gomaxprocs: key == "/gomaxprocs",
            }),
            Some(_) if is_file_key(key) => Ok(Self::FileKey(key.to_string())),
            Some(_) => Err(ExtractorError::InvalidKey {
                key: key.to_string(),
            }),
        }
    }

    /// Returns an extractor for the full name that leaves it untouched.
    pub fn full() -> Self {
        Self::FullName {
            exclude: Vec::new(),
            exclude_gomaxprocs: false,
        }
    }

    /// Returns an extractor for the full name with the given name keys
    /// normalized to `/key=*` (or `-*` for `/gomaxprocs`).
    ///
    /// Keys that are not `/`-prefixed name keys are ignored.
    pub fn full_name_excluding<S: AsRef<str>>(keys: &[S]) -> Self {
        let mut exclude = Vec::new();
        let mut exclude_gomaxprocs = false;
        for key in keys.iter().map(AsRef::as_ref) {
            if !key.starts_with('/') {
                continue;
            }
            exclude.push(format!("{key}="));
            if key == "/gomaxprocs" {
                exclude_gomaxprocs = true;
            }
        }
        Self::FullName {
            exclude,
            exclude_gomaxprocs,
        }
    }

    /// Extracts this component from `record`. Missing components are `""`.
    pub fn extract<'r>(&self, record: &'r Record) -> Cow<'r, str> {
        match self {
            Self::Name => Cow::Borrowed(record.base_name()),
            Self::FullName {
                exclude,
                exclude_gomaxprocs,
            } => extract_full_name(record, exclude, *exclude_gomaxprocs),
            Self::NameKey { prefix, gomaxprocs } => {
                Cow::Borrowed(extract_name_key(record, prefix, *gomaxprocs))
            }
            Self::FileKey(key) => Cow::Borrowed(record.file_config_value(key)),
        }
    }
}

/// Reports whether `key` could be a file configuration key: it starts with
/// a lower-case letter and contains no spaces or upper-case letters.
pub fn is_file_key(key: &str) -> bool {
    let Some(first) = key.chars().next() else {
        return false;
    };
    first.is_lowercase() && key.chars().all(|c| !c.is_whitespace() && !c.is_uppercase())
}

fn extract_name_key<'r>(record: &'r Record, prefix: &str, gomaxprocs: bool) -> &'r str {
    let (_, mut parts) = record.name_parts();
    if gomaxprocs
        && let Some(last) = parts.clone().next_back()
        && let Some(procs) = last.strip_prefix('-')
    {
        return procs;
    }
    parts
        .find_map(|part| part.strip_prefix(prefix))
        .unwrap_or("")
}

fn extract_full_name<'r>(
    record: &'r Record,
    exclude: &[String],
    exclude_gomaxprocs: bool,
) -> Cow<'r, str> {
    let name = record.full_name();
    let needs_rewrite = exclude.iter().any(|k| name.contains(k.as_str()))
        || (exclude_gomaxprocs && name.contains('-'));
    if !needs_rewrite {
        return Cow::Borrowed(name);
    }

    let (base, parts) = record.name_parts();
    let mut out = String::with_capacity(name.len());
    out.push_str(base);
    for part in parts {
        if let Some(k) = exclude.iter().find(|k| part.starts_with(k.as_str())) {
            out.push_str(k);
            out.push('*');
        } else if exclude_gomaxprocs && part.starts_with('-') {
            out.push_str("-*");
        } else {
            out.push_str(part);
        }
    }
    Cow::Owned(out)
}
