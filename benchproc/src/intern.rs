//! String interning shared by [`ConfigSet`](crate::config::ConfigSet) and
//! [`Schema`](crate::schema::Schema).
//!
//! Both stores retain every distinct key and value they have ever seen, so
//! interning never causes over-retention: the interned string is referenced
//! by a stored config anyway.

use std::collections::HashSet;
use std::sync::Arc;

/// A table of canonical, shared strings.
///
/// Interning the same text twice returns two handles to the same
/// allocation, which makes equality checks between interned strings cheap
/// and keeps row buffers small.
///
/// # Thread Safety
///
/// `Interner` requires `&mut self` to insert and performs no locking. Each
/// owner holds its own instance; shard work across independent owners
/// rather than sharing one.
#[derive(Debug, Clone)]
pub struct Interner {
    strings: HashSet<Arc<str>>,
    empty: Arc<str>,
}

impl Interner {
    /// Creates an empty interner.
    pub fn new() -> Self {
        let empty: Arc<str> = Arc::from("");
        let mut strings = HashSet::new();
        strings.insert(Arc::clone(&empty));
        Self { strings, empty }
    }

    /// Returns the canonical copy of `s`, inserting it on first use.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing);
        }
        let interned: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&interned));
        interned
    }

    /// Interns raw bytes, replacing invalid UTF-8 sequences.
    pub fn intern_bytes(&mut self, bytes: &[u8]) -> Arc<str> {
        self.intern(&String::from_utf8_lossy(bytes))
    }

    /// Returns the canonical empty string.
    pub fn empty(&self) -> Arc<str> {
        Arc::clone(&self.empty)
    }

    /// Returns the number of distinct strings interned, including `""`.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns `true` if only the empty string has been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 1
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}
