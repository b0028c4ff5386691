//! Hash-consed key/value and tuple configurations.
//!
//! A [`Config`] is either a key/value leaf or a tuple of other Configs. All
//! Configs live in the arena of the [`ConfigSet`] that created them, and the
//! set guarantees that two structurally equal Configs are the same handle.
//! Equality and hashing of a `Config` are therefore O(1) regardless of how
//! deeply nested it is, and Configs can be used directly as map keys.
//!
//! # Representation
//!
//! Tuples are stored as a reversed singly-linked chain: each tuple node
//! holds the tuple of all but its last element (the prefix) and the last
//! element. Appending to an existing tuple reuses the prefix without copying
//! it.
//!
//! # Example
//!
//! ```rust
//! use benchproc::config::ConfigSet;
//!
//! let mut cs = ConfigSet::new();
//! let goos = cs.key_val("goos", "linux");
//! let arch = cs.key_val("goarch", "amd64");
//! let t1 = cs.tuple(&[goos, arch]);
//! let goos_again = cs.key_val("goos", "linux");
//! let t2 = cs.tuple(&[goos_again, arch]);
//! assert_eq!(t1, t2);
//! assert_eq!(cs.display(t1).to_string(), "(goos:linux, goarch:amd64)");
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::intern::Interner;

/// Source of unique [`ConfigSet`] identities.
static NEXT_SET_ID: AtomicU32 = AtomicU32::new(1);

/// Index of the canonical empty tuple in every set's arena.
const EMPTY: u32 = 0;

/// Handle to an immutable configuration stored in a [`ConfigSet`].
///
/// `Config` is `Copy` and compares by identity. Two Configs from different
/// ConfigSets are never equal, even if they are structurally identical.
/// Passing a Config to a ConfigSet that did not create it panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    set: u32,
    index: u32,
}

/// A node in the ConfigSet arena.
#[derive(Debug, Clone)]
enum Node {
    /// The empty tuple.
    Empty,
    /// A key/value leaf.
    KeyVal { key: Arc<str>, val: Arc<str> },
    /// A tuple ending in `elt`, with `len` elements in total.
    Tuple { prefix: u32, elt: u32, len: usize },
}

/// The owning store that canonicalizes Configs for one run.
///
/// A ConfigSet never evicts: every Config it hands out stays valid for the
/// lifetime of the set.
///
/// # Thread Safety
///
/// Construction requires `&mut self`; the set is `Send` but performs no
/// locking. Use one ConfigSet per worker and merge results afterwards, or
/// wrap it in a lock.
#[derive(Debug)]
pub struct ConfigSet {
    id: u32,
    nodes: Vec<Node>,
    /// Canonical leaves, keyed by key then value.
    kvs: HashMap<Arc<str>, HashMap<Arc<str>, u32>>,
    /// Canonical tuples, keyed by (prefix, last element).
    tuples: HashMap<(u32, u32), u32>,
    interner: Interner,
}

impl ConfigSet {
    /// Creates an empty ConfigSet with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: NEXT_SET_ID.fetch_add(1, AtomicOrdering::Relaxed),
            nodes: vec![Node::Empty],
            kvs: HashMap::new(),
            tuples: HashMap::new(),
            interner: Interner::new(),
        }
    }

    /// Returns the canonical empty tuple.
    pub fn empty(&self) -> Config {
        self.handle(EMPTY)
    }

    /// Returns the canonical key/value leaf for `(key, val)`, creating it on
    /// first use.
    pub fn key_val(&mut self, key: &str, val: &str) -> Config {
        if let Some(index) = self.kvs.get(key).and_then(|vals| vals.get(val)) {
            return self.handle(*index);
        }
        let key = self.interner.intern(key);
        let val = self.interner.intern(val);
        let index = self.push(Node::KeyVal {
            key: Arc::clone(&key),
            val: Arc::clone(&val),
        });
        self.kvs.entry(key).or_default().insert(val, index);
        self.handle(index)
    }

    /// Returns the canonical tuple of `elts`.
    ///
    /// # Panics
    ///
    /// Panics if any element was created by a different ConfigSet.
    pub fn tuple(&mut self, elts: &[Config]) -> Config {
        let empty = self.empty();
        self.append(empty, elts)
    }

    /// Returns the canonical tuple that extends `base` by `elts`.
    ///
    /// A leaf `base` is treated as the one-element tuple containing it.
    ///
    /// # Panics
    ///
    /// Panics if `base` or any element was created by a different ConfigSet.
    pub fn append(&mut self, base: Config, elts: &[Config]) -> Config {
        let mut prefix = if self.is_leaf(base) {
            let empty = self.empty();
            self.append(empty, &[base]).index
        } else {
            base.index
        };
        let base_len = self.len_of(prefix);

        // While every prefix so far is canonical, the next one may be too.
        // The first miss creates a fresh node, and nothing extending a fresh
        // node can already exist.
        let mut found = true;
        for (i, elt) in elts.iter().enumerate() {
            self.check(*elt);
            let key = (prefix, elt.index);
            if found {
                if let Some(existing) = self.tuples.get(&key) {
                    prefix = *existing;
                    continue;
                }
                found = false;
            }
            let index = self.push(Node::Tuple {
                prefix,
                elt: elt.index,
                len: base_len + i + 1,
            });
            self.tuples.insert(key, index);
            prefix = index;
        }
        self.handle(prefix)
    }

    /// Returns whether `c` is a key/value leaf.
    ///
    /// # Panics
    ///
    /// Panics if `c` was created by a different ConfigSet.
    pub fn is_leaf(&self, c: Config) -> bool {
        matches!(self.node(c), Node::KeyVal { .. })
    }

    /// Returns the key and value of a leaf, or `None` for a tuple.
    ///
    /// # Panics
    ///
    /// Panics if `c` was created by a different ConfigSet.
    pub fn leaf(&self, c: Config) -> Option<(&str, &str)> {
        match self.node(c) {
            Node::KeyVal { key, val } => Some((key.as_ref(), val.as_ref())),
            _ => None,
        }
    }

    /// Returns the elements of a tuple in order, or an empty vector for a
    /// leaf.
    ///
    /// # Panics
    ///
    /// Panics if `c` was created by a different ConfigSet.
    pub fn elements(&self, c: Config) -> Vec<Config> {
        let mut out = Vec::with_capacity(self.tuple_len(c));
        let mut cur = c.index;
        while let Node::Tuple { prefix, elt, .. } = self.nodes[cur as usize] {
            out.push(self.handle(elt));
            cur = prefix;
        }
        out.reverse();
        out
    }

    /// Returns the number of elements in a tuple. Leaves have length 0.
    ///
    /// # Panics
    ///
    /// Panics if `c` was created by a different ConfigSet.
    pub fn tuple_len(&self, c: Config) -> usize {
        self.check(c);
        self.len_of(c.index)
    }

    /// Splits a non-empty tuple into the tuple of all but its last element
    /// and the last element.
    ///
    /// # Panics
    ///
    /// Panics if `c` was created by a different ConfigSet.
    pub fn prefix_and_last(&self, c: Config) -> Option<(Config, Config)> {
        match *self.node(c) {
            Node::Tuple { prefix, elt, .. } => Some((self.handle(prefix), self.handle(elt))),
            _ => None,
        }
    }

    /// Interns `s` in this set's string table.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        self.interner.intern(s)
    }

    /// Returns the string table shared by every leaf in this set.
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Returns the number of distinct Configs stored, including the empty
    /// tuple.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing beyond the empty tuple has been stored.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Returns a value that formats `c` as `key:val` or `(a, b, ...)`.
    pub fn display(&self, c: Config) -> ConfigDisplay<'_> {
        self.check(c);
        ConfigDisplay { set: self, config: c }
    }

    /// Compares two Configs alphabetically.
    ///
    /// Leaves compare by key, then value, and sort before tuples. Tuples
    /// compare element-wise, and a proper prefix sorts first. The result is
    /// `Equal` only when `a == b`.
    ///
    /// # Panics
    ///
    /// Panics if either Config was created by a different ConfigSet.
    pub fn cmp_alpha(&self, a: Config, b: Config) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        match (self.leaf(a), self.leaf(b)) {
            (Some((k1, v1)), Some((k2, v2))) => k1.cmp(k2).then_with(|| v1.cmp(v2)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => {
                let (ea, eb) = (self.elements(a), self.elements(b));
                ea.iter()
                    .zip(eb.iter())
                    .map(|(x, y)| self.cmp_alpha(*x, *y))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or_else(|| ea.len().cmp(&eb.len()))
            }
        }
    }

    fn handle(&self, index: u32) -> Config {
        Config { set: self.id, index }
    }

    fn push(&mut self, node: Node) -> u32 {
        let index = u32::try_from(self.nodes.len()).unwrap_or_else(|_| {
            panic!("ConfigSet exceeded {} configs", u32::MAX);
        });
        self.nodes.push(node);
        index
    }

    fn len_of(&self, index: u32) -> usize {
        match self.nodes[index as usize] {
            Node::Tuple { len, .. } => len,
            _ => 0,
        }
    }

    fn node(&self, c: Config) -> &Node {
        self.check(c);
        &self.nodes[c.index as usize]
    }

    fn check(&self, c: Config) {
        assert!(
            c.set == self.id,
            "Config belongs to ConfigSet {} but was used with ConfigSet {}",
            c.set,
            self.id
        );
    }
}

impl Default for ConfigSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Formatting adapter returned by [`ConfigSet::display`].
pub struct ConfigDisplay<'a> {
    set: &'a ConfigSet,
    config: Config,
}

impl fmt::Display for ConfigDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((key, val)) = self.set.leaf(self.config) {
            return write!(f, "{key}:{val}");
        }
        f.write_str("(")?;
        for (i, elt) in self.set.elements(self.config).into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.set.display(elt))?;
        }
        f.write_str(")")
    }
}

/// Tracks a set of Configs in order of first observation.
///
/// The tracker doubles as a sort order: observed Configs sort by when they
/// were first added, before any Config that was never added. Configs that
/// were never added fall back to [`ConfigSet::cmp_alpha`].
#[derive(Debug, Clone, Default)]
pub struct ConfigTracker {
    configs: Vec<Config>,
    order: HashMap<Config, usize>,
}

impl ConfigTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `c` if it has not been seen before.
    pub fn add(&mut self, c: Config) {
        if self.order.contains_key(&c) {
            return;
        }
        self.order.insert(c, self.configs.len());
        self.configs.push(c);
    }

    /// The distinct Configs observed, in order of first observation.
    pub fn configs(&self) -> &[Config] {
        &self.configs
    }

    /// The position of `c` in observation order, if it was observed.
    pub fn position(&self, c: Config) -> Option<usize> {
        self.order.get(&c).copied()
    }

    /// Compares two Configs by observation order.
    ///
    /// # Panics
    ///
    /// Panics if the fallback comparison receives Configs from a different
    /// ConfigSet than `set`.
    pub fn cmp(&self, set: &ConfigSet, a: Config, b: Config) -> Ordering {
        match (self.position(a), self.position(b)) {
            (Some(i), Some(j)) => i.cmp(&j),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => set.cmp_alpha(a, b),
        }
    }
}

/// A node of a tree built by [`ConfigSet::tree`].
///
/// Every node at depth `N` of one tree holds a leaf with the same key, or
/// `None` where a shorter tuple had no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTree {
    /// The key/value leaf at this node.
    pub config: Option<Config>,
    /// The number of input Configs under this node. Widths at every level
    /// sum to the number of input Configs.
    pub width: usize,
    /// Child nodes. These all share this node's prefix.
    pub children: Vec<ConfigTree>,
}

/// The key structure shared by a set of Configs.
enum Shape {
    Leaf(String),
    Tuple(Vec<Shape>, usize),
}

impl Shape {
    fn size(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Tuple(_, size) => *size,
        }
    }

    fn keys(&self, out: &mut Vec<String>) {
        match self {
            Self::Leaf(key) => out.push(key.clone()),
            Self::Tuple(elts, _) => elts.iter().for_each(|e| e.keys(out)),
        }
    }
}

/// Arena node used while building a [`ConfigTree`] forest.
struct TreeNode {
    config: Option<Config>,
    width: usize,
    children: Vec<usize>,
}

impl ConfigSet {
    /// Merges a sequence of Configs into a forest by common prefix, for
    /// drawing compact headers over a sequence of table columns.
    ///
    /// The Configs are flattened to their leaves, so nested tuples merge
    /// across tuple boundaries. Also returns the key at each level of the
    /// forest.
    ///
    /// # Panics
    ///
    /// Panics if the Configs do not share a key structure: a leaf where
    /// another Config has a tuple, or different keys at the same position.
    pub fn tree(&self, configs: &[Config]) -> (Vec<ConfigTree>, Vec<String>) {
        if configs.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let shape = self.common_shape(configs);

        let mut nodes = vec![TreeNode {
            config: None,
            width: 0,
            children: Vec::new(),
        }];
        // The rightmost node at each level; spine[0] is the virtual root.
        let mut spine = vec![0; shape.size() + 1];
        let mut flat = Vec::with_capacity(shape.size());
        for (i, &cfg) in configs.iter().enumerate() {
            flat.clear();
            self.flatten(&shape, Some(cfg), &mut flat);

            let mut diverged = i == 0;
            for (level, &kv) in flat.iter().enumerate() {
                let node = spine[level + 1];
                if !diverged && nodes[node].config == kv {
                    nodes[node].width += 1;
                    continue;
                }
                diverged = true;
                let new = nodes.len();
                nodes.push(TreeNode {
                    config: kv,
                    width: 1,
                    children: Vec::new(),
                });
                nodes[spine[level]].children.push(new);
                spine[level + 1] = new;
            }
        }

        fn build(nodes: &[TreeNode], i: usize) -> ConfigTree {
            ConfigTree {
                config: nodes[i].config,
                width: nodes[i].width,
                children: nodes[i].children.iter().map(|&c| build(nodes, c)).collect(),
            }
        }
        let forest = nodes[0].children.iter().map(|&c| build(&nodes, c)).collect();
        let mut keys = Vec::with_capacity(shape.size());
        shape.keys(&mut keys);
        (forest, keys)
    }

    fn common_shape(&self, configs: &[Config]) -> Shape {
        if let Some((key, _)) = self.leaf(configs[0]) {
            for &c in &configs[1..] {
                match self.leaf(c) {
                    Some((k, _)) if k == key => {}
                    Some((k, _)) => panic!("mismatched keys: {key:?}, {k:?}"),
                    None => panic!("mismatched key/val and tuple configs"),
                }
            }
            return Shape::Leaf(key.to_string());
        }

        let mut max_len = 0;
        for &c in configs {
            assert!(!self.is_leaf(c), "mismatched key/val and tuple configs");
            max_len = max_len.max(self.tuple_len(c));
        }

        // Strip the last element of every tuple long enough to have one at
        // each position, working backwards.
        let mut prefixes = configs.to_vec();
        let mut elts = Vec::with_capacity(max_len);
        let mut size = 0;
        for idx in (0..max_len).rev() {
            let mut column: Vec<Config> = Vec::new();
            for cfg in &mut prefixes {
                if idx >= self.tuple_len(*cfg) {
                    continue;
                }
                if let Some((prefix, last)) = self.prefix_and_last(*cfg) {
                    *cfg = prefix;
                    if column.last() != Some(&last) {
                        column.push(last);
                    }
                }
            }
            let sub = self.common_shape(&column);
            size += sub.size();
            elts.push(sub);
        }
        elts.reverse();
        Shape::Tuple(elts, size)
    }

    /// Appends the leaves of `config` in `shape` order, with `None` where
    /// `config` is shorter than `shape`.
    fn flatten(&self, shape: &Shape, config: Option<Config>, out: &mut Vec<Option<Config>>) {
        match shape {
            Shape::Leaf(_) => out.push(config),
            Shape::Tuple(subs, _) => {
                let elts = config.map(|c| self.elements(c)).unwrap_or_default();
                for (i, sub) in subs.iter().enumerate() {
                    self.flatten(sub, elts.get(i).copied(), out);
                }
            }
        }
    }
}
