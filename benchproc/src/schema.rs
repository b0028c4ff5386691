//! Growable schemas that project records into hash-consed rows.
//!
//! A [`Schema`] is an ordered tree of fields and groups produced by a
//! [`ProjectionParser`](crate::projection::ProjectionParser). Projecting a
//! [`Record`] fills one value per field and canonicalizes the result into a
//! [`Row`]: two projections with the same values yield the same `Row`, so
//! rows can be used directly as map keys.
//!
//! ## Growth
//!
//! Group projections such as `.config` add a field the first time a record
//! exposes a new file configuration key. Each field's value index is
//! assigned once, in creation order, and never changes, while the field's
//! position in [`Schema::fields`] follows the projection expression. Rows
//! are stored by value index with trailing empty values trimmed, so a row
//! projected before the schema grew is identical to the same row projected
//! after.
//!
//! ## Ordering
//!
//! Rows sort lexicographically by field in schema order. Each field has its
//! own [`Order`]: first observation (the default), alphabetic, numeric, or
//! an exact list of values.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::config::{Config, ConfigSet};
use crate::extract::Extractor;
use crate::intern::Interner;
use crate::record::Record;

/// Source of unique [`Schema`] identities.
static NEXT_SCHEMA_ID: AtomicU32 = AtomicU32::new(1);

/// The root group of every schema.
const ROOT: usize = 0;

/// Name of the field that varies per measurement.
pub const UNIT_KEY: &str = ".unit";

/// The sort order of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    /// Order of first observation.
    First,
    /// Lexicographic order.
    Alpha,
    /// Numeric order. Values that parse as numbers sort before values
    /// that do not; the rest sort lexicographically.
    Numeric,
    /// The order of the listed values. Records with any other value are
    /// rejected by the projection.
    Exact(Vec<String>),
}

impl Order {
    /// Looks up a named order: `first`, `alpha` or `numeric`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "first" => Some(Self::First),
            "alpha" => Some(Self::Alpha),
            "numeric" => Some(Self::Numeric),
            _ => None,
        }
    }

    fn field_order(&self) -> FieldOrder {
        match self {
            Self::First => FieldOrder::Observed(HashMap::new()),
            Self::Alpha => FieldOrder::Alpha,
            Self::Numeric => FieldOrder::Numeric,
            Self::Exact(values) => FieldOrder::Exact(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), i))
                    .collect(),
            ),
        }
    }
}

/// Per-field comparator state.
#[derive(Debug, Clone)]
enum FieldOrder {
    /// Position of each value in observation order.
    Observed(HashMap<Arc<str>, usize>),
    /// Position of each allowed value.
    Exact(HashMap<String, usize>),
    Alpha,
    Numeric,
}

impl FieldOrder {
    fn cmp(&self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Observed(pos) => rank(pos.get(a), pos.get(b)).then_with(|| a.cmp(b)),
            Self::Exact(pos) => rank(pos.get(a), pos.get(b)).then_with(|| a.cmp(b)),
            Self::Alpha => a.cmp(b),
            Self::Numeric => cmp_numeric(a, b),
        }
    }
}

/// Compares optional positions, with unknown values last.
fn rank(a: Option<&usize>, b: Option<&usize>) -> Ordering {
    let a = a.copied().unwrap_or(usize::MAX);
    let b = b.copied().unwrap_or(usize::MAX);
    a.cmp(&b)
}

/// Numeric order: numbers before non-numbers, then by value, then by text.
fn cmp_numeric(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Keys projected by specific fields, which group projections skip.
#[derive(Debug, Default)]
pub(crate) struct Exclusions {
    /// Specific file keys, skipped by `.config`.
    pub(crate) config_keys: HashSet<String>,
    /// Specific name keys, normalized away by `.fullname`.
    pub(crate) name_keys: Vec<String>,
    /// Built from `name_keys` when the first record is projected.
    full_name: Option<Extractor>,
}

impl Exclusions {
    fn full_name(&mut self) -> &Extractor {
        self.full_name
            .get_or_insert_with(|| Extractor::full_name_excluding(&self.name_keys))
    }
}

/// Exclusions shared by a projection parser and every schema it produces,
/// so keys parsed later are still skipped by earlier group projections.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedExclusions(Arc<Mutex<Exclusions>>);

impl SharedExclusions {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Exclusions> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct FieldDef {
    name: Arc<str>,
    order: FieldOrder,
}

#[derive(Debug, Clone, Copy)]
enum Child {
    Field(u32),
    Group(usize),
}

#[derive(Debug)]
struct Group {
    name: String,
    /// Whether this group becomes a nested tuple in [`Schema::to_config`].
    nested: bool,
    children: Vec<Child>,
}

/// How one projection fills the row buffer.
#[derive(Debug)]
enum Projector {
    /// A single extracted key.
    Key { field: u32, extractor: Extractor },
    /// The full name, with more specific name keys normalized away.
    FullName { field: u32 },
    /// Every file configuration key not projected elsewhere.
    FileConfig {
        group: usize,
        order: Order,
        seen: HashMap<String, u32>,
    },
}

/// A hash-consed projection of a record.
///
/// `Row` is `Copy` and compares by identity; two rows from the same
/// [`Schema`] are equal exactly when they have the same values. Rows from
/// different schemas are never equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Row {
    schema: u32,
    index: u32,
}

/// A single dimension of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: Arc<str>,
    schema: u32,
    index: u32,
}

impl Field {
    /// The key this field was projected from, such as `goos` or `/size`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A projection plan and the store of the rows it has produced.
///
/// # Thread Safety
///
/// Projecting requires `&mut self` because it grows the schema, updates
/// observation orders and stores new rows. Use one schema per worker.
#[derive(Debug)]
pub struct Schema {
    id: u32,
    groups: Vec<Group>,
    fields: Vec<FieldDef>,
    /// Value indexes of all fields in schema order.
    flat: Vec<u32>,
    projectors: Vec<Projector>,
    unit: Option<u32>,
    exclusions: SharedExclusions,

    /// Scratch row, indexed by field value index.
    row: Vec<Arc<str>>,
    interner: Interner,
    rows: Vec<Box<[Arc<str>]>>,
    by_hash: HashMap<u64, Vec<u32>>,
}

impl Schema {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_exclusions(SharedExclusions::default())
    }

    pub(crate) fn with_exclusions(exclusions: SharedExclusions) -> Self {
        Self {
            id: NEXT_SCHEMA_ID.fetch_add(1, AtomicOrdering::Relaxed),
            groups: vec![Group {
                name: String::new(),
                nested: false,
                children: Vec::new(),
            }],
            fields: Vec::new(),
            flat: Vec::new(),
            projectors: Vec::new(),
            unit: None,
            exclusions,
            row: Vec::new(),
            interner: Interner::new(),
            rows: Vec::new(),
            by_hash: HashMap::new(),
        }
    }

    /// The root group, for use by the projection parser.
    pub(crate) fn root(&self) -> usize {
        ROOT
    }

    pub(crate) fn add_group(&mut self, parent: usize, name: &str, nested: bool) -> usize {
        let group = self.groups.len();
        self.groups.push(Group {
            name: name.to_string(),
            nested,
            children: Vec::new(),
        });
        self.groups[parent].children.push(Child::Group(group));
        group
    }

    fn add_field(&mut self, parent: usize, name: &str, order: &Order) -> u32 {
        let index = u32::try_from(self.fields.len()).unwrap_or_else(|_| {
            panic!("Schema exceeded {} fields", u32::MAX);
        });
        let name = self.interner.intern(name);
        trace!(
            schema = self.id,
            group = %self.groups[parent].name,
            field = %name,
            index,
            "adding field"
        );
        self.fields.push(FieldDef {
            name,
            order: order.field_order(),
        });
        self.groups[parent].children.push(Child::Field(index));
        self.row.push(self.interner.empty());
        self.flat = self.flatten();
        index
    }

    pub(crate) fn add_key(&mut self, parent: usize, key: &str, extractor: Extractor, order: &Order) {
        let field = self.add_field(parent, key, order);
        self.projectors.push(Projector::Key { field, extractor });
    }

    pub(crate) fn add_full_name(&mut self, parent: usize, order: &Order) {
        let field = self.add_field(parent, ".fullname", order);
        self.projectors.push(Projector::FullName { field });
    }

    pub(crate) fn add_file_config(&mut self, parent: usize, order: Order) {
        let group = self.add_group(parent, ".config", false);
        self.projectors.push(Projector::FileConfig {
            group,
            order,
            seen: HashMap::new(),
        });
    }

    /// Adds the unit field under `parent`. Returns `None` if this schema
    /// already has one.
    pub(crate) fn add_unit(&mut self, parent: usize, order: &Order) -> Option<Field> {
        if self.unit.is_some() {
            return None;
        }
        let index = self.add_field(parent, UNIT_KEY, order);
        self.unit = Some(index);
        Some(self.field(index))
    }

    /// Appends a `.unit` field used by [`project_values`](Self::project_values)
    /// to break out each measurement of a record.
    ///
    /// # Panics
    ///
    /// Panics if this schema already has a `.unit` field.
    pub fn add_values(&mut self) -> Field {
        match self.add_unit(ROOT, &Order::First) {
            Some(field) => field,
            None => panic!("Schema already has a {UNIT_KEY} field"),
        }
    }

    /// The `.unit` field, if this schema has one.
    pub fn unit_field(&self) -> Option<Field> {
        self.unit.map(|index| self.field(index))
    }

    /// The fields of this schema in projection order.
    ///
    /// Group projections can contribute any number of fields, and
    /// projecting new records may add more.
    pub fn fields(&self) -> Vec<Field> {
        self.flat.iter().map(|&index| self.field(index)).collect()
    }

    /// The number of fields in this schema.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// The number of distinct rows produced so far.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Projects `record` into a row.
    ///
    /// Returns `None` if an exact-value projection rejects the record. If
    /// this schema has a `.unit` field it is left empty; use
    /// [`project_values`](Self::project_values) instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use benchproc::projection::ProjectionParser;
    /// use benchproc::record::Record;
    ///
    /// let mut schema = ProjectionParser::new().parse(".name,/size")?;
    /// let r1 = Record::new("BenchmarkFoo/size=10");
    /// let r2 = Record::new("BenchmarkFoo/size=10-8");
    /// let a = schema.project(&r1).unwrap();
    /// assert_eq!(schema.project(&r2), Some(a));
    /// assert_eq!(schema.display_row(a).to_string(), ".name:BenchmarkFoo /size:10");
    /// # Ok::<(), benchproc::error::SyntaxError>(())
    /// ```
    pub fn project(&mut self, record: &Record) -> Option<Row> {
        if !self.populate(record) {
            return None;
        }
        Some(self.intern_row())
    }

    /// Projects each measurement of `record` into its own row.
    ///
    /// The result has one row per entry of `record.values`. The rows differ
    /// only in the `.unit` field; without one they are all identical.
    /// Returns `None` if an exact-value projection rejects the record.
    pub fn project_values(&mut self, record: &Record) -> Option<Vec<Row>> {
        if !self.populate(record) {
            return None;
        }
        let Some(unit) = self.unit else {
            let row = self.intern_row();
            return Some(vec![row; record.values.len()]);
        };
        let mut out = Vec::with_capacity(record.values.len());
        for value in &record.values {
            self.row[unit as usize] = self.interner.intern(&value.unit);
            out.push(self.intern_row());
        }
        Some(out)
    }

    fn populate(&mut self, record: &Record) -> bool {
        let empty = self.interner.empty();
        self.row.fill(empty);

        // Projectors may add fields, which needs the whole schema.
        let mut projectors = std::mem::take(&mut self.projectors);
        let ok = projectors.iter_mut().all(|p| self.run(p, record));
        self.projectors = projectors;
        if !ok {
            trace!(schema = self.id, name = %record.full_name(), "record rejected by projection");
        }
        ok
    }

    fn run(&mut self, projector: &mut Projector, record: &Record) -> bool {
        match projector {
            Projector::Key { field, extractor } => {
                let value = extractor.extract(record);
                return self.set_value(*field, &value);
            }
            Projector::FullName { field } => {
                let value = self.exclusions.lock().full_name().extract(record);
                return self.set_value(*field, &value);
            }
            Projector::FileConfig { group, order, seen } => {
                for cfg in record.file_config() {
                    let field = match seen.get(&cfg.key) {
                        Some(&field) => field,
                        None if self.exclusions.lock().config_keys.contains(&cfg.key) => continue,
                        None => {
                            let field = self.add_field(*group, &cfg.key, order);
                            debug!(
                                schema = self.id,
                                key = %cfg.key,
                                index = field,
                                "schema grew new file config field"
                            );
                            seen.insert(cfg.key.clone(), field);
                            field
                        }
                    };
                    self.row[field as usize] = self.interner.intern(&cfg.value);
                }
            }
        }
        true
    }

    /// Stores `value` for `field`, or returns false if the field's exact
    /// order does not allow it.
    fn set_value(&mut self, field: u32, value: &str) -> bool {
        if let FieldOrder::Exact(allowed) = &self.fields[field as usize].order
            && !allowed.contains_key(value)
        {
            return false;
        }
        self.row[field as usize] = self.interner.intern(value);
        true
    }

    /// Canonicalizes the row buffer, ignoring trailing empty values.
    fn intern_row(&mut self) -> Row {
        let len = self
            .row
            .iter()
            .rposition(|v| !v.is_empty())
            .map_or(0, |i| i + 1);
        let row = &self.row[..len];

        let mut hasher = DefaultHasher::new();
        row.hash(&mut hasher);
        let hash = hasher.finish();

        let candidates = self.by_hash.entry(hash).or_default();
        if let Some(&index) = candidates
            .iter()
            .find(|&&i| *self.rows[i as usize] == *row)
        {
            return Row {
                schema: self.id,
                index,
            };
        }

        // A new row: record first observations.
        for (i, def) in self.fields.iter_mut().enumerate() {
            if let FieldOrder::Observed(pos) = &mut def.order {
                let value = row.get(i).map_or("", |v| v.as_ref());
                if !pos.contains_key(value) {
                    let next = pos.len();
                    pos.insert(Arc::from(value), next);
                }
            }
        }

        let index = u32::try_from(self.rows.len()).unwrap_or_else(|_| {
            panic!("Schema exceeded {} rows", u32::MAX);
        });
        self.rows.push(Box::from(row));
        candidates.push(index);
        Row {
            schema: self.id,
            index,
        }
    }

    /// The value of `field` in `row`. Fields added after the row was
    /// created read as `""`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `field` belongs to a different schema.
    pub fn get(&self, row: Row, field: &Field) -> &str {
        self.check_field(field);
        self.value(self.values(row), field.index)
    }

    /// Formats `row` as space-separated `key:value` pairs, omitting empty
    /// values.
    ///
    /// # Panics
    ///
    /// Panics if `row` belongs to a different schema.
    pub fn display_row(&self, row: Row) -> RowDisplay<'_> {
        self.check_row(row);
        RowDisplay { schema: self, row }
    }

    /// Compares two rows field by field in schema order.
    ///
    /// # Panics
    ///
    /// Panics if either row belongs to a different schema.
    pub fn cmp_rows(&self, a: Row, b: Row) -> Ordering {
        let orders = self.comparators();
        cmp_values(&orders, self.values(a), self.values(b))
    }

    /// Whether `a` sorts before `b`.
    ///
    /// # Panics
    ///
    /// Panics if either row belongs to a different schema.
    pub fn less(&self, a: Row, b: Row) -> bool {
        self.cmp_rows(a, b) == Ordering::Less
    }

    /// Sorts rows in schema order.
    ///
    /// This is equivalent to sorting with [`cmp_rows`](Self::cmp_rows) but
    /// resolves each field's comparator once rather than per comparison.
    ///
    /// # Panics
    ///
    /// Panics if any row belongs to a different schema.
    pub fn sort_rows(&self, rows: &mut [Row]) {
        for &row in rows.iter() {
            self.check_row(row);
        }
        let orders = self.comparators();
        rows.sort_by(|&a, &b| {
            cmp_values(
                &orders,
                &self.rows[a.index as usize],
                &self.rows[b.index as usize],
            )
        });
    }

    /// Converts `row` into a tuple of key/value leaves in schema order.
    ///
    /// Parenthesized sub-projections become nested tuples. Every field is
    /// present, with `""` for fields the row has no value for.
    ///
    /// # Panics
    ///
    /// Panics if `row` belongs to a different schema.
    pub fn to_config(&self, row: Row, cs: &mut ConfigSet) -> Config {
        let values = self.values(row);
        let elts = self.group_configs(ROOT, values, cs);
        cs.tuple(&elts)
    }

    fn group_configs(&self, group: usize, values: &[Arc<str>], cs: &mut ConfigSet) -> Vec<Config> {
        let mut out = Vec::new();
        for child in &self.groups[group].children {
            match *child {
                Child::Field(index) => {
                    let name = &self.fields[index as usize].name;
                    out.push(cs.key_val(name, self.value(values, index)));
                }
                Child::Group(sub) if self.groups[sub].nested => {
                    let elts = self.group_configs(sub, values, cs);
                    out.push(cs.tuple(&elts));
                }
                Child::Group(sub) => out.extend(self.group_configs(sub, values, cs)),
            }
        }
        out
    }

    fn comparators(&self) -> Vec<(usize, &FieldOrder)> {
        self.flat
            .iter()
            .map(|&i| (i as usize, &self.fields[i as usize].order))
            .collect()
    }

    fn flatten(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.fields.len());
        let mut stack = vec![self.groups[ROOT].children.iter()];
        while let Some(iter) = stack.last_mut() {
            match iter.next() {
                Some(Child::Field(index)) => out.push(*index),
                Some(Child::Group(sub)) => stack.push(self.groups[*sub].children.iter()),
                None => {
                    stack.pop();
                }
            }
        }
        out
    }

    fn field(&self, index: u32) -> Field {
        Field {
            name: Arc::clone(&self.fields[index as usize].name),
            schema: self.id,
            index,
        }
    }

    fn values(&self, row: Row) -> &[Arc<str>] {
        self.check_row(row);
        &self.rows[row.index as usize]
    }

    fn value<'a>(&self, values: &'a [Arc<str>], index: u32) -> &'a str {
        values.get(index as usize).map_or("", |v| v.as_ref())
    }

    fn check_row(&self, row: Row) {
        assert!(
            row.schema == self.id,
            "Row belongs to Schema {} but was used with Schema {}",
            row.schema,
            self.id
        );
    }

    fn check_field(&self, field: &Field) {
        assert!(
            field.schema == self.id,
            "Field {} belongs to Schema {} but was used with Schema {}",
            field.name,
            field.schema,
            self.id
        );
    }
}

fn cmp_values(orders: &[(usize, &FieldOrder)], a: &[Arc<str>], b: &[Arc<str>]) -> Ordering {
    for &(index, order) in orders {
        let x = a.get(index).map_or("", |v| v.as_ref());
        let y = b.get(index).map_or("", |v| v.as_ref());
        if x != y {
            return order.cmp(x, y);
        }
    }
    Ordering::Equal
}

/// Formatting adapter returned by [`Schema::display_row`].
pub struct RowDisplay<'a> {
    schema: &'a Schema,
    row: Row,
}

impl fmt::Display for RowDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.schema.values(self.row);
        let mut first = true;
        for &index in &self.schema.flat {
            let value = self.schema.value(values, index);
            if value.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}:{}", self.schema.fields[index as usize].name, value)?;
        }
        Ok(())
    }
}
