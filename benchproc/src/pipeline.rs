//! A filter-project-group pipeline over a stream of records.
//!
//! A [`Pipeline`] ties the other modules together the way a benchmark
//! comparison tool uses them: records pass through a [`Filter`], optionally
//! have their units tidied, and are then projected twice. The `group_by`
//! projection picks the [`Group`] a record belongs to, and the `columns`
//! projection (with a `.unit` field appended) picks the [`Column`] each of
//! its measurements lands in.
//!
//! # Example
//!
//! ```rust
//! use benchproc::pipeline::{Pipeline, PipelineConfig};
//! use benchproc::record::Record;
//!
//! let config = PipelineConfig {
//!     group_by: "goos".to_string(),
//!     columns: "/size".to_string(),
//!     ..PipelineConfig::default()
//! };
//! let mut pipeline = Pipeline::new(&config)?;
//! for (os, size, ns) in [("linux", 1, 10.0), ("linux", 1, 12.0), ("darwin", 2, 20.0)] {
//!     let r = Record::new(format!("BenchmarkA/size={size}"))
//!         .with_file_config("goos", os)
//!         .with_value(ns, "ns/op");
//!     pipeline.push(r);
//! }
//!
//! assert_eq!(pipeline.groups().len(), 2);
//! let linux = &pipeline.groups().iter().next().unwrap();
//! assert_eq!(linux.columns()[0].values(), &[10.0, 12.0]);
//! # Ok::<(), benchproc::error::PipelineError>(())
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::PipelineError;
use crate::filter::Filter;
use crate::projection::ProjectionParser;
use crate::record::Record;
use crate::schema::{Row, Schema};
use crate::units::TidyCache;

/// Configuration for a [`Pipeline`].
///
/// Every field has a default, so a configuration file only needs to name
/// the settings it changes:
///
/// ```json
/// { "filter": "goos:linux", "group_by": ".config", "columns": "/size@numeric" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Query selecting the records and measurements to keep.
    pub filter: String,
    /// Projection that splits records into groups.
    pub group_by: String,
    /// Projection that splits each group's measurements into columns.
    pub columns: String,
    /// Whether to normalize pre-scaled units such as `ns/op`.
    pub tidy_units: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: "*".to_string(),
            group_by: String::new(),
            columns: String::new(),
            tidy_units: false,
        }
    }
}

/// Record counters for a [`Pipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Records pushed into the pipeline.
    pub seen: u64,
    /// Records that contributed to a group.
    pub kept: u64,
    /// Records removed by the filter or rejected by a projection.
    pub dropped: u64,
}

/// The measurements of one column of a group.
#[derive(Debug, Clone)]
pub struct Column {
    row: Row,
    values: Vec<f64>,
}

impl Column {
    /// The column row, in the pipeline's column schema.
    pub fn row(&self) -> Row {
        self.row
    }

    /// The measurements in arrival order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The arithmetic mean of the measurements.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// The columns of one group, in order of first observation.
#[derive(Debug, Clone)]
pub struct Group {
    row: Row,
    columns: Vec<Column>,
    by_row: HashMap<Row, usize>,
}

impl Group {
    fn new(row: Row) -> Self {
        Self {
            row,
            columns: Vec::new(),
            by_row: HashMap::new(),
        }
    }

    /// The group row, in the pipeline's group schema.
    pub fn row(&self) -> Row {
        self.row
    }

    /// The columns of this group in order of first observation.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The column for `row`, if this group has one.
    pub fn column(&self, row: Row) -> Option<&Column> {
        self.by_row.get(&row).map(|&i| &self.columns[i])
    }

    fn push(&mut self, row: Row, value: f64) {
        let i = *self.by_row.entry(row).or_insert_with(|| {
            self.columns.push(Column {
                row,
                values: Vec::new(),
            });
            self.columns.len() - 1
        });
        self.columns[i].values.push(value);
    }
}

/// All groups of a pipeline, in order of first observation.
#[derive(Debug, Clone, Default)]
pub struct Groups {
    groups: Vec<Group>,
    by_row: HashMap<Row, usize>,
}

impl Groups {
    /// The number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no record has been grouped yet.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterates over groups in order of first observation.
    pub fn iter(&self) -> std::slice::Iter<'_, Group> {
        self.groups.iter()
    }

    /// The group for `row`, if any record projected to it.
    pub fn get(&self, row: Row) -> Option<&Group> {
        self.by_row.get(&row).map(|&i| &self.groups[i])
    }

    fn entry(&mut self, row: Row) -> &mut Group {
        let i = *self.by_row.entry(row).or_insert_with(|| {
            self.groups.push(Group::new(row));
            self.groups.len() - 1
        });
        &mut self.groups[i]
    }
}

impl<'a> IntoIterator for &'a Groups {
    type Item = &'a Group;
    type IntoIter = std::slice::Iter<'a, Group>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

/// A configured filter-project-group pipeline.
#[derive(Debug)]
pub struct Pipeline {
    filter: Filter,
    group_schema: Schema,
    column_schema: Schema,
    tidy: Option<TidyCache>,
    groups: Groups,
    stats: PipelineStats,
}

impl Pipeline {
    /// Compiles the filter and projections of `config`.
    ///
    /// The two projections are parsed together, so a key projected by one
    /// is excluded from `.config` and `.fullname` groups in the other.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] if the filter or either projection is
    /// invalid, or if either projection names `.unit`.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let filter =
            Filter::new(&config.filter).map_err(|source| PipelineError::Filter { source })?;

        let group_err = |source| PipelineError::Projection {
            setting: "group_by",
            source,
        };
        let columns_err = |source| PipelineError::Projection {
            setting: "columns",
            source,
        };

        let mut parser = ProjectionParser::new();
        let group_schema = parser.parse(&config.group_by).map_err(group_err)?;
        let mut column_schema = parser.parse(&config.columns).map_err(columns_err)?;
        if group_schema.unit_field().is_some() {
            return Err(PipelineError::UnitInGroups);
        }
        if column_schema.unit_field().is_some() {
            return Err(PipelineError::DuplicateUnit);
        }
        column_schema.add_values();

        debug!(
            filter = %filter.query(),
            group_by = %config.group_by,
            columns = %config.columns,
            tidy_units = config.tidy_units,
            "built pipeline"
        );
        Ok(Self {
            filter,
            group_schema,
            column_schema,
            tidy: config.tidy_units.then(TidyCache::new),
            groups: Groups::default(),
            stats: PipelineStats::default(),
        })
    }

    /// Feeds one record through the pipeline. Returns whether any of its
    /// measurements were grouped.
    pub fn push(&mut self, mut record: Record) -> bool {
        self.stats.seen += 1;
        if !self.filter.match_record(&record).apply(&mut record) {
            trace!(name = %record.full_name(), "record removed by filter");
            self.stats.dropped += 1;
            return false;
        }
        if let Some(cache) = &mut self.tidy {
            cache.tidy(&mut record);
        }

        let Some(group) = self.group_schema.project(&record) else {
            trace!(name = %record.full_name(), "record rejected by group_by");
            self.stats.dropped += 1;
            return false;
        };
        let Some(columns) = self.column_schema.project_values(&record) else {
            trace!(name = %record.full_name(), "record rejected by columns");
            self.stats.dropped += 1;
            return false;
        };

        let group = self.groups.entry(group);
        for (column, value) in columns.into_iter().zip(&record.values) {
            group.push(column, value.value);
        }
        self.stats.kept += 1;
        true
    }

    /// The groups collected so far, in order of first observation.
    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// The groups sorted by the `group_by` projection.
    pub fn sorted_groups(&self) -> Vec<&Group> {
        let mut rows: Vec<Row> = self.groups.iter().map(Group::row).collect();
        self.group_schema.sort_rows(&mut rows);
        rows.into_iter()
            .filter_map(|row| self.groups.get(row))
            .collect()
    }

    /// The columns of `group` sorted by the `columns` projection.
    pub fn sorted_columns<'g>(&self, group: &'g Group) -> Vec<&'g Column> {
        let mut rows: Vec<Row> = group.columns.iter().map(Column::row).collect();
        self.column_schema.sort_rows(&mut rows);
        rows.into_iter()
            .filter_map(|row| group.column(row))
            .collect()
    }

    /// The schema of group rows.
    pub fn group_schema(&self) -> &Schema {
        &self.group_schema
    }

    /// The schema of column rows. Its last field is `.unit`.
    pub fn column_schema(&self) -> &Schema {
        &self.column_schema
    }

    /// The compiled filter.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Record counters.
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}
