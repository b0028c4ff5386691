//! # benchproc
//!
//! Projection, grouping and filtering engine for benchmark results.
//!
//! benchproc turns a stream of benchmark records into structured,
//! comparable groups. Records are selected with a small query language,
//! projected onto user-chosen keys, and canonicalized so that equal
//! projections compare with a single integer comparison.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Hash-consed configurations and rows: structural equality is identity
//! - Schemas that grow as new configuration keys are observed, without
//!   disturbing rows created earlier
//! - Per-measurement filtering with a compact bitset result
//! - Syntax errors that point at the offending character
//! - No I/O: records come in, rows and groups come out
//!
//! ## Quick Start
//!
//! ```rust
//! use benchproc::{Filter, ProjectionParser, Record};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Keep Linux results, one row per (benchmark, size)
//! let filter = Filter::new("goos:linux")?;
//! let mut schema = ProjectionParser::new().parse(".name,/size@numeric")?;
//!
//! let mut rows = Vec::new();
//! for (os, name) in [
//!     ("linux", "BenchmarkEncode/size=64-8"),
//!     ("darwin", "BenchmarkEncode/size=64-8"),
//!     ("linux", "BenchmarkEncode/size=8-8"),
//! ] {
//!     let mut r = Record::new(name)
//!         .with_file_config("goos", os)
//!         .with_value(120.0, "ns/op");
//!     if filter.match_record(&r).apply(&mut r) {
//!         rows.extend(schema.project(&r));
//!     }
//! }
//!
//! schema.sort_rows(&mut rows);
//! let shown: Vec<String> = rows.iter().map(|&r| schema.display_row(r).to_string()).collect();
//! assert_eq!(shown, [
//!     ".name:BenchmarkEncode /size:8",
//!     ".name:BenchmarkEncode /size:64",
//! ]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Record`] — One benchmark result: file configuration, name, measurements
//! - [`Filter`] — Compiled query; yields a per-measurement [`Match`]
//! - [`ProjectionParser`] — Parses projection expressions into [`Schema`]s
//! - [`Schema`] — Projects records into canonical [`Row`]s and orders them
//! - [`ConfigSet`] — Hash-consed store of key/value leaves and tuples
//! - [`Pipeline`] — Filter, project and group a stream of records
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`config`] — `ConfigSet`, `Config` handles, observation order and header trees
//! - [`schema`] — Growable schemas, rows and sort orders
//! - [`projection`] — The projection expression language
//! - [`kvql`] — The query language tokenizer, parser and AST
//! - [`filter`] — Query evaluation against records
//! - [`extract`] — Key extractors over records
//! - [`header`] — Compact headers over sorted rows
//! - [`units`] — Unit classification and normalization
//! - [`pipeline`] — The end-to-end processing pipeline
//! - [`record`] — The record model
//! - [`intern`] — String interning shared by configs and schemas
//! - [`error`] — Error types

pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod header;
pub mod intern;
pub mod kvql;
pub mod pipeline;
pub mod projection;
pub mod record;
pub mod schema;
pub mod units;

// Re-export primary API types at crate root for convenience.
pub use config::{Config, ConfigSet, ConfigTracker, ConfigTree};
pub use error::{BenchprocError, ExtractorError, PipelineError, Result, SyntaxError};
pub use filter::{Filter, Match};
pub use kvql::Query;
pub use pipeline::{Pipeline, PipelineConfig};
pub use projection::ProjectionParser;
pub use record::Record;
pub use schema::{Field, Order, Row, Schema};
