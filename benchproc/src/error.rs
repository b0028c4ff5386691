//! Error types for the benchproc projection and filtering engine.

use thiserror::Error;

/// The main error type for all benchproc operations.
///
/// Every variant originates from user-supplied text (a query, a projection
/// or a pipeline configuration). Misuse of the API itself, such as mixing
/// handles from different stores, panics instead.
#[derive(Error, Debug)]
pub enum BenchprocError {
    /// A query or projection expression could not be parsed.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// A key could not be turned into an extractor.
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractorError),

    /// A pipeline configuration was rejected.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// A malformed query or projection string.
///
/// Both the `kvql` query language and the projection language report
/// errors with this type. The offset is a byte offset into `query`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error: {message}\n\t{query}\n\t{}^", caret_padding(.query, .offset))]
pub struct SyntaxError {
    /// The complete string that failed to parse.
    pub query: String,
    /// Byte offset of the error in `query`.
    pub offset: usize,
    /// Human-readable description of the problem.
    pub message: String,
}

impl SyntaxError {
    /// Creates a new syntax error.
    pub fn new(query: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            offset,
            message: message.into(),
        }
    }
}

/// Spaces that place a caret under the character at byte `offset`.
///
/// Only graphic characters advance the caret, so control characters in
/// the query do not shift it.
fn caret_padding(query: &str, offset: &usize) -> String {
    let width = query
        .char_indices()
        .take_while(|(i, _)| i < offset)
        .filter(|(_, c)| !c.is_control())
        .count();
    " ".repeat(width)
}

/// Errors that can occur when constructing a key extractor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractorError {
    /// The key was empty.
    #[error("key must not be empty")]
    EmptyKey,

    /// The key starts with `.` but is not a known special key.
    #[error("unknown special key: {key}")]
    UnknownSpecialKey {
        /// The unrecognized key.
        key: String,
    },

    /// The key is neither a special key, a name key nor a valid file key.
    #[error("expected .name, .fullname, /key, or file key: {key}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },
}

/// Errors that can occur when building a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The filter query failed to parse or compile.
    #[error("invalid filter: {source}")]
    Filter {
        /// The underlying syntax error.
        #[source]
        source: SyntaxError,
    },

    /// One of the projections failed to parse.
    #[error("invalid {setting} projection: {source}")]
    Projection {
        /// Which setting held the projection (`group_by` or `columns`).
        setting: &'static str,
        /// The underlying syntax error.
        #[source]
        source: SyntaxError,
    },

    /// The column projection already names `.unit`.
    #[error("columns must not project .unit; it is added automatically")]
    DuplicateUnit,

    /// The group projection names `.unit`, which never varies per record.
    #[error("group_by must not project .unit; measurements are split by columns")]
    UnitInGroups,
}

/// Type alias for `Result<T, BenchprocError>`.
pub type Result<T> = std::result::Result<T, BenchprocError>;
