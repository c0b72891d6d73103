//! Error types for grove-core

use crate::table::DType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in grove-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse delimited text
    #[error("failed to parse '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// One or more names are not registered in the collection
    #[error("table(s) not in collection: {names:?}")]
    NotFound { names: Vec<String> },

    /// The join-key specification does not fit the tables being merged
    #[error("invalid merge specification: {0}")]
    MergeSpec(#[from] MergeSpecError),

    /// A sanity check referenced columns the table does not have
    #[error("column(s) not in table: {columns:?}")]
    Schema { columns: Vec<String> },

    /// Columns of a table disagree on the row count
    #[error("column '{column}' has {found} rows, expected {expected}")]
    ShapeMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Two columns of a table share a name
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// A cast would change at least one value
    #[error("cannot cast {from:?} to {to:?} without loss (row {row})")]
    LossyCast { from: DType, to: DType, row: usize },

    /// Unknown join kind name
    #[error("unsupported join kind '{0}' (expected inner, left, right or outer)")]
    UnsupportedJoinKind(String),

    /// Attribute-style registration under an operation name
    #[error("'{0}' is a reserved collection operation and cannot be set as an attribute")]
    ReservedName(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ways a multi-merge request can be malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeSpecError {
    /// Nothing to merge
    #[error("at least one table is required")]
    NoTables,

    /// The number of join keys does not match the number of merge steps
    #[error("{found} join key specification(s) given for {expected} merge step(s)")]
    StepCountMismatch { expected: usize, found: usize },

    /// Composite key lists of different lengths
    #[error("step {step}: {left} left key column(s) but {right} right key column(s)")]
    KeyArity {
        step: usize,
        left: usize,
        right: usize,
    },

    /// A key with no columns
    #[error("step {step}: join key has no columns")]
    EmptyKey { step: usize },

    /// A right-side key column is missing from the table being joined in
    #[error("column '{column}' not present in table {table}")]
    MissingColumn { column: String, table: usize },

    /// A left-side key column is missing from the tables merged so far
    #[error("column '{column}' not present in tables 0..{table} merged so far")]
    MissingLeftColumn { column: String, table: usize },

    /// Default keys requested but the two sides share no column
    #[error("step {step}: no common columns to join on")]
    NoCommonColumns { step: usize },
}
