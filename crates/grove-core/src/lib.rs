//! grove-core: named collections of tables with chained multi-table merges
//!
//! This library provides functionality to:
//! - Register tables by name, from memory or from delimited text files loaded lazily
//! - Merge several tables in one call, step by step on per-step join keys
//! - Check key uniqueness and completeness of a table
//! - Narrow numeric columns to the smallest exact storage type
//! - Persist name -> path manifests and build them by scanning directories

pub mod collection;
pub mod error;
pub mod join;
pub mod manifest;
pub mod merge;
pub mod parser;
pub mod reduce;
pub mod sanity;
pub mod scanner;
pub mod source;
pub mod table;

pub use collection::{Attr, Collection, CollectionInfo, ColumnInfo, Operation, TableInfo, DEFAULT_HEAD_ROWS};
pub use error::{Error, MergeSpecError, Result};
pub use join::{join, join_with_suffixes, JoinKeys, JoinKind};
pub use manifest::Manifest;
pub use merge::{merge, JoinOn, MergeOn};
pub use parser::{parse_csv, parse_csv_str, parse_csv_with, ReadOptions};
pub use reduce::{reduce_column, reduce_table, reduce_table_in_place, smallest_integer_dtype};
pub use sanity::{check, check_table, SanityReport, Violation};
pub use scanner::scan_directory;
pub use source::{CsvResolver, Source, SourceResolver};
pub use table::{CellValue, Column, ColumnData, DType, Table};
