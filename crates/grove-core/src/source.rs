//! Table sources and the resolvers that load them

use crate::error::Result;
use crate::parser::{parse_csv_with, ReadOptions};
use crate::table::Table;
use std::path::{Path, PathBuf};

/// Where a collection entry gets its table from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// An already materialized table
    Table(Table),
    /// A file loaded on first access
    Path(PathBuf),
}

impl From<Table> for Source {
    fn from(table: Table) -> Self {
        Source::Table(table)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

/// Turns a file locator into a table
pub trait SourceResolver {
    fn resolve(&self, path: &Path) -> Result<Table>;
}

/// Default resolver: delimited text files
#[derive(Debug, Clone, Default)]
pub struct CsvResolver {
    pub options: ReadOptions,
}

impl CsvResolver {
    pub fn new(options: ReadOptions) -> Self {
        Self { options }
    }
}

impl SourceResolver for CsvResolver {
    fn resolve(&self, path: &Path) -> Result<Table> {
        parse_csv_with(path, &self.options)
    }
}

impl<F> SourceResolver for F
where
    F: Fn(&Path) -> Result<Table>,
{
    fn resolve(&self, path: &Path) -> Result<Table> {
        self(path)
    }
}
