//! Named collection of tables with lazy loading
//!
//! Entries are registered either as tables or as file paths. A path-backed
//! entry is read the first time anything asks for it and cached from then on.

use crate::error::{Error, Result};
use crate::join::JoinKind;
use crate::manifest::Manifest;
use crate::merge::{self, MergeOn};
use crate::reduce::reduce_table_in_place;
use crate::sanity::{self, SanityReport};
use crate::source::{CsvResolver, Source, SourceResolver};
use crate::table::{DType, Table};
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rows shown per table by [`Collection::head`] when callers have no preference
pub const DEFAULT_HEAD_ROWS: usize = 5;

const MIB: f64 = 1024.0 * 1024.0;

enum Entry {
    Loaded(Table),
    Lazy { path: PathBuf, table: OnceCell<Table> },
}

impl Entry {
    fn table_mut(&mut self) -> Option<&mut Table> {
        match self {
            Entry::Loaded(table) => Some(table),
            Entry::Lazy { table, .. } => table.get_mut(),
        }
    }

    fn is_resolved(&self) -> bool {
        match self {
            Entry::Loaded(_) => true,
            Entry::Lazy { table, .. } => table.get().is_some(),
        }
    }
}

impl From<Source> for Entry {
    fn from(source: Source) -> Self {
        match source {
            Source::Table(table) => Entry::Loaded(table),
            Source::Path(path) => Entry::Lazy {
                path,
                table: OnceCell::new(),
            },
        }
    }
}

/// The collection's own operations
///
/// These names win over table names for attribute-style access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Names,
    Contains,
    Len,
    IsEmpty,
    Get,
    GetMany,
    Set,
    Attr,
    SetAttr,
    Merge,
    Info,
    Head,
    Check,
    Reduce,
    ReduceAll,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::Names,
        Operation::Contains,
        Operation::Len,
        Operation::IsEmpty,
        Operation::Get,
        Operation::GetMany,
        Operation::Set,
        Operation::Attr,
        Operation::SetAttr,
        Operation::Merge,
        Operation::Info,
        Operation::Head,
        Operation::Check,
        Operation::Reduce,
        Operation::ReduceAll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Names => "names",
            Operation::Contains => "contains",
            Operation::Len => "len",
            Operation::IsEmpty => "is_empty",
            Operation::Get => "get",
            Operation::GetMany => "get_many",
            Operation::Set => "set",
            Operation::Attr => "attr",
            Operation::SetAttr => "set_attr",
            Operation::Merge => "merge",
            Operation::Info => "info",
            Operation::Head => "head",
            Operation::Check => "check",
            Operation::Reduce => "reduce",
            Operation::ReduceAll => "reduce_all",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of attribute-style lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attr<'a> {
    Operation(Operation),
    Table(&'a Table),
}

/// Named tables, loaded on demand
pub struct Collection {
    entries: BTreeMap<String, Entry>,
    resolver: Box<dyn SourceResolver>,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    /// An empty collection reading files with [`CsvResolver`]
    pub fn new() -> Self {
        Self::with_resolver(CsvResolver::default())
    }

    /// An empty collection reading files with a custom resolver
    pub fn with_resolver(resolver: impl SourceResolver + 'static) -> Self {
        Self {
            entries: BTreeMap::new(),
            resolver: Box::new(resolver),
        }
    }

    /// Register every `(name, source)` pair; nothing is read yet
    pub fn from_sources<I, N, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<Source>,
    {
        let mut collection = Self::new();
        collection.extend(sources);
        collection
    }

    /// Lazy collection over the files of a manifest
    pub fn from_manifest(manifest: Manifest) -> Self {
        Self::from_sources(manifest)
    }

    /// Register or replace an entry
    ///
    /// Path-backed sources are not checked until the entry is first accessed.
    pub fn set(&mut self, name: impl Into<String>, source: impl Into<Source>) {
        self.entries.insert(name.into(), Entry::from(source.into()));
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Table registered under `name`, loading it on first access
    pub fn get(&self, name: &str) -> Result<&Table> {
        let entry = self.entries.get(name).ok_or_else(|| Error::NotFound {
            names: vec![name.to_string()],
        })?;
        self.resolve(name, entry)
    }

    /// Tables for several names, in the order given
    ///
    /// Fails with every missing name before loading anything.
    pub fn get_many(&self, names: &[&str]) -> Result<Vec<&Table>> {
        let mut missing: Vec<String> = Vec::new();
        for name in names {
            if !self.contains(name) && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(Error::NotFound { names: missing });
        }
        names.iter().map(|name| self.get(name)).collect()
    }

    /// Attribute-style lookup: operation names first, then tables
    pub fn attr(&self, name: &str) -> Result<Attr<'_>> {
        match Operation::from_name(name) {
            Some(op) => Ok(Attr::Operation(op)),
            None => self.get(name).map(Attr::Table),
        }
    }

    /// Attribute-style registration; operation names are refused
    pub fn set_attr(&mut self, name: &str, source: impl Into<Source>) -> Result<()> {
        if Operation::from_name(name).is_some() {
            return Err(Error::ReservedName(name.to_string()));
        }
        self.set(name, source);
        Ok(())
    }

    /// Merge the named tables in order, see [`merge::merge`]
    pub fn merge(&self, names: &[&str], on: impl Into<MergeOn>, how: JoinKind) -> Result<Table> {
        let tables = self.get_many(names)?;
        merge::merge(&tables, on, how)
    }

    /// Size summary of every table; loads all entries
    pub fn info(&self) -> Result<CollectionInfo> {
        let tables = self
            .entries
            .iter()
            .map(|(name, entry)| -> Result<TableInfo> {
                Ok(TableInfo::new(name, self.resolve(name, entry)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let total_memory_bytes = tables.iter().map(|t| t.memory_bytes).sum();
        Ok(CollectionInfo {
            tables,
            total_memory_bytes,
        })
    }

    /// The first `n` rows of every table
    pub fn head(&self, n: usize) -> Result<Vec<(&str, Table)>> {
        self.entries
            .iter()
            .map(|(name, entry)| -> Result<(&str, Table)> {
                Ok((name.as_str(), self.resolve(name, entry)?.head(n)))
            })
            .collect()
    }

    /// Sanity-check one table, see [`sanity::check`]
    pub fn check(&self, name: &str, key_columns: &[&str], non_null_columns: &[&str]) -> Result<SanityReport> {
        sanity::check(self.get(name)?, key_columns, non_null_columns)
    }

    /// Narrow one table's numeric storage in place
    pub fn reduce(&mut self, name: &str) -> Result<()> {
        self.get(name)?;
        if let Some(table) = self.entries.get_mut(name).and_then(Entry::table_mut) {
            reduce_table_in_place(table);
        }
        Ok(())
    }

    /// [`Collection::reduce`] for every table
    pub fn reduce_all(&mut self) -> Result<()> {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in names {
            self.reduce(&name)?;
        }
        Ok(())
    }

    fn resolve<'a>(&'a self, name: &str, entry: &'a Entry) -> Result<&'a Table> {
        match entry {
            Entry::Loaded(table) => Ok(table),
            Entry::Lazy { path, table } => {
                if let Some(table) = table.get() {
                    return Ok(table);
                }
                let loaded = self.load(name, path)?;
                Ok(table.get_or_init(|| loaded))
            }
        }
    }

    fn load(&self, name: &str, path: &Path) -> Result<Table> {
        let table = self.resolver.resolve(path)?;
        debug!(
            name,
            path = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "resolved table"
        );
        Ok(table)
    }
}

impl<N, S> Extend<(N, S)> for Collection
where
    N: Into<String>,
    S: Into<Source>,
{
    fn extend<I: IntoIterator<Item = (N, S)>>(&mut self, iter: I) {
        for (name, source) in iter {
            self.set(name, source);
        }
    }
}

impl<N, S> FromIterator<(N, S)> for Collection
where
    N: Into<String>,
    S: Into<Source>,
{
    fn from_iter<I: IntoIterator<Item = (N, S)>>(iter: I) -> Self {
        Self::from_sources(iter)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(name, entry)| (name, if entry.is_resolved() { "loaded" } else { "lazy" })),
            )
            .finish()
    }
}

/// Lists each table with its column and row count, loading lazy entries
impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Collection is empty");
        }
        for (name, entry) in &self.entries {
            writeln!(f, "{}", name)?;
            writeln!(f, "{}", "=".repeat(name.chars().count().max(8)))?;
            match self.resolve(name, entry) {
                Ok(table) => {
                    writeln!(f, "* cols: {}", table.column_count())?;
                    writeln!(f, "* rows: {}", table.row_count())?;
                }
                Err(e) => writeln!(f, "* error: {}", e)?,
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// One column of [`TableInfo`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: DType,
    pub non_null: usize,
}

/// Shape and estimated footprint of one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub memory_bytes: usize,
    pub schema: Vec<ColumnInfo>,
}

impl TableInfo {
    fn new(name: &str, table: &Table) -> Self {
        Self {
            name: name.to_string(),
            rows: table.row_count(),
            columns: table.column_count(),
            memory_bytes: table.memory_usage(),
            schema: table
                .columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    dtype: c.dtype(),
                    non_null: c.len() - c.data.null_count(),
                })
                .collect(),
        }
    }
}

/// Output of [`Collection::info`]
///
/// `{}` prints the table list and memory usage; `{:#}` adds every table's
/// columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub tables: Vec<TableInfo>,
    pub total_memory_bytes: usize,
}

impl fmt::Display for CollectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
        writeln!(f, "Contents: {} tables", self.tables.len())?;
        writeln!(f, "{:?}", names)?;
        writeln!(f)?;
        writeln!(f, "Memory usage")?;
        writeln!(f, "============")?;

        let width = names
            .iter()
            .map(|n| n.chars().count())
            .chain(["Table".len(), "TOTAL".len()])
            .max()
            .unwrap_or(5);
        writeln!(f, "{:>width$}  {:>10}", "Table", "MiB")?;
        for table in &self.tables {
            writeln!(f, "{:>width$}  {:>10.6}", table.name, table.memory_bytes as f64 / MIB)?;
        }
        writeln!(f, "{:>width$}  {:>10.6}", "TOTAL", self.total_memory_bytes as f64 / MIB)?;

        if f.alternate() {
            for table in &self.tables {
                writeln!(f)?;
                writeln!(f, "{}", table.name)?;
                writeln!(f, "{}", "=".repeat(table.name.chars().count().max(8)))?;
                writeln!(f, "{} rows, {} columns", table.rows, table.columns)?;
                for column in &table.schema {
                    writeln!(
                        f,
                        "  {:<20} {:<8} {} non-null",
                        column.name, column.dtype, column.non_null
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn items() -> Table {
        Table::new(vec![
            Column::new("id", vec![1i64, 2, 3]),
            Column::new("description", vec!["bolt", "nut", "gear"]),
        ])
        .unwrap()
    }

    fn categories() -> Table {
        Table::new(vec![
            Column::new("id", vec![1i64, 3, 4]),
            Column::new("category", vec!["metal", "metal", "wood"]),
        ])
        .unwrap()
    }

    fn counting_collection() -> (Collection, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let collection = Collection::with_resolver(move |path: &Path| {
            counter.set(counter.get() + 1);
            match path.to_str() {
                Some("items.csv") => Ok(items()),
                Some("categories.csv") => Ok(categories()),
                _ => Err(Error::FileRead {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
            }
        });
        (collection, calls)
    }

    #[test]
    fn test_names() {
        let collection = Collection::from_sources([("b", items()), ("a", categories()), ("c", items())]);
        assert_eq!(collection.names(), vec!["a", "b", "c"]);
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_resolves_once_and_lazily() {
        let (mut collection, calls) = counting_collection();
        collection.set("items", "items.csv");
        collection.set("categories", "categories.csv");
        assert_eq!(calls.get(), 0);

        let first = collection.get("items").unwrap().clone();
        let second = collection.get("items").unwrap();
        assert_eq!(&first, second);
        assert_eq!(calls.get(), 1);

        collection.get_many(&["items", "categories", "items"]).unwrap();
        collection.info().unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_get_many_matches_get() {
        let collection = Collection::from_sources([("items", items()), ("categories", categories())]);
        let many = collection.get_many(&["categories", "items"]).unwrap();
        assert_eq!(
            many,
            vec![
                collection.get("categories").unwrap(),
                collection.get("items").unwrap()
            ]
        );
    }

    #[test]
    fn test_missing_names() {
        let collection = Collection::from_sources([("items", items())]);
        assert!(matches!(
            collection.get("nope"),
            Err(Error::NotFound { names }) if names == vec!["nope"]
        ));

        collection.get("items").unwrap();
        assert!(collection.get("nope").is_err());

        let err = collection.get_many(&["x", "items", "y", "x"]).unwrap_err();
        match err {
            Error::NotFound { names } => assert_eq!(names, vec!["x", "y"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failed_resolution_is_reported() {
        let (mut collection, _) = counting_collection();
        collection.set("broken", "missing.csv");
        assert!(matches!(collection.get("broken"), Err(Error::FileRead { .. })));
    }

    #[test]
    fn test_operations_shadow_tables_for_attr() {
        let mut collection = Collection::new();
        collection.set("merge", items());
        collection.set("items", items());

        assert_eq!(collection.attr("merge").unwrap(), Attr::Operation(Operation::Merge));
        assert_eq!(collection.get("merge").unwrap(), &items());
        assert_eq!(collection.attr("items").unwrap(), Attr::Table(&items()));
        assert!(collection.attr("nope").is_err());

        for name in ["len", "contains", "is_empty"] {
            collection.set(name, items());
            assert!(matches!(collection.attr(name).unwrap(), Attr::Operation(_)), "{name}");
        }
        assert_eq!(collection.attr("is_empty").unwrap(), Attr::Operation(Operation::IsEmpty));
    }

    #[test]
    fn test_set_attr() {
        let mut collection = Collection::new();
        collection.set_attr("items", items()).unwrap();
        assert!(collection.contains("items"));
        assert!(matches!(
            collection.set_attr("info", items()),
            Err(Error::ReservedName(name)) if name == "info"
        ));
        assert!(!collection.contains("info"));
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()), Some(op));
        }
        assert_eq!(Operation::from_name("items"), None);
    }

    #[test]
    fn test_merge_by_name() {
        let collection = Collection::from_sources([("items", items()), ("categories", categories())]);
        let merged = collection.merge(&["items", "categories"], "id", JoinKind::Inner).unwrap();
        assert_eq!(merged.column_names(), vec!["id", "description", "category"]);
        assert_eq!(merged.row_count(), 2);

        assert!(matches!(
            collection.merge(&["items", "nope"], "id", JoinKind::Inner),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Collection::new().to_string(), "Collection is empty");

        let collection = Collection::from_sources([("items", items())]);
        assert_eq!(collection.to_string(), "items\n========\n* cols: 2\n* rows: 3\n\n");
    }

    #[test]
    fn test_info() {
        let collection = Collection::from_sources([("items", items()), ("categories", categories())]);
        let info = collection.info().unwrap();
        assert_eq!(info.tables.len(), 2);
        assert_eq!(info.tables[0].name, "categories");
        assert_eq!(info.tables[1].rows, 3);
        assert_eq!(
            info.total_memory_bytes,
            items().memory_usage() + categories().memory_usage()
        );

        let text = info.to_string();
        assert!(text.starts_with("Contents: 2 tables\n[\"categories\", \"items\"]\n"));
        assert!(text.contains("TOTAL"));
        assert!(!text.contains("non-null"));
        assert!(format!("{:#}", info).contains("description          utf8     3 non-null"));
    }

    #[test]
    fn test_info_of_empty_collection() {
        let info = Collection::new().info().unwrap();
        assert!(info.tables.is_empty());
        assert_eq!(info.total_memory_bytes, 0);

        let text = info.to_string();
        assert!(text.starts_with("Contents: 0 tables\n[]\n"));
        assert!(text.contains("TOTAL"));
    }

    #[test]
    fn test_head() {
        let collection = Collection::from_sources([("items", items())]);
        let heads = collection.head(2).unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].0, "items");
        assert_eq!(heads[0].1.row_count(), 2);
        assert_eq!(collection.get("items").unwrap().row_count(), 3);
    }

    #[test]
    fn test_reduce_in_place() {
        let mut collection = Collection::from_sources([("items", items())]);
        collection.reduce("items").unwrap();
        assert_eq!(collection.get("items").unwrap().columns()[0].dtype(), DType::UInt8);
        assert!(collection.reduce("nope").is_err());
    }

    #[test]
    fn test_csv_files_load_lazily() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.csv");

        let mut collection = Collection::new();
        collection.set("items", path.as_path());
        fs::write(&path, "id,description\n1,bolt\n2,nut\n").unwrap();

        let table = collection.get("items").unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.columns()[0].dtype(), DType::Int64);

        collection.reduce_all().unwrap();
        assert_eq!(collection.get("items").unwrap().columns()[0].dtype(), DType::UInt8);
    }
}
