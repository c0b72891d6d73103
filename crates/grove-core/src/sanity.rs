//! Structural sanity checks for a single table
//!
//! Only malformed requests (unknown columns) are errors. Duplicate keys and
//! nulls are findings in the returned report.

use crate::error::{Error, Result};
use crate::table::{CellValue, KeyValue, Table};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A data-quality finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Violation {
    /// Several rows share one composite key
    DuplicateKey {
        /// The shared key values, in key column order
        key: Vec<CellValue>,
        /// Every row carrying this key
        rows: Vec<usize>,
    },
    /// A column required to be complete has nulls
    NullValues { column: String, rows: Vec<usize> },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateKey { key, rows } => {
                let key: Vec<String> = key.iter().map(|v| v.to_string()).collect();
                write!(f, "duplicate key ({}) in rows {:?}", key.join(", "), rows)
            }
            Violation::NullValues { column, rows } => {
                write!(f, "{} null value(s) in column '{}'", rows.len(), column)
            }
        }
    }
}

/// Outcome of a sanity check
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SanityReport {
    pub violations: Vec<Violation>,
}

impl SanityReport {
    /// True when no violation was found
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for SanityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return writeln!(f, "OK");
        }
        for violation in &self.violations {
            writeln!(f, "- {}", violation)?;
        }
        Ok(())
    }
}

/// Check key uniqueness and completeness of a table
///
/// `key_columns` together form one composite key that must be unique across
/// all rows; nulls in a key compare equal to each other. Every column in
/// `non_null_columns` must be free of nulls. Either list may be empty.
pub fn check(table: &Table, key_columns: &[&str], non_null_columns: &[&str]) -> Result<SanityReport> {
    let key_columns = dedup(key_columns);
    let non_null_columns = dedup(non_null_columns);

    let requested: Vec<&str> = key_columns.iter().chain(&non_null_columns).copied().collect();
    let missing: Vec<String> = dedup(&requested)
        .into_iter()
        .filter(|name| !table.has_column(name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(Error::Schema { columns: missing });
    }

    let mut report = SanityReport::default();
    if !key_columns.is_empty() {
        report.violations.extend(duplicate_keys(table, &key_columns));
    }
    for name in non_null_columns {
        let Some(column) = table.find_column(name) else {
            continue;
        };
        let rows: Vec<usize> = (0..column.len()).filter(|&row| column.data.is_null(row)).collect();
        if !rows.is_empty() {
            report.violations.push(Violation::NullValues {
                column: name.to_string(),
                rows,
            });
        }
    }

    debug!(
        rows = table.row_count(),
        violations = report.violations.len(),
        "sanity check finished"
    );
    Ok(report)
}

/// Require every column of the table to be free of nulls
pub fn check_table(table: &Table) -> SanityReport {
    let columns = table.column_names();
    check(table, &[], &columns).unwrap_or_default()
}

fn duplicate_keys(table: &Table, key_columns: &[&str]) -> Vec<Violation> {
    let columns: Vec<_> = key_columns
        .iter()
        .filter_map(|name| table.find_column(name))
        .collect();

    // Groups in order of first appearance
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of: HashMap<Vec<KeyValue>, usize> = HashMap::new();
    for row in 0..table.row_count() {
        let key: Vec<KeyValue> = columns
            .iter()
            .map(|c| c.data.get(row).map_or(KeyValue::Null, |v| v.key()))
            .collect();
        match group_of.get(&key) {
            Some(&group) => groups[group].push(row),
            None => {
                group_of.insert(key, groups.len());
                groups.push(vec![row]);
            }
        }
    }

    groups
        .into_iter()
        .filter(|rows| rows.len() > 1)
        .map(|rows| Violation::DuplicateKey {
            key: columns
                .iter()
                .map(|c| c.data.get(rows[0]).unwrap_or(CellValue::Empty))
                .collect(),
            rows,
        })
        .collect()
}

fn dedup<'a>(names: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(name) {
            out.push(*name);
        }
    }
    out
}
