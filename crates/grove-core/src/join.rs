//! Two-table relational hash join
//!
//! Row order: inner, left and outer joins follow the left table, with the
//! matching right rows in right-table order. Outer joins then append the
//! unmatched right rows. Right joins follow the right table. Null keys never
//! match.

use crate::error::{Error, MergeSpecError, Result};
use crate::table::{CellValue, Column, ColumnData, KeyValue, Table};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Relational join kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl JoinKind {
    pub fn name(self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Outer => "outer",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JoinKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinKind::Inner),
            "left" => Ok(JoinKind::Left),
            "right" => Ok(JoinKind::Right),
            "outer" | "full" => Ok(JoinKind::Outer),
            _ => Err(Error::UnsupportedJoinKind(s.to_string())),
        }
    }
}

/// Key columns of one join, matched pairwise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKeys {
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
}

impl JoinKeys {
    pub fn new<L, R>(left_on: L, right_on: R) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            left_on: left_on.into_iter().map(Into::into).collect(),
            right_on: right_on.into_iter().map(Into::into).collect(),
        }
    }

    /// Same column names on both sides
    pub fn on<I>(columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        Self {
            left_on: columns.clone(),
            right_on: columns,
        }
    }

    /// Key pairs with the same name on both sides; these come out as one column
    fn shared(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.left_on
            .iter()
            .zip(&self.right_on)
            .enumerate()
            .filter(|(_, (l, r))| l == r)
            .map(|(i, (l, _))| (i, l.as_str()))
    }
}

/// Join two tables, suffixing clashing column names with `_x` / `_y`
pub fn join(left: &Table, right: &Table, keys: &JoinKeys, how: JoinKind) -> Result<Table> {
    join_with_suffixes(left, right, keys, how, ("_x", "_y"))
}

/// Join two tables with explicit suffixes for clashing column names
pub fn join_with_suffixes(
    left: &Table,
    right: &Table,
    keys: &JoinKeys,
    how: JoinKind,
    suffixes: (&str, &str),
) -> Result<Table> {
    if keys.left_on.is_empty() || keys.right_on.is_empty() {
        return Err(MergeSpecError::EmptyKey { step: 1 }.into());
    }
    if keys.left_on.len() != keys.right_on.len() {
        return Err(MergeSpecError::KeyArity {
            step: 1,
            left: keys.left_on.len(),
            right: keys.right_on.len(),
        }
        .into());
    }
    let left_keys = key_indices(left, &keys.left_on, 0)?;
    let right_keys = key_indices(right, &keys.right_on, 1)?;

    let (left_positions, right_positions) = match how {
        JoinKind::Right => {
            let (r, l) = match_rows(right, &right_keys, left, &left_keys, true, false);
            (l, r)
        }
        JoinKind::Inner => match_rows(left, &left_keys, right, &right_keys, false, false),
        JoinKind::Left => match_rows(left, &left_keys, right, &right_keys, true, false),
        JoinKind::Outer => match_rows(left, &left_keys, right, &right_keys, true, true),
    };

    let shared: Vec<(usize, &str)> = keys.shared().collect();
    let coalesced_right: HashSet<&str> = shared.iter().map(|(_, name)| *name).collect();
    let right_names: HashSet<&str> = right
        .columns()
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| !coalesced_right.contains(name))
        .collect();
    let clashing: HashSet<&str> = left
        .columns()
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| right_names.contains(name))
        .collect();

    let mut columns = Vec::with_capacity(left.column_count() + right_names.len());
    for column in left.columns() {
        let name = column.name.as_str();
        let data = match shared.iter().find(|(_, key)| *key == name) {
            Some((k, _)) if matches!(how, JoinKind::Right | JoinKind::Outer) => {
                let right_column = &right.columns()[right_keys[*k]];
                coalesce(
                    &column.data.take(&left_positions),
                    &right_column.data.take(&right_positions),
                )?
            }
            _ => column.data.take(&left_positions),
        };
        let name = if clashing.contains(name) {
            format!("{}{}", name, suffixes.0)
        } else {
            name.to_string()
        };
        columns.push(Column::new(name, data));
    }
    for column in right.columns() {
        let name = column.name.as_str();
        if coalesced_right.contains(name) {
            continue;
        }
        let name = if clashing.contains(name) {
            format!("{}{}", name, suffixes.1)
        } else {
            name.to_string()
        };
        columns.push(Column::new(name, column.data.take(&right_positions)));
    }

    debug!(
        left_rows = left.row_count(),
        right_rows = right.row_count(),
        rows = left_positions.len(),
        how = %how,
        "joined tables"
    );
    Table::new(columns)
}

fn key_indices(table: &Table, names: &[String], table_index: usize) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                MergeSpecError::MissingColumn {
                    column: name.clone(),
                    table: table_index,
                }
                .into()
            })
        })
        .collect()
}

/// Composite key of one row; `None` if any part is null
fn row_key(table: &Table, key_columns: &[usize], row: usize) -> Option<Vec<KeyValue>> {
    key_columns
        .iter()
        .map(|&c| match table.columns()[c].data.get(row)?.key() {
            KeyValue::Null => None,
            key => Some(key),
        })
        .collect()
}

/// Match rows of `driver` against `probe`, in driver order
///
/// Returns gather positions for driver and probe. `keep_unmatched` keeps
/// driver rows without a match; `append_probe` appends probe rows that never
/// matched.
fn match_rows(
    driver: &Table,
    driver_keys: &[usize],
    probe: &Table,
    probe_keys: &[usize],
    keep_unmatched: bool,
    append_probe: bool,
) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    let mut probe_map: HashMap<Vec<KeyValue>, Vec<usize>> = HashMap::new();
    for row in 0..probe.row_count() {
        if let Some(key) = row_key(probe, probe_keys, row) {
            probe_map.entry(key).or_default().push(row);
        }
    }

    let mut driver_positions = Vec::new();
    let mut probe_positions = Vec::new();
    let mut probe_matched = vec![false; probe.row_count()];

    for row in 0..driver.row_count() {
        let matches = row_key(driver, driver_keys, row).and_then(|key| probe_map.get(&key));
        match matches {
            Some(matches) => {
                for &probe_row in matches {
                    driver_positions.push(Some(row));
                    probe_positions.push(Some(probe_row));
                    probe_matched[probe_row] = true;
                }
            }
            None if keep_unmatched => {
                driver_positions.push(Some(row));
                probe_positions.push(None);
            }
            None => {}
        }
    }

    if append_probe {
        for (row, matched) in probe_matched.iter().enumerate() {
            if !matched {
                driver_positions.push(None);
                probe_positions.push(Some(row));
            }
        }
    }

    (driver_positions, probe_positions)
}

/// Take `primary` where present, `fallback` elsewhere. Keeps the storage type
/// when both sides agree, otherwise infers one from the values.
fn coalesce(primary: &ColumnData, fallback: &ColumnData) -> Result<ColumnData> {
    let cells: Vec<CellValue> = primary
        .cells()
        .into_iter()
        .zip(fallback.cells())
        .map(|(p, f)| if p.is_empty() { f } else { p })
        .collect();
    let merged = ColumnData::from_cells(&cells);
    if primary.dtype() == fallback.dtype() {
        merged.cast(primary.dtype())
    } else {
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Table {
        Table::new(vec![
            Column::new("id", vec![1i64, 2, 3]),
            Column::new("description", vec!["apple", "pear", "fig"]),
        ])
        .unwrap()
    }

    fn prices() -> Table {
        Table::new(vec![
            Column::new("id", vec![3i64, 1, 1, 4]),
            Column::new("price", vec![30i64, 10, 11, 40]),
        ])
        .unwrap()
    }

    fn ids(table: &Table) -> Vec<CellValue> {
        table.find_column("id").unwrap().data.cells()
    }

    #[test]
    fn test_inner_join_follows_left_order() {
        let joined = join(&items(), &prices(), &JoinKeys::on(["id"]), JoinKind::Inner).unwrap();

        assert_eq!(joined.column_names(), vec!["id", "description", "price"]);
        assert_eq!(
            ids(&joined),
            vec![
                CellValue::Integer(1),
                CellValue::Integer(1),
                CellValue::Integer(3)
            ]
        );
        assert_eq!(
            joined.find_column("price").unwrap().data.cells(),
            vec![
                CellValue::Integer(10),
                CellValue::Integer(11),
                CellValue::Integer(30)
            ]
        );
    }

    #[test]
    fn test_left_join_keeps_unmatched_rows() {
        let joined = join(&items(), &prices(), &JoinKeys::on(["id"]), JoinKind::Left).unwrap();

        assert_eq!(joined.row_count(), 4);
        assert_eq!(joined.row(2).unwrap()[0], CellValue::Integer(2));
        assert_eq!(joined.row(2).unwrap()[2], CellValue::Empty);
    }

    #[test]
    fn test_right_join_follows_right_order_and_coalesces_keys() {
        let joined = join(&items(), &prices(), &JoinKeys::on(["id"]), JoinKind::Right).unwrap();

        assert_eq!(
            ids(&joined),
            vec![
                CellValue::Integer(3),
                CellValue::Integer(1),
                CellValue::Integer(1),
                CellValue::Integer(4)
            ]
        );
        assert_eq!(joined.row(3).unwrap()[1], CellValue::Empty);
        assert_eq!(joined.find_column("id").unwrap().dtype(), crate::DType::Int64);
    }

    #[test]
    fn test_outer_join_appends_unmatched_right_rows() {
        let joined = join(&items(), &prices(), &JoinKeys::on(["id"]), JoinKind::Outer).unwrap();

        assert_eq!(joined.row_count(), 5);
        assert_eq!(
            joined.row(4).unwrap(),
            vec![
                CellValue::Integer(4),
                CellValue::Empty,
                CellValue::Integer(40)
            ]
        );
    }

    #[test]
    fn test_differently_named_keys_keep_both_columns() {
        let mut right = prices();
        right.rename_column("id", "item_id").unwrap();

        let keys = JoinKeys::new(["id"], ["item_id"]);
        let joined = join(&items(), &right, &keys, JoinKind::Inner).unwrap();
        assert_eq!(
            joined.column_names(),
            vec!["id", "description", "item_id", "price"]
        );
    }

    #[test]
    fn test_clashing_columns_get_suffixes() {
        let left = Table::new(vec![
            Column::new("id", vec![1i64]),
            Column::new("value", vec![1i64]),
        ])
        .unwrap();
        let right = Table::new(vec![
            Column::new("id", vec![1i64]),
            Column::new("value", vec![2i64]),
        ])
        .unwrap();

        let joined = join(&left, &right, &JoinKeys::on(["id"]), JoinKind::Inner).unwrap();
        assert_eq!(joined.column_names(), vec!["id", "value_x", "value_y"]);
    }

    #[test]
    fn test_null_keys_never_match() {
        let left = Table::new(vec![Column::new("id", vec![Some(1i64), None])]).unwrap();
        let right = Table::new(vec![
            Column::new("id", vec![None, Some(1i64)]),
            Column::new("v", vec!["null", "one"]),
        ])
        .unwrap();

        let joined = join(&left, &right, &JoinKeys::on(["id"]), JoinKind::Inner).unwrap();
        assert_eq!(joined.row_count(), 1);
        assert_eq!(joined.row(0).unwrap()[1], CellValue::String("one".to_string()));
    }

    #[test]
    fn test_integer_and_float_keys_match() {
        let left = Table::new(vec![Column::new("id", vec![1i64, 2])]).unwrap();
        let right = Table::new(vec![
            Column::new("id", vec![2.0, 2.5]),
            Column::new("v", vec!["two", "two and a half"]),
        ])
        .unwrap();

        let joined = join(&left, &right, &JoinKeys::on(["id"]), JoinKind::Inner).unwrap();
        assert_eq!(joined.row_count(), 1);
    }

    #[test]
    fn test_composite_keys() {
        let left = Table::new(vec![
            Column::new("a", vec![1i64, 1, 2]),
            Column::new("b", vec!["x", "y", "x"]),
        ])
        .unwrap();
        let right = Table::new(vec![
            Column::new("a", vec![1i64, 2]),
            Column::new("b", vec!["y", "y"]),
            Column::new("hit", vec![true, true]),
        ])
        .unwrap();

        let joined = join(&left, &right, &JoinKeys::on(["a", "b"]), JoinKind::Inner).unwrap();
        assert_eq!(joined.row_count(), 1);
        assert_eq!(joined.column_names(), vec!["a", "b", "hit"]);
    }

    #[test]
    fn test_missing_key_column() {
        let err = join(&items(), &prices(), &JoinKeys::new(["id"], ["nope"]), JoinKind::Inner)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MergeSpec(MergeSpecError::MissingColumn { table: 1, .. })
        ));
    }

    #[test]
    fn test_join_kind_from_str() {
        assert_eq!("inner".parse::<JoinKind>().unwrap(), JoinKind::Inner);
        assert_eq!("LEFT".parse::<JoinKind>().unwrap(), JoinKind::Left);
        assert_eq!("full".parse::<JoinKind>().unwrap(), JoinKind::Outer);
        assert!(matches!(
            "cross".parse::<JoinKind>(),
            Err(Error::UnsupportedJoinKind(_))
        ));
    }
}
