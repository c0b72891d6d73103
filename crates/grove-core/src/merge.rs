//! Chained multi-table merge
//!
//! Tables are folded left to right: the accumulator starts as the first table
//! and each following table is joined into it. Left-side key names resolve
//! against everything merged so far, right-side names against the table being
//! joined in.

use crate::error::{MergeSpecError, Result};
use crate::join::{join, JoinKeys, JoinKind};
use crate::table::Table;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// How one merge step matches rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOn {
    /// One column, same name on both sides
    Column(String),
    /// One column on each side, named differently
    Pair(String, String),
    /// Composite key: left columns matched pairwise with right columns
    Columns(Vec<String>, Vec<String>),
}

impl JoinOn {
    pub fn column(name: impl Into<String>) -> Self {
        JoinOn::Column(name.into())
    }

    pub fn pair(left: impl Into<String>, right: impl Into<String>) -> Self {
        JoinOn::Pair(left.into(), right.into())
    }

    /// Composite key with the same names on both sides
    pub fn columns<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        JoinOn::Columns(names.clone(), names)
    }

    pub fn composite<L, R>(left: L, right: R) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        JoinOn::Columns(
            left.into_iter().map(Into::into).collect(),
            right.into_iter().map(Into::into).collect(),
        )
    }

    fn to_keys(&self, step: usize) -> Result<JoinKeys> {
        let keys = match self {
            JoinOn::Column(name) => JoinKeys::on([name.clone()]),
            JoinOn::Pair(left, right) => JoinKeys::new([left.clone()], [right.clone()]),
            JoinOn::Columns(left, right) => {
                if left.is_empty() || right.is_empty() {
                    return Err(MergeSpecError::EmptyKey { step }.into());
                }
                if left.len() != right.len() {
                    return Err(MergeSpecError::KeyArity {
                        step,
                        left: left.len(),
                        right: right.len(),
                    }
                    .into());
                }
                JoinKeys::new(left.clone(), right.clone())
            }
        };
        Ok(keys)
    }
}

impl From<&str> for JoinOn {
    fn from(name: &str) -> Self {
        JoinOn::column(name)
    }
}

impl From<String> for JoinOn {
    fn from(name: String) -> Self {
        JoinOn::Column(name)
    }
}

impl From<(&str, &str)> for JoinOn {
    fn from((left, right): (&str, &str)) -> Self {
        JoinOn::pair(left, right)
    }
}

/// Join keys for a whole merge chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MergeOn {
    /// Every step joins on all column names both sides share
    #[default]
    Common,
    /// The same key at every step
    Each(JoinOn),
    /// One key per step; needs exactly `tables - 1` entries
    Steps(Vec<JoinOn>),
}

impl From<JoinOn> for MergeOn {
    fn from(on: JoinOn) -> Self {
        MergeOn::Each(on)
    }
}

impl From<&str> for MergeOn {
    fn from(name: &str) -> Self {
        MergeOn::Each(JoinOn::column(name))
    }
}

impl From<(&str, &str)> for MergeOn {
    fn from(pair: (&str, &str)) -> Self {
        MergeOn::Each(pair.into())
    }
}

impl From<Vec<JoinOn>> for MergeOn {
    fn from(steps: Vec<JoinOn>) -> Self {
        MergeOn::Steps(steps)
    }
}

impl<const N: usize> From<[JoinOn; N]> for MergeOn {
    fn from(steps: [JoinOn; N]) -> Self {
        MergeOn::Steps(steps.into())
    }
}

/// Merge an ordered list of tables into one
///
/// A single table comes back unchanged. Non-key column names carried by more
/// than one table are renamed `{name}_{table_index}` in each of them.
pub fn merge(tables: &[&Table], on: impl Into<MergeOn>, how: JoinKind) -> Result<Table> {
    let (first, rest) = tables.split_first().ok_or(MergeSpecError::NoTables)?;
    if rest.is_empty() {
        return Ok((*first).clone());
    }

    let plan = plan_steps(tables, &on.into())?;

    let mut acc: Table = (*first).clone();
    let mut origin: HashMap<String, usize> = first
        .column_names()
        .into_iter()
        .map(|name| (name.to_string(), 0))
        .collect();
    let mut suffixed: HashSet<String> = HashSet::new();

    for (step, keys) in plan.into_iter().enumerate() {
        let index = step + 1;
        let right = tables[index];
        let mut keys = match keys {
            Some(keys) => keys,
            None => common_keys(&acc, right, index)?,
        };

        for column in &keys.left_on {
            if !acc.has_column(column) {
                return Err(MergeSpecError::MissingLeftColumn {
                    column: column.clone(),
                    table: index,
                }
                .into());
            }
        }

        let coalesced: HashSet<String> = keys
            .left_on
            .iter()
            .zip(&keys.right_on)
            .filter(|(l, r)| l == r)
            .map(|(_, r)| r.clone())
            .collect();

        let mut right = Cow::Borrowed(right);
        let mut new_origin = Vec::new();
        for name in tables[index].column_names() {
            if coalesced.contains(name) {
                continue;
            }
            let renamed = if let Some(&from) = origin.get(name) {
                let left_name = format!("{}_{}", name, from);
                acc.rename_column(name, left_name.clone())?;
                rename_key(&mut keys.left_on, name, &left_name);
                origin.remove(name);
                origin.insert(left_name, from);
                suffixed.insert(name.to_string());
                Some(format!("{}_{}", name, index))
            } else if suffixed.contains(name) {
                Some(format!("{}_{}", name, index))
            } else {
                None
            };

            match renamed {
                Some(right_name) => {
                    right.to_mut().rename_column(name, right_name.clone())?;
                    rename_key(&mut keys.right_on, name, &right_name);
                    new_origin.push(right_name);
                }
                None => new_origin.push(name.to_string()),
            }
        }

        acc = join(&acc, &right, &keys, how)?;
        origin.extend(new_origin.into_iter().map(|name| (name, index)));

        debug!(
            step = index,
            left_on = ?keys.left_on,
            right_on = ?keys.right_on,
            how = %how,
            rows = acc.row_count(),
            "merged table into chain"
        );
    }

    Ok(acc)
}

/// Validate the key specification against the chain up front
///
/// `None` entries are resolved per step from the columns both sides share.
fn plan_steps(tables: &[&Table], on: &MergeOn) -> Result<Vec<Option<JoinKeys>>> {
    let steps = tables.len() - 1;
    let specs: Vec<Option<&JoinOn>> = match on {
        MergeOn::Common => vec![None; steps],
        MergeOn::Each(spec) => vec![Some(spec); steps],
        MergeOn::Steps(specs) => {
            if specs.len() != steps {
                return Err(MergeSpecError::StepCountMismatch {
                    expected: steps,
                    found: specs.len(),
                }
                .into());
            }
            specs.iter().map(Some).collect()
        }
    };

    specs
        .into_iter()
        .enumerate()
        .map(|(step, spec)| {
            let index = step + 1;
            let Some(spec) = spec else {
                return Ok(None);
            };
            let keys = spec.to_keys(index)?;
            if let Some(missing) = keys.right_on.iter().find(|c| !tables[index].has_column(c)) {
                return Err(MergeSpecError::MissingColumn {
                    column: missing.clone(),
                    table: index,
                }
                .into());
            }
            Ok(Some(keys))
        })
        .collect()
}

fn common_keys(acc: &Table, right: &Table, index: usize) -> Result<JoinKeys> {
    let shared: Vec<&str> = acc
        .column_names()
        .into_iter()
        .filter(|name| right.has_column(name))
        .collect();
    if shared.is_empty() {
        return Err(MergeSpecError::NoCommonColumns { step: index }.into());
    }
    Ok(JoinKeys::on(shared))
}

fn rename_key(keys: &mut [String], from: &str, to: &str) {
    for key in keys.iter_mut().filter(|k| k.as_str() == from) {
        *key = to.to_string();
    }
}
