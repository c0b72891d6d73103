//! Core table types: typed, nullable columns and the tables built from them

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Storage type of a column
///
/// Variants are listed in the order the memory reducer tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
}

impl DType {
    /// Bytes used to store one value of this type
    pub fn byte_width(self) -> usize {
        match self {
            DType::Bool | DType::UInt8 | DType::Int8 => 1,
            DType::UInt16 | DType::Int16 => 2,
            DType::UInt32 | DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 => 8,
            DType::Utf8 => std::mem::size_of::<String>(),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::UInt8
                | DType::Int8
                | DType::UInt16
                | DType::Int16
                | DType::UInt32
                | DType::Int32
                | DType::Int64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Lowercase type name, e.g. "uint8"
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::UInt8 => "uint8",
            DType::Int8 => "int8",
            DType::UInt16 => "uint16",
            DType::Int16 => "int16",
            DType::UInt32 => "uint32",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Utf8 => "utf8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A single cell value, independent of the storage type it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// String value
    String(String),
    /// Empty/null cell
    Empty,
}

/// Field contents read as missing values
pub const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

impl CellValue {
    /// Parse a string into a CellValue, detecting the type
    ///
    /// Blank fields and [`NA_TOKENS`] become [`CellValue::Empty`].
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() || NA_TOKENS.contains(&trimmed) {
            return CellValue::Empty;
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return CellValue::Integer(i);
        }

        if let Ok(f) = trimmed.parse::<f64>() {
            return CellValue::Float(f);
        }

        match trimmed {
            "true" | "True" | "TRUE" => CellValue::Bool(true),
            "false" | "False" | "FALSE" => CellValue::Bool(false),
            _ => CellValue::String(trimmed.to_string()),
        }
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Hashable form used for key matching and uniqueness checks
    ///
    /// Integral floats compare equal to the matching integer; NaN is null.
    pub(crate) fn key(&self) -> KeyValue {
        match self {
            CellValue::Integer(i) => KeyValue::Int(*i),
            CellValue::Float(f) => {
                if f.is_nan() {
                    KeyValue::Null
                } else if f.fract() == 0.0 && *f >= -TWO_POW_63 && *f < TWO_POW_63 {
                    KeyValue::Int(*f as i64)
                } else {
                    KeyValue::Float(f.to_bits())
                }
            }
            CellValue::Bool(b) => KeyValue::Bool(*b),
            CellValue::String(s) => KeyValue::Str(s.clone()),
            CellValue::Empty => KeyValue::Null,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(fl) => write!(f, "{}", fl),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Empty => write!(f, ""),
        }
    }
}

/// Normalized, hashable cell value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

/// Runs `$body` with `$v` bound to the typed values of any variant
macro_rules! with_values {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($v) => $body,
            ColumnData::UInt8($v) => $body,
            ColumnData::Int8($v) => $body,
            ColumnData::UInt16($v) => $body,
            ColumnData::Int16($v) => $body,
            ColumnData::UInt32($v) => $body,
            ColumnData::Int32($v) => $body,
            ColumnData::Int64($v) => $body,
            ColumnData::Float32($v) => $body,
            ColumnData::Float64($v) => $body,
            ColumnData::Utf8($v) => $body,
        }
    };
}

/// Like `with_values!`, wrapping the result back into the same variant
macro_rules! map_values {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($v) => ColumnData::Bool($body),
            ColumnData::UInt8($v) => ColumnData::UInt8($body),
            ColumnData::Int8($v) => ColumnData::Int8($body),
            ColumnData::UInt16($v) => ColumnData::UInt16($body),
            ColumnData::Int16($v) => ColumnData::Int16($body),
            ColumnData::UInt32($v) => ColumnData::UInt32($body),
            ColumnData::Int32($v) => ColumnData::Int32($body),
            ColumnData::Int64($v) => ColumnData::Int64($body),
            ColumnData::Float32($v) => ColumnData::Float32($body),
            ColumnData::Float64($v) => ColumnData::Float64($body),
            ColumnData::Utf8($v) => ColumnData::Utf8($body),
        }
    };
}

/// Columnar storage, one variant per [`DType`]. `None` marks a null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Bool(Vec<Option<bool>>),
    UInt8(Vec<Option<u8>>),
    Int8(Vec<Option<i8>>),
    UInt16(Vec<Option<u16>>),
    Int16(Vec<Option<i16>>),
    UInt32(Vec<Option<u32>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
}

impl ColumnData {
    pub fn dtype(&self) -> DType {
        match self {
            ColumnData::Bool(_) => DType::Bool,
            ColumnData::UInt8(_) => DType::UInt8,
            ColumnData::Int8(_) => DType::Int8,
            ColumnData::UInt16(_) => DType::UInt16,
            ColumnData::Int16(_) => DType::Int16,
            ColumnData::UInt32(_) => DType::UInt32,
            ColumnData::Int32(_) => DType::Int32,
            ColumnData::Int64(_) => DType::Int64,
            ColumnData::Float32(_) => DType::Float32,
            ColumnData::Float64(_) => DType::Float64,
            ColumnData::Utf8(_) => DType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row`, or `None` when out of bounds
    pub fn get(&self, row: usize) -> Option<CellValue> {
        fn cell<T>(v: &[Option<T>], row: usize, f: impl Fn(&T) -> CellValue) -> Option<CellValue> {
            v.get(row).map(|c| c.as_ref().map_or(CellValue::Empty, &f))
        }

        match self {
            ColumnData::Bool(v) => cell(v, row, |b| CellValue::Bool(*b)),
            ColumnData::UInt8(v) => cell(v, row, |x| CellValue::Integer(i64::from(*x))),
            ColumnData::Int8(v) => cell(v, row, |x| CellValue::Integer(i64::from(*x))),
            ColumnData::UInt16(v) => cell(v, row, |x| CellValue::Integer(i64::from(*x))),
            ColumnData::Int16(v) => cell(v, row, |x| CellValue::Integer(i64::from(*x))),
            ColumnData::UInt32(v) => cell(v, row, |x| CellValue::Integer(i64::from(*x))),
            ColumnData::Int32(v) => cell(v, row, |x| CellValue::Integer(i64::from(*x))),
            ColumnData::Int64(v) => cell(v, row, |x| CellValue::Integer(*x)),
            ColumnData::Float32(v) => cell(v, row, |x| CellValue::Float(f64::from(*x))),
            ColumnData::Float64(v) => cell(v, row, |x| CellValue::Float(*x)),
            ColumnData::Utf8(v) => cell(v, row, |s| CellValue::String(s.clone())),
        }
    }

    /// All values in row order
    pub fn cells(&self) -> Vec<CellValue> {
        (0..self.len()).filter_map(|row| self.get(row)).collect()
    }

    /// Missing value at `row`; float NaN counts as missing
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Float32(v) => v.get(row).is_some_and(|c| c.map_or(true, f32::is_nan)),
            ColumnData::Float64(v) => v.get(row).is_some_and(|c| c.map_or(true, f64::is_nan)),
            _ => with_values!(self, v => v.get(row).is_some_and(Option::is_none)),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&row| self.is_null(row)).count()
    }

    /// Gather rows by position; `None` positions produce nulls
    pub fn take(&self, positions: &[Option<usize>]) -> ColumnData {
        map_values!(self, v => positions
            .iter()
            .map(|p| p.and_then(|i| v.get(i).cloned().flatten()))
            .collect())
    }

    /// The first `n` rows
    pub fn head(&self, n: usize) -> ColumnData {
        map_values!(self, v => v.iter().take(n).cloned().collect())
    }

    /// Estimated heap footprint in bytes: values, a validity bit per row,
    /// and string contents
    pub fn memory_usage(&self) -> usize {
        let len = self.len();
        let strings = match self {
            ColumnData::Utf8(v) => v.iter().flatten().map(String::len).sum(),
            _ => 0,
        };
        len * self.dtype().byte_width() + len.div_ceil(8) + strings
    }

    /// Build a column from cell values, inferring the storage type
    ///
    /// Integers become `Int64`, any float promotes the column to `Float64`,
    /// booleans stay `Bool`, and anything mixed with text becomes `Utf8`.
    /// A column of only empty cells is `Float64`.
    pub fn from_cells(cells: &[CellValue]) -> ColumnData {
        match infer_dtype(cells) {
            DType::Bool => ColumnData::Bool(cells.iter().map(CellValue::as_bool).collect()),
            DType::Int64 => ColumnData::Int64(cells.iter().map(CellValue::as_i64).collect()),
            DType::Utf8 => ColumnData::Utf8(
                cells
                    .iter()
                    .map(|c| (!c.is_empty()).then(|| c.to_string()))
                    .collect(),
            ),
            _ => ColumnData::Float64(cells.iter().map(CellValue::as_f64).collect()),
        }
    }

    /// Build a column from raw text fields, inferring the storage type
    ///
    /// Text columns keep the raw (trimmed) field contents.
    pub fn parse_text<S: AsRef<str>>(fields: &[S]) -> ColumnData {
        let cells: Vec<CellValue> = fields.iter().map(|s| CellValue::parse(s.as_ref())).collect();
        if infer_dtype(&cells) == DType::Utf8 {
            return ColumnData::Utf8(
                fields
                    .iter()
                    .zip(&cells)
                    .map(|(s, cell)| (!cell.is_empty()).then(|| s.as_ref().trim().to_string()))
                    .collect(),
            );
        }
        ColumnData::from_cells(&cells)
    }

    /// Convert to another storage type, failing if any value would change
    pub fn cast(&self, to: DType) -> Result<ColumnData> {
        let from = self.dtype();
        if from == to {
            return Ok(self.clone());
        }

        let cells = self.cells();
        let data = match to {
            DType::Bool => ColumnData::Bool(convert(&cells, from, to, CellValue::as_bool)?),
            DType::UInt8 => ColumnData::UInt8(convert(&cells, from, to, exact_int)?),
            DType::Int8 => ColumnData::Int8(convert(&cells, from, to, exact_int)?),
            DType::UInt16 => ColumnData::UInt16(convert(&cells, from, to, exact_int)?),
            DType::Int16 => ColumnData::Int16(convert(&cells, from, to, exact_int)?),
            DType::UInt32 => ColumnData::UInt32(convert(&cells, from, to, exact_int)?),
            DType::Int32 => ColumnData::Int32(convert(&cells, from, to, exact_int)?),
            DType::Int64 => ColumnData::Int64(convert(&cells, from, to, exact_int)?),
            DType::Float32 => ColumnData::Float32(convert(&cells, from, to, exact_f32)?),
            DType::Float64 => ColumnData::Float64(convert(&cells, from, to, exact_f64)?),
            DType::Utf8 => ColumnData::Utf8(convert(&cells, from, to, |c| Some(c.to_string()))?),
        };
        Ok(data)
    }
}

fn infer_dtype(cells: &[CellValue]) -> DType {
    let (mut ints, mut floats, mut bools, mut text) = (false, false, false, false);
    for cell in cells {
        match cell {
            CellValue::Integer(_) => ints = true,
            CellValue::Float(_) => floats = true,
            CellValue::Bool(_) => bools = true,
            CellValue::String(_) => text = true,
            CellValue::Empty => {}
        }
    }

    if text || (bools && (ints || floats)) {
        DType::Utf8
    } else if bools {
        DType::Bool
    } else if ints && !floats {
        DType::Int64
    } else {
        DType::Float64
    }
}

/// Convert every non-empty cell with `f`; a `None` from `f` means the value
/// does not fit the target type
fn convert<T>(
    cells: &[CellValue],
    from: DType,
    to: DType,
    f: impl Fn(&CellValue) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            CellValue::Empty => Ok(None),
            _ => f(cell).map(Some).ok_or(Error::LossyCast { from, to, row }),
        })
        .collect()
}

const TWO_POW_63: f64 = 9.223_372_036_854_775_808e18;

fn exact_int<T: TryFrom<i64>>(cell: &CellValue) -> Option<T> {
    let i = match cell {
        CellValue::Integer(i) => *i,
        CellValue::Float(f) if f.fract() == 0.0 && *f >= -TWO_POW_63 && *f < TWO_POW_63 => *f as i64,
        _ => return None,
    };
    T::try_from(i).ok()
}

fn exact_f32(cell: &CellValue) -> Option<f32> {
    match cell {
        CellValue::Integer(i) => {
            let f = *i as f32;
            (f64::from(f) < TWO_POW_63 && f as i64 == *i).then_some(f)
        }
        CellValue::Float(f) => {
            let narrow = *f as f32;
            (f64::from(narrow) == *f || f.is_nan()).then_some(narrow)
        }
        _ => None,
    }
}

fn exact_f64(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Integer(i) => {
            let f = *i as f64;
            (f < TWO_POW_63 && f as i64 == *i).then_some(f)
        }
        CellValue::Float(f) => Some(*f),
        _ => None,
    }
}

impl From<Vec<i64>> for ColumnData {
    fn from(values: Vec<i64>) -> Self {
        ColumnData::Int64(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<i64>>> for ColumnData {
    fn from(values: Vec<Option<i64>>) -> Self {
        ColumnData::Int64(values)
    }
}

impl From<Vec<f64>> for ColumnData {
    fn from(values: Vec<f64>) -> Self {
        ColumnData::Float64(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<f64>>> for ColumnData {
    fn from(values: Vec<Option<f64>>) -> Self {
        ColumnData::Float64(values)
    }
}

impl From<Vec<bool>> for ColumnData {
    fn from(values: Vec<bool>) -> Self {
        ColumnData::Bool(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<&str>> for ColumnData {
    fn from(values: Vec<&str>) -> Self {
        ColumnData::Utf8(values.into_iter().map(|s| Some(s.to_string())).collect())
    }
}

impl From<Vec<Option<&str>>> for ColumnData {
    fn from(values: Vec<Option<&str>>) -> Self {
        ColumnData::Utf8(values.into_iter().map(|s| s.map(str::to_string)).collect())
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Typed values
    pub data: ColumnData,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, data: impl Into<ColumnData>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An in-memory table: uniquely named columns of equal length
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    source_path: Option<PathBuf>,
}

impl Table {
    /// Create a table, checking that names are unique and lengths agree
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::DuplicateColumn(column.name.clone()));
            }
        }
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(Error::ShapeMismatch {
                    column: bad.name.clone(),
                    expected,
                    found: bad.len(),
                });
            }
        }
        Ok(Self {
            columns,
            source_path: None,
        })
    }

    /// Record the file this table was read from
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// The file this table was read from, if any
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of one row, or `None` when out of bounds
    pub fn row(&self, index: usize) -> Option<Vec<CellValue>> {
        if index >= self.row_count() {
            return None;
        }
        self.columns.iter().map(|c| c.data.get(index)).collect()
    }

    /// Append a column of matching length and unused name
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(Error::DuplicateColumn(column.name));
        }
        if !self.columns.is_empty() && column.len() != self.row_count() {
            return Err(Error::ShapeMismatch {
                expected: self.row_count(),
                found: column.len(),
                column: column.name,
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Rename a column in place
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let to = to.into();
        if from == to {
            return Ok(());
        }
        if self.has_column(&to) {
            return Err(Error::DuplicateColumn(to));
        }
        let index = self.column_index(from).ok_or_else(|| Error::Schema {
            columns: vec![from.to_string()],
        })?;
        self.columns[index].name = to;
        Ok(())
    }

    /// The first `n` rows as a new table
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.head(n)))
                .collect(),
            source_path: self.source_path.clone(),
        }
    }

    /// Estimated memory footprint in bytes
    pub fn memory_usage(&self) -> usize {
        self.columns.iter().map(|c| c.data.memory_usage()).sum()
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.column_names();
        writeln!(f, "{}", header.join("\t"))?;
        writeln!(f, "{}", "-".repeat(header.len() * 12))?;
        for index in 0..self.row_count() {
            let values: Vec<String> = self
                .columns
                .iter()
                .map(|c| c.data.get(index).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            writeln!(f, "{}", values.join("\t"))?;
        }
        Ok(())
    }
}
