//! Delimited text reader producing typed tables

use crate::error::{Error, Result};
use crate::table::{Column, ColumnData, Table};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Delimiters tried when none is configured, in tie-break order
const CANDIDATE_DELIMITERS: &[u8] = b",\t;|";

/// Options for reading delimited text files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Field delimiter; sniffed from the file when unset
    pub delimiter: Option<u8>,
    /// Whether the first record holds column names. Without headers, columns
    /// are named by position ("0", "1", ...)
    pub has_headers: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_headers: true,
        }
    }
}

/// Parse a delimited file into a Table using default options
pub fn parse_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    parse_csv_with(path, &ReadOptions::default())
}

/// Parse a delimited file into a Table
pub fn parse_csv_with<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Table> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let delimiter = options
        .delimiter
        .or_else(|| delimiter_for_extension(path))
        .unwrap_or_else(|| sniff_delimiter(&content));

    let table = read_table(&content, delimiter, options.has_headers, path)?;
    Ok(table.with_source(path))
}

/// Parse delimited text from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str) -> Result<Table> {
    read_table(content, sniff_delimiter(content), true, Path::new(source_name))
}

/// Guess the delimiter from the first line: the candidate occurring most
/// often wins, ties going to the earlier candidate. Defaults to a comma.
pub fn sniff_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or_default();
    let mut best = (b',', 0);
    for &candidate in CANDIDATE_DELIMITERS {
        let count = first_line.bytes().filter(|&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

fn delimiter_for_extension(path: &Path) -> Option<u8> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsv" | "tab") => Some(b'\t'),
        _ => None,
    }
}

fn read_table(content: &str, delimiter: u8, has_headers: bool, path: &Path) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .delimiter(delimiter)
        .flexible(true) // Allow varying number of fields
        .from_reader(content.as_bytes());

    let mut names: Vec<String> = if has_headers {
        csv_reader
            .headers()
            .map_err(|e| Error::Csv {
                path: path.to_path_buf(),
                source: e,
            })?
            .iter()
            .map(|name| name.trim().to_string())
            .collect()
    } else {
        Vec::new()
    };

    let mut fields: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;

        // Headerless input takes its width from the first record
        if !has_headers && row_idx == 0 {
            names = (0..record.len()).map(|i| i.to_string()).collect();
            fields = vec![Vec::new(); names.len()];
        }

        if record.len() > names.len() {
            warn!(
                row = row_idx + 1,
                path = %path.display(),
                "row has more fields than columns, truncating"
            );
        } else if record.len() < names.len() {
            warn!(
                row = row_idx + 1,
                path = %path.display(),
                "row has fewer fields than columns, padding with empty cells"
            );
        }

        for (i, column) in fields.iter_mut().enumerate() {
            column.push(record.get(i).unwrap_or_default().to_string());
        }
    }

    if names.is_empty() {
        return Err(Error::CsvParse {
            path: path.to_path_buf(),
            message: "no columns found".to_string(),
        });
    }

    let columns = names
        .into_iter()
        .zip(fields)
        .map(|(name, values)| Column::new(name, ColumnData::parse_text(&values)))
        .collect();
    Table::new(columns)
}
