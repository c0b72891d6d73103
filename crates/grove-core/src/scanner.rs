//! Directory scanner for discovering delimited table files

use crate::error::Result;
use crate::manifest::Manifest;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// File extensions picked up by [`scan_directory`]
pub const TABLE_EXTENSIONS: [&str; 4] = ["csv", "tsv", "tab", "txt"];

/// Scan one or more directories for table files, naming each by its file stem
///
/// Files are visited in name order; when two files share a stem the later one
/// wins and a warning is logged.
pub fn scan_directory<P: AsRef<Path>>(roots: &[P]) -> Result<Manifest> {
    let mut manifest = Manifest::new();

    for root in roots {
        for entry in WalkDir::new(root.as_ref())
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_table_file(path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            if let Some(previous) = manifest.insert(name, path) {
                warn!(
                    name,
                    previous = %previous.display(),
                    path = %path.display(),
                    "duplicate table name while scanning"
                );
            }
        }
    }

    Ok(manifest)
}

fn is_table_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TABLE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
