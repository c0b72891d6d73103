//! Persisted name -> file path mapping a collection can be built from

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Table names and the files they load from
///
/// Stored as a flat JSON object, e.g. `{"items": "data/items.csv"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    tables: BTreeMap<String, PathBuf>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, replacing any previous path under the same name
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Option<PathBuf> {
        self.tables.insert(name.into(), path.into())
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.tables.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Entries sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.tables.iter().map(|(name, path)| (name.as_str(), path.as_path()))
    }

    /// Load a manifest from JSON
    ///
    /// Relative paths are taken relative to the manifest's own directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let mut manifest: Manifest = serde_json::from_str(&content).map_err(Error::Json)?;

        if let Some(base) = path.as_ref().parent() {
            for table_path in manifest.tables.values_mut() {
                if table_path.is_relative() {
                    *table_path = base.join(&*table_path);
                }
            }
        }
        Ok(manifest)
    }

    /// Save the manifest to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl<N, P> FromIterator<(N, P)> for Manifest
where
    N: Into<String>,
    P: Into<PathBuf>,
{
    fn from_iter<I: IntoIterator<Item = (N, P)>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for (name, path) in iter {
            manifest.insert(name, path);
        }
        manifest
    }
}

impl IntoIterator for Manifest {
    type Item = (String, PathBuf);
    type IntoIter = std::collections::btree_map::IntoIter<String, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_json_shape() {
        let manifest: Manifest = [("items", "items.csv"), ("categories", "cat.tsv")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(json, r#"{"categories":"cat.tsv","items":"items.csv"}"#);
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join("grove.json");
        fs::write(
            &manifest_path,
            r#"{"items": "data/items.csv", "abs": "/srv/tables/abs.csv"}"#,
        )
        .unwrap();

        let manifest = Manifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("items"), Some(dir.path().join("data/items.csv").as_path()));
        assert_eq!(manifest.get("abs"), Some(Path::new("/srv/tables/abs.csv")));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join("grove.json");
        let mut manifest = Manifest::new();
        manifest.insert("items", dir.path().join("items.csv"));
        manifest.save(&manifest_path).unwrap();

        assert_eq!(Manifest::load(&manifest_path).unwrap(), manifest);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Manifest::load("/nonexistent/grove.json").unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
