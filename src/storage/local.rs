//! Parquet files on the local file system

use std::fs::{self, File};
use std::path::PathBuf;

use chrono::NaiveDate;
use polars::prelude::*;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{SnapshotKey, SnapshotStore};
use crate::error::{PanelError, Result};

const EXTENSION: &str = "parquet";

/// Stores each snapshot at `{base_dir}/{prefix}/{YYYYMMDD}.parquet`
#[derive(Debug, Clone)]
pub struct LocalSnapshotStore {
    base_dir: PathBuf,
}

impl LocalSnapshotStore {
    /// Create a store rooted at `base_dir`. Nothing is created until the first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    fn prefix_dir(&self, prefix: &str) -> PathBuf {
        self.base_dir.join(prefix)
    }

    pub fn snapshot_path(&self, key: &SnapshotKey) -> PathBuf {
        self.prefix_dir(&key.prefix)
            .join(format!("{}.{}", key.date_stem(), EXTENSION))
    }
}

impl SnapshotStore for LocalSnapshotStore {
    fn get(&self, key: &SnapshotKey) -> Result<DataFrame> {
        let path = self.snapshot_path(key);
        if !path.is_file() {
            return Err(PanelError::StorageNotFound {
                prefix: key.prefix.clone(),
                date: key.date,
            });
        }

        let file = File::open(&path)?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| PanelError::Data(format!("Failed to read {}: {}", path.display(), e)))
    }

    fn put(&self, key: &SnapshotKey, df: &mut DataFrame) -> Result<()> {
        self.ensure(&key.prefix)?;
        let path = self.snapshot_path(key);

        // Write next to the target and rename over it so a failed write
        // leaves the previous snapshot in place.
        let mut tmp = NamedTempFile::new_in(self.prefix_dir(&key.prefix))?;
        ParquetWriter::new(tmp.as_file_mut())
            .finish(df)
            .map_err(|e| PanelError::Data(format!("Failed to write {}: {}", key, e)))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| PanelError::Io(e.error))?;

        debug!(path = %path.display(), rows = df.height(), "Snapshot written");
        Ok(())
    }

    fn exists(&self, prefix: &str) -> bool {
        self.prefix_dir(prefix).is_dir()
    }

    fn ensure(&self, prefix: &str) -> Result<()> {
        fs::create_dir_all(self.prefix_dir(prefix))?;
        Ok(())
    }

    fn dates(&self, prefix: &str) -> Result<Vec<NaiveDate>> {
        let dir = self.prefix_dir(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut dates = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok());
            if let Some(date) = parsed {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(day: u32) -> SnapshotKey {
        SnapshotKey::new("tests", NaiveDate::from_ymd_opt(2013, 1, day).unwrap())
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());
        let mut df = df!("id" => &[1i64, 2], "count" => &[Some(3i64), None]).unwrap();

        assert!(!store.exists("tests"));
        store.put(&key(1), &mut df).unwrap();
        assert!(store.exists("tests"));
        assert!(store.snapshot_path(&key(1)).ends_with("tests/20130101.parquet"));

        let loaded = store.get(&key(1)).unwrap();
        assert!(loaded.equals_missing(&df));
    }

    #[test]
    fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());
        store.put(&key(1), &mut df!("v" => &[1i64]).unwrap()).unwrap();
        store.put(&key(1), &mut df!("v" => &[2i64, 3]).unwrap()).unwrap();

        let loaded = store.get(&key(1)).unwrap();
        assert_eq!(loaded.height(), 2);
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());
        let err = store.get(&key(2)).unwrap_err();
        assert!(matches!(err, PanelError::StorageNotFound { .. }));
    }

    #[test]
    fn test_ensure_is_idempotent_and_dates_listed() {
        let dir = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(dir.path());
        store.ensure("tests").unwrap();
        store.ensure("tests").unwrap();
        assert!(store.dates("tests").unwrap().is_empty());

        store.put(&key(5), &mut df!("v" => &[1i64]).unwrap()).unwrap();
        store.put(&key(2), &mut df!("v" => &[1i64]).unwrap()).unwrap();
        fs::write(store.prefix_dir("tests").join("notes.txt"), "x").unwrap();

        let dates = store.dates("tests").unwrap();
        assert_eq!(dates, vec![key(2).date, key(5).date]);
    }
}
