//! In-process snapshot store

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use parking_lot::RwLock;
use polars::prelude::DataFrame;

use super::{SnapshotKey, SnapshotStore};
use crate::error::{PanelError, Result};

/// Keeps snapshots in memory; useful for tests and one-shot pipelines
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<SnapshotKey, DataFrame>>,
    prefixes: RwLock<HashSet<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, key: &SnapshotKey) -> Result<DataFrame> {
        self.snapshots
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| PanelError::StorageNotFound {
                prefix: key.prefix.clone(),
                date: key.date,
            })
    }

    fn put(&self, key: &SnapshotKey, df: &mut DataFrame) -> Result<()> {
        self.ensure(&key.prefix)?;
        self.snapshots.write().insert(key.clone(), df.clone());
        Ok(())
    }

    fn exists(&self, prefix: &str) -> bool {
        self.prefixes.read().contains(prefix)
    }

    fn ensure(&self, prefix: &str) -> Result<()> {
        self.prefixes.write().insert(prefix.to_string());
        Ok(())
    }

    fn dates(&self, prefix: &str) -> Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self
            .snapshots
            .read()
            .keys()
            .filter(|k| k.prefix == prefix)
            .map(|k| k.date)
            .collect();
        dates.sort();
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        let key = SnapshotKey::new("tests", NaiveDate::from_ymd_opt(2013, 1, 1).unwrap());

        assert!(matches!(store.get(&key), Err(PanelError::StorageNotFound { .. })));
        store.put(&key, &mut df!("v" => &[1i64]).unwrap()).unwrap();

        assert!(store.exists("tests"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().height(), 1);
        assert_eq!(store.dates("tests").unwrap(), vec![key.date]);
        assert!(store.dates("other").unwrap().is_empty());
    }
}
