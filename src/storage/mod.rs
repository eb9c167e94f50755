//! Snapshot storage backends
//!
//! A snapshot is the aggregation result for one `(prefix, as-of date)`.
//! Stores hold whole tables: a `put` replaces any previous value for the
//! key in one step, so readers see either the old or the new snapshot.

mod local;
mod memory;

pub use local::LocalSnapshotStore;
pub use memory::MemorySnapshotStore;

use std::fmt;

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Storage key of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub prefix: String,
    pub date: NaiveDate,
}

impl SnapshotKey {
    pub fn new(prefix: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            prefix: prefix.into(),
            date,
        }
    }

    /// `YYYYMMDD`
    pub fn date_stem(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.date_stem())
    }
}

/// Storage backend for snapshots
pub trait SnapshotStore: Send + Sync {
    /// Load a snapshot; [`PanelError::StorageNotFound`](crate::PanelError::StorageNotFound) if absent
    fn get(&self, key: &SnapshotKey) -> Result<DataFrame>;

    /// Store a snapshot, replacing any previous one for the same key
    fn put(&self, key: &SnapshotKey, df: &mut DataFrame) -> Result<()>;

    /// Whether the namespace for `prefix` exists
    fn exists(&self, prefix: &str) -> bool;

    /// Create the namespace for `prefix` if needed; idempotent
    fn ensure(&self, prefix: &str) -> Result<()>;

    /// Dates with a stored snapshot under `prefix`, ascending
    fn dates(&self, prefix: &str) -> Result<Vec<NaiveDate>>;
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<S> {
    fn get(&self, key: &SnapshotKey) -> Result<DataFrame> {
        (**self).get(key)
    }

    fn put(&self, key: &SnapshotKey, df: &mut DataFrame) -> Result<()> {
        (**self).put(key, df)
    }

    fn exists(&self, prefix: &str) -> bool {
        (**self).exists(prefix)
    }

    fn ensure(&self, prefix: &str) -> Result<()> {
        (**self).ensure(prefix)
    }

    fn dates(&self, prefix: &str) -> Result<Vec<NaiveDate>> {
        (**self).dates(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = SnapshotKey::new("tests", NaiveDate::from_ymd_opt(2013, 1, 1).unwrap());
        assert_eq!(key.to_string(), "tests/20130101");
    }
}
