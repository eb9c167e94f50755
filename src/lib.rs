//! Spacetime panel construction and ranking evaluation
//!
//! Builds entity panels from event tables: events are censored to time
//! windows ending at each as-of date, aggregated per spatial scope, stored as
//! one snapshot per date and reassembled into a wide `(id, date)` panel with
//! `{prefix}_{space}_{delta}_{metric}` columns.
//!
//! # Modules
//!
//! - [`spacetime`] - window parsing, censoring, aggregation and the aggregator
//! - [`storage`] - snapshot stores keyed by `(prefix, date)`
//! - [`metrics`] - precision/recall at k with unlabeled data, AUC
//! - [`utils`] - parallel fan-out, timing and table file I/O
//! - [`cli`] - command-line interface

// Core error handling
pub mod error;

pub mod spacetime;
pub mod storage;
pub mod metrics;

pub mod utils;
pub mod cli;

pub use error::{PanelError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{PanelError, Result};

    // Aggregation
    pub use crate::spacetime::{
        aggregate, censor, parse_window, spacetime_prefix, AggFunc, AggregateSpec,
        AggregatorConfig, DateAggregation, EventAggregation, Expression, Metric, MetricDtype,
        PanelColumn, Spacedeltas, SpacetimeAggregator, Window,
    };

    // Storage
    pub use crate::storage::{LocalSnapshotStore, MemorySnapshotStore, SnapshotKey, SnapshotStore};

    // Metrics
    pub use crate::metrics::{PrecisionAtK, RankingMetrics, RankingSummary};

    // Utilities
    pub use crate::utils::{DataLoader, DataSaver, ParallelConfig};
}
