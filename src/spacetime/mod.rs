//! Spacetime aggregation
//!
//! Events are censored to a time window before each as-of date, aggregated
//! per spatial scope, stored as one snapshot per date and reassembled into
//! a wide panel keyed by `(id, date)`.
//!
//! - [`window`] - window tokens such as `3y`, `6m` or `all`
//! - [`censor`] - time-window row filters
//! - [`aggregate`] - numerator/denominator metrics over groups
//! - [`aggregator`] - per-date snapshots and panel assembly
//! - [`naming`] - `{prefix}_{space}_{delta}_{metric}` column names

pub mod aggregate;
pub mod aggregator;
pub mod censor;
pub mod config;
pub mod frame;
pub mod naming;
pub mod window;

pub use aggregate::{aggregate, AggFunc, AggregateSpec, ComputeFn, Expression, Metric};
pub use aggregator::{DateAggregation, EventAggregation, SnapshotState, SpacetimeAggregator};
pub use censor::{censor, censor_date};
pub use config::{
    AggregatorConfig, MetricDtype, SpacedeltaMap, Spacedeltas, SpatialIndex,
};
pub use naming::{spacetime_prefix, PanelColumn};
pub use window::{parse_window, Window, WindowSpan, WindowUnit};
