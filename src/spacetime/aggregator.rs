//! Per-date snapshot aggregation, persistence and panel assembly

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info};

use super::aggregate::{aggregate, AggregateSpec, Expression};
use super::censor::censor_date;
use super::config::{AggregatorConfig, MetricDtype, SpacedeltaMap};
use super::frame::{
    align_concat, column_series, composite_id, constant_date_series, date_lit, ensure_temporal,
    pivot_panel, DATE_COLUMN, DELTA_COLUMN, ID_COLUMN, SPACE_COLUMN,
};
use crate::error::{PanelError, Result};
use crate::storage::{SnapshotKey, SnapshotStore};
use crate::utils::{parallel_try_map, Timer};

const KEY_COLUMNS: [&str; 4] = [ID_COLUMN, DATE_COLUMN, SPACE_COLUMN, DELTA_COLUMN];

/// Produces the aggregations for one as-of date.
///
/// The returned frame has `id`, `space` and `delta` columns plus one column
/// per metric, with one row per entity per (space, delta) pair of
/// `spacedeltas`. A `date` column is added (or overwritten) by the aggregator.
pub trait DateAggregation: Send + Sync {
    fn aggregate(&self, date: NaiveDate, spacedeltas: &SpacedeltaMap) -> Result<DataFrame>;

    /// Declared metric dtypes, reapplied after reading
    fn dtypes(&self) -> HashMap<String, MetricDtype> {
        HashMap::new()
    }
}

/// Censor + aggregate an event table for every configured (space, delta)
#[derive(Debug, Clone)]
pub struct EventAggregation {
    events: DataFrame,
    date_column: String,
    spec: AggregateSpec,
    weight: Option<Expression>,
}

impl EventAggregation {
    pub fn new(events: DataFrame, date_column: impl Into<String>, spec: AggregateSpec) -> Result<Self> {
        let date_column = date_column.into();
        spec.validate()?;
        for name in spec.metric_names() {
            if KEY_COLUMNS.contains(&name) {
                return Err(PanelError::Parse(format!(
                    "Metric name '{}' collides with a snapshot key column",
                    name
                )));
            }
        }
        // Fails on a missing or non-temporal column before any aggregation runs
        ensure_temporal(column_series(&events, &date_column)?)?;

        Ok(Self {
            events,
            date_column,
            spec,
            weight: None,
        })
    }

    pub fn with_weight(mut self, weight: Expression) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn spec(&self) -> &AggregateSpec {
        &self.spec
    }
}

impl DateAggregation for EventAggregation {
    fn aggregate(&self, date: NaiveDate, spacedeltas: &SpacedeltaMap) -> Result<DataFrame> {
        let mut frames = Vec::new();

        for (space, sd) in spacedeltas {
            let index = sd.spatial_index.columns();
            for (delta, window) in &sd.deltas {
                let censored = censor_date(&self.events, &self.date_column, date, window)?;
                let aggregated = aggregate(&censored, &self.spec, self.weight.as_ref(), Some(index))?;
                debug!(%date, space = %space, delta = %delta, groups = aggregated.height(), "Aggregated");
                frames.push(to_snapshot_layout(aggregated, index, space, delta)?);
            }
        }

        align_concat(frames)
    }

    fn dtypes(&self) -> HashMap<String, MetricDtype> {
        self.spec.dtypes()
    }
}

/// Replace the index columns of an aggregate with `id`, `space`, `delta`.
/// A composite index becomes a string id, see [`composite_id`].
fn to_snapshot_layout(
    aggregated: DataFrame,
    index: &[String],
    space: &str,
    delta: &str,
) -> Result<DataFrame> {
    let id = match index {
        [single] => col(single.as_str()).alias(ID_COLUMN),
        _ => composite_id(index),
    };
    let mut columns = vec![
        id,
        lit(space).alias(SPACE_COLUMN),
        lit(delta).alias(DELTA_COLUMN),
    ];
    columns.extend(
        aggregated
            .get_column_names()
            .into_iter()
            .filter(|name| !index.iter().any(|i| i.as_str() == name.as_str()))
            .map(|name| col(name.clone())),
    );

    Ok(aggregated.lazy().select(columns).collect()?)
}

/// Set the `date` column and order the key columns first
fn normalize_snapshot(mut df: DataFrame, date: NaiveDate) -> Result<DataFrame> {
    for name in [ID_COLUMN, SPACE_COLUMN, DELTA_COLUMN] {
        if df.column(name).is_err() {
            return Err(PanelError::Schema(format!(
                "Snapshot for {} is missing the '{}' column",
                date, name
            )));
        }
    }

    df.with_column(constant_date_series(DATE_COLUMN, date, df.height())?)?;

    let order: Vec<String> = KEY_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(
            df.get_column_names()
                .into_iter()
                .map(|c| c.to_string())
                .filter(|c| !KEY_COLUMNS.contains(&c.as_str())),
        )
        .collect();
    Ok(df.select(order)?)
}

/// Lifecycle of one date's snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Unaggregated,
    Persisted,
}

/// Aggregates a [`DateAggregation`] over the configured dates, keeping one
/// snapshot per date in a [`SnapshotStore`], and reassembles the snapshots
/// into a wide panel.
pub struct SpacetimeAggregator<A, S> {
    config: AggregatorConfig,
    source: A,
    store: S,
}

impl<A: DateAggregation, S: SnapshotStore> SpacetimeAggregator<A, S> {
    /// Validates the configuration up front
    pub fn new(config: AggregatorConfig, source: A, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            store,
        })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn source(&self) -> &A {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    fn key(&self, date: NaiveDate) -> SnapshotKey {
        SnapshotKey::new(self.config.prefix.as_str(), date)
    }

    /// Metric dtypes reapplied after reading; config entries win over the source's
    pub fn dtypes(&self) -> HashMap<String, DataType> {
        let mut dtypes = self.source.dtypes();
        dtypes.extend(self.config.dtypes.iter().map(|(k, v)| (k.clone(), *v)));
        dtypes
            .into_iter()
            .map(|(metric, dtype)| (metric, dtype.to_dtype()))
            .collect()
    }

    pub fn state(&self, date: NaiveDate) -> Result<SnapshotState> {
        let stored = self.store.dates(&self.config.prefix)?;
        Ok(if stored.contains(&date) {
            SnapshotState::Persisted
        } else {
            SnapshotState::Unaggregated
        })
    }

    /// Configured dates that have no stored snapshot yet
    pub fn missing_dates(&self) -> Result<Vec<NaiveDate>> {
        let stored: HashSet<NaiveDate> = self.store.dates(&self.config.prefix)?.into_iter().collect();
        Ok(self
            .config
            .dates
            .iter()
            .filter(|d| !stored.contains(d))
            .copied()
            .collect())
    }

    /// Run the source for `date`, returning the snapshot without storing it
    pub fn aggregate(&self, date: NaiveDate) -> Result<DataFrame> {
        let df = self.source.aggregate(date, &self.config.spacedeltas)?;
        normalize_snapshot(df, date)
    }

    /// Aggregate `date` and replace its stored snapshot
    pub fn write_date(&self, date: NaiveDate) -> Result<DataFrame> {
        info!(prefix = %self.config.prefix, %date, "Aggregating");
        let mut df = self.aggregate(date)?;

        self.store.ensure(&self.config.prefix)?;

        info!(prefix = %self.config.prefix, %date, rows = df.height(), "Writing");
        self.store.put(&self.key(date), &mut df)?;
        Ok(df)
    }

    /// Write every configured date, one task per date
    pub fn write_all(&self) -> Result<()> {
        self.write_dates(&self.config.dates)
    }

    pub fn write_dates(&self, dates: &[NaiveDate]) -> Result<()> {
        let timer = Timer::start(format!("Writing {} dates of {}", dates.len(), self.config.prefix));
        parallel_try_map(dates.to_vec(), &self.config.parallel, |date| {
            self.write_date(date).map(|_| ())
        })?;
        timer.stop();
        Ok(())
    }

    /// Load the snapshot for `date`.
    ///
    /// With `left`, only entities present in `left` on `date` are kept: for
    /// each configured space, rows of that space keep ids found in `left`'s
    /// spatial-index column(s). When `left` has no rows on `date` an empty
    /// frame is returned without touching storage.
    pub fn read_date(&self, date: NaiveDate, left: Option<&DataFrame>) -> Result<DataFrame> {
        let left = match left {
            Some(left) => {
                let on_date = rows_on_date(left, date)?;
                if on_date.height() == 0 {
                    debug!(prefix = %self.config.prefix, %date, "No entities requested, skipping read");
                    return Ok(DataFrame::empty());
                }
                Some(on_date)
            }
            None => None,
        };

        info!(prefix = %self.config.prefix, %date, "Reading date");
        let mut df = self.store.get(&self.key(date))?;

        if let Some(left) = left {
            df = self.restrict_to(df, &left)?;
        }

        normalize_snapshot(df, date)
    }

    fn restrict_to(&self, df: DataFrame, left: &DataFrame) -> Result<DataFrame> {
        let id_dtype = column_series(&df, ID_COLUMN)?.dtype().clone();

        let mut keep = lit(true);
        for (space, sd) in &self.config.spacedeltas {
            let allowed = left_ids(left, sd.spatial_index.columns(), &id_dtype)?;
            debug!(space = %space, ids = allowed.len(), "Restricting to left");
            let outside = col(SPACE_COLUMN).neq(lit(space.as_str()));
            keep = keep.and(outside.or(col(ID_COLUMN).is_in(lit(allowed))));
        }

        Ok(df.lazy().filter(keep).collect()?)
    }

    /// Load every configured date and union them in date order.
    ///
    /// With `pivot`, reshape to one row per (id, date) and one
    /// `{prefix}_{space}_{delta}_{metric}` column per combination.
    /// A missing snapshot for any date is an error.
    pub fn read(&self, left: Option<&DataFrame>, pivot: bool) -> Result<DataFrame> {
        let mut timer = Timer::start(format!("Reading {}", self.config.prefix));

        let frames = parallel_try_map(self.config.dates.clone(), &self.config.parallel, |date| {
            self.read_date(date, left)
        })?;
        timer.checkpoint("load");

        let mut long = align_concat(frames)?;
        timer.checkpoint("union");

        let dtypes = self.dtypes();
        let result = if pivot {
            pivot_panel(&long, &self.config.prefix, &dtypes)?
        } else {
            restore_dtypes(&mut long, &dtypes)?;
            long
        };
        timer.stop();
        Ok(result)
    }
}

/// Rows of `left` whose `date` falls on `date`
fn rows_on_date(left: &DataFrame, date: NaiveDate) -> Result<DataFrame> {
    ensure_temporal(column_series(left, DATE_COLUMN)?)?;
    let on_date = col(DATE_COLUMN).cast(DataType::Date).eq(date_lit(date));
    Ok(left.clone().lazy().filter(on_date).collect()?)
}

/// Distinct ids of `left` for a spatial index, cast to the snapshot's id dtype
fn left_ids(left: &DataFrame, columns: &[String], id_dtype: &DataType) -> Result<Series> {
    for name in columns {
        column_series(left, name)?;
    }
    let keys = match columns {
        [single] => column_series(left, single)?.clone(),
        _ => left
            .clone()
            .lazy()
            .select([composite_id(columns)])
            .collect()?
            .column(ID_COLUMN)?
            .as_materialized_series()
            .clone(),
    };

    let keys = keys.strict_cast(id_dtype).map_err(|e| {
        PanelError::Schema(format!(
            "Cannot compare left column(s) {:?} of dtype {} with snapshot ids of dtype {}: {}",
            columns,
            keys.dtype(),
            id_dtype,
            e
        ))
    })?;
    Ok(keys.drop_nulls().unique()?)
}

fn restore_dtypes(df: &mut DataFrame, dtypes: &HashMap<String, DataType>) -> Result<()> {
    for (metric, dtype) in dtypes {
        let Ok(column) = df.column(metric) else {
            continue;
        };
        if column.dtype() == dtype {
            continue;
        }
        let cast = column.as_materialized_series().strict_cast(dtype).map_err(|e| {
            PanelError::Schema(format!("Cannot restore dtype {} for {}: {}", dtype, metric, e))
        })?;
        df.with_column(cast)?;
    }
    Ok(())
}
