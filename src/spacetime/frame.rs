//! Frame plumbing: temporal literals, composite ids, schema-aligned unions
//! and the long-to-wide panel pivot.

use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::pivot::pivot_stable;
use polars::prelude::*;

use super::naming::PanelColumn;
use crate::error::{PanelError, Result};

/// Key columns of a snapshot, in order
pub const ID_COLUMN: &str = "id";
pub const DATE_COLUMN: &str = "date";
pub const SPACE_COLUMN: &str = "space";
pub const DELTA_COLUMN: &str = "delta";

/// Separator between the parts of a composite id. Occurrences inside a
/// part are escaped with a backslash.
pub const KEY_SEPARATOR: &str = "|";

/// Pivot header combining space and delta
const CELL_COLUMN: &str = "__cell";

/// `num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Look up a column, mapping absence to [`PanelError::MissingColumn`]
pub fn column_series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| PanelError::MissingColumn(name.to_string()))
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Fails unless `series` is a `Date` or `Datetime`
pub fn ensure_temporal(series: &Series) -> Result<()> {
    match series.dtype() {
        DataType::Date | DataType::Datetime(_, _) => Ok(()),
        other => Err(PanelError::Schema(format!(
            "Column '{}' must be a Date or Datetime, found {}",
            series.name(),
            other
        ))),
    }
}

/// Days since 1970-01-01, the physical representation of a polars `Date`
pub fn date_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn datetime_micros(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_micros()
}

/// Microsecond `Datetime` literal
pub fn datetime_lit(dt: NaiveDateTime) -> Expr {
    lit(datetime_micros(dt)).cast(DataType::Datetime(TimeUnit::Microseconds, None))
}

/// `Date` literal
pub fn date_lit(date: NaiveDate) -> Expr {
    lit(date_days(date)).cast(DataType::Date)
}

/// Build a `Date` series from chrono dates
pub fn date_series(name: &str, dates: &[NaiveDate]) -> Result<Series> {
    let days: Vec<i32> = dates.iter().map(|d| date_days(*d)).collect();
    Ok(Series::new(name.into(), days).cast(&DataType::Date)?)
}

/// A `Date` series repeating one date
pub fn constant_date_series(name: &str, date: NaiveDate, len: usize) -> Result<Series> {
    Ok(Series::new(name.into(), vec![date_days(date); len]).cast(&DataType::Date)?)
}

/// String id of a composite key: every part is rendered as a string, `\`
/// and [`KEY_SEPARATOR`] are backslash-escaped and the parts are joined
/// with [`KEY_SEPARATOR`]. Missing if any part is missing.
pub fn composite_id(columns: &[String]) -> Expr {
    let parts: Vec<Expr> = columns
        .iter()
        .map(|name| {
            col(name.as_str())
                .cast(DataType::String)
                .str()
                .replace_all(lit("\\"), lit("\\\\"), true)
                .str()
                .replace_all(lit(KEY_SEPARATOR), lit("\\|"), true)
        })
        .collect();
    concat_str(parts, KEY_SEPARATOR, false).alias(ID_COLUMN)
}

/// Union frames whose column sets and dtypes differ.
///
/// Columns are ordered by first appearance. A column absent from a frame
/// is null-filled, and a column whose dtype differs between frames is cast
/// to the common supertype. Frames with no columns are skipped.
pub fn align_concat(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let inputs: Vec<LazyFrame> = frames
        .into_iter()
        .filter(|df| df.width() > 0)
        .map(|df| df.lazy())
        .collect();
    if inputs.is_empty() {
        return Ok(DataFrame::empty());
    }

    let args = UnionArgs {
        rechunk: true,
        to_supertypes: true,
        ..Default::default()
    };
    Ok(concat_lf_diagonal(inputs, args)?.collect()?)
}

/// Sorted distinct values of a string column
fn distinct_strings(df: &DataFrame, name: &str) -> Result<BTreeSet<String>> {
    let values = column_series(df, name)?.cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

/// Reshape a long snapshot union (`id, date, space, delta, metrics...`) into
/// one row per `(id, date)` with a `{prefix}_{space}_{delta}_{metric}` column
/// for every observed (space, delta, metric) combination.
///
/// Combinations an entity lacks are null. Metrics listed in `dtypes` are cast
/// back to their declared dtype after the reshape.
pub fn pivot_panel(
    long: &DataFrame,
    prefix: &str,
    dtypes: &HashMap<String, DataType>,
) -> Result<DataFrame> {
    if long.width() == 0 {
        return Ok(DataFrame::empty());
    }

    let key_columns = [ID_COLUMN, DATE_COLUMN, SPACE_COLUMN, DELTA_COLUMN];
    for name in key_columns {
        if long.column(name).is_err() {
            return Err(PanelError::Schema(format!(
                "Cannot pivot: snapshot column '{}' is missing",
                name
            )));
        }
    }
    let metrics: Vec<String> = long
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .filter(|name| !key_columns.contains(&name.as_str()))
        .collect();

    let keys = long.select(key_columns)?;
    if keys.get_columns().iter().any(|c| c.null_count() > 0) {
        return Err(PanelError::Schema(
            "Cannot pivot: a row has a missing id, date, space or delta".to_string(),
        ));
    }
    let duplicated = keys.is_duplicated()?;
    if duplicated.any() {
        return Err(PanelError::Schema(format!(
            "Cannot pivot: {} rows share an (id, date, space, delta) entry",
            duplicated.num_trues()
        )));
    }

    if long.height() == 0 {
        return Ok(long.select([ID_COLUMN, DATE_COLUMN])?);
    }

    let spaces = distinct_strings(long, SPACE_COLUMN)?;
    let deltas = distinct_strings(long, DELTA_COLUMN)?;

    let cells = long
        .clone()
        .lazy()
        .with_column(concat_str([col(SPACE_COLUMN), col(DELTA_COLUMN)], "_", false).alias(CELL_COLUMN))
        .collect()?;

    let mut columns: Vec<Column> = Vec::new();
    for metric in &metrics {
        let wide = pivot_stable(
            &cells,
            [CELL_COLUMN],
            Some([ID_COLUMN, DATE_COLUMN]),
            Some([metric.as_str()]),
            false,
            None,
            None,
        )?;
        if columns.is_empty() {
            columns.extend(wide.select([ID_COLUMN, DATE_COLUMN])?.take_columns());
        }

        let source_dtype = long.column(metric)?.dtype().clone();
        for space in &spaces {
            for delta in &deltas {
                let name = PanelColumn::new(prefix, space, delta, metric)?.to_string();
                let cell = format!("{}_{}", space, delta);
                let mut values = match wide.column(&cell) {
                    Ok(column) => column.as_materialized_series().clone(),
                    Err(_) => Series::full_null(name.as_str().into(), wide.height(), &source_dtype),
                };
                if let Some(dtype) = dtypes.get(metric) {
                    values = values.strict_cast(dtype).map_err(|e| {
                        PanelError::Schema(format!(
                            "Cannot restore dtype {} for column {}: {}",
                            dtype, name, e
                        ))
                    })?;
                }
                values.rename(name.into());
                columns.push(Column::from(values));
            }
        }
    }

    Ok(DataFrame::new(columns)?)
}
