//! Restrict an event table to a time window ending at an as-of date

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use tracing::debug;

use super::frame::{column_series, datetime_lit, ensure_temporal};
use super::window::Window;
use crate::error::Result;

/// Keep rows with `end - window <= date_column < end`.
///
/// With an unbounded window only `date_column < end` applies. Rows with a
/// missing timestamp are dropped. The input frame is not modified.
pub fn censor(
    df: &DataFrame,
    date_column: &str,
    end: NaiveDateTime,
    window: &Window,
) -> Result<DataFrame> {
    ensure_temporal(column_series(df, date_column)?)?;

    let timestamp = col(date_column).cast(DataType::Datetime(TimeUnit::Microseconds, None));
    let mut keep = timestamp.clone().lt(datetime_lit(end));
    if let Some(start) = window.lower_bound(end) {
        keep = keep.and(timestamp.gt_eq(datetime_lit(start)));
    }

    let censored = df.clone().lazy().filter(keep).collect()?;
    debug!(
        column = date_column,
        end = %end,
        window = %window,
        kept = censored.height(),
        total = df.height(),
        "Censored events"
    );
    Ok(censored)
}

/// [`censor`] with a midnight as-of date
pub fn censor_date(
    df: &DataFrame,
    date_column: &str,
    end: NaiveDate,
    window: &Window,
) -> Result<DataFrame> {
    censor(df, date_column, NaiveDateTime::new(end, NaiveTime::MIN), window)
}
