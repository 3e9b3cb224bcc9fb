//! Polars column helpers.
//!
//! The checkpoints are small per-shard frames built from and read back into
//! Rust structs. These helpers do the typed column conversion in both
//! directions so callers never touch physical representations directly.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Builds a nullable `Int64` column.
pub fn i64_column(name: &str, values: &[Option<i64>]) -> Column {
    Column::new(name.into(), values)
}

/// Builds a nullable `Float64` column.
pub fn f64_column(name: &str, values: &[Option<f64>]) -> Column {
    Column::new(name.into(), values)
}

/// Builds a nullable `Float32` column.
pub fn f32_column(name: &str, values: &[Option<f32>]) -> Column {
    Column::new(name.into(), values)
}

/// Builds a nullable `String` column.
pub fn string_column(name: &str, values: &[Option<String>]) -> Column {
    Column::new(name.into(), values)
}

/// Builds a nullable `Date` column.
pub fn date_column(name: &str, values: &[Option<NaiveDate>]) -> PolarsResult<Column> {
    let days: Vec<Option<i32>> = values.iter().map(|v| v.map(days_since_epoch)).collect();
    Column::new(name.into(), days).cast(&DataType::Date)
}

/// Builds a nullable `Datetime[us]` column.
pub fn datetime_column(name: &str, values: &[Option<NaiveDateTime>]) -> PolarsResult<Column> {
    let micros: Vec<Option<i64>> = values
        .iter()
        .map(|v| v.map(|dt| dt.and_utc().timestamp_micros()))
        .collect();
    Column::new(name.into(), micros).cast(&DataType::Datetime(TimeUnit::Microseconds, None))
}

/// Reads a column as nullable `i64`, casting when needed.
pub fn read_i64s(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<i64>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Reads a column as nullable `f64`, casting when needed.
pub fn read_f64s(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Reads a column as nullable owned strings.
pub fn read_strings(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Reads a `Date` column.
pub fn read_dates(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let column = df
        .column(name)?
        .cast(&DataType::Date)?
        .cast(&DataType::Int32)?;
    Ok(column
        .i32()?
        .into_iter()
        .map(|v| v.and_then(date_from_epoch_days))
        .collect())
}

/// Reads a `Date` or `Datetime` column as naive timestamps.
pub fn read_datetimes(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDateTime>>> {
    let column = df
        .column(name)?
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
        .cast(&DataType::Int64)?;
    Ok(column
        .i64()?
        .into_iter()
        .map(|v| v.and_then(DateTime::from_timestamp_micros).map(|dt| dt.naive_utc()))
        .collect())
}
