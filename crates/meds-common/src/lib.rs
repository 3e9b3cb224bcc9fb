//! Shared utilities for the MEDS event-stream crates.
//!
//! Polars column helpers for the parquet checkpoints, plus lenient scalar
//! parsing for raw source cells.

pub mod frame;
pub mod parse;

pub use frame::{
    date_column, datetime_column, f32_column, f64_column, i64_column, read_dates, read_datetimes,
    read_f64s, read_i64s, read_strings, string_column,
};
pub use parse::{parse_date, parse_f64, parse_flag, parse_i64};
