//! Conversion between event records and checkpoint frames.

use polars::prelude::{DataFrame, PolarsResult};

use meds_common::{
    date_column, datetime_column, f32_column, f64_column, i64_column, read_dates, read_datetimes,
    read_f64s, read_i64s, read_strings, string_column,
};
use meds_model::{RawEvent, StreamEvent};

pub const SUBJECT_ID: &str = "subject_id";
pub const TIME: &str = "time";
pub const CODE: &str = "code";
pub const NUMERIC_VALUE: &str = "numeric_value";
pub const TEXT_VALUE: &str = "text_value";
pub const NUMUNIT_ID: &str = "numunit_id";
pub const DURATION: &str = "duration";

/// Column layout of a stream checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLayout {
    /// Mapped stream; keeps `numunit_id` for the cleaning join.
    Mapped,
    /// Final cleaned stream; the five canonical columns only.
    Final,
}

/// Frame of the extract and sort checkpoints.
pub fn raw_events_to_frame(events: &[RawEvent]) -> PolarsResult<DataFrame> {
    let subject_ids: Vec<Option<i64>> = events.iter().map(|e| Some(e.subject_id)).collect();
    let times: Vec<_> = events.iter().map(|e| e.time).collect();
    let codes: Vec<Option<String>> = events.iter().map(|e| Some(e.code.clone())).collect();
    let values: Vec<Option<f64>> = events.iter().map(|e| e.numeric_value).collect();
    let units: Vec<Option<i64>> = events.iter().map(|e| e.numunit_id).collect();
    let durations: Vec<Option<i64>> = events.iter().map(|e| e.duration).collect();

    DataFrame::new(vec![
        i64_column(SUBJECT_ID, &subject_ids),
        date_column(TIME, &times)?,
        string_column(CODE, &codes),
        f64_column(NUMERIC_VALUE, &values),
        i64_column(NUMUNIT_ID, &units),
        i64_column(DURATION, &durations),
    ])
}

/// Reads the extract and sort checkpoints back. Rows with a null subject
/// id or code are dropped.
pub fn raw_events_from_frame(df: &DataFrame) -> PolarsResult<Vec<RawEvent>> {
    let subject_ids = read_i64s(df, SUBJECT_ID)?;
    let times = read_dates(df, TIME)?;
    let codes = read_strings(df, CODE)?;
    let values = read_f64s(df, NUMERIC_VALUE)?;
    let units = read_i64s(df, NUMUNIT_ID)?;
    let durations = read_i64s(df, DURATION)?;

    let mut events = Vec::with_capacity(df.height());
    for (idx, (subject_id, code)) in subject_ids.into_iter().zip(codes).enumerate() {
        let (Some(subject_id), Some(code)) = (subject_id, code) else {
            continue;
        };
        events.push(RawEvent {
            subject_id,
            time: times[idx],
            code,
            numeric_value: values[idx],
            numunit_id: units[idx],
            duration: durations[idx],
        });
    }
    Ok(events)
}

/// Frame of a stream checkpoint in the given layout.
pub fn stream_events_to_frame(
    events: &[StreamEvent],
    layout: StreamLayout,
) -> PolarsResult<DataFrame> {
    let subject_ids: Vec<Option<i64>> = events.iter().map(|e| Some(e.subject_id)).collect();
    let times: Vec<_> = events.iter().map(|e| e.time).collect();
    let codes: Vec<Option<String>> = events.iter().map(|e| Some(e.code.clone())).collect();
    let values: Vec<Option<f32>> = events.iter().map(|e| e.numeric_value).collect();
    let texts: Vec<Option<String>> = events.iter().map(|e| e.text_value.clone()).collect();

    let mut columns = vec![
        i64_column(SUBJECT_ID, &subject_ids),
        datetime_column(TIME, &times)?,
        string_column(CODE, &codes),
        f32_column(NUMERIC_VALUE, &values),
        string_column(TEXT_VALUE, &texts),
    ];
    if layout == StreamLayout::Mapped {
        let units: Vec<Option<i64>> = events.iter().map(|e| e.numunit_id).collect();
        columns.push(i64_column(NUMUNIT_ID, &units));
    }
    DataFrame::new(columns)
}

/// Reads a stream checkpoint of either layout.
pub fn stream_events_from_frame(df: &DataFrame) -> PolarsResult<Vec<StreamEvent>> {
    let subject_ids = read_i64s(df, SUBJECT_ID)?;
    let times = read_datetimes(df, TIME)?;
    let codes = read_strings(df, CODE)?;
    let values = read_f64s(df, NUMERIC_VALUE)?;
    let texts = read_strings(df, TEXT_VALUE)?;
    let units = if df.column(NUMUNIT_ID).is_ok() {
        read_i64s(df, NUMUNIT_ID)?
    } else {
        vec![None; df.height()]
    };

    let mut events = Vec::with_capacity(df.height());
    for (idx, (subject_id, code)) in subject_ids.into_iter().zip(codes).enumerate() {
        let (Some(subject_id), Some(code)) = (subject_id, code) else {
            continue;
        };
        events.push(StreamEvent {
            subject_id,
            time: times[idx],
            code,
            numeric_value: values[idx].map(|v| v as f32),
            text_value: texts[idx].clone(),
            numunit_id: units[idx],
        });
    }
    Ok(events)
}
