//! Event records at each pipeline stage.
//!
//! - [`RawEvent`]: a scanned source row, code still vocabulary-specific.
//! - [`MappedEvent`]: a raw event after code mapping.
//! - [`StreamEvent`]: the persisted unit of the event stream.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::code::{BIRTH_CODE, CODE_SEPARATOR, Category};
use crate::subject::Subject;

/// Source vocabulary of a raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Vocabulary {
    /// Observation medical codes.
    MedCode,
    /// Drug-issue product codes.
    ProdCode,
}

impl Vocabulary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vocabulary::MedCode => "medcodeid",
            Vocabulary::ProdCode => "prodcodeid",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "medcodeid" => Some(Vocabulary::MedCode),
            "prodcodeid" => Some(Vocabulary::ProdCode),
            _ => None,
        }
    }
}

impl fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scanned source row.
///
/// `code` is `{vocabulary}//{raw_code}` for scanned rows and `MEDS_BIRTH`
/// for the synthetic birth row added by the sort stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub subject_id: i64,
    pub time: Option<NaiveDate>,
    pub code: String,
    pub numeric_value: Option<f64>,
    pub numunit_id: Option<i64>,
    pub duration: Option<i64>,
}

impl RawEvent {
    pub fn new(
        subject_id: i64,
        time: Option<NaiveDate>,
        vocabulary: Vocabulary,
        raw_code: &str,
    ) -> Self {
        Self {
            subject_id,
            time,
            code: format!("{vocabulary}{CODE_SEPARATOR}{raw_code}"),
            numeric_value: None,
            numunit_id: None,
            duration: None,
        }
    }

    /// Synthetic birth row dated January 1 of the birth year.
    pub fn birth(subject: &Subject) -> Self {
        Self {
            subject_id: subject.subject_id,
            time: subject.birth_date(),
            code: BIRTH_CODE.to_string(),
            numeric_value: None,
            numunit_id: None,
            duration: None,
        }
    }

    pub fn with_value(mut self, value: Option<f64>) -> Self {
        self.numeric_value = value;
        self
    }

    pub fn with_unit(mut self, unit_id: Option<i64>) -> Self {
        self.numunit_id = unit_id;
        self
    }

    pub fn with_duration(mut self, duration: Option<i64>) -> Self {
        self.duration = duration;
        self
    }

    /// Splits the code into its vocabulary and raw code.
    pub fn raw_code(&self) -> Option<(Vocabulary, &str)> {
        let (prefix, raw) = self.code.split_once(CODE_SEPARATOR)?;
        Some((Vocabulary::from_prefix(prefix)?, raw))
    }

    pub fn is_birth(&self) -> bool {
        self.code == BIRTH_CODE
    }
}

/// A raw event with its canonical code resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedEvent {
    pub subject_id: i64,
    pub time: Option<NaiveDate>,
    pub code: String,
    pub category: Category,
    pub numeric_value: Option<f64>,
    pub numunit_id: Option<i64>,
    pub duration: Option<i64>,
}

impl MappedEvent {
    pub fn from_raw(raw: &RawEvent, code: String, category: Category) -> Self {
        Self {
            subject_id: raw.subject_id,
            time: raw.time,
            code,
            category,
            numeric_value: raw.numeric_value,
            numunit_id: raw.numunit_id,
            duration: raw.duration,
        }
    }

    /// Drops the prescription-only fields and widens the date to a timestamp.
    pub fn into_stream_event(self) -> StreamEvent {
        StreamEvent {
            subject_id: self.subject_id,
            time: self.time.map(midnight),
            code: self.code,
            numeric_value: self.numeric_value.map(|v| v as f32),
            text_value: None,
            numunit_id: self.numunit_id,
        }
    }
}

/// One persisted event-stream row.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub subject_id: i64,
    pub time: Option<NaiveDateTime>,
    pub code: String,
    pub numeric_value: Option<f32>,
    /// Always null in the current stream.
    pub text_value: Option<String>,
    pub numunit_id: Option<i64>,
}

impl StreamEvent {
    /// An event without value or unit, such as the synthetic birth,
    /// diagnosis and episode events.
    pub fn marker(subject_id: i64, time: Option<NaiveDate>, code: impl Into<String>) -> Self {
        Self {
            subject_id,
            time: time.map(midnight),
            code: code.into(),
            numeric_value: None,
            text_value: None,
            numunit_id: None,
        }
    }

    pub fn is_birth(&self) -> bool {
        self.code == BIRTH_CODE
    }

    pub fn category(&self) -> Option<Category> {
        Category::from_code(&self.code)
    }
}

/// Midnight of `date`.
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::Split;

    #[test]
    fn raw_code_splits_vocabulary() {
        let event = RawEvent::new(7, None, Vocabulary::ProdCode, "5551");
        assert_eq!(event.code, "prodcodeid//5551");
        assert_eq!(event.raw_code(), Some((Vocabulary::ProdCode, "5551")));

        let birth = RawEvent::birth(&Subject::control(7, 1950, Split::Train));
        assert!(birth.is_birth());
        assert_eq!(birth.raw_code(), None);
        assert_eq!(birth.time, NaiveDate::from_ymd_opt(1950, 1, 1));
    }

    #[test]
    fn stream_event_keeps_value_and_unit() {
        let raw = RawEvent::new(1, NaiveDate::from_ymd_opt(2020, 3, 4), Vocabulary::MedCode, "9")
            .with_value(Some(12.5))
            .with_unit(Some(3));
        let mapped = MappedEvent::from_raw(&raw, "LAB//CRP//9".to_string(), Category::Lab);
        let stream = mapped.into_stream_event();

        assert_eq!(stream.numeric_value, Some(12.5));
        assert_eq!(stream.numunit_id, Some(3));
        assert_eq!(stream.category(), Some(Category::Lab));
        assert_eq!(
            stream.time.map(|t| t.date()),
            NaiveDate::from_ymd_opt(2020, 3, 4)
        );
    }
}
