//! Per-subject trajectory windows.
//!
//! - Case: `[cancer_date - 5y, cancer_date]`
//! - Control: `[last_observed - 6y, last_observed - 1y]`, where
//!   `last_observed` is the subject's own latest non-null event date.
//!
//! Bounds are inclusive. Events without a date are never filtered here.

use std::collections::HashMap;

use chrono::{Months, NaiveDate};

use meds_model::{RawEvent, Subject, SubjectTable};

pub const CASE_LOOKBACK_YEARS: u32 = 5;
pub const CONTROL_LOOKBACK_YEARS: u32 = 6;
pub const CONTROL_GAP_YEARS: u32 = 1;

fn years_before(date: NaiveDate, years: u32) -> Option<NaiveDate> {
    date.checked_sub_months(Months::new(12 * years))
}

/// Inclusive date range of retained events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TrajectoryWindow {
    /// Computes the window for one subject.
    ///
    /// Returns `None` for a case without a diagnosis date and for a control
    /// without any dated event.
    pub fn for_subject(subject: &Subject, last_observed: Option<NaiveDate>) -> Option<Self> {
        if subject.is_case {
            let end = subject.cancer_date?;
            Some(Self {
                start: years_before(end, CASE_LOOKBACK_YEARS)?,
                end,
            })
        } else {
            let last = last_observed?;
            Some(Self {
                start: years_before(last, CONTROL_LOOKBACK_YEARS)?,
                end: years_before(last, CONTROL_GAP_YEARS)?,
            })
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Latest non-null event date per subject, accumulated over a scan.
#[derive(Debug, Clone, Default)]
pub struct LastObserved {
    dates: HashMap<i64, NaiveDate>,
}

impl LastObserved {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, subject_id: i64, date: Option<NaiveDate>) {
        let Some(date) = date else {
            return;
        };
        self.dates
            .entry(subject_id)
            .and_modify(|last| {
                if date > *last {
                    *last = date;
                }
            })
            .or_insert(date);
    }

    pub fn get(&self, subject_id: i64) -> Option<NaiveDate> {
        self.dates.get(&subject_id).copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Windows for every subject of the table, computed once.
#[derive(Debug, Clone, Default)]
pub struct WindowFilter {
    windows: HashMap<i64, TrajectoryWindow>,
}

impl WindowFilter {
    pub fn new(subjects: &SubjectTable, last_observed: &LastObserved) -> Self {
        let windows = subjects
            .iter()
            .filter_map(|subject| {
                TrajectoryWindow::for_subject(subject, last_observed.get(subject.subject_id))
                    .map(|window| (subject.subject_id, window))
            })
            .collect();
        Self { windows }
    }

    pub fn window(&self, subject_id: i64) -> Option<&TrajectoryWindow> {
        self.windows.get(&subject_id)
    }

    /// Whether `event` survives windowing. Subjects without a window keep
    /// nothing; undated events of windowed subjects are kept.
    pub fn retains(&self, event: &RawEvent) -> bool {
        let Some(window) = self.windows.get(&event.subject_id) else {
            return false;
        };
        event.time.is_none_or(|date| window.contains(date))
    }

    /// Number of subjects with a window.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meds_model::{Split, Vocabulary};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(subject_id: i64, time: Option<NaiveDate>) -> RawEvent {
        RawEvent::new(subject_id, time, Vocabulary::MedCode, "1")
    }

    #[test]
    fn case_window_boundaries_are_inclusive() {
        let case = Subject::case(1, 1960, date(2020, 6, 15), Split::Train);
        let window = TrajectoryWindow::for_subject(&case, None).unwrap();
        assert_eq!(window.start, date(2015, 6, 15));
        assert_eq!(window.end, date(2020, 6, 15));

        assert!(window.contains(date(2015, 6, 15)));
        assert!(window.contains(date(2020, 6, 15)));
        assert!(!window.contains(date(2015, 6, 14)));
        assert!(!window.contains(date(2020, 6, 16)));
    }

    #[test]
    fn control_window_uses_own_last_date() {
        let subjects: SubjectTable = [
            Subject::control(1, 1950, Split::Train),
            Subject::control(2, 1950, Split::Train),
        ]
        .into_iter()
        .collect();
        let mut last = LastObserved::new();
        last.observe(1, Some(date(2019, 3, 1)));
        last.observe(1, Some(date(2021, 3, 1)));
        last.observe(1, None);
        last.observe(2, Some(date(2010, 1, 1)));

        let filter = WindowFilter::new(&subjects, &last);
        let window = filter.window(1).unwrap();
        assert_eq!(window.start, date(2015, 3, 1));
        assert_eq!(window.end, date(2020, 3, 1));
        assert_eq!(filter.window(2).unwrap().end, date(2009, 1, 1));
    }

    #[test]
    fn undated_events_bypass_the_window() {
        let subjects: SubjectTable = [
            Subject::case(1, 1960, date(2020, 6, 15), Split::Train),
            Subject::control(2, 1950, Split::Val),
        ]
        .into_iter()
        .collect();
        let filter = WindowFilter::new(&subjects, &LastObserved::new());

        assert!(filter.retains(&event(1, None)));
        assert!(filter.retains(&event(1, Some(date(2018, 1, 1)))));
        assert!(!filter.retains(&event(1, Some(date(2021, 1, 1)))));
        // A control with no dated events keeps nothing.
        assert!(!filter.retains(&event(2, None)));
        assert!(!filter.retains(&event(3, Some(date(2018, 1, 1)))));
    }

    #[test]
    fn leap_day_clamps_to_month_end() {
        let case = Subject::case(1, 1960, date(2020, 2, 29), Split::Test);
        let window = TrajectoryWindow::for_subject(&case, None).unwrap();
        assert_eq!(window.start, date(2015, 2, 28));
    }
}
