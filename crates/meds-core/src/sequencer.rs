//! Event sequencing.
//!
//! Adds the synthetic birth and diagnosis events, removes repeated
//! lifestyle statuses and same-day duplicates, and puts every subject's
//! events in canonical order:
//!
//! 1. `MEDS_BIRTH`
//! 2. events without a time
//! 3. everything else by ascending time
//!
//! All sorts are stable, so ties keep their input order across runs.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use meds_model::{RawEvent, StreamEvent, Subject, code_term, diagnosis_code, midnight, short_code};

/// Smoking and drinking status terms. Only the first occurrence per subject
/// is kept.
pub const LIFESTYLE_TERMS: [&str; 9] = [
    "Non-drinker",
    "Drinker - unspecified",
    "Drinker - within limits",
    "Drinker - excess/disorder",
    "current or ex-smoker",
    "current smoker",
    "ex-smoker",
    "nicotine or tobacco use",
    "non-smoker",
];

pub fn is_lifestyle_term(term: &str) -> bool {
    LIFESTYLE_TERMS.contains(&term)
}

/// An event that can be put in canonical order.
pub trait Sequenced {
    fn subject_id(&self) -> i64;
    fn sort_time(&self) -> Option<NaiveDateTime>;
    fn is_birth(&self) -> bool;

    /// 0 for birth, 1 for undated, 2 otherwise.
    fn sort_priority(&self) -> u8 {
        if self.is_birth() {
            0
        } else if self.sort_time().is_none() {
            1
        } else {
            2
        }
    }
}

impl Sequenced for RawEvent {
    fn subject_id(&self) -> i64 {
        self.subject_id
    }

    fn sort_time(&self) -> Option<NaiveDateTime> {
        self.time.map(midnight)
    }

    fn is_birth(&self) -> bool {
        RawEvent::is_birth(self)
    }
}

impl Sequenced for StreamEvent {
    fn subject_id(&self) -> i64 {
        self.subject_id
    }

    fn sort_time(&self) -> Option<NaiveDateTime> {
        self.time
    }

    fn is_birth(&self) -> bool {
        StreamEvent::is_birth(self)
    }
}

type SortKey = (i64, u8, Option<NaiveDateTime>);

fn sort_key<E: Sequenced>(event: &E) -> SortKey {
    (event.subject_id(), event.sort_priority(), event.sort_time())
}

/// Stable sort by `(subject_id, priority, time)`.
pub fn canonical_sort<E: Sequenced>(events: &mut [E]) {
    events.sort_by_key(sort_key);
}

/// Whether `events` already satisfy the canonical order.
pub fn is_canonically_ordered<E: Sequenced>(events: &[E]) -> bool {
    events
        .windows(2)
        .all(|pair| sort_key(&pair[0]) <= sort_key(&pair[1]))
}

/// Keeps the first occurrence of each lifestyle term per subject, in input
/// order. Other events are untouched.
pub fn dedup_lifestyle(events: Vec<StreamEvent>) -> Vec<StreamEvent> {
    let mut seen: HashSet<(i64, String)> = HashSet::new();
    events
        .into_iter()
        .filter(|event| match code_term(&event.code) {
            Some(term) if is_lifestyle_term(term) => {
                seen.insert((event.subject_id, term.to_string()))
            }
            _ => true,
        })
        .collect()
}

/// Collapses rows sharing `(subject_id, time, CATEGORY//term//)` to the
/// first after a stable sort on time alone. The result is in time order,
/// not canonical order.
pub fn collapse_near_duplicates(mut events: Vec<StreamEvent>) -> Vec<StreamEvent> {
    events.sort_by_key(|event| event.time);
    let mut seen: HashSet<(i64, Option<NaiveDateTime>, String)> = HashSet::new();
    events.retain(|event| {
        seen.insert((
            event.subject_id,
            event.time,
            short_code(&event.code).to_string(),
        ))
    });
    events
}

/// Birth event for every subject, as scanned rows.
pub fn birth_events<'a>(subjects: impl IntoIterator<Item = &'a Subject>) -> Vec<RawEvent> {
    subjects.into_iter().map(RawEvent::birth).collect()
}

/// Assembles a shard's final stream.
#[derive(Debug, Clone)]
pub struct EventSequencer {
    cancer_type: String,
}

impl EventSequencer {
    pub fn new(cancer_type: impl Into<String>) -> Self {
        Self {
            cancer_type: cancer_type.into(),
        }
    }

    pub fn cancer_type(&self) -> &str {
        &self.cancer_type
    }

    /// The diagnosis event of a case, dated on the diagnosis.
    pub fn diagnosis_event(&self, subject: &Subject) -> Option<StreamEvent> {
        if !subject.is_case {
            return None;
        }
        let date = subject.cancer_date?;
        Some(StreamEvent::marker(
            subject.subject_id,
            Some(date),
            diagnosis_code(&self.cancer_type),
        ))
    }

    /// Lifestyle dedup, diagnosis events, near-duplicate collapse, then the
    /// canonical sort.
    pub fn assemble<'a>(
        &self,
        mut events: Vec<StreamEvent>,
        subjects: impl IntoIterator<Item = &'a Subject>,
    ) -> Vec<StreamEvent> {
        canonical_sort(&mut events);
        let mut events = dedup_lifestyle(events);
        for subject in subjects {
            if let Some(diagnosis) = self.diagnosis_event(subject) {
                events.push(diagnosis);
            }
        }
        let mut events = collapse_near_duplicates(events);
        canonical_sort(&mut events);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use meds_model::Split;

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn event(subject_id: i64, time: Option<NaiveDate>, code: &str) -> StreamEvent {
        StreamEvent::marker(subject_id, time, code)
    }

    #[test]
    fn birth_then_undated_then_by_time() {
        let subject = Subject::control(1, 1950, Split::Train);
        let mut events = vec![
            event(1, day(2020, 1, 1), "MEDICAL//a//1"),
            event(1, None, "MEDICAL//b//2"),
            event(1, day(2019, 1, 1), "MEDICAL//c//3"),
        ];
        events.push(StreamEvent::marker(1, subject.birth_date(), "MEDS_BIRTH"));
        canonical_sort(&mut events);

        let codes: Vec<&str> = events.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(
            codes,
            vec!["MEDS_BIRTH", "MEDICAL//b//2", "MEDICAL//c//3", "MEDICAL//a//1"]
        );
        assert!(is_canonically_ordered(&events));
    }

    #[test]
    fn three_smoker_records_keep_earliest() {
        let sequencer = EventSequencer::new("pancreatic");
        let events = vec![
            event(1, day(2018, 5, 1), "MEDICAL//current smoker//2"),
            event(1, day(2016, 5, 1), "MEDICAL//current smoker//1"),
            event(1, day(2017, 5, 1), "MEDICAL//current smoker//3"),
            event(1, day(2017, 5, 1), "MEDICAL//back pain//4"),
            event(1, day(2018, 5, 1), "MEDICAL//back pain//5"),
        ];
        let out = sequencer.assemble(events, &[Subject::control(1, 1950, Split::Train)]);

        let smoker: Vec<&StreamEvent> = out
            .iter()
            .filter(|e| e.code.contains("current smoker"))
            .collect();
        assert_eq!(smoker.len(), 1);
        assert_eq!(smoker[0].code, "MEDICAL//current smoker//1");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn same_day_same_term_collapses_across_raw_codes() {
        let events = vec![
            event(1, day(2019, 1, 1), "LAB//CRP//10"),
            event(1, day(2019, 1, 1), "LAB//CRP//20"),
            event(2, day(2019, 1, 1), "LAB//CRP//20"),
            event(1, day(2019, 1, 2), "LAB//CRP//20"),
        ];
        let out = collapse_near_duplicates(events);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].code, "LAB//CRP//10");
    }

    #[test]
    fn diagnosis_added_for_cases_only() {
        let sequencer = EventSequencer::new("pancreatic");
        let case = Subject::case(1, 1960, NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(), Split::Val);
        let control = Subject::control(2, 1960, Split::Val);

        let out = sequencer.assemble(Vec::new(), [&case, &control]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, "MEDICAL//pancreatic_cancer//");
        assert_eq!(out[0].subject_id, 1);
        assert!(sequencer.diagnosis_event(&control).is_none());
    }
}
