//! Drug episode consolidation.
//!
//! Prescriptions of one drug for one subject form a run. A new episode
//! opens on the first prescription and whenever the day gap to the previous
//! prescription exceeds `median + std + 14` of that run's gaps.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};

use meds_model::{MappedEvent, StreamEvent, drug_group, episode_end_code, episode_start_code};

/// Days added to the adaptive threshold.
pub const GRACE_DAYS: f64 = 14.0;

/// Supply assumed for a prescription without a recorded duration.
pub const DEFAULT_DURATION_DAYS: i64 = 60;

/// Median and sample standard deviation of a run's day gaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapStats {
    pub median: f64,
    pub std: f64,
}

impl GapStats {
    /// `None` when there are no gaps. The deviation is 0 for a single gap.
    pub fn from_gaps(gaps: &[f64]) -> Option<Self> {
        let median = median(gaps)?;
        let std = sample_std(gaps).unwrap_or(0.0);
        Some(Self { median, std })
    }

    pub fn threshold(&self) -> f64 {
        self.median + self.std + GRACE_DAYS
    }
}

/// Median of `values`; the mean of the middle pair for an even count.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len().is_multiple_of(2) {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (n - 1); `None` for fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// One consolidated exposure period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrugEpisode {
    pub subject_id: i64,
    pub drug_group: String,
    /// 1-based within `(subject_id, drug_group)`.
    pub episode_id: u32,
    pub start_time: NaiveDate,
    pub end_time: NaiveDate,
}

impl DrugEpisode {
    /// The START and END events of this episode.
    pub fn into_events(self) -> [StreamEvent; 2] {
        [
            StreamEvent::marker(
                self.subject_id,
                Some(self.start_time),
                episode_start_code(&self.drug_group),
            ),
            StreamEvent::marker(
                self.subject_id,
                Some(self.end_time),
                episode_end_code(&self.drug_group),
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
struct Issue {
    date: NaiveDate,
    duration: Option<i64>,
}

fn episode_end(last: Issue, max_date: NaiveDate) -> NaiveDate {
    let days = last.duration.unwrap_or(DEFAULT_DURATION_DAYS);
    if days >= 0 {
        max_date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        max_date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
    .unwrap_or(max_date)
}

fn consolidate_run(subject_id: i64, drug: &str, issues: &[Issue]) -> Vec<DrugEpisode> {
    let gaps: Vec<f64> = issues
        .windows(2)
        .map(|pair| (pair[1].date - pair[0].date).num_days() as f64)
        .collect();
    let threshold = GapStats::from_gaps(&gaps).map(|stats| stats.threshold());

    let mut episodes = Vec::new();
    let mut start = 0;
    for idx in 1..=issues.len() {
        let opens_new = idx == issues.len()
            || threshold.is_some_and(|limit| gaps[idx - 1] > limit);
        if !opens_new {
            continue;
        }
        let run = &issues[start..idx];
        if let (Some(first), Some(last)) = (run.first(), run.last()) {
            let max_date = run.iter().map(|issue| issue.date).max().unwrap_or(first.date);
            episodes.push(DrugEpisode {
                subject_id,
                drug_group: drug.to_string(),
                episode_id: u32::try_from(episodes.len() + 1).unwrap_or(u32::MAX),
                start_time: first.date,
                end_time: episode_end(*last, max_date),
            });
        }
        start = idx;
    }
    episodes
}

/// Consolidates prescription events into episodes.
///
/// Non-prescription events and undated prescriptions are ignored. Output is
/// ordered by subject, drug and episode.
pub fn consolidate(prescriptions: &[MappedEvent]) -> Vec<DrugEpisode> {
    let mut runs: BTreeMap<(i64, &str), Vec<Issue>> = BTreeMap::new();
    for event in prescriptions {
        let (Some(drug), Some(date)) = (drug_group(&event.code), event.time) else {
            continue;
        };
        runs.entry((event.subject_id, drug)).or_default().push(Issue {
            date,
            duration: event.duration,
        });
    }

    runs.into_iter()
        .flat_map(|((subject_id, drug), mut issues)| {
            issues.sort_by_key(|issue| issue.date);
            consolidate_run(subject_id, drug, &issues)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meds_model::Category;

    fn script(subject_id: i64, day: u64, drug: &str, duration: Option<i64>) -> MappedEvent {
        let origin = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        MappedEvent {
            subject_id,
            time: origin.checked_add_days(Days::new(day)),
            code: format!("PRESCRIPTION//{drug}//{day}"),
            category: Category::Prescription,
            numeric_value: None,
            numunit_id: None,
            duration,
        }
    }

    #[test]
    fn long_gap_opens_second_episode() {
        let scripts = vec![
            script(1, 0, "DrugX", Some(28)),
            script(1, 28, "DrugX", Some(28)),
            script(1, 56, "DrugX", Some(28)),
            script(1, 400, "DrugX", None),
        ];
        let episodes = consolidate(&scripts);
        assert_eq!(episodes.len(), 2);

        let origin = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        assert_eq!(episodes[0].start_time, origin);
        assert_eq!(episodes[0].end_time, origin + Days::new(56 + 28));
        assert_eq!(episodes[1].episode_id, 2);
        assert_eq!(episodes[1].end_time, origin + Days::new(400 + 60));

        let events: Vec<StreamEvent> = episodes
            .into_iter()
            .flat_map(DrugEpisode::into_events)
            .collect();
        let starts = events
            .iter()
            .filter(|e| e.code == "START_PRESCRIPTION//DrugX//")
            .count();
        let ends = events
            .iter()
            .filter(|e| e.code == "END_PRESCRIPTION//DrugX//")
            .count();
        assert_eq!((starts, ends), (2, 2));
    }

    #[test]
    fn drugs_and_subjects_are_separate_runs() {
        let scripts = vec![
            script(1, 0, "DrugX", None),
            script(1, 10, "DrugY", None),
            script(2, 0, "DrugX", None),
            script(1, 30, "DrugX", None),
        ];
        let episodes = consolidate(&scripts);
        assert_eq!(episodes.len(), 3);
        assert!(episodes.iter().all(|e| e.episode_id == 1));
    }

    #[test]
    fn gap_statistics() {
        let stats = GapStats::from_gaps(&[28.0, 28.0, 344.0]).unwrap();
        assert_eq!(stats.median, 28.0);
        assert!((stats.std - 182.4).abs() < 0.1);
        assert_eq!(GapStats::from_gaps(&[30.0]).unwrap().std, 0.0);
        assert!(GapStats::from_gaps(&[]).is_none());
        assert_eq!(median(&[1.0, 4.0, 2.0, 3.0]), Some(2.5));
    }
}
