//! Value cleaning over a finished event stream.
//!
//! - `LAB`: curated conversion and valid range, joined on `(term, unit)`
//! - `MEASUREMENT`: global per-term outlier rejection at median ± 3σ
//!
//! Cleaning only ever replaces `numeric_value` with null. Rows are never
//! removed or reordered.

use std::collections::HashMap;

use tracing::debug;

use meds_model::{Category, CleaningRules, StreamEvent, code_term};

use crate::episodes::{median, sample_std};

/// Width of the accepted band in standard deviations.
pub const OUTLIER_SIGMAS: f64 = 3.0;

/// Rule lookup key of a code: its term with any `/` removed.
pub fn rule_identifier(code: &str) -> Option<String> {
    code_term(code).map(|term| term.replace('/', ""))
}

/// Median and sample deviation of one measurement term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermStats {
    pub median: f64,
    /// `None` for a term seen once.
    pub std: Option<f64>,
}

impl TermStats {
    pub fn new(median: f64, std: Option<f64>) -> Self {
        Self { median, std }
    }

    /// `[max(0, median - 3σ), median + 3σ]`, or `None` without a σ.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let std = self.std?;
        let lower = (self.median - OUTLIER_SIGMAS * std).max(0.0);
        Some((lower, self.median + OUTLIER_SIGMAS * std))
    }

    pub fn accepts(&self, value: f64) -> bool {
        self.bounds()
            .is_none_or(|(lower, upper)| lower <= value && value <= upper)
    }
}

/// Collects measurement values across every shard of a stream.
#[derive(Debug, Clone, Default)]
pub struct MeasurementStats {
    values: HashMap<String, Vec<f64>>,
}

impl MeasurementStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &StreamEvent) {
        if event.category() != Some(Category::Measurement) {
            return;
        }
        let (Some(value), Some(term)) = (event.numeric_value, rule_identifier(&event.code)) else {
            return;
        };
        self.values.entry(term).or_default().push(f64::from(value));
    }

    pub fn observe_all<'a>(&mut self, events: impl IntoIterator<Item = &'a StreamEvent>) {
        for event in events {
            self.observe(event);
        }
    }

    pub fn finish(self) -> HashMap<String, TermStats> {
        self.values
            .into_iter()
            .filter_map(|(term, values)| {
                let median = median(&values)?;
                Some((term, TermStats::new(median, sample_std(&values))))
            })
            .collect()
    }
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// Not a candidate: no value, or a category that is never cleaned.
    Untouched,
    /// Value rewritten by a lab rule.
    Converted,
    /// Value nulled by a lab rule.
    RejectedByRule,
    /// Lab value without a matching rule, passed through.
    NoRule,
    /// Measurement value inside its band.
    Accepted,
    /// Measurement value nulled as an outlier.
    RejectedOutlier,
}

/// Per-outcome counts for a cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningCounts {
    pub untouched: u64,
    pub converted: u64,
    pub rejected_by_rule: u64,
    pub no_rule: u64,
    pub accepted: u64,
    pub rejected_outlier: u64,
}

impl CleaningCounts {
    pub fn record(&mut self, outcome: CleanOutcome) {
        let slot = match outcome {
            CleanOutcome::Untouched => &mut self.untouched,
            CleanOutcome::Converted => &mut self.converted,
            CleanOutcome::RejectedByRule => &mut self.rejected_by_rule,
            CleanOutcome::NoRule => &mut self.no_rule,
            CleanOutcome::Accepted => &mut self.accepted,
            CleanOutcome::RejectedOutlier => &mut self.rejected_outlier,
        };
        *slot += 1;
    }

    pub fn merge(&mut self, other: &CleaningCounts) {
        self.untouched += other.untouched;
        self.converted += other.converted;
        self.rejected_by_rule += other.rejected_by_rule;
        self.no_rule += other.no_rule;
        self.accepted += other.accepted;
        self.rejected_outlier += other.rejected_outlier;
    }

    pub fn nulled(&self) -> u64 {
        self.rejected_by_rule + self.rejected_outlier
    }
}

/// Applies lab rules and measurement bounds.
#[derive(Debug, Clone, Default)]
pub struct ValueCleaner {
    rules: Option<CleaningRules>,
    measurements: HashMap<String, TermStats>,
}

impl ValueCleaner {
    /// `rules` is `None` when the rules file is missing; lab values then
    /// pass through.
    pub fn new(rules: Option<CleaningRules>, measurements: HashMap<String, TermStats>) -> Self {
        Self {
            rules,
            measurements,
        }
    }

    pub fn has_rules(&self) -> bool {
        self.rules.is_some()
    }

    pub fn clean(&self, event: &mut StreamEvent) -> CleanOutcome {
        let Some(value) = event.numeric_value else {
            return CleanOutcome::Untouched;
        };
        match event.category() {
            Some(Category::Lab) => self.clean_lab(event, f64::from(value)),
            Some(Category::Measurement) => self.clean_measurement(event, f64::from(value)),
            _ => CleanOutcome::Untouched,
        }
    }

    fn clean_lab(&self, event: &mut StreamEvent, value: f64) -> CleanOutcome {
        let rule = self.rules.as_ref().and_then(|rules| {
            let identifier = rule_identifier(&event.code)?;
            rules.get(&identifier, event.numunit_id?)
        });
        let Some(rule) = rule else {
            return CleanOutcome::NoRule;
        };
        match rule.standardize(value) {
            Some(converted) => {
                event.numeric_value = Some(converted as f32);
                CleanOutcome::Converted
            }
            None => {
                event.numeric_value = None;
                CleanOutcome::RejectedByRule
            }
        }
    }

    fn clean_measurement(&self, event: &mut StreamEvent, value: f64) -> CleanOutcome {
        let accepted = rule_identifier(&event.code)
            .and_then(|term| self.measurements.get(&term))
            .is_none_or(|stats| stats.accepts(value));
        if accepted {
            CleanOutcome::Accepted
        } else {
            event.numeric_value = None;
            CleanOutcome::RejectedOutlier
        }
    }

    /// Cleans a shard in place.
    pub fn clean_all(&self, events: &mut [StreamEvent]) -> CleaningCounts {
        let mut counts = CleaningCounts::default();
        for event in events.iter_mut() {
            counts.record(self.clean(event));
        }
        debug!(
            rows = events.len(),
            nulled = counts.nulled(),
            converted = counts.converted,
            "cleaned shard"
        );
        counts
    }
}
