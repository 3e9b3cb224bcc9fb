//! Study subjects and their split assignment.
//!
//! The subject table is produced upstream (cohort matching and split
//! assignment) and is read-only here. Every event that reaches the output
//! must belong to a subject in this table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Dataset split a subject was assigned to.
///
/// The internal names (`train`, `val`, `test`) differ from the directory
/// names used on disk (`train`, `tuning`, `held_out`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// All splits in output order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Returns the name used in the subject table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    /// Returns the fixed on-disk directory name for this split.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "tuning",
            Split::Test => "held_out",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Split {
    type Err = ModelError;

    /// Accepts both the internal names and the on-disk directory names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" | "tuning" => Ok(Split::Val),
            "test" | "held_out" => Ok(Split::Test),
            _ => Err(ModelError::UnknownSplit(s.to_string())),
        }
    }
}

/// One study participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: i64,
    pub is_case: bool,
    /// Diagnosis date; present for cases only.
    pub cancer_date: Option<NaiveDate>,
    pub birth_year: i32,
    pub split: Split,
}

impl Subject {
    /// Creates a control subject (no diagnosis date).
    pub fn control(subject_id: i64, birth_year: i32, split: Split) -> Self {
        Self {
            subject_id,
            is_case: false,
            cancer_date: None,
            birth_year,
            split,
        }
    }

    /// Creates a case subject diagnosed on `cancer_date`.
    pub fn case(subject_id: i64, birth_year: i32, cancer_date: NaiveDate, split: Split) -> Self {
        Self {
            subject_id,
            is_case: true,
            cancer_date: Some(cancer_date),
            birth_year,
            split,
        }
    }

    /// January 1 of the birth year, or `None` for an out-of-range year.
    pub fn birth_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.birth_year, 1, 1)
    }
}

/// Subject table keyed by subject id.
#[derive(Debug, Clone, Default)]
pub struct SubjectTable {
    subjects: BTreeMap<i64, Subject>,
}

impl SubjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a subject. The first record for a subject id wins; returns
    /// `false` when the id was already present.
    pub fn insert(&mut self, subject: Subject) -> bool {
        if self.subjects.contains_key(&subject.subject_id) {
            return false;
        }
        self.subjects.insert(subject.subject_id, subject);
        true
    }

    pub fn get(&self, subject_id: i64) -> Option<&Subject> {
        self.subjects.get(&subject_id)
    }

    pub fn contains(&self, subject_id: i64) -> bool {
        self.subjects.contains_key(&subject_id)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Iterates subjects in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.values()
    }

    /// Sorted, de-duplicated subject ids assigned to `split`.
    pub fn ids_in_split(&self, split: Split) -> Vec<i64> {
        self.subjects
            .values()
            .filter(|subject| subject.split == split)
            .map(|subject| subject.subject_id)
            .collect()
    }
}

impl FromIterator<Subject> for SubjectTable {
    fn from_iter<I: IntoIterator<Item = Subject>>(iter: I) -> Self {
        let mut table = SubjectTable::new();
        for subject in iter {
            table.insert(subject);
        }
        table
    }
}
