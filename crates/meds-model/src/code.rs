//! Canonical code strings and event categories.
//!
//! Mapped events carry a code of the form `{CATEGORY}//{Term}//{RawCode}`.
//! Synthetic events use fixed codes (`MEDS_BIRTH`) or the same three-part
//! shape with an empty raw code (`MEDICAL//{type}_cancer//`,
//! `START_PRESCRIPTION//{drug}//`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Code of the synthetic birth event.
pub const BIRTH_CODE: &str = "MEDS_BIRTH";

/// Separator between the parts of a code.
pub const CODE_SEPARATOR: &str = "//";

/// Term used when an unmapped code is tagged instead of dropped.
pub const NULL_TERM: &str = "NULL";

/// Event category, derived from the code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Lab,
    Measurement,
    Medical,
    Prescription,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Lab => "LAB",
            Category::Measurement => "MEASUREMENT",
            Category::Medical => "MEDICAL",
            Category::Prescription => "PRESCRIPTION",
        }
    }

    /// Category of a canonical code, or `None` for synthetic and episode codes.
    pub fn from_code(code: &str) -> Option<Category> {
        let (prefix, _) = code.split_once(CODE_SEPARATOR)?;
        prefix.parse().ok()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LAB" => Ok(Category::Lab),
            "MEASUREMENT" => Ok(Category::Measurement),
            "MEDICAL" => Ok(Category::Medical),
            "PRESCRIPTION" => Ok(Category::Prescription),
            other => Err(ModelError::Message(format!("unknown category: {other}"))),
        }
    }
}

/// Builds `{CATEGORY}//{term}//{raw_code}`.
pub fn canonical_code(category: Category, term: &str, raw_code: &str) -> String {
    format!("{category}{CODE_SEPARATOR}{term}{CODE_SEPARATOR}{raw_code}")
}

/// The term segment of a three-part code (`LAB//Hemoglobin//123` -> `Hemoglobin`).
pub fn code_term(code: &str) -> Option<&str> {
    let (_, rest) = code.split_once(CODE_SEPARATOR)?;
    let (term, _) = rest.split_once(CODE_SEPARATOR)?;
    Some(term)
}

/// The `{CATEGORY}//{Term}//` prefix used to detect near-duplicates.
///
/// Codes without two separators (e.g. `MEDS_BIRTH`) are returned whole.
pub fn short_code(code: &str) -> &str {
    let Some(first) = code.find(CODE_SEPARATOR) else {
        return code;
    };
    let after_first = first + CODE_SEPARATOR.len();
    match code[after_first..].find(CODE_SEPARATOR) {
        Some(second) => &code[..after_first + second + CODE_SEPARATOR.len()],
        None => code,
    }
}

/// Drug group of a prescription code: the drug term with the raw product
/// code (pack size / formulation) stripped.
pub fn drug_group(code: &str) -> Option<&str> {
    if Category::from_code(code) != Some(Category::Prescription) {
        return None;
    }
    code_term(code)
}

/// Code of the synthetic diagnosis event.
pub fn diagnosis_code(cancer_type: &str) -> String {
    format!("MEDICAL{CODE_SEPARATOR}{cancer_type}_cancer{CODE_SEPARATOR}")
}

/// Code of the event opening a drug episode.
pub fn episode_start_code(drug: &str) -> String {
    format!("START_PRESCRIPTION{CODE_SEPARATOR}{drug}{CODE_SEPARATOR}")
}

/// Code of the event closing a drug episode.
pub fn episode_end_code(drug: &str) -> String {
    format!("END_PRESCRIPTION{CODE_SEPARATOR}{drug}{CODE_SEPARATOR}")
}
