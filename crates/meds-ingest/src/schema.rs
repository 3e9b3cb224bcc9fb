//! Per-file schema detection.
//!
//! Raw extracts expose the same information under different column names.
//! Detection reads only the header row and resolves each logical field to a
//! column index, so reading never relies on a column being present.

use std::fmt;
use std::path::Path;

use meds_model::Vocabulary;

use crate::error::Result;
use crate::table::read_headers;

/// Recognized patient-id column names, in order of preference.
pub const PATIENT_ID_COLUMNS: [&str; 3] = ["e_patid", "patid", "consid"];

/// Kind of raw extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Observation,
    DrugIssue,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Observation => "observation",
            SourceKind::DrugIssue => "drug_issue",
        }
    }

    pub fn vocabulary(&self) -> Vocabulary {
        match self {
            SourceKind::Observation => Vocabulary::MedCode,
            SourceKind::DrugIssue => Vocabulary::ProdCode,
        }
    }

    fn date_column(&self) -> &'static str {
        match self {
            SourceKind::Observation => "obsdate",
            SourceKind::DrugIssue => "issuedate",
        }
    }

    fn code_column(&self) -> &'static str {
        match self {
            SourceKind::Observation => "medcodeid",
            SourceKind::DrugIssue => "prodcodeid",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column indices of one raw extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSchema {
    pub kind: SourceKind,
    pub patient_id_column: String,
    pub patient_id: usize,
    pub code: usize,
    pub date: Option<usize>,
    pub value: Option<usize>,
    pub unit: Option<usize>,
    pub duration: Option<usize>,
}

/// Outcome of probing a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaProbe {
    Recognized(SourceSchema),
    Unrecognized { reason: String },
}

/// Resolves logical fields against a normalized header row.
pub fn probe_schema(headers: &[String], kind: SourceKind) -> SchemaProbe {
    let find = |name: &str| headers.iter().position(|h| h == name);

    let Some((patient_id_column, patient_id)) = PATIENT_ID_COLUMNS
        .iter()
        .find_map(|name| find(name).map(|idx| (name.to_string(), idx)))
    else {
        return SchemaProbe::Unrecognized {
            reason: format!(
                "no patient id column (expected one of {})",
                PATIENT_ID_COLUMNS.join(", ")
            ),
        };
    };

    let Some(code) = find(kind.code_column()) else {
        return SchemaProbe::Unrecognized {
            reason: format!("no '{}' column", kind.code_column()),
        };
    };

    let (value, unit, duration) = match kind {
        SourceKind::Observation => (find("value"), find("numunitid"), None),
        SourceKind::DrugIssue => (None, None, find("duration")),
    };

    SchemaProbe::Recognized(SourceSchema {
        kind,
        patient_id_column,
        patient_id,
        code,
        date: find(kind.date_column()),
        value,
        unit,
        duration,
    })
}

/// Reads the header of `path` and probes it.
pub fn detect_schema(path: &Path, kind: SourceKind) -> Result<SchemaProbe> {
    let headers = read_headers(path)?;
    Ok(probe_schema(&headers, kind))
}
