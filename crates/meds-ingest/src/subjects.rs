//! Subject table loading.

use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use meds_common::{parse_date, parse_flag, parse_i64};
use meds_model::{Split, Subject, SubjectTable};

use crate::error::{IngestError, Result};
use crate::table::{DelimitedReader, field};

fn invalid(reader: &DelimitedReader, field: &str, value: Option<&str>) -> IngestError {
    IngestError::InvalidValue {
        field: field.to_string(),
        value: value.unwrap_or_default().to_string(),
        path: reader.path().to_path_buf(),
        row: reader.row(),
    }
}

/// Loads the subject table.
///
/// Required columns: `subject_id`, `is_case`, `yob`, `split`; `cancerdate`
/// is read when present. Enrichment columns (`site`, `region`, `gender`,
/// `ethnicity`, ...) are ignored.
///
/// A malformed id, case flag or birth year is fatal. Rows with a split
/// outside train/val/test and repeated subject ids are skipped with a
/// warning. A case without a diagnosis date is kept and warned about.
pub fn load_subject_table(path: &Path) -> Result<SubjectTable> {
    let mut reader = DelimitedReader::open(path)?;
    let id_col = reader.require("subject_id")?;
    let case_col = reader.require("is_case")?;
    let yob_col = reader.require("yob")?;
    let split_col = reader.require("split")?;
    let date_col = reader.column("cancerdate");

    let mut table = SubjectTable::new();
    let mut record = StringRecord::new();
    let mut cases_without_date = 0usize;

    while reader.read_record(&mut record)? {
        let raw_id = field(&record, Some(id_col));
        let subject_id = raw_id
            .and_then(parse_i64)
            .ok_or_else(|| invalid(&reader, "subject_id", raw_id))?;

        let raw_case = field(&record, Some(case_col));
        let is_case = raw_case
            .and_then(parse_flag)
            .ok_or_else(|| invalid(&reader, "is_case", raw_case))?;

        let raw_yob = field(&record, Some(yob_col));
        let birth_year = raw_yob
            .and_then(parse_i64)
            .and_then(|y| i32::try_from(y).ok())
            .ok_or_else(|| invalid(&reader, "yob", raw_yob))?;

        let raw_split = field(&record, Some(split_col)).unwrap_or_default();
        let split: Split = match raw_split.parse() {
            Ok(split) => split,
            Err(_) => {
                warn!(
                    row = reader.row(),
                    split = raw_split,
                    "skipping subject with unknown split"
                );
                continue;
            }
        };

        let cancer_date = if is_case {
            field(&record, date_col).and_then(parse_date)
        } else {
            None
        };
        if is_case && cancer_date.is_none() {
            cases_without_date += 1;
            warn!(row = reader.row(), "case subject has no diagnosis date");
        }

        let inserted = table.insert(Subject {
            subject_id,
            is_case,
            cancer_date,
            birth_year,
            split,
        });
        if !inserted {
            warn!(row = reader.row(), "duplicate subject id, keeping first record");
        }
    }

    info!(
        path = %path.display(),
        subjects = table.len(),
        cases_without_date,
        "loaded subject table"
    );
    Ok(table)
}
