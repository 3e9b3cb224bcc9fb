//! Cleaning rules loading.

use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use meds_common::{parse_f64, parse_i64};
use meds_model::{CleaningRule, CleaningRules};

use crate::error::Result;
use crate::table::{DelimitedReader, field};

/// Identifier type of rules keyed by medical term.
pub const MEDICAL_TERM_IDENTIFIER: &str = "MedicalTerm";

/// Loads the curated cleaning rules.
///
/// Returns `Ok(None)` with a warning when the file does not exist. Only
/// `IdentifierType == "MedicalTerm"` rows are used; rows with an
/// unparseable unit, factor or range are skipped with a warning. A missing
/// `ConversionBias` is 0.
pub fn load_cleaning_rules(path: &Path) -> Result<Option<CleaningRules>> {
    if !path.is_file() {
        warn!(path = %path.display(), "cleaning rules file not found, values pass through unchanged");
        return Ok(None);
    }

    let mut reader = DelimitedReader::open(path)?;
    let type_col = reader.require("IdentifierType")?;
    let id_col = reader.require("Identifier")?;
    let unit_col = reader.require("UnitID")?;
    let factor_col = reader.require("ConversionFactor")?;
    let bias_col = reader.column("ConversionBias");
    let min_col = reader.require("ValidMin")?;
    let max_col = reader.require("ValidMax")?;

    let mut rules = CleaningRules::new();
    let mut skipped = 0usize;
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        let identifier_type = field(&record, Some(type_col)).unwrap_or_default();
        if identifier_type != MEDICAL_TERM_IDENTIFIER {
            continue;
        }
        let Some(identifier) = field(&record, Some(id_col)) else {
            continue;
        };

        let parsed = (
            field(&record, Some(unit_col)).and_then(parse_i64),
            field(&record, Some(factor_col)).and_then(parse_f64),
            field(&record, Some(min_col)).and_then(parse_f64),
            field(&record, Some(max_col)).and_then(parse_f64),
        );
        let (Some(unit_id), Some(conversion_factor), Some(valid_min), Some(valid_max)) = parsed
        else {
            skipped += 1;
            warn!(
                path = %path.display(),
                row = reader.row(),
                identifier,
                "skipping cleaning rule with unparseable unit, factor or range"
            );
            continue;
        };

        rules.insert(CleaningRule {
            identifier_type: identifier_type.to_string(),
            identifier: identifier.to_string(),
            unit_id,
            conversion_factor,
            conversion_bias: field(&record, bias_col).and_then(parse_f64).unwrap_or(0.0),
            valid_min,
            valid_max,
        });
    }

    info!(path = %path.display(), rules = rules.len(), skipped, "loaded cleaning rules");
    Ok(Some(rules))
}
