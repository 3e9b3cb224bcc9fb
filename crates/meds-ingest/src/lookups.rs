//! Curated codelist and dictionary loaders.
//!
//! Loaders return plain row vectors in file order; deduplication (first
//! occurrence wins) is left to the mapping tables that consume them.

use std::collections::BTreeMap;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use meds_common::parse_i64;

use crate::error::Result;
use crate::table::{DelimitedReader, field};

/// One `(raw code, term)` pair from an expanded codelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodelistEntry {
    pub code: String,
    pub term: String,
}

/// The three code columns of the curated term codelist.
#[derive(Debug, Clone, Default)]
pub struct Codelists {
    /// `medcodes`: medical codes per term.
    pub primary: Vec<CodelistEntry>,
    /// `ReadcodeList`: read codes per term.
    pub read_codes: Vec<CodelistEntry>,
    /// `medcodes2`: independently curated medical codes per term.
    pub secondary: Vec<CodelistEntry>,
}

/// One medical dictionary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub med_code: String,
    pub read_code: Option<String>,
    pub snomed_concept: Option<String>,
}

/// Active ICD-10 target of a SNOMED concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icd10Target {
    pub snomed_concept: String,
    pub target: String,
}

/// Splits a codelist cell into codes.
///
/// Pieces are separated by commas and stripped of spaces, quotes and
/// brackets, so `"['123', '456']"` yields `["123", "456"]`.
pub fn expand_codes(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(|piece| piece.trim_matches(|c: char| matches!(c, ' ' | '\'' | '"' | '[' | ']')))
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

fn push_expanded(
    entries: &mut Vec<CodelistEntry>,
    record: &StringRecord,
    code_col: Option<usize>,
    term: &str,
) {
    if let Some(cell) = field(record, code_col) {
        entries.extend(expand_codes(cell).into_iter().map(|code| CodelistEntry {
            code,
            term: term.to_string(),
        }));
    }
}

/// Loads the curated term codelist (`MedicalTerm`, `medcodes`,
/// `ReadcodeList`, `medcodes2`).
///
/// `MedicalTerm` and `medcodes` are required; a missing `ReadcodeList` or
/// `medcodes2` column leaves that tier empty.
pub fn load_codelists(path: &Path) -> Result<Codelists> {
    let mut reader = DelimitedReader::open(path)?;
    let term_col = reader.require("MedicalTerm")?;
    let primary_col = reader.require("medcodes")?;
    let read_col = reader.column("ReadcodeList");
    let secondary_col = reader.column("medcodes2");
    for (name, col) in [("ReadcodeList", read_col), ("medcodes2", secondary_col)] {
        if col.is_none() {
            warn!(path = %path.display(), column = name, "codelist column absent, tier disabled");
        }
    }

    let mut codelists = Codelists::default();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        let Some(term) = field(&record, Some(term_col)) else {
            continue;
        };
        push_expanded(&mut codelists.primary, &record, Some(primary_col), term);
        push_expanded(&mut codelists.read_codes, &record, read_col, term);
        push_expanded(&mut codelists.secondary, &record, secondary_col, term);
    }

    info!(
        path = %path.display(),
        primary = codelists.primary.len(),
        read_codes = codelists.read_codes.len(),
        secondary = codelists.secondary.len(),
        "loaded codelists"
    );
    Ok(codelists)
}

/// Loads the product codelist (`DrugTerm`, comma-separated `prodcodes`).
pub fn load_product_codelist(path: &Path) -> Result<Vec<CodelistEntry>> {
    let mut reader = DelimitedReader::open(path)?;
    let term_col = reader.require("DrugTerm")?;
    let code_col = reader.require("prodcodes")?;

    let mut entries = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        if let Some(term) = field(&record, Some(term_col)) {
            push_expanded(&mut entries, &record, Some(code_col), term);
        }
    }
    info!(path = %path.display(), codes = entries.len(), "loaded product codelist");
    Ok(entries)
}

/// Loads the medical dictionary.
///
/// The read code comes from `CleansedReadCode`, or `OriginalReadCode` when
/// the cleansed column is absent.
pub fn load_medical_dictionary(path: &Path) -> Result<Vec<DictionaryEntry>> {
    let mut reader = DelimitedReader::open(path)?;
    let code_col = reader.require("MedCodeId")?;
    let read_col = reader
        .column("CleansedReadCode")
        .or_else(|| reader.column("OriginalReadCode"));
    let snomed_col = reader.column("SnomedCTConceptId");
    if read_col.is_none() {
        warn!(path = %path.display(), "medical dictionary has no read code column");
    }

    let mut entries = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        let Some(med_code) = field(&record, Some(code_col)) else {
            continue;
        };
        entries.push(DictionaryEntry {
            med_code: med_code.to_string(),
            read_code: field(&record, read_col).map(str::to_string),
            snomed_concept: field(&record, snomed_col).map(str::to_string),
        });
    }
    info!(path = %path.display(), codes = entries.len(), "loaded medical dictionary");
    Ok(entries)
}

/// Loads the SNOMED to ICD-10 extended map.
///
/// Keeps only `active == 1` rows and, per `referencedComponentId`, the row
/// with the lowest `(mapGroup, mapPriority)`. Earlier rows win ties.
/// Output is ordered by concept id.
pub fn load_snomed_icd10_map(path: &Path) -> Result<Vec<Icd10Target>> {
    let mut reader = DelimitedReader::open(path)?;
    let concept_col = reader.require("referencedComponentId")?;
    let target_col = reader.require("mapTarget")?;
    let active_col = reader.require("active")?;
    let group_col = reader.column("mapGroup");
    let priority_col = reader.column("mapPriority");

    let mut best: BTreeMap<String, ((i64, i64), String)> = BTreeMap::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        if field(&record, Some(active_col)).and_then(parse_i64) != Some(1) {
            continue;
        }
        let (Some(concept), Some(target)) = (
            field(&record, Some(concept_col)),
            field(&record, Some(target_col)),
        ) else {
            continue;
        };
        let rank = (
            field(&record, group_col).and_then(parse_i64).unwrap_or(i64::MAX),
            field(&record, priority_col).and_then(parse_i64).unwrap_or(i64::MAX),
        );
        let replace = best
            .get(concept)
            .is_none_or(|(existing, _)| rank < *existing);
        if replace {
            best.insert(concept.to_string(), (rank, target.to_string()));
        }
    }

    info!(path = %path.display(), concepts = best.len(), "loaded SNOMED to ICD-10 map");
    Ok(best
        .into_iter()
        .map(|(snomed_concept, (_, target))| Icd10Target {
            snomed_concept,
            target,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_codes_strips_noise() {
        assert_eq!(expand_codes("['123', \"456\" ,]"), vec!["123", "456"]);
        assert_eq!(expand_codes(""), Vec::<String>::new());
        assert_eq!(expand_codes("789"), vec!["789"]);
    }

    #[test]
    fn test_load_codelists_expands_each_tier() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codelists.csv");
        std::fs::write(
            &path,
            "MedicalTerm ,medcodes,ReadcodeList,medcodes2\r\n\
             CRP,\"[1, 2]\",44E..,3\r\n\
             current smoker,4,137R.,\r\n",
        )
        .unwrap();

        let codelists = load_codelists(&path).unwrap();
        let primary: Vec<(&str, &str)> = codelists
            .primary
            .iter()
            .map(|e| (e.code.as_str(), e.term.as_str()))
            .collect();
        assert_eq!(primary, vec![("1", "CRP"), ("2", "CRP"), ("4", "current smoker")]);
        assert_eq!(codelists.read_codes.len(), 2);
        assert_eq!(codelists.secondary, vec![CodelistEntry {
            code: "3".to_string(),
            term: "CRP".to_string()
        }]);
    }

    #[test]
    fn test_dictionary_falls_back_to_original_read_code() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dictionary.txt");
        std::fs::write(
            &path,
            "MedCodeId\tTerm\tOriginalReadCode\tSnomedCTConceptId\n\
             100\tx\t42W..\t555\n\
             101\ty\t\t\n",
        )
        .unwrap();

        let entries = load_medical_dictionary(&path).unwrap();
        assert_eq!(entries[0].read_code.as_deref(), Some("42W.."));
        assert_eq!(entries[0].snomed_concept.as_deref(), Some("555"));
        assert_eq!(entries[1].read_code, None);
    }

    #[test]
    fn test_snomed_map_keeps_lowest_active_rank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("map.txt");
        std::fs::write(
            &path,
            "referencedComponentId\tmapGroup\tmapPriority\tmapTarget\tactive\n\
             555\t2\t1\tZ99\t1\n\
             555\t1\t2\tK86.1\t1\n\
             555\t1\t1\tC25.9\t0\n\
             777\t1\t1\tE11\t1\n",
        )
        .unwrap();

        let targets = load_snomed_icd10_map(&path).unwrap();
        assert_eq!(
            targets,
            vec![
                Icd10Target {
                    snomed_concept: "555".to_string(),
                    target: "K86.1".to_string()
                },
                Icd10Target {
                    snomed_concept: "777".to_string(),
                    target: "E11".to_string()
                },
            ]
        );
    }
}
