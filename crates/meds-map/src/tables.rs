//! Immutable lookup tables for one mapping pass.

use std::collections::HashMap;

use meds_ingest::{CodelistEntry, Codelists, DictionaryEntry, Icd10Target};
use meds_model::Category;

/// Codelist terms that denote laboratory tests.
pub const LAB_TERMS: [&str; 32] = [
    "MVC",
    "CRP",
    "Hemoglobin",
    "TIBC",
    "HbA1c",
    "plasma_viscosity",
    "ESR",
    "GGT",
    "lymphocyte",
    "platelets",
    "AST",
    "ALP",
    "ferritin",
    "MCH",
    "calcium_serum",
    "neutrophils",
    "h_p_ylori",
    "glucose",
    "cholesterol_triglycerides",
    "bilirubin",
    "anti_ttg",
    "plasma_proteins",
    "BP",
    "amylase",
    "ALT",
    "urea_serum",
    "CA125",
    "creatinine_serum",
    "albumin_serum",
    "WCC",
    "creatinine_urine",
    "iron",
];

/// `LAB` for laboratory terms, `MEDICAL` for every other codelist term.
pub fn term_category(term: &str) -> Category {
    if LAB_TERMS.contains(&term) {
        Category::Lab
    } else {
        Category::Medical
    }
}

fn insert_first(map: &mut HashMap<String, String>, key: &str, value: &str) {
    map.entry(key.to_string())
        .or_insert_with(|| value.to_string());
}

/// Entry counts, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSizes {
    pub primary: usize,
    pub read_code_terms: usize,
    pub secondary: usize,
    pub read_codes: usize,
    pub snomed_concepts: usize,
    pub icd10_targets: usize,
    pub products: usize,
}

/// All lookups used by the mapper. Each key keeps its first occurrence.
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    primary: HashMap<String, String>,
    read_code_terms: HashMap<String, String>,
    secondary: HashMap<String, String>,
    read_codes: HashMap<String, String>,
    snomed_concepts: HashMap<String, String>,
    icd10_targets: HashMap<String, String>,
    products: HashMap<String, String>,
}

impl LookupTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codelists(mut self, codelists: &Codelists) -> Self {
        for entry in &codelists.primary {
            insert_first(&mut self.primary, &entry.code, &entry.term);
        }
        for entry in &codelists.read_codes {
            insert_first(&mut self.read_code_terms, &entry.code, &entry.term);
        }
        for entry in &codelists.secondary {
            insert_first(&mut self.secondary, &entry.code, &entry.term);
        }
        self
    }

    pub fn with_dictionary(mut self, entries: &[DictionaryEntry]) -> Self {
        for entry in entries {
            if let Some(read_code) = &entry.read_code {
                insert_first(&mut self.read_codes, &entry.med_code, read_code);
            }
            if let Some(concept) = &entry.snomed_concept {
                insert_first(&mut self.snomed_concepts, &entry.med_code, concept);
            }
        }
        self
    }

    pub fn with_icd10_map(mut self, targets: &[Icd10Target]) -> Self {
        for target in targets {
            insert_first(&mut self.icd10_targets, &target.snomed_concept, &target.target);
        }
        self
    }

    pub fn with_products(mut self, entries: &[CodelistEntry]) -> Self {
        for entry in entries {
            insert_first(&mut self.products, &entry.code, &entry.term);
        }
        self
    }

    pub fn primary_term(&self, code: &str) -> Option<&str> {
        self.primary.get(code).map(String::as_str)
    }

    pub fn read_code(&self, code: &str) -> Option<&str> {
        self.read_codes.get(code).map(String::as_str)
    }

    pub fn read_code_term(&self, read_code: &str) -> Option<&str> {
        self.read_code_terms.get(read_code).map(String::as_str)
    }

    pub fn secondary_term(&self, code: &str) -> Option<&str> {
        self.secondary.get(code).map(String::as_str)
    }

    pub fn snomed_concept(&self, code: &str) -> Option<&str> {
        self.snomed_concepts.get(code).map(String::as_str)
    }

    pub fn icd10_target(&self, concept: &str) -> Option<&str> {
        self.icd10_targets.get(concept).map(String::as_str)
    }

    pub fn product_term(&self, code: &str) -> Option<&str> {
        self.products.get(code).map(String::as_str)
    }

    /// Whether a medical dictionary with read codes was loaded.
    pub fn has_read_codes(&self) -> bool {
        !self.read_codes.is_empty()
    }

    pub fn sizes(&self) -> TableSizes {
        TableSizes {
            primary: self.primary.len(),
            read_code_terms: self.read_code_terms.len(),
            secondary: self.secondary.len(),
            read_codes: self.read_codes.len(),
            snomed_concepts: self.snomed_concepts.len(),
            icd10_targets: self.icd10_targets.len(),
            products: self.products.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, term: &str) -> CodelistEntry {
        CodelistEntry {
            code: code.to_string(),
            term: term.to_string(),
        }
    }

    #[test]
    fn term_category_uses_lab_set() {
        assert_eq!(term_category("Hemoglobin"), Category::Lab);
        assert_eq!(term_category("hemoglobin"), Category::Medical);
        assert_eq!(term_category("current smoker"), Category::Medical);
    }

    #[test]
    fn first_occurrence_wins() {
        let codelists = Codelists {
            primary: vec![entry("1", "CRP"), entry("1", "ESR")],
            read_codes: vec![],
            secondary: vec![entry("1", "other")],
        };
        let tables = LookupTables::new().with_codelists(&codelists);
        assert_eq!(tables.primary_term("1"), Some("CRP"));
        assert_eq!(tables.secondary_term("1"), Some("other"));
        assert_eq!(tables.sizes().primary, 1);
        assert!(!tables.has_read_codes());
    }
}
