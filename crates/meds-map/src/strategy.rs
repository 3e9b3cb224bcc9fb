//! Terminal mapping strategies.
//!
//! After the three curated tiers, exactly one terminal strategy runs. It is
//! chosen once per pass from [`TerminalMode`] and never switched mid-pass.

use std::fmt;

use meds_model::{Category, TerminalMode, canonical_code};

use crate::engine::{MappingTier, Resolution};
use crate::tables::LookupTables;

/// Suffix appended to a 3-character read-code prefix.
pub const READ_CODE_SUFFIX: &str = "..000";

/// Read-code prefixes of administrative codes that never reach the fallback.
pub const EXCLUDED_READ_PREFIXES: [&str; 4] = ["0", "9", "EMI", "^ES"];

/// Resolves codes the curated tiers left unmapped.
pub trait TerminalStrategy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the lookup data this strategy reads was loaded.
    fn has_lookups(&self, tables: &LookupTables) -> bool;

    fn resolve(&self, tables: &LookupTables, raw_code: &str, has_value: bool)
    -> Option<Resolution>;
}

/// Synthesizes `{read3}..000` from the dictionary read code.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadCodeFallback;

impl ReadCodeFallback {
    pub fn is_excluded(read_code: &str) -> bool {
        EXCLUDED_READ_PREFIXES
            .iter()
            .any(|prefix| read_code.starts_with(prefix))
    }
}

impl TerminalStrategy for ReadCodeFallback {
    fn name(&self) -> &'static str {
        "read_code"
    }

    fn has_lookups(&self, tables: &LookupTables) -> bool {
        tables.sizes().read_codes > 0
    }

    fn resolve(
        &self,
        tables: &LookupTables,
        raw_code: &str,
        has_value: bool,
    ) -> Option<Resolution> {
        let read_code = tables.read_code(raw_code)?;
        if Self::is_excluded(read_code) {
            return None;
        }
        let prefix: String = read_code.chars().take(3).collect();
        let term = format!("{prefix}{READ_CODE_SUFFIX}");
        let category = if has_value {
            Category::Measurement
        } else {
            Category::Medical
        };
        Some(Resolution {
            code: canonical_code(category, &term, raw_code),
            category,
            tier: MappingTier::ReadCodeFallback,
        })
    }
}

/// Resolves through the dictionary SNOMED concept, optionally on to the
/// active ICD-10 target.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnomedFallback {
    pub to_icd10: bool,
}

impl TerminalStrategy for SnomedFallback {
    fn name(&self) -> &'static str {
        if self.to_icd10 { "snomed_icd10" } else { "snomed" }
    }

    fn has_lookups(&self, tables: &LookupTables) -> bool {
        let sizes = tables.sizes();
        sizes.snomed_concepts > 0 && (!self.to_icd10 || sizes.icd10_targets > 0)
    }

    fn resolve(
        &self,
        tables: &LookupTables,
        raw_code: &str,
        _has_value: bool,
    ) -> Option<Resolution> {
        let concept = tables.snomed_concept(raw_code)?;
        let (term, tier) = if self.to_icd10 {
            (tables.icd10_target(concept)?, MappingTier::Icd10)
        } else {
            (concept, MappingTier::Snomed)
        };
        Some(Resolution {
            code: canonical_code(Category::Medical, term, raw_code),
            category: Category::Medical,
            tier,
        })
    }
}

/// Builds the strategy for `mode`.
pub fn terminal_strategy(mode: TerminalMode) -> Box<dyn TerminalStrategy> {
    match mode {
        TerminalMode::ReadCode => Box::new(ReadCodeFallback),
        TerminalMode::Snomed => Box::new(SnomedFallback { to_icd10: false }),
        TerminalMode::SnomedIcd10 => Box::new(SnomedFallback { to_icd10: true }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meds_ingest::{DictionaryEntry, Icd10Target};

    fn tables(read_code: &str) -> LookupTables {
        LookupTables::new()
            .with_dictionary(&[DictionaryEntry {
                med_code: "100".to_string(),
                read_code: Some(read_code.to_string()),
                snomed_concept: Some("555".to_string()),
            }])
            .with_icd10_map(&[Icd10Target {
                snomed_concept: "555".to_string(),
                target: "K86.1".to_string(),
            }])
    }

    #[test]
    fn read_code_fallback_category_follows_value() {
        let tables = tables("42W4.00");
        let with_value = ReadCodeFallback.resolve(&tables, "100", true).unwrap();
        assert_eq!(with_value.code, "MEASUREMENT//42W..000//100");
        assert_eq!(with_value.category, Category::Measurement);

        let without = ReadCodeFallback.resolve(&tables, "100", false).unwrap();
        assert_eq!(without.code, "MEDICAL//42W..000//100");
    }

    #[test]
    fn administrative_read_codes_never_fall_back() {
        for read_code in ["0A1..", "9N1..", "EMISNQ1", "^ESCTAB"] {
            let tables = tables(read_code);
            assert!(ReadCodeFallback.resolve(&tables, "100", true).is_none());
        }
        assert!(ReadCodeFallback.resolve(&tables("42W.."), "101", true).is_none());
    }

    #[test]
    fn snomed_strategies() {
        let tables = tables("42W..");
        let snomed = terminal_strategy(TerminalMode::Snomed)
            .resolve(&tables, "100", true)
            .unwrap();
        assert_eq!(snomed.code, "MEDICAL//555//100");
        assert_eq!(snomed.tier, MappingTier::Snomed);

        let icd10 = terminal_strategy(TerminalMode::SnomedIcd10)
            .resolve(&tables, "100", false)
            .unwrap();
        assert_eq!(icd10.code, "MEDICAL//K86.1//100");
        assert_eq!(icd10.tier, MappingTier::Icd10);
    }
}
