//! Tiered code mapping.
//!
//! Medical codes resolve through a fixed hierarchy, first hit wins:
//!
//! 1. primary codelist (`medcodes`)
//! 2. dictionary read code found in the `ReadcodeList` codelist
//! 3. secondary codelist (`medcodes2`)
//! 4. the terminal strategy (read-code fallback, or the SNOMED chain)
//!
//! Product codes resolve only through the product codelist. Anything left
//! follows the [`UnmappedPolicy`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use meds_model::{
    Category, MappedEvent, MappingOptions, NULL_TERM, RawEvent, UnmappedPolicy, Vocabulary,
    canonical_code,
};

use crate::strategy::{TerminalStrategy, terminal_strategy};
use crate::tables::{LookupTables, term_category};

/// Tier that resolved a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingTier {
    Primary,
    ReadCodeList,
    Secondary,
    ReadCodeFallback,
    Snomed,
    Icd10,
    Product,
    Unmapped,
}

impl MappingTier {
    pub const ALL: [MappingTier; 8] = [
        MappingTier::Primary,
        MappingTier::ReadCodeList,
        MappingTier::Secondary,
        MappingTier::ReadCodeFallback,
        MappingTier::Snomed,
        MappingTier::Icd10,
        MappingTier::Product,
        MappingTier::Unmapped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingTier::Primary => "primary",
            MappingTier::ReadCodeList => "read_code_list",
            MappingTier::Secondary => "secondary",
            MappingTier::ReadCodeFallback => "read_code_fallback",
            MappingTier::Snomed => "snomed",
            MappingTier::Icd10 => "icd10",
            MappingTier::Product => "product",
            MappingTier::Unmapped => "unmapped",
        }
    }

    /// Human-readable description for reports.
    pub fn label(&self) -> &'static str {
        match self {
            MappingTier::Primary => "primary 'medcodes' list",
            MappingTier::ReadCodeList => "'ReadcodeList' via read code",
            MappingTier::Secondary => "'medcodes2' list",
            MappingTier::ReadCodeFallback => "generic read code",
            MappingTier::Snomed => "SNOMED concept",
            MappingTier::Icd10 => "ICD-10 via SNOMED",
            MappingTier::Product => "product codelist",
            MappingTier::Unmapped => "unmapped",
        }
    }
}

impl fmt::Display for MappingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved canonical code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub code: String,
    pub category: Category,
    pub tier: MappingTier,
}

impl Resolution {
    fn from_term(term: &str, raw_code: &str, tier: MappingTier) -> Self {
        let category = term_category(term);
        Self {
            code: canonical_code(category, term, raw_code),
            category,
            tier,
        }
    }
}

/// Maps raw codes to canonical codes.
#[derive(Debug)]
pub struct CodeMapper {
    tables: LookupTables,
    terminal: Box<dyn TerminalStrategy>,
    unmapped: UnmappedPolicy,
}

impl CodeMapper {
    pub fn new(tables: LookupTables, options: MappingOptions) -> Self {
        let terminal = terminal_strategy(options.terminal);
        if !terminal.has_lookups(&tables) {
            warn!(
                terminal = terminal.name(),
                "terminal strategy has no lookup data loaded, its tier never matches"
            );
        }
        debug!(
            terminal = terminal.name(),
            unmapped = %options.unmapped,
            "selected terminal strategy"
        );
        Self {
            tables,
            terminal,
            unmapped: options.unmapped,
        }
    }

    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    pub fn terminal_name(&self) -> &'static str {
        self.terminal.name()
    }

    pub fn unmapped_policy(&self) -> UnmappedPolicy {
        self.unmapped
    }

    /// Runs the tier hierarchy without applying the unmapped policy.
    pub fn resolve(
        &self,
        vocabulary: Vocabulary,
        raw_code: &str,
        has_value: bool,
    ) -> Option<Resolution> {
        match vocabulary {
            Vocabulary::MedCode => self.resolve_medical(raw_code, has_value),
            Vocabulary::ProdCode => self.tables.product_term(raw_code).map(|drug| Resolution {
                code: canonical_code(Category::Prescription, drug, raw_code),
                category: Category::Prescription,
                tier: MappingTier::Product,
            }),
        }
    }

    fn resolve_medical(&self, raw_code: &str, has_value: bool) -> Option<Resolution> {
        let tables = &self.tables;
        if let Some(term) = tables.primary_term(raw_code) {
            return Some(Resolution::from_term(term, raw_code, MappingTier::Primary));
        }
        if let Some(term) = tables
            .read_code(raw_code)
            .and_then(|read_code| tables.read_code_term(read_code))
        {
            return Some(Resolution::from_term(
                term,
                raw_code,
                MappingTier::ReadCodeList,
            ));
        }
        if let Some(term) = tables.secondary_term(raw_code) {
            return Some(Resolution::from_term(term, raw_code, MappingTier::Secondary));
        }
        self.terminal.resolve(tables, raw_code, has_value)
    }

    /// Resolves a code and applies the unmapped policy.
    ///
    /// Returns `None` only when the code is unmapped and the policy drops.
    pub fn map_code(
        &self,
        vocabulary: Vocabulary,
        raw_code: &str,
        has_value: bool,
    ) -> Option<Resolution> {
        match self.resolve(vocabulary, raw_code, has_value) {
            Some(resolution) => Some(resolution),
            None => match self.unmapped {
                UnmappedPolicy::Drop => None,
                UnmappedPolicy::Tag => Some(Resolution {
                    code: canonical_code(Category::Medical, NULL_TERM, raw_code),
                    category: Category::Medical,
                    tier: MappingTier::Unmapped,
                }),
            },
        }
    }

    /// Maps a scanned event. Events whose code carries no vocabulary prefix
    /// are treated as unmapped.
    pub fn map_event(&self, event: &RawEvent) -> (MappingTier, Option<MappedEvent>) {
        let Some((vocabulary, raw_code)) = event.raw_code() else {
            return (MappingTier::Unmapped, None);
        };
        match self.map_code(vocabulary, raw_code, event.numeric_value.is_some()) {
            Some(resolution) => (
                resolution.tier,
                Some(MappedEvent::from_raw(
                    event,
                    resolution.code,
                    resolution.category,
                )),
            ),
            None => (MappingTier::Unmapped, None),
        }
    }
}

/// Per-tier event counts of a mapping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierCounts {
    counts: BTreeMap<MappingTier, u64>,
}

impl TierCounts {
    pub fn record(&mut self, tier: MappingTier) {
        *self.counts.entry(tier).or_default() += 1;
    }

    pub fn get(&self, tier: MappingTier) -> u64 {
        self.counts.get(&tier).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn merge(&mut self, other: &TierCounts) {
        for (tier, count) in &other.counts {
            *self.counts.entry(*tier).or_default() += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MappingTier, u64)> + '_ {
        self.counts.iter().map(|(tier, count)| (*tier, *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use meds_ingest::{CodelistEntry, Codelists, DictionaryEntry};
    use meds_model::TerminalMode;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    fn entry(code: &str, term: &str) -> CodelistEntry {
        CodelistEntry {
            code: code.to_string(),
            term: term.to_string(),
        }
    }

    #[test]
    fn product_codes_use_product_list_only() {
        let tables = LookupTables::new()
            .with_codelists(&Codelists {
                primary: vec![entry("999", "CRP")],
                ..Codelists::default()
            })
            .with_products(&[entry("999", "Metformin")]);
        let mapper = CodeMapper::new(tables, MappingOptions::default());

        let drug = mapper.map_code(Vocabulary::ProdCode, "999", false).unwrap();
        assert_eq!(drug.code, "PRESCRIPTION//Metformin//999");
        assert_eq!(drug.tier, MappingTier::Product);

        let medical = mapper.map_code(Vocabulary::MedCode, "999", false).unwrap();
        assert_eq!(medical.code, "LAB//CRP//999");
        assert!(mapper.map_code(Vocabulary::ProdCode, "1", false).is_none());
    }

    #[test]
    fn unmapped_policy_drop_or_tag() {
        let drop = CodeMapper::new(LookupTables::new(), MappingOptions::default());
        assert!(drop.map_code(Vocabulary::MedCode, "42", true).is_none());

        let tag = CodeMapper::new(
            LookupTables::new(),
            MappingOptions::default().with_unmapped(UnmappedPolicy::Tag),
        );
        let tagged = tag.map_code(Vocabulary::MedCode, "42", true).unwrap();
        assert_eq!(tagged.code, "MEDICAL//NULL//42");
        assert_eq!(tagged.tier, MappingTier::Unmapped);
    }

    #[test]
    fn terminal_strategy_selected_once() {
        let mapper = CodeMapper::new(
            LookupTables::new(),
            MappingOptions::default().with_terminal(TerminalMode::SnomedIcd10),
        );
        assert_eq!(mapper.terminal_name(), "snomed_icd10");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn logs_while(f: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        logs.text()
    }

    #[test]
    fn missing_terminal_lookups_are_reported() {
        let logs = logs_while(|| {
            CodeMapper::new(
                LookupTables::new(),
                MappingOptions::default().with_terminal(TerminalMode::Snomed),
            );
        });
        assert!(logs.contains("selected terminal strategy"));
        assert!(logs.contains("snomed"));
        assert!(logs.contains("has no lookup data loaded"));

        let tables = LookupTables::new().with_dictionary(&[DictionaryEntry {
            med_code: "1".to_string(),
            read_code: Some("A1...".to_string()),
            snomed_concept: None,
        }]);
        let logs = logs_while(|| {
            CodeMapper::new(tables, MappingOptions::default());
        });
        assert!(logs.contains("selected terminal strategy"));
        assert!(!logs.contains("has no lookup data loaded"));
    }

    #[test]
    fn tier_counts_merge() {
        let mut a = TierCounts::default();
        a.record(MappingTier::Primary);
        a.record(MappingTier::Primary);
        let mut b = TierCounts::default();
        b.record(MappingTier::Unmapped);
        a.merge(&b);
        assert_eq!(a.get(MappingTier::Primary), 2);
        assert_eq!(a.get(MappingTier::Unmapped), 1);
        assert_eq!(a.total(), 3);
    }
}
