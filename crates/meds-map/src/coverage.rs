//! Mapping coverage over distinct raw codes.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use meds_model::{RawEvent, Vocabulary};

use crate::engine::{CodeMapper, MappingTier, TierCounts};

/// One report line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    pub tier: MappingTier,
    pub label: &'static str,
    pub codes: u64,
    pub percent: f64,
}

/// Distinct raw codes seen so far.
///
/// A code counts as "has value" when any of its occurrences carries a
/// numeric value, matching how the read-code fallback picks its category.
#[derive(Debug, Clone, Default)]
pub struct CodeInventory {
    codes: BTreeMap<(Vocabulary, String), bool>,
}

impl CodeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &RawEvent) {
        let Some((vocabulary, raw_code)) = event.raw_code() else {
            return;
        };
        let has_value = event.numeric_value.is_some();
        self.codes
            .entry((vocabulary, raw_code.to_string()))
            .and_modify(|seen| *seen |= has_value)
            .or_insert(has_value);
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// How many distinct raw codes resolve at each tier.
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    counts: TierCounts,
}

impl CoverageReport {
    pub fn from_inventory(mapper: &CodeMapper, inventory: &CodeInventory) -> Self {
        let mut counts = TierCounts::default();
        for ((vocabulary, raw_code), has_value) in &inventory.codes {
            let tier = mapper
                .resolve(*vocabulary, raw_code, *has_value)
                .map_or(MappingTier::Unmapped, |resolution| resolution.tier);
            counts.record(tier);
        }
        Self { counts }
    }

    pub fn from_events<'a>(
        mapper: &CodeMapper,
        events: impl IntoIterator<Item = &'a RawEvent>,
    ) -> Self {
        let mut inventory = CodeInventory::new();
        for event in events {
            inventory.observe(event);
        }
        Self::from_inventory(mapper, &inventory)
    }

    pub fn total_codes(&self) -> u64 {
        self.counts.total()
    }

    pub fn count(&self, tier: MappingTier) -> u64 {
        self.counts.get(tier)
    }

    /// One row per tier, in hierarchy order, including empty tiers.
    pub fn rows(&self) -> Vec<CoverageRow> {
        let total = self.total_codes();
        MappingTier::ALL
            .iter()
            .map(|tier| {
                let codes = self.counts.get(*tier);
                let percent = if total == 0 {
                    0.0
                } else {
                    codes as f64 * 100.0 / total as f64
                };
                CoverageRow {
                    tier: *tier,
                    label: tier.label(),
                    codes,
                    percent,
                }
            })
            .collect()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("create coverage report {}", path.display()))?;
        for row in self.rows() {
            writer
                .serialize(&row)
                .with_context(|| format!("write coverage report {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("flush coverage report {}", path.display()))?;
        Ok(())
    }
}
