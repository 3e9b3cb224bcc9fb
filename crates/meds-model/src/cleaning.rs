//! Curated unit-conversion and valid-range rules for laboratory values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One curated rule, keyed by `(identifier, unit_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningRule {
    pub identifier_type: String,
    pub identifier: String,
    pub unit_id: i64,
    pub conversion_factor: f64,
    pub conversion_bias: f64,
    pub valid_min: f64,
    pub valid_max: f64,
}

impl CleaningRule {
    /// Applies the linear conversion. Returns `None` when the converted
    /// value falls outside the inclusive valid range.
    pub fn standardize(&self, raw: f64) -> Option<f64> {
        let value = raw * self.conversion_factor + self.conversion_bias;
        (self.valid_min..=self.valid_max)
            .contains(&value)
            .then_some(value)
    }
}

/// Rule set loaded once per cleaning run.
#[derive(Debug, Clone, Default)]
pub struct CleaningRules {
    rules: HashMap<(String, i64), CleaningRule>,
}

impl CleaningRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule; a later rule for the same key is ignored.
    pub fn insert(&mut self, rule: CleaningRule) -> bool {
        let key = (rule.identifier.clone(), rule.unit_id);
        if self.rules.contains_key(&key) {
            return false;
        }
        self.rules.insert(key, rule);
        true
    }

    pub fn get(&self, identifier: &str, unit_id: i64) -> Option<&CleaningRule> {
        self.rules.get(&(identifier.to_string(), unit_id))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<CleaningRule> for CleaningRules {
    fn from_iter<I: IntoIterator<Item = CleaningRule>>(iter: I) -> Self {
        let mut rules = CleaningRules::new();
        for rule in iter {
            rules.insert(rule);
        }
        rules
    }
}
