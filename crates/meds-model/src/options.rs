//! Mapping options resolved once per run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// What happens to a raw code that no mapping tier resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedPolicy {
    /// Remove the event from the stream.
    #[default]
    Drop,
    /// Keep the event as `MEDICAL//NULL//{raw_code}`.
    Tag,
}

impl UnmappedPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmappedPolicy::Drop => "drop",
            UnmappedPolicy::Tag => "tag",
        }
    }
}

impl fmt::Display for UnmappedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UnmappedPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(UnmappedPolicy::Drop),
            "tag" => Ok(UnmappedPolicy::Tag),
            _ => Err(ModelError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Which terminal strategy follows the curated tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalMode {
    /// Synthesize a code from the read-code prefix.
    #[default]
    ReadCode,
    /// Resolve to the SNOMED concept id.
    Snomed,
    /// Resolve through SNOMED to the active ICD-10 target.
    SnomedIcd10,
}

impl TerminalMode {
    pub fn from_flags(snomed_fallback: bool, map_to_icd10: bool) -> Self {
        match (snomed_fallback, map_to_icd10) {
            (false, _) => TerminalMode::ReadCode,
            (true, false) => TerminalMode::Snomed,
            (true, true) => TerminalMode::SnomedIcd10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalMode::ReadCode => "read_code",
            TerminalMode::Snomed => "snomed",
            TerminalMode::SnomedIcd10 => "snomed_icd10",
        }
    }
}

/// Options for one mapping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingOptions {
    pub unmapped: UnmappedPolicy,
    pub terminal: TerminalMode,
}

impl MappingOptions {
    pub fn with_unmapped(mut self, unmapped: UnmappedPolicy) -> Self {
        self.unmapped = unmapped;
        self
    }

    pub fn with_terminal(mut self, terminal: TerminalMode) -> Self {
        self.terminal = terminal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Drop".parse::<UnmappedPolicy>().unwrap(), UnmappedPolicy::Drop);
        assert_eq!("tag".parse::<UnmappedPolicy>().unwrap(), UnmappedPolicy::Tag);
        assert!("keep".parse::<UnmappedPolicy>().is_err());
    }

    #[test]
    fn terminal_mode_from_flags() {
        assert_eq!(TerminalMode::from_flags(false, true), TerminalMode::ReadCode);
        assert_eq!(TerminalMode::from_flags(true, false), TerminalMode::Snomed);
        assert_eq!(TerminalMode::from_flags(true, true), TerminalMode::SnomedIcd10);
    }
}
