//! Pipeline configuration file.
//!
//! Every path may contain a `{cancer_type}` placeholder. Relative paths are
//! resolved against the directory holding the configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use meds_core::DEFAULT_SHARD_SIZE;
use meds_model::{MappingOptions, TerminalMode, UnmappedPolicy};
use meds_output::{DEFAULT_SPILL_ROWS, Stage};

/// Placeholder substituted in every configured path.
pub const CANCER_TYPE_PLACEHOLDER: &str = "{cancer_type}";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtlConfig {
    pub study: StudyConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    pub paths: PathsConfig,
    pub outputs: OutputsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    pub cancer_type: String,
    #[serde(default = "default_shard_size")]
    pub shard_size: usize,
    #[serde(default = "default_spill_rows")]
    pub spill_rows: usize,
}

fn default_shard_size() -> usize {
    DEFAULT_SHARD_SIZE
}

fn default_spill_rows() -> usize {
    DEFAULT_SPILL_ROWS
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    #[serde(default)]
    pub unmapped: UnmappedPolicy,
    /// Replace the read-code fallback with the SNOMED chain.
    #[serde(default)]
    pub snomed_fallback: bool,
    /// Continue the SNOMED chain to the ICD-10 target.
    #[serde(default)]
    pub map_to_icd10: bool,
}

impl MappingConfig {
    pub fn terminal_mode(&self) -> TerminalMode {
        TerminalMode::from_flags(self.snomed_fallback, self.map_to_icd10)
    }

    pub fn options(&self) -> MappingOptions {
        MappingOptions::default()
            .with_unmapped(self.unmapped)
            .with_terminal(self.terminal_mode())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub subject_information_file: PathBuf,
    pub observation_data_dir: PathBuf,
    pub medication_data_dir: Option<PathBuf>,
    pub codelists: PathBuf,
    pub product_codelist: Option<PathBuf>,
    pub medical_dictionary: Option<PathBuf>,
    pub snomed_icd10_map: Option<PathBuf>,
    pub cleaning_rules: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputsConfig {
    pub intermediate_unsorted_dir: PathBuf,
    pub intermediate_sorted_dir: PathBuf,
    pub event_stream_dir: PathBuf,
    pub final_cleaned_dir: PathBuf,
    pub coverage_report: Option<PathBuf>,
}

impl OutputsConfig {
    /// Directory holding the artifact of `stage`.
    pub fn dir_for(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Extract => &self.intermediate_unsorted_dir,
            Stage::Sort => &self.intermediate_sorted_dir,
            Stage::Map => &self.event_stream_dir,
            Stage::Clean => &self.final_cleaned_dir,
        }
    }
}

fn resolve(path: &mut PathBuf, cancer_type: &str, base: &Path) {
    let substituted = PathBuf::from(
        path.to_string_lossy()
            .replace(CANCER_TYPE_PLACEHOLDER, cancer_type),
    );
    *path = if substituted.is_relative() {
        base.join(substituted)
    } else {
        substituted
    };
}

fn resolve_optional(path: &mut Option<PathBuf>, cancer_type: &str, base: &Path) {
    if let Some(path) = path {
        resolve(path, cancer_type, base);
    }
}

impl EtlConfig {
    /// Parses `text` and resolves every path against `base`.
    pub fn from_toml(text: &str, base: &Path) -> Result<Self> {
        let mut config: EtlConfig = toml::from_str(text).context("parse configuration")?;
        config.validate()?;
        config.resolve_paths(base);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.study.cancer_type.trim().is_empty() {
            bail!("study.cancer_type must not be empty");
        }
        if self.study.shard_size == 0 {
            bail!("study.shard_size must be at least 1");
        }
        if self.study.spill_rows == 0 {
            bail!("study.spill_rows must be at least 1");
        }
        let terminal = self.mapping.terminal_mode();
        if terminal != TerminalMode::ReadCode && self.paths.medical_dictionary.is_none() {
            bail!("mapping.snomed_fallback requires paths.medical_dictionary");
        }
        if terminal == TerminalMode::SnomedIcd10 && self.paths.snomed_icd10_map.is_none() {
            bail!("mapping.map_to_icd10 requires paths.snomed_icd10_map");
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let cancer_type = self.study.cancer_type.clone();
        let ct = cancer_type.as_str();

        let paths = &mut self.paths;
        resolve(&mut paths.subject_information_file, ct, base);
        resolve(&mut paths.observation_data_dir, ct, base);
        resolve_optional(&mut paths.medication_data_dir, ct, base);
        resolve(&mut paths.codelists, ct, base);
        resolve_optional(&mut paths.product_codelist, ct, base);
        resolve_optional(&mut paths.medical_dictionary, ct, base);
        resolve_optional(&mut paths.snomed_icd10_map, ct, base);
        resolve_optional(&mut paths.cleaning_rules, ct, base);

        let outputs = &mut self.outputs;
        resolve(&mut outputs.intermediate_unsorted_dir, ct, base);
        resolve(&mut outputs.intermediate_sorted_dir, ct, base);
        resolve(&mut outputs.event_stream_dir, ct, base);
        resolve(&mut outputs.final_cleaned_dir, ct, base);
        resolve_optional(&mut outputs.coverage_report, ct, base);
    }
}

/// Reads and validates the configuration file.
pub fn load_config(path: &Path) -> Result<EtlConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read configuration {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    EtlConfig::from_toml(&text, base)
        .with_context(|| format!("invalid configuration {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[study]
cancer_type = "pancreatic"

[paths]
subject_information_file = "data/{cancer_type}/subjects.csv"
observation_data_dir = "/raw/observations"
codelists = "codelists/{cancer_type}_terms.csv"

[outputs]
intermediate_unsorted_dir = "out/{cancer_type}/unsorted"
intermediate_sorted_dir = "out/{cancer_type}/sorted"
event_stream_dir = "out/{cancer_type}/mapped"
final_cleaned_dir = "out/{cancer_type}/final"
"#;

    #[test]
    fn test_defaults_and_placeholder_substitution() {
        let config = EtlConfig::from_toml(MINIMAL, Path::new("/study")).unwrap();
        assert_eq!(config.study.shard_size, DEFAULT_SHARD_SIZE);
        assert_eq!(config.study.spill_rows, DEFAULT_SPILL_ROWS);
        assert_eq!(config.mapping.options(), MappingOptions::default());
        assert_eq!(
            config.paths.subject_information_file,
            Path::new("/study/data/pancreatic/subjects.csv")
        );
        assert_eq!(config.paths.observation_data_dir, Path::new("/raw/observations"));
        assert_eq!(
            config.outputs.dir_for(Stage::Clean),
            Path::new("/study/out/pancreatic/final")
        );
        assert!(config.paths.cleaning_rules.is_none());
    }

    #[test]
    fn test_mapping_section() {
        let text = MINIMAL.replace(
            "[paths]",
            "[mapping]\nunmapped = \"tag\"\nsnomed_fallback = true\n\n[paths]\nmedical_dictionary = \"dict.txt\"",
        );
        let config = EtlConfig::from_toml(&text, Path::new("/study")).unwrap();
        let options = config.mapping.options();
        assert_eq!(options.unmapped, UnmappedPolicy::Tag);
        assert_eq!(options.terminal, TerminalMode::Snomed);
    }

    #[test]
    fn test_invalid_configurations_are_rejected() {
        let icd10_without_map = MINIMAL.replace(
            "[paths]",
            "[mapping]\nsnomed_fallback = true\nmap_to_icd10 = true\n\n[paths]\nmedical_dictionary = \"dict.txt\"",
        );
        assert!(EtlConfig::from_toml(&icd10_without_map, Path::new(".")).is_err());

        let bad_policy = MINIMAL.replace("[paths]", "[mapping]\nunmapped = \"keep\"\n\n[paths]");
        assert!(EtlConfig::from_toml(&bad_policy, Path::new(".")).is_err());

        let missing_required = MINIMAL.replace("codelists = ", "codelist_file = ");
        assert!(EtlConfig::from_toml(&missing_required, Path::new(".")).is_err());
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/config.toml"));
    }
}
