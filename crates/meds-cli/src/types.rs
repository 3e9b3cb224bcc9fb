use std::path::PathBuf;

use meds_map::CoverageReport;
use meds_output::{ArtifactManifest, Stage};

/// Outcome of one committed stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub output_dir: PathBuf,
    pub manifest: ArtifactManifest,
    /// Stage-specific counters, in display order.
    pub counters: Vec<(String, u64)>,
    pub duration_ms: u128,
}

impl StageReport {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }
}

/// Outcome of the coverage analysis.
#[derive(Debug, Clone)]
pub struct CoverageResult {
    pub report: CoverageReport,
    pub csv_path: Option<PathBuf>,
}
