//! Stage artifacts with staged, atomic publish.
//!
//! A stage writes every shard into `{target}.staging`, adds an
//! `artifact.json` manifest, then renames the staging directory onto the
//! target. A stage that fails before [`StagedArtifact::publish`] leaves the
//! target untouched, so downstream stages never see partial output.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use meds_model::Split;

use crate::error::{OutputError, Result};
use crate::parquet::write_parquet;
use crate::shard::{ShardPlan, ShardSpec};

/// Manifest file name inside every published artifact.
pub const MANIFEST_FILE: &str = "artifact.json";

/// Bumped when checkpoint columns change.
pub const SCHEMA_VERSION: u32 = 2;

/// Pipeline stage that produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Sort,
    Map,
    Clean,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Extract, Stage::Sort, Stage::Map, Stage::Clean];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Sort => "sort",
            Stage::Map => "map",
            Stage::Clean => "clean",
        }
    }

    /// The stage whose artifact this one reads.
    pub fn upstream(&self) -> Option<Stage> {
        match self {
            Stage::Extract => None,
            Stage::Sort => Some(Stage::Extract),
            Stage::Map => Some(Stage::Sort),
            Stage::Clean => Some(Stage::Map),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// One shard's entry in the manifest.
///
/// `first_subject` and `last_subject` fingerprint the membership so a
/// changed subject table is caught even when shard sizes stay the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub split: Split,
    pub index: usize,
    pub subjects: usize,
    pub first_subject: Option<i64>,
    pub last_subject: Option<i64>,
    pub rows: u64,
}

impl ShardRecord {
    pub fn new(shard: &ShardSpec, rows: u64) -> Self {
        Self {
            split: shard.split,
            index: shard.index,
            subjects: shard.subject_ids.len(),
            first_subject: shard.subject_ids.first().copied(),
            last_subject: shard.subject_ids.last().copied(),
            rows,
        }
    }

    /// Whether this record describes `shard`'s membership.
    pub fn describes(&self, shard: &ShardSpec) -> bool {
        self.split == shard.split
            && self.index == shard.index
            && self.subjects == shard.subject_ids.len()
            && self.first_subject == shard.subject_ids.first().copied()
            && self.last_subject == shard.subject_ids.last().copied()
    }
}

/// Contents of `artifact.json`.
///
/// Carries no timestamps so identical runs produce identical manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub stage: Stage,
    pub schema_version: u32,
    pub shards: Vec<ShardRecord>,
}

impl ArtifactManifest {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            schema_version: SCHEMA_VERSION,
            shards: Vec::new(),
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.shards.iter().map(|s| s.rows).sum()
    }

    pub fn total_subjects(&self) -> usize {
        self.shards.iter().map(|s| s.subjects).sum()
    }

    /// Shard records of one split, in index order.
    pub fn shards_in(&self, split: Split) -> impl Iterator<Item = &ShardRecord> {
        self.shards.iter().filter(move |s| s.split == split)
    }

    /// Whether the shards were written under `plan`'s layout by this
    /// schema version.
    pub fn matches_plan(&self, plan: &ShardPlan) -> bool {
        self.schema_version == SCHEMA_VERSION
            && self.shards.len() == plan.len()
            && self
                .shards
                .iter()
                .zip(plan.shards())
                .all(|(record, shard)| record.describes(shard))
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| OutputError::io(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| OutputError::Manifest { path, source })
    }

    fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| OutputError::Manifest {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, bytes).map_err(|e| OutputError::io(&path, e))
    }
}

/// Checks that `dir` holds a published artifact of `stage`.
pub fn require_artifact(dir: &Path, stage: Stage) -> Result<ArtifactManifest> {
    if !dir.join(MANIFEST_FILE).is_file() {
        return Err(OutputError::MissingUpstream {
            stage: stage.to_string(),
            path: dir.to_path_buf(),
        });
    }
    let manifest = ArtifactManifest::read(dir)?;
    if manifest.stage != stage {
        return Err(OutputError::StageMismatch {
            expected: stage.to_string(),
            found: manifest.stage.to_string(),
            path: dir.to_path_buf(),
        });
    }
    Ok(manifest)
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".");
    name.push(suffix);
    target.with_file_name(name)
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| OutputError::io(dir, e))?;
    }
    Ok(())
}

/// An artifact being written into its staging directory.
#[derive(Debug)]
pub struct StagedArtifact {
    target: PathBuf,
    staging: PathBuf,
    manifest: ArtifactManifest,
}

impl StagedArtifact {
    /// Starts a fresh staging directory next to `target`, removing any
    /// leftover from an earlier failed run.
    pub fn begin(target: &Path, stage: Stage) -> Result<Self> {
        let staging = sibling(target, "staging");
        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging).map_err(|e| OutputError::io(&staging, e))?;
        debug!(stage = %stage, staging = %staging.display(), "staging artifact");
        Ok(Self {
            target: target.to_path_buf(),
            staging,
            manifest: ArtifactManifest::new(stage),
        })
    }

    pub fn stage(&self) -> Stage {
        self.manifest.stage
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    pub fn manifest(&self) -> &ArtifactManifest {
        &self.manifest
    }

    /// Writes one shard file and records it.
    pub fn write_shard(&mut self, shard: &ShardSpec, df: &mut DataFrame) -> Result<u64> {
        let rows = df.height() as u64;
        write_parquet(&shard.file_path(&self.staging), df)?;
        self.record(ShardRecord::new(shard, rows));
        Ok(rows)
    }

    /// Records a shard whose files were written by the caller under
    /// [`StagedArtifact::staging_dir`].
    pub fn record(&mut self, record: ShardRecord) {
        self.manifest.shards.push(record);
    }

    /// Writes the manifest and moves the staging directory onto the target.
    pub fn publish(mut self) -> Result<ArtifactManifest> {
        self.manifest
            .shards
            .sort_by_key(|record| (record.split, record.index));
        self.manifest.write(&self.staging)?;

        let previous = sibling(&self.target, "previous");
        remove_dir_if_exists(&previous)?;
        let had_target = self.target.exists();
        if had_target {
            fs::rename(&self.target, &previous).map_err(|source| {
                OutputError::AtomicPublishFailed {
                    path: self.target.clone(),
                    source,
                }
            })?;
        }

        if let Err(source) = fs::rename(&self.staging, &self.target) {
            if had_target && let Err(restore) = fs::rename(&previous, &self.target) {
                warn!(
                    path = %self.target.display(),
                    error = %restore,
                    "failed to restore previous artifact"
                );
            }
            return Err(OutputError::AtomicPublishFailed {
                path: self.target.clone(),
                source,
            });
        }
        remove_dir_if_exists(&previous)?;

        info!(
            stage = %self.manifest.stage,
            path = %self.target.display(),
            shards = self.manifest.shards.len(),
            rows = self.manifest.total_rows(),
            "published artifact"
        );
        Ok(self.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_chain() {
        assert_eq!(Stage::Extract.upstream(), None);
        assert_eq!(Stage::Clean.upstream(), Some(Stage::Map));
        assert_eq!("Sort".parse::<Stage>().unwrap(), Stage::Sort);
        assert!("load".parse::<Stage>().is_err());
    }

    fn plan(rows: &[(i64, Split)]) -> ShardPlan {
        let subjects: meds_model::SubjectTable = rows
            .iter()
            .map(|(id, split)| meds_model::Subject::control(*id, 1950, *split))
            .collect();
        ShardPlan::new(&subjects, 2)
    }

    fn manifest_for(plan: &ShardPlan) -> ArtifactManifest {
        let mut manifest = ArtifactManifest::new(Stage::Sort);
        manifest.shards = plan
            .shards()
            .iter()
            .map(|shard| ShardRecord::new(shard, 0))
            .collect();
        manifest
    }

    #[test]
    fn test_matches_plan_detects_changed_membership() {
        let written = plan(&[(1, Split::Train), (2, Split::Train), (3, Split::Test)]);
        let manifest = manifest_for(&written);
        assert!(manifest.matches_plan(&written));

        let same_sizes = plan(&[(1, Split::Train), (5, Split::Train), (3, Split::Test)]);
        assert!(!manifest.matches_plan(&same_sizes));

        let mut older = manifest.clone();
        older.schema_version = SCHEMA_VERSION - 1;
        assert!(!older.matches_plan(&written));
    }

    #[test]
    fn test_sibling_appends_suffix() {
        assert_eq!(
            sibling(Path::new("/out/sorted"), "staging"),
            Path::new("/out/sorted.staging")
        );
    }

    #[test]
    fn test_require_artifact_reports_missing_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mapped");

        let err = require_artifact(&target, Stage::Map).unwrap_err();
        assert!(matches!(err, OutputError::MissingUpstream { ref stage, .. } if stage == "map"));

        StagedArtifact::begin(&target, Stage::Sort)
            .unwrap()
            .publish()
            .unwrap();
        let err = require_artifact(&target, Stage::Map).unwrap_err();
        assert!(matches!(err, OutputError::StageMismatch { .. }));
        assert!(require_artifact(&target, Stage::Sort).is_ok());
    }

    #[test]
    fn test_unpublished_stage_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("clean");
        StagedArtifact::begin(&target, Stage::Clean)
            .unwrap()
            .publish()
            .unwrap();

        let staged = StagedArtifact::begin(&target, Stage::Extract).unwrap();
        assert!(staged.staging_dir().exists());
        drop(staged);

        assert_eq!(require_artifact(&target, Stage::Clean).unwrap().stage, Stage::Clean);
    }
}
