//! Positional shard planning.
//!
//! Within each split, subject ids are sorted and de-duplicated, then cut
//! into consecutive chunks of `shard_size`. Membership depends only on the
//! ids, never on event content.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use meds_model::{Split, SubjectTable};

/// One output shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub split: Split,
    /// 0-based within the split.
    pub index: usize,
    /// Sorted subject ids.
    pub subject_ids: Vec<i64>,
}

impl ShardSpec {
    pub fn file_name(&self) -> String {
        format!("shard_{}.parquet", self.index)
    }

    /// `{base}/{split_dir}/shard_{n}.parquet`
    pub fn file_path(&self, base: &Path) -> PathBuf {
        base.join(self.split.dir_name()).join(self.file_name())
    }

    /// `{base}/{split_dir}/shard_{n}`, holding spill parts.
    pub fn parts_dir(&self, base: &Path) -> PathBuf {
        base.join(self.split.dir_name())
            .join(format!("shard_{}", self.index))
    }
}

/// Cuts `ids` into positional shards.
pub fn plan_split(split: Split, ids: &[i64], shard_size: usize) -> Vec<ShardSpec> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids.chunks(shard_size.max(1))
        .enumerate()
        .map(|(index, chunk)| ShardSpec {
            split,
            index,
            subject_ids: chunk.to_vec(),
        })
        .collect()
}

/// Shards of every split, in split then index order.
#[derive(Debug, Clone, Default)]
pub struct ShardPlan {
    shards: Vec<ShardSpec>,
    by_subject: HashMap<i64, usize>,
}

impl ShardPlan {
    pub fn new(subjects: &SubjectTable, shard_size: usize) -> Self {
        let shards: Vec<ShardSpec> = Split::ALL
            .iter()
            .flat_map(|split| plan_split(*split, &subjects.ids_in_split(*split), shard_size))
            .collect();
        let by_subject = shards
            .iter()
            .enumerate()
            .flat_map(|(pos, shard)| shard.subject_ids.iter().map(move |id| (*id, pos)))
            .collect();
        Self { shards, by_subject }
    }

    pub fn shards(&self) -> &[ShardSpec] {
        &self.shards
    }

    /// Position in [`ShardPlan::shards`] of the shard holding `subject_id`.
    pub fn position_of(&self, subject_id: i64) -> Option<usize> {
        self.by_subject.get(&subject_id).copied()
    }

    pub fn shard_of(&self, subject_id: i64) -> Option<&ShardSpec> {
        self.position_of(subject_id).map(|pos| &self.shards[pos])
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn subject_count(&self) -> usize {
        self.by_subject.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meds_model::Subject;

    #[test]
    fn test_shards_are_positional_per_split() {
        let subjects: SubjectTable = [
            Subject::control(30, 1950, Split::Train),
            Subject::control(10, 1950, Split::Train),
            Subject::control(20, 1950, Split::Train),
            Subject::control(5, 1950, Split::Test),
        ]
        .into_iter()
        .collect();
        let plan = ShardPlan::new(&subjects, 2);

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.shards()[0].subject_ids, vec![10, 20]);
        assert_eq!(plan.shards()[1].subject_ids, vec![30]);
        assert_eq!(plan.shards()[1].index, 1);
        assert_eq!(plan.shards()[2].split, Split::Test);
        assert_eq!(plan.shards()[2].index, 0);
        assert_eq!(plan.shard_of(30).map(|s| s.index), Some(1));
        assert!(plan.shard_of(99).is_none());
    }

    #[test]
    fn test_paths_use_split_directory_names() {
        let shard = ShardSpec {
            split: Split::Val,
            index: 3,
            subject_ids: vec![1],
        };
        let base = Path::new("/out");
        assert_eq!(shard.file_path(base), Path::new("/out/tuning/shard_3.parquet"));
        assert_eq!(shard.parts_dir(base), Path::new("/out/tuning/shard_3"));
    }

    #[test]
    fn test_plan_split_dedups() {
        let shards = plan_split(Split::Train, &[3, 1, 3, 2], 0);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].subject_ids, vec![1]);
    }
}
