//! Run-level context shared by every stage.

use meds_model::{MappingOptions, Subject, SubjectTable};

use crate::sequencer::EventSequencer;

/// Subjects per output shard unless configured otherwise.
pub const DEFAULT_SHARD_SIZE: usize = 1000;

/// Study metadata, the subject table and run options.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Cancer type of the study (e.g. "pancreatic").
    pub cancer_type: String,
    /// Upstream subject table; read-only.
    pub subjects: SubjectTable,
    /// Subjects per shard.
    pub shard_size: usize,
    /// Mapping policy and terminal strategy.
    pub mapping: MappingOptions,
}

impl PipelineContext {
    pub fn new(cancer_type: impl Into<String>, subjects: SubjectTable) -> Self {
        Self {
            cancer_type: cancer_type.into(),
            subjects,
            shard_size: DEFAULT_SHARD_SIZE,
            mapping: MappingOptions::default(),
        }
    }

    /// Sets the shard size; zero is treated as one.
    pub fn with_shard_size(mut self, shard_size: usize) -> Self {
        self.shard_size = shard_size.max(1);
        self
    }

    pub fn with_mapping(mut self, mapping: MappingOptions) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn sequencer(&self) -> EventSequencer {
        EventSequencer::new(&self.cancer_type)
    }

    /// Subjects for `ids`, skipping ids absent from the table.
    pub fn subjects_for<'a>(&'a self, ids: &'a [i64]) -> impl Iterator<Item = &'a Subject> + 'a {
        ids.iter().filter_map(|id| self.subjects.get(*id))
    }
}
