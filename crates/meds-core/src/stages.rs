//! Per-shard stage transformations.
//!
//! Each function works on one shard's rows in memory; shard size bounds
//! the working set.

use tracing::debug;

use meds_map::{CodeMapper, MappingTier, TierCounts};
use meds_model::{BIRTH_CODE, Category, MappedEvent, RawEvent, StreamEvent};

use crate::cleaning::{CleaningCounts, ValueCleaner};
use crate::episodes::{DrugEpisode, consolidate};
use crate::pipeline_context::PipelineContext;
use crate::sequencer::{birth_events, canonical_sort};

/// Sort stage: adds a birth row per shard subject and puts the shard in
/// canonical order.
pub fn build_sorted_shard(
    ctx: &PipelineContext,
    subject_ids: &[i64],
    mut events: Vec<RawEvent>,
) -> Vec<RawEvent> {
    events.retain(|event| !event.is_birth());
    events.extend(birth_events(ctx.subjects_for(subject_ids)));
    canonical_sort(&mut events);
    events
}

/// Counts of one map-stage shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapShardStats {
    pub input_rows: u64,
    pub output_rows: u64,
    pub prescriptions: u64,
    pub episodes: u64,
    pub tiers: TierCounts,
}

impl MapShardStats {
    pub fn merge(&mut self, other: &MapShardStats) {
        self.input_rows += other.input_rows;
        self.output_rows += other.output_rows;
        self.prescriptions += other.prescriptions;
        self.episodes += other.episodes;
        self.tiers.merge(&other.tiers);
    }

    pub fn unmapped(&self) -> u64 {
        self.tiers.get(MappingTier::Unmapped)
    }
}

/// Map stage: maps codes, consolidates prescriptions into episodes and
/// sequences the result.
pub fn build_event_stream(
    ctx: &PipelineContext,
    mapper: &CodeMapper,
    subject_ids: &[i64],
    events: Vec<RawEvent>,
) -> (Vec<StreamEvent>, MapShardStats) {
    let mut stats = MapShardStats {
        input_rows: events.len() as u64,
        ..MapShardStats::default()
    };
    let mut stream: Vec<StreamEvent> = Vec::with_capacity(events.len());
    let mut prescriptions: Vec<MappedEvent> = Vec::new();

    for event in &events {
        if event.is_birth() {
            stream.push(StreamEvent::marker(event.subject_id, event.time, BIRTH_CODE));
            continue;
        }
        let (tier, mapped) = mapper.map_event(event);
        stats.tiers.record(tier);
        match mapped {
            Some(mapped) if mapped.category == Category::Prescription => {
                prescriptions.push(mapped);
            }
            Some(mapped) => stream.push(mapped.into_stream_event()),
            None => {}
        }
    }

    let episodes = consolidate(&prescriptions);
    stats.prescriptions = prescriptions.len() as u64;
    stats.episodes = episodes.len() as u64;
    stream.extend(episodes.into_iter().flat_map(DrugEpisode::into_events));

    let stream = ctx
        .sequencer()
        .assemble(stream, ctx.subjects_for(subject_ids));
    stats.output_rows = stream.len() as u64;
    debug!(
        subjects = subject_ids.len(),
        input_rows = stats.input_rows,
        output_rows = stats.output_rows,
        episodes = stats.episodes,
        "built event stream shard"
    );
    (stream, stats)
}

/// Clean stage: nulls rejected values in place. Row count and order are
/// unchanged.
pub fn clean_shard(
    cleaner: &ValueCleaner,
    mut events: Vec<StreamEvent>,
) -> (Vec<StreamEvent>, CleaningCounts) {
    let counts = cleaner.clean_all(&mut events);
    (events, counts)
}
