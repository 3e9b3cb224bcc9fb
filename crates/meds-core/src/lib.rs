//! Event stream construction.
//!
//! # Features
//!
//! - **Trajectory windows**: per-subject inclusion ranges for cases and controls
//! - **Streaming extract passes**: last observed dates, then windowed routing
//! - **Event sequencing**: birth and diagnosis events, lifestyle dedup,
//!   near-duplicate collapse, canonical stable sort
//! - **Drug episodes**: adaptive-gap consolidation of prescriptions
//! - **Value cleaning**: curated lab rules and global measurement outliers
//! - **Shard stages**: sort, map and clean transformations for one shard
//!
//! # Example
//!
//! ```ignore
//! use meds_core::{PipelineContext, build_event_stream};
//!
//! let ctx = PipelineContext::new("pancreatic", subjects);
//! let (stream, stats) = build_event_stream(&ctx, &mapper, &shard_ids, sorted_rows);
//! ```

pub mod cleaning;
pub mod episodes;
pub mod extract;
pub mod pipeline_context;
pub mod sequencer;
pub mod stages;
pub mod window;

pub use cleaning::{
    CleanOutcome, CleaningCounts, MeasurementStats, OUTLIER_SIGMAS, TermStats, ValueCleaner,
    rule_identifier,
};
pub use episodes::{
    DEFAULT_DURATION_DAYS, DrugEpisode, GRACE_DAYS, GapStats, consolidate, median, sample_std,
};
pub use extract::{ScanCounts, scan_last_observed, scan_windowed};
pub use pipeline_context::{DEFAULT_SHARD_SIZE, PipelineContext};
pub use sequencer::{
    EventSequencer, LIFESTYLE_TERMS, Sequenced, birth_events, canonical_sort,
    collapse_near_duplicates, dedup_lifestyle, is_canonically_ordered, is_lifestyle_term,
};
pub use stages::{MapShardStats, build_event_stream, build_sorted_shard, clean_shard};
pub use window::{LastObserved, TrajectoryWindow, WindowFilter};
