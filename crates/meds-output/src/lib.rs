//! Sharded checkpoint output.
//!
//! # Features
//!
//! - **Shard planning**: positional, split-scoped subject chunks
//! - **Frame conversion**: raw and stream events to and from polars frames
//! - **Parquet IO**: one file per shard under `{base}/{split_dir}/`
//! - **Spill writer**: bounded per-shard buffers for the extract stage
//! - **Atomic publish**: staging directory, manifest, then rename
//!
//! # Example
//!
//! ```ignore
//! use meds_output::{ShardPlan, Stage, StagedArtifact, StreamLayout, stream_events_to_frame};
//!
//! let plan = ShardPlan::new(&subjects, 1000);
//! let mut staged = StagedArtifact::begin(&target, Stage::Clean)?;
//! for shard in plan.shards() {
//!     let mut df = stream_events_to_frame(&events, StreamLayout::Final)?;
//!     staged.write_shard(shard, &mut df)?;
//! }
//! staged.publish()?;
//! ```

pub mod artifact;
pub mod error;
pub mod frame;
pub mod parquet;
pub mod shard;
pub mod spill;

pub use artifact::{
    ArtifactManifest, MANIFEST_FILE, SCHEMA_VERSION, ShardRecord, Stage, StagedArtifact,
    require_artifact,
};
pub use error::{OutputError, Result};
pub use frame::{
    StreamLayout, raw_events_from_frame, raw_events_to_frame, stream_events_from_frame,
    stream_events_to_frame,
};
pub use parquet::{list_parquet_files, read_parquet, write_parquet};
pub use shard::{ShardPlan, ShardSpec, plan_split};
pub use spill::{DEFAULT_SPILL_ROWS, SpillWriter, read_shard_parts};
