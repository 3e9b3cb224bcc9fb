//! Per-shard spill buffers for the extract stage.
//!
//! Raw rows arrive in source-file order for all subjects at once. Each row
//! is routed to its shard's buffer, and a buffer is flushed to a numbered
//! part file once it reaches `spill_rows`, so memory stays bounded by the
//! number of shards times the spill size.

use std::path::{Path, PathBuf};

use meds_model::RawEvent;

use crate::artifact::ShardRecord;
use crate::error::Result;
use crate::frame::{raw_events_from_frame, raw_events_to_frame};
use crate::parquet::{list_parquet_files, read_parquet, write_parquet};
use crate::shard::{ShardPlan, ShardSpec};

/// Rows buffered per shard before a part file is written.
pub const DEFAULT_SPILL_ROWS: usize = 100_000;

#[derive(Debug, Default)]
struct ShardBuffer {
    rows: Vec<RawEvent>,
    parts: usize,
    written: u64,
}

/// Routes raw rows into per-shard part files under `base`.
#[derive(Debug)]
pub struct SpillWriter<'a> {
    plan: &'a ShardPlan,
    base: PathBuf,
    spill_rows: usize,
    buffers: Vec<ShardBuffer>,
}

impl<'a> SpillWriter<'a> {
    pub fn new(plan: &'a ShardPlan, base: impl Into<PathBuf>, spill_rows: usize) -> Self {
        Self {
            plan,
            base: base.into(),
            spill_rows: spill_rows.max(1),
            buffers: plan.shards().iter().map(|_| ShardBuffer::default()).collect(),
        }
    }

    /// Buffers `event`. Returns `false` when its subject has no shard.
    pub fn push(&mut self, event: RawEvent) -> Result<bool> {
        let Some(pos) = self.plan.position_of(event.subject_id) else {
            return Ok(false);
        };
        self.buffers[pos].rows.push(event);
        if self.buffers[pos].rows.len() >= self.spill_rows {
            self.flush(pos)?;
        }
        Ok(true)
    }

    fn flush(&mut self, pos: usize) -> Result<()> {
        let buffer = &mut self.buffers[pos];
        if buffer.rows.is_empty() {
            return Ok(());
        }
        let shard = &self.plan.shards()[pos];
        let path = shard
            .parts_dir(&self.base)
            .join(format!("part_{:05}.parquet", buffer.parts));
        let mut df = raw_events_to_frame(&buffer.rows)?;
        write_parquet(&path, &mut df)?;

        buffer.parts += 1;
        buffer.written += buffer.rows.len() as u64;
        buffer.rows.clear();
        Ok(())
    }

    /// Flushes every buffer and returns one record per planned shard,
    /// including shards that received no rows.
    pub fn finish(mut self) -> Result<Vec<ShardRecord>> {
        for pos in 0..self.buffers.len() {
            self.flush(pos)?;
        }
        Ok(self
            .plan
            .shards()
            .iter()
            .zip(&self.buffers)
            .map(|(shard, buffer)| ShardRecord::new(shard, buffer.written))
            .collect())
    }
}

/// Reads every part of one shard back, in part order.
pub fn read_shard_parts(base: &Path, shard: &ShardSpec) -> Result<Vec<RawEvent>> {
    let mut events = Vec::new();
    for part in list_parquet_files(&shard.parts_dir(base))? {
        let df = read_parquet(&part)?;
        events.extend(raw_events_from_frame(&df)?);
    }
    Ok(events)
}
