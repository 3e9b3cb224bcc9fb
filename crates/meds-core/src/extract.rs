//! Streaming passes over the raw extracts.
//!
//! Pass 1 records each subject's last observed date. Pass 2 applies the
//! trajectory windows and hands every retained row to a sink, which routes
//! it to its shard.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use meds_ingest::RawSource;
use meds_model::{RawEvent, SubjectTable};

use crate::window::{LastObserved, WindowFilter};

/// Row counts of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounts {
    /// Rows read from the extracts.
    pub rows: u64,
    /// Rows of subjects outside the subject table.
    pub unknown_subject: u64,
    /// Rows outside the subject's window.
    pub outside_window: u64,
    /// Rows handed to the sink.
    pub retained: u64,
    /// Rows dropped by the reader (bad patient id or empty code).
    pub malformed: u64,
}

fn scan(
    sources: &[RawSource],
    mut visit: impl FnMut(RawEvent) -> Result<()>,
) -> Result<u64> {
    let mut malformed = 0;
    for source in sources {
        let mut reader = source
            .open()
            .with_context(|| format!("open raw source {}", source.path.display()))?;
        for event in reader.by_ref() {
            let event =
                event.with_context(|| format!("read raw source {}", source.path.display()))?;
            visit(event)?;
        }
        debug!(
            path = %source.path.display(),
            skipped = reader.skipped_rows(),
            "scanned raw source"
        );
        malformed += reader.skipped_rows();
    }
    Ok(malformed)
}

/// Pass 1: latest dated event per cohort subject.
pub fn scan_last_observed(sources: &[RawSource], subjects: &SubjectTable) -> Result<LastObserved> {
    let start = Instant::now();
    let mut last = LastObserved::new();
    scan(sources, |event| {
        if subjects.contains(event.subject_id) {
            last.observe(event.subject_id, event.time);
        }
        Ok(())
    })?;
    info!(
        subjects = last.len(),
        duration_ms = start.elapsed().as_millis(),
        "collected last observed dates"
    );
    Ok(last)
}

/// Pass 2: windowed rows of cohort subjects, in file then row order.
pub fn scan_windowed(
    sources: &[RawSource],
    subjects: &SubjectTable,
    filter: &WindowFilter,
    mut sink: impl FnMut(RawEvent) -> Result<()>,
) -> Result<ScanCounts> {
    let start = Instant::now();
    let mut counts = ScanCounts::default();
    let malformed = scan(sources, |event| {
        counts.rows += 1;
        if !subjects.contains(event.subject_id) {
            counts.unknown_subject += 1;
            return Ok(());
        }
        if !filter.retains(&event) {
            counts.outside_window += 1;
            return Ok(());
        }
        counts.retained += 1;
        sink(event)
    })?;
    counts.malformed = malformed;
    info!(
        rows = counts.rows,
        retained = counts.retained,
        outside_window = counts.outside_window,
        unknown_subject = counts.unknown_subject,
        duration_ms = start.elapsed().as_millis(),
        "windowed raw events"
    );
    Ok(counts)
}
