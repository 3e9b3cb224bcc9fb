//! Stage orchestration.
//!
//! Every stage checks its upstream artifact, works one shard at a time and
//! publishes its own artifact atomically:
//!
//! 1. `extract`: windowed raw rows spilled into per-shard parts
//! 2. `sort`: birth rows added, canonical order
//! 3. `map`: canonical codes, drug episodes, sequenced stream
//! 4. `clean`: lab rules and measurement outliers, final columns

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{Level, debug, enabled, info, info_span, trace, warn};

use meds_core::{
    CleaningCounts, MapShardStats, MeasurementStats, PipelineContext, ValueCleaner, WindowFilter,
    build_event_stream, build_sorted_shard, clean_shard, scan_last_observed, scan_windowed,
};
use meds_ingest::{
    discover_sources, load_cleaning_rules, load_codelists, load_medical_dictionary,
    load_product_codelist, load_snomed_icd10_map, load_subject_table,
};
use meds_map::{CodeInventory, CodeMapper, CoverageReport, LookupTables};
use meds_model::{RawEvent, StreamEvent};
use meds_output::{
    ArtifactManifest, ShardPlan, ShardSpec, SpillWriter, Stage, StagedArtifact, StreamLayout,
    raw_events_from_frame, raw_events_to_frame, read_parquet, read_shard_parts,
    require_artifact, stream_events_from_frame, stream_events_to_frame,
};

use crate::config::EtlConfig;
use crate::logging::redact_value;
use crate::types::{CoverageResult, StageReport};

type Counters = Vec<(String, u64)>;

fn counter(name: &str, value: u64) -> (String, u64) {
    (name.to_string(), value)
}

/// Loads the subject table and builds the run context.
pub fn load_context(config: &EtlConfig) -> Result<PipelineContext> {
    let path = &config.paths.subject_information_file;
    let subjects = load_subject_table(path)
        .with_context(|| format!("load subject table {}", path.display()))?;
    Ok(PipelineContext::new(&config.study.cancer_type, subjects)
        .with_shard_size(config.study.shard_size)
        .with_mapping(config.mapping.options()))
}

/// Loads every configured lookup table.
pub fn load_lookup_tables(config: &EtlConfig) -> Result<LookupTables> {
    let paths = &config.paths;
    let codelists = load_codelists(&paths.codelists)
        .with_context(|| format!("load codelists {}", paths.codelists.display()))?;
    let mut tables = LookupTables::new().with_codelists(&codelists);

    if let Some(path) = &paths.medical_dictionary {
        let entries = load_medical_dictionary(path)
            .with_context(|| format!("load medical dictionary {}", path.display()))?;
        tables = tables.with_dictionary(&entries);
    }
    if let Some(path) = &paths.product_codelist {
        let entries = load_product_codelist(path)
            .with_context(|| format!("load product codelist {}", path.display()))?;
        tables = tables.with_products(&entries);
    }
    if let Some(path) = &paths.snomed_icd10_map {
        let targets = load_snomed_icd10_map(path)
            .with_context(|| format!("load SNOMED to ICD-10 map {}", path.display()))?;
        tables = tables.with_icd10_map(&targets);
    }
    Ok(tables)
}

fn build_mapper(config: &EtlConfig, ctx: &PipelineContext) -> Result<CodeMapper> {
    let tables = load_lookup_tables(config)?;
    let sizes = tables.sizes();
    let mapper = CodeMapper::new(tables, ctx.mapping);
    info!(
        terminal = mapper.terminal_name(),
        unmapped = %mapper.unmapped_policy(),
        primary = sizes.primary,
        secondary = sizes.secondary,
        read_codes = sizes.read_codes,
        products = sizes.products,
        "built code mapper"
    );
    Ok(mapper)
}

/// Checks the upstream artifact and that it was sharded like `plan`.
fn open_upstream<'c>(
    config: &'c EtlConfig,
    upstream: Stage,
    plan: &ShardPlan,
) -> Result<&'c Path> {
    let dir = config.outputs.dir_for(upstream);
    let manifest = require_artifact(dir, upstream)?;
    if !manifest.matches_plan(plan) {
        bail!(
            "{upstream} artifact at {} has a different shard layout; rerun the {upstream} stage",
            dir.display()
        );
    }
    Ok(dir)
}

fn read_raw_shard(dir: &Path, shard: &ShardSpec) -> Result<Vec<RawEvent>> {
    let df = read_parquet(&shard.file_path(dir))?;
    Ok(raw_events_from_frame(&df)?)
}

fn read_stream_shard(dir: &Path, shard: &ShardSpec) -> Result<Vec<StreamEvent>> {
    let df = read_parquet(&shard.file_path(dir))?;
    Ok(stream_events_from_frame(&df)?)
}

fn trace_subject_rows(stage: Stage, subject_ids: impl IntoIterator<Item = i64>) {
    if !enabled!(Level::TRACE) {
        return;
    }
    let mut rows: BTreeMap<i64, u64> = BTreeMap::new();
    for subject_id in subject_ids {
        *rows.entry(subject_id).or_default() += 1;
    }
    for (subject_id, rows) in rows {
        let subject_id = subject_id.to_string();
        trace!(
            stage = %stage,
            subject_id = redact_value(&subject_id),
            rows,
            "subject rows"
        );
    }
}

fn extract(
    config: &EtlConfig,
    ctx: &PipelineContext,
    plan: &ShardPlan,
) -> Result<(ArtifactManifest, Counters)> {
    let paths = &config.paths;
    let inventory = discover_sources(
        &paths.observation_data_dir,
        paths.medication_data_dir.as_deref(),
    )
    .with_context(|| {
        format!(
            "discover raw sources in {}",
            paths.observation_data_dir.display()
        )
    })?;

    let last_observed = scan_last_observed(&inventory.sources, &ctx.subjects)?;
    let filter = WindowFilter::new(&ctx.subjects, &last_observed);
    let without_window = ctx.subjects.len() - filter.len();
    if without_window > 0 {
        warn!(
            subjects = without_window,
            "subjects without a trajectory window receive only synthetic events"
        );
    }

    let mut staged =
        StagedArtifact::begin(config.outputs.dir_for(Stage::Extract), Stage::Extract)?;
    let mut writer = SpillWriter::new(plan, staged.staging_dir(), config.study.spill_rows);
    let counts = scan_windowed(&inventory.sources, &ctx.subjects, &filter, |event| {
        writer.push(event)?;
        Ok(())
    })?;
    for record in writer.finish()? {
        staged.record(record);
    }
    let manifest = staged.publish()?;

    let counters = vec![
        counter("source files", inventory.sources.len() as u64),
        counter("skipped files", inventory.skipped.len() as u64),
        counter("rows read", counts.rows),
        counter("malformed rows", counts.malformed),
        counter("unknown subject", counts.unknown_subject),
        counter("outside window", counts.outside_window),
        counter("retained", counts.retained),
    ];
    Ok((manifest, counters))
}

fn sort(
    config: &EtlConfig,
    ctx: &PipelineContext,
    plan: &ShardPlan,
) -> Result<(ArtifactManifest, Counters)> {
    let source = open_upstream(config, Stage::Extract, plan)?;
    let mut staged = StagedArtifact::begin(config.outputs.dir_for(Stage::Sort), Stage::Sort)?;
    let mut births = 0u64;

    for shard in plan.shards() {
        let events = read_shard_parts(source, shard)?;
        let sorted = build_sorted_shard(ctx, &shard.subject_ids, events);
        births += sorted.iter().filter(|event| event.is_birth()).count() as u64;
        trace_subject_rows(Stage::Sort, sorted.iter().map(|event| event.subject_id));

        let mut df = raw_events_to_frame(&sorted)?;
        let rows = staged.write_shard(shard, &mut df)?;
        debug!(split = %shard.split, shard = shard.index, rows, "sorted shard");
    }

    let manifest = staged.publish()?;
    Ok((manifest, vec![counter("birth events", births)]))
}

fn map(
    config: &EtlConfig,
    ctx: &PipelineContext,
    plan: &ShardPlan,
) -> Result<(ArtifactManifest, Counters)> {
    let source = open_upstream(config, Stage::Sort, plan)?;
    let mapper = build_mapper(config, ctx)?;
    let mut staged = StagedArtifact::begin(config.outputs.dir_for(Stage::Map), Stage::Map)?;
    let mut totals = MapShardStats::default();

    for shard in plan.shards() {
        let events = read_raw_shard(source, shard)?;
        let (stream, stats) = build_event_stream(ctx, &mapper, &shard.subject_ids, events);
        totals.merge(&stats);
        trace_subject_rows(Stage::Map, stream.iter().map(|event| event.subject_id));

        let mut df = stream_events_to_frame(&stream, StreamLayout::Mapped)?;
        staged.write_shard(shard, &mut df)?;
    }

    let manifest = staged.publish()?;
    let mut counters = vec![
        counter("input rows", totals.input_rows),
        counter("output rows", totals.output_rows),
        counter("prescriptions", totals.prescriptions),
        counter("episodes", totals.episodes),
    ];
    counters.extend(
        totals
            .tiers
            .iter()
            .map(|(tier, count)| (format!("tier {tier}"), count)),
    );
    Ok((manifest, counters))
}

fn clean(config: &EtlConfig, plan: &ShardPlan) -> Result<(ArtifactManifest, Counters)> {
    let source = open_upstream(config, Stage::Map, plan)?;
    let rules = match &config.paths.cleaning_rules {
        Some(path) => load_cleaning_rules(path)
            .with_context(|| format!("load cleaning rules {}", path.display()))?,
        None => {
            warn!("no cleaning rules configured, lab values pass through unchanged");
            None
        }
    };

    let mut measurements = MeasurementStats::new();
    for shard in plan.shards() {
        measurements.observe_all(&read_stream_shard(source, shard)?);
    }
    let cleaner = ValueCleaner::new(rules, measurements.finish());

    let mut staged = StagedArtifact::begin(config.outputs.dir_for(Stage::Clean), Stage::Clean)?;
    let mut totals = CleaningCounts::default();
    for shard in plan.shards() {
        let events = read_stream_shard(source, shard)?;
        let (cleaned, counts) = clean_shard(&cleaner, events);
        totals.merge(&counts);

        let mut df = stream_events_to_frame(&cleaned, StreamLayout::Final)?;
        staged.write_shard(shard, &mut df)?;
    }

    let manifest = staged.publish()?;
    let counters = vec![
        counter("converted", totals.converted),
        counter("rejected by rule", totals.rejected_by_rule),
        counter("no rule", totals.no_rule),
        counter("accepted", totals.accepted),
        counter("rejected outlier", totals.rejected_outlier),
        counter("nulled", totals.nulled()),
    ];
    Ok((manifest, counters))
}

fn execute(config: &EtlConfig, stage: Stage) -> Result<(ArtifactManifest, Counters)> {
    let ctx = load_context(config)?;
    let plan = ShardPlan::new(&ctx.subjects, ctx.shard_size);
    debug!(shards = plan.len(), subjects = plan.subject_count(), "planned shards");
    match stage {
        Stage::Extract => extract(config, &ctx, &plan),
        Stage::Sort => sort(config, &ctx, &plan),
        Stage::Map => map(config, &ctx, &plan),
        Stage::Clean => clean(config, &plan),
    }
}

/// Runs one stage and publishes its artifact.
pub fn run_stage(config: &EtlConfig, stage: Stage) -> Result<StageReport> {
    let span = info_span!("stage", stage = %stage);
    let _guard = span.enter();
    let start = Instant::now();
    info!("stage started");

    let (manifest, counters) =
        execute(config, stage).with_context(|| format!("{stage} stage failed"))?;

    let duration_ms = start.elapsed().as_millis();
    info!(
        shards = manifest.shards.len(),
        rows = manifest.total_rows(),
        duration_ms,
        "stage finished"
    );
    Ok(StageReport {
        stage,
        output_dir: config.outputs.dir_for(stage).to_path_buf(),
        manifest,
        counters,
        duration_ms,
    })
}

/// Runs extract, sort, map and clean in order, stopping at the first
/// failure.
pub fn run_all(config: &EtlConfig) -> Result<Vec<StageReport>> {
    Stage::ALL
        .iter()
        .map(|stage| run_stage(config, *stage))
        .collect()
}

/// Mapping coverage of the distinct raw codes in the sorted artifact.
///
/// `csv_path` overrides `outputs.coverage_report`.
pub fn run_coverage(config: &EtlConfig, csv_path: Option<&Path>) -> Result<CoverageResult> {
    let run = || -> Result<CoverageResult> {
        let ctx = load_context(config)?;
        let plan = ShardPlan::new(&ctx.subjects, ctx.shard_size);
        let source = open_upstream(config, Stage::Sort, &plan)?;
        let mapper = build_mapper(config, &ctx)?;

        let mut inventory = CodeInventory::new();
        for shard in plan.shards() {
            for event in &read_raw_shard(source, shard)? {
                inventory.observe(event);
            }
        }
        let report = CoverageReport::from_inventory(&mapper, &inventory);
        info!(codes = report.total_codes(), "computed mapping coverage");

        let csv_path = csv_path
            .map(Path::to_path_buf)
            .or_else(|| config.outputs.coverage_report.clone());
        if let Some(path) = &csv_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            report.write_csv(path)?;
        }
        Ok(CoverageResult { report, csv_path })
    };
    run().context("coverage analysis failed")
}
