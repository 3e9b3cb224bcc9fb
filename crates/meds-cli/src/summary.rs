use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use meds_cli::types::{CoverageResult, StageReport};
use meds_map::MappingTier;
use meds_model::Split;

pub fn print_stage_summary(report: &StageReport) {
    println!("Stage: {} ({} ms)", report.stage, report.duration_ms);
    println!("Output: {}", report.output_dir.display());

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Split"),
        header_cell("Shards"),
        header_cell("Subjects"),
        header_cell("Rows"),
    ]);
    apply_summary_table_style(&mut table);
    for index in 1..=3 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for split in Split::ALL {
        let shards: Vec<_> = report.manifest.shards_in(split).collect();
        let subjects: usize = shards.iter().map(|s| s.subjects).sum();
        let rows: u64 = shards.iter().map(|s| s.rows).sum();
        table.add_row(vec![
            Cell::new(split.as_str()),
            count_cell(shards.len() as u64),
            count_cell(subjects as u64),
            count_cell(rows),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(report.manifest.shards.len()).add_attribute(Attribute::Bold),
        Cell::new(report.manifest.total_subjects()).add_attribute(Attribute::Bold),
        Cell::new(report.manifest.total_rows()).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");

    if !report.counters.is_empty() {
        let mut counters = Table::new();
        counters.set_header(vec![header_cell("Counter"), header_cell("Value")]);
        apply_table_style(&mut counters);
        align_column(&mut counters, 1, CellAlignment::Right);
        for (name, value) in &report.counters {
            counters.add_row(vec![Cell::new(name), count_cell(*value)]);
        }
        println!("{counters}");
    }
}

pub fn print_coverage(result: &CoverageResult) {
    println!("Distinct codes: {}", result.report.total_codes());
    if let Some(path) = &result.csv_path {
        println!("Coverage report: {}", path.display());
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Tier"),
        header_cell("Description"),
        header_cell("Codes"),
        header_cell("Percent"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    for row in result.report.rows() {
        let tier = if row.tier == MappingTier::Unmapped {
            Cell::new(row.tier).fg(Color::Yellow)
        } else {
            Cell::new(row.tier)
        };
        table.add_row(vec![
            tier,
            Cell::new(row.label),
            count_cell(row.codes),
            Cell::new(format!("{:.1}%", row.percent)),
        ]);
    }
    println!("{table}");
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn count_cell(count: u64) -> Cell {
    if count == 0 {
        Cell::new(count).fg(Color::DarkGrey)
    } else {
        Cell::new(count)
    }
}
