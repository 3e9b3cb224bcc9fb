//! CLI argument definitions for the event stream pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;

use meds_cli::config::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(
    name = "meds-etl",
    version,
    about = "Build MEDS event streams from raw clinical extracts",
    long_about = "Build per-subject MEDS event streams from raw clinical extracts.\n\n\
                  Stages run in order (extract, sort, map, clean); each one commits a\n\
                  sharded parquet checkpoint that the next stage reads."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Pipeline configuration file.
    #[arg(
        long = "config",
        short = 'c',
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_FILE,
        global = true
    )]
    pub config: PathBuf,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow subject ids in trace logs.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan raw extracts, apply trajectory windows and spill rows by shard.
    Extract,

    /// Add birth events and sort every shard canonically.
    Sort,

    /// Map codes, consolidate drug episodes and sequence the stream.
    Map,

    /// Clean lab and measurement values and write the final shards.
    Clean,

    /// Run extract, sort, map and clean in order.
    Run,

    /// Report how the distinct raw codes resolve across mapping tiers.
    Coverage(CoverageArgs),
}

#[derive(Parser)]
pub struct CoverageArgs {
    /// Write the report as CSV (overrides `outputs.coverage_report`).
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
