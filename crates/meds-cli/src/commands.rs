use anyhow::Result;

use meds_cli::config::EtlConfig;
use meds_cli::pipeline::{run_all, run_coverage, run_stage};
use meds_output::Stage;

use crate::cli::CoverageArgs;
use crate::summary::{print_coverage, print_stage_summary};

pub fn run_single(config: &EtlConfig, stage: Stage) -> Result<()> {
    let report = run_stage(config, stage)?;
    print_stage_summary(&report);
    Ok(())
}

pub fn run_pipeline(config: &EtlConfig) -> Result<()> {
    for report in run_all(config)? {
        print_stage_summary(&report);
    }
    Ok(())
}

pub fn run_coverage_report(config: &EtlConfig, args: &CoverageArgs) -> Result<()> {
    let result = run_coverage(config, args.output.as_deref())?;
    print_coverage(&result);
    Ok(())
}
