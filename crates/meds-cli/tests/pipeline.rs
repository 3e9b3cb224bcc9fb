//! End-to-end runs of the stage pipeline over a small raw extract.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use meds_cli::config::{EtlConfig, load_config};
use meds_cli::pipeline::{run_all, run_coverage, run_stage};
use meds_map::MappingTier;
use meds_model::{Split, StreamEvent};
use meds_output::{
    ArtifactManifest, Stage, list_parquet_files, read_parquet, stream_events_from_frame,
};

const CONFIG: &str = r#"
[study]
cancer_type = "pancreatic"
shard_size = 2
spill_rows = 2

[paths]
subject_information_file = "raw/subjects.csv"
observation_data_dir = "raw/observations"
medication_data_dir = "raw/medications"
codelists = "lookups/{cancer_type}_codelists.csv"
product_codelist = "lookups/products.csv"
cleaning_rules = "lookups/cleaning_rules.csv"

[outputs]
intermediate_unsorted_dir = "out/{cancer_type}/unsorted"
intermediate_sorted_dir = "out/{cancer_type}/sorted"
event_stream_dir = "out/{cancer_type}/mapped"
final_cleaned_dir = "out/{cancer_type}/final"
coverage_report = "out/{cancer_type}/coverage.csv"
"#;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn study() -> (TempDir, EtlConfig) {
    let root = TempDir::new().unwrap();
    let base = root.path();
    write(
        &base.join("raw/subjects.csv"),
        "subject_id,is_case,cancerdate,yob,split\n\
         1,1,2020-06-15,1955,train\n\
         2,0,,1960.0,train\n\
         3,0,,1970,test\n",
    );
    write(
        &base.join("raw/observations/Observation_001.txt"),
        "e_patid\tobsdate\tmedcodeid\tvalue\tnumunitid\n\
         1\t01/03/2019\t10\t130\t56\n\
         1\t01/04/2019\t10\t500\t56\n\
         1\t01/01/2010\t12\t\t\n\
         1\t01/01/2018\t999\t\t\n\
         2\t01/01/2015\t12\t\t\n\
         2\t01/01/2021\t12\t\t\n\
         9\t01/01/2019\t12\t\t\n",
    );
    write(
        &base.join("raw/medications/DrugIssue_001.txt"),
        "e_patid\tissuedate\tprodcodeid\tquantity\tduration\n\
         1\t01/02/2018\t900\t28\t28\n\
         1\t01/03/2018\t900\t28\t28\n",
    );
    write(
        &base.join("lookups/pancreatic_codelists.csv"),
        "MedicalTerm,medcodes\nHemoglobin,10\ncough,12\n",
    );
    write(&base.join("lookups/products.csv"), "DrugTerm,prodcodes\nDrugX,900\n");
    write(
        &base.join("lookups/cleaning_rules.csv"),
        "IdentifierType,Identifier,UnitID,ConversionFactor,ConversionBias,ValidMin,ValidMax\n\
         MedicalTerm,Hemoglobin,56,0.1,,5,20\n",
    );
    let config_path = base.join("config.toml");
    write(&config_path, CONFIG);
    let config = load_config(&config_path).unwrap();
    (root, config)
}

fn read_split(dir: &Path, split: Split) -> Vec<StreamEvent> {
    list_parquet_files(&dir.join(split.dir_name()))
        .unwrap()
        .iter()
        .flat_map(|path| stream_events_from_frame(&read_parquet(path).unwrap()).unwrap())
        .collect()
}

fn codes(events: &[StreamEvent], subject_id: i64) -> Vec<&str> {
    events
        .iter()
        .filter(|e| e.subject_id == subject_id)
        .map(|e| e.code.as_str())
        .collect()
}

#[test]
fn full_run_produces_cleaned_subject_streams() {
    let (_root, config) = study();
    let reports = run_all(&config).unwrap();
    let stages: Vec<Stage> = reports.iter().map(|r| r.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    let extract = &reports[0];
    assert_eq!(extract.counter("unknown subject"), Some(1));
    assert_eq!(extract.counter("outside window"), Some(2));
    assert_eq!(extract.counter("retained"), Some(6));
    assert_eq!(reports[1].counter("birth events"), Some(3));
    assert_eq!(reports[2].counter("episodes"), Some(1));
    assert_eq!(reports[3].counter("converted"), Some(1));
    assert_eq!(reports[3].counter("rejected by rule"), Some(1));

    let final_dir = config.outputs.dir_for(Stage::Clean);
    let train = read_split(final_dir, Split::Train);
    assert_eq!(
        codes(&train, 1),
        vec![
            "MEDS_BIRTH",
            "START_PRESCRIPTION//DrugX//",
            "END_PRESCRIPTION//DrugX//",
            "LAB//Hemoglobin//10",
            "LAB//Hemoglobin//10",
            "MEDICAL//pancreatic_cancer//",
        ]
    );
    let labs: Vec<Option<f32>> = train
        .iter()
        .filter(|e| e.code == "LAB//Hemoglobin//10")
        .map(|e| e.numeric_value)
        .collect();
    assert!((labs[0].unwrap() - 13.0).abs() < 1e-4);
    assert_eq!(labs[1], None);
    assert!(train.iter().all(|e| e.numunit_id.is_none()));

    assert_eq!(codes(&train, 2), vec!["MEDS_BIRTH", "MEDICAL//cough//12"]);
    assert!(read_split(final_dir, Split::Val).is_empty());
    assert_eq!(codes(&read_split(final_dir, Split::Test), 3), vec!["MEDS_BIRTH"]);
}

#[test]
fn rerun_is_deterministic() {
    let (_root, config) = study();
    let first = run_all(&config).unwrap();
    let final_dir = config.outputs.dir_for(Stage::Clean);
    let before = read_split(final_dir, Split::Train);

    let second = run_all(&config).unwrap();
    let after = read_split(final_dir, Split::Train);
    assert_eq!(before, after);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.manifest, b.manifest);
    }
    assert_eq!(
        ArtifactManifest::read(final_dir).unwrap(),
        second[3].manifest
    );
}

#[test]
fn stage_without_upstream_fails_and_writes_nothing() {
    let (_root, config) = study();
    let err = run_stage(&config, Stage::Map).unwrap_err();
    assert!(format!("{err:#}").contains("map stage failed"));
    assert!(!config.outputs.dir_for(Stage::Map).exists());
}

#[test]
fn edited_subject_table_invalidates_upstream_artifact() {
    let (_root, config) = study();
    run_stage(&config, Stage::Extract).unwrap();

    write(
        &config.paths.subject_information_file,
        "subject_id,is_case,cancerdate,yob,split\n\
         1,1,2020-06-15,1955,train\n\
         4,0,,1960,train\n\
         3,0,,1970,test\n",
    );
    let err = run_stage(&config, Stage::Sort).unwrap_err();
    assert!(format!("{err:#}").contains("different shard layout"));
    assert!(!config.outputs.dir_for(Stage::Sort).exists());
}

#[test]
fn coverage_counts_distinct_codes_by_tier() {
    let (_root, config) = study();
    run_stage(&config, Stage::Extract).unwrap();
    run_stage(&config, Stage::Sort).unwrap();

    let result = run_coverage(&config, None).unwrap();
    assert_eq!(result.report.total_codes(), 4);
    assert_eq!(result.report.count(MappingTier::Primary), 2);
    assert_eq!(result.report.count(MappingTier::Product), 1);
    assert_eq!(result.report.count(MappingTier::Unmapped), 1);
    let csv_path = result.csv_path.unwrap();
    assert!(fs::read_to_string(csv_path).unwrap().contains("unmapped"));
}
