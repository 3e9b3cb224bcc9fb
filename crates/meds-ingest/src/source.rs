//! Streaming reader over raw extracts.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, warn};

use meds_common::{parse_date, parse_f64, parse_i64};
use meds_model::RawEvent;

use crate::discovery::{drug_issue_files, observation_files};
use crate::error::Result;
use crate::schema::{SchemaProbe, SourceKind, SourceSchema, detect_schema};
use crate::table::{DelimitedReader, field};

/// A raw extract with a recognized schema.
#[derive(Debug, Clone)]
pub struct RawSource {
    pub path: PathBuf,
    pub schema: SourceSchema,
}

impl RawSource {
    pub fn open(&self) -> Result<RawEventReader> {
        RawEventReader::open(self)
    }
}

/// Files found in the source directories.
#[derive(Debug, Default)]
pub struct SourceInventory {
    pub sources: Vec<RawSource>,
    /// Files skipped because their schema was not recognized.
    pub skipped: Vec<PathBuf>,
}

fn probe_files(files: Vec<PathBuf>, kind: SourceKind, inventory: &mut SourceInventory) {
    for path in files {
        match detect_schema(&path, kind) {
            Ok(SchemaProbe::Recognized(schema)) => {
                debug!(
                    path = %path.display(),
                    kind = %kind,
                    patient_id = %schema.patient_id_column,
                    "recognized source schema"
                );
                inventory.sources.push(RawSource { path, schema });
            }
            Ok(SchemaProbe::Unrecognized { reason }) => {
                warn!(path = %path.display(), kind = %kind, %reason, "skipping raw source file");
                inventory.skipped.push(path);
            }
            Err(error) => {
                warn!(
                    path = %path.display(),
                    kind = %kind,
                    %error,
                    "skipping unreadable raw source file"
                );
                inventory.skipped.push(path);
            }
        }
    }
}

/// Discovers observation and drug-issue extracts and probes their schemas.
///
/// A missing or unreadable directory is fatal. Files that are empty,
/// unreadable or of an unrecognized schema are skipped with a warning.
pub fn discover_sources(
    observation_dir: &Path,
    medication_dir: Option<&Path>,
) -> Result<SourceInventory> {
    let mut inventory = SourceInventory::default();
    probe_files(
        observation_files(observation_dir)?,
        SourceKind::Observation,
        &mut inventory,
    );
    if let Some(dir) = medication_dir {
        probe_files(drug_issue_files(dir)?, SourceKind::DrugIssue, &mut inventory);
    }
    Ok(inventory)
}

/// Iterates the rows of one extract as [`RawEvent`]s.
///
/// Rows with an unparseable patient id or an empty code are skipped.
/// Dates and numbers parse leniently; bad cells become null.
pub struct RawEventReader {
    reader: DelimitedReader,
    schema: SourceSchema,
    record: StringRecord,
    skipped_rows: u64,
}

impl RawEventReader {
    pub fn open(source: &RawSource) -> Result<Self> {
        Ok(Self {
            reader: DelimitedReader::open(&source.path)?,
            schema: source.schema.clone(),
            record: StringRecord::new(),
            skipped_rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Rows dropped for a missing patient id or code so far.
    pub fn skipped_rows(&self) -> u64 {
        self.skipped_rows
    }

    fn to_event(&self) -> Option<RawEvent> {
        let schema = &self.schema;
        let subject_id = field(&self.record, Some(schema.patient_id)).and_then(parse_i64)?;
        let code = field(&self.record, Some(schema.code))?;
        let time = field(&self.record, schema.date).and_then(parse_date);

        Some(
            RawEvent::new(subject_id, time, schema.kind.vocabulary(), code)
                .with_value(field(&self.record, schema.value).and_then(parse_f64))
                .with_unit(field(&self.record, schema.unit).and_then(parse_i64))
                .with_duration(field(&self.record, schema.duration).and_then(parse_i64)),
        )
    }
}

impl Iterator for RawEventReader {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
            match self.to_event() {
                Some(event) => return Some(Ok(event)),
                None => self.skipped_rows += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use meds_model::Vocabulary;
    use tempfile::TempDir;

    #[test]
    fn test_reads_observation_rows() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("obs.txt"),
            "e_patid\tobsdate\tmedcodeid\tvalue\tnumunitid\n\
             1\t15/06/2020\t123\t4.5\t7\n\
             x\t15/06/2020\t123\t\t\n\
             2\t\t456\tabc\t\n\
             3\t01/01/2020\t\t1\t1\n",
        )
        .unwrap();

        let inventory = discover_sources(dir.path(), None).unwrap();
        assert_eq!(inventory.sources.len(), 1);

        let mut reader = inventory.sources[0].open().unwrap();
        let events: Vec<RawEvent> = reader.by_ref().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(reader.skipped_rows(), 2);

        assert_eq!(events[0].subject_id, 1);
        assert_eq!(events[0].time, NaiveDate::from_ymd_opt(2020, 6, 15));
        assert_eq!(events[0].raw_code(), Some((Vocabulary::MedCode, "123")));
        assert_eq!(events[0].numeric_value, Some(4.5));
        assert_eq!(events[0].numunit_id, Some(7));

        assert_eq!(events[1].time, None);
        assert_eq!(events[1].numeric_value, None);
    }

    #[test]
    fn test_unrecognized_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "pracid\tmedcodeid\n1\t2\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "patid\tmedcodeid\n1\t2\n").unwrap();

        let inventory = discover_sources(dir.path(), None).unwrap();
        assert_eq!(inventory.sources.len(), 1);
        assert_eq!(inventory.skipped.len(), 1);
        assert!(inventory.skipped[0].ends_with("a.txt"));
    }

    #[test]
    fn test_empty_and_undecodable_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a_empty.txt"), "").unwrap();
        std::fs::write(
            dir.path().join("a_bad.txt"),
            b"e_pat\xffid\tmedcodeid\n1\t2\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("b.txt"), "e_patid\tmedcodeid\n1\t2\n").unwrap();

        let inventory = discover_sources(dir.path(), None).unwrap();
        assert_eq!(inventory.sources.len(), 1);
        assert!(inventory.sources[0].path.ends_with("b.txt"));
        assert_eq!(inventory.skipped.len(), 2);
    }

    #[test]
    fn test_drug_issue_file_in_observation_dir_is_probed_and_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("DrugIssue_001.txt"),
            "e_patid\tissuedate\tprodcodeid\n1\t01/01/2019\t9\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("Observation_001.txt"), "e_patid\tmedcodeid\n1\t2\n")
            .unwrap();

        let inventory = discover_sources(dir.path(), None).unwrap();
        assert_eq!(inventory.sources.len(), 1);
        assert!(inventory.sources[0].path.ends_with("Observation_001.txt"));
        assert!(inventory.skipped[0].ends_with("DrugIssue_001.txt"));
    }

    #[test]
    fn test_drug_issue_rows_carry_duration() {
        let obs = TempDir::new().unwrap();
        let meds = TempDir::new().unwrap();
        std::fs::write(
            meds.path().join("DrugIssue_1.txt"),
            "e_patid\tissuedate\tprodcodeid\tduration\n5\t02/03/2019\t999\t28\n",
        )
        .unwrap();

        let inventory = discover_sources(obs.path(), Some(meds.path())).unwrap();
        let events: Vec<RawEvent> = inventory.sources[0]
            .open()
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(events[0].code, "prodcodeid//999");
        assert_eq!(events[0].duration, Some(28));
    }
}
