//! Delimited text reading.
//!
//! `.txt` and `.tsv` files are tab-delimited without quoting; everything
//! else is read as comma-separated CSV. Headers and fields are trimmed and a
//! leading BOM is stripped, so `"\u{feff}MedicalTerm\r"` is `MedicalTerm`.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{IngestError, Result};

/// Returns the field delimiter used for `path`.
pub fn delimiter_for(path: &Path) -> u8 {
    let tab = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("tsv"))
        .unwrap_or(false);
    if tab { b'\t' } else { b',' }
}

fn normalize_header(value: &str) -> String {
    value.trim_matches('\u{feff}').trim().to_string()
}

/// A delimited file opened for record-by-record reading.
pub struct DelimitedReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    row: u64,
}

impl DelimitedReader {
    pub fn open(path: &Path) -> Result<Self> {
        let delimiter = delimiter_for(path);
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IngestError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                IngestError::FileRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .quoting(delimiter != b'\t')
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| IngestError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(normalize_header)
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(IngestError::EmptyFile {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            row: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Index of a column, if present.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column that must be present.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| IngestError::MissingColumn {
            column: name.to_string(),
            path: self.path.clone(),
        })
    }

    /// 1-based data row number of the last record read.
    pub fn row(&self) -> u64 {
        self.row
    }

    /// Reads the next record into `record`; returns `false` at end of file.
    pub fn read_record(&mut self, record: &mut StringRecord) -> Result<bool> {
        let more = self
            .reader
            .read_record(record)
            .map_err(|source| IngestError::Csv {
                path: self.path.clone(),
                source,
            })?;
        if more {
            self.row += 1;
        }
        Ok(more)
    }
}

/// Reads only the normalized header row.
pub fn read_headers(path: &Path) -> Result<Vec<String>> {
    Ok(DelimitedReader::open(path)?.headers)
}

/// Read a delimited file into a vector of row maps keyed by header.
pub fn read_csv_rows(path: &Path) -> Result<Vec<BTreeMap<String, String>>> {
    let mut reader = DelimitedReader::open(path)?;
    let headers = reader.headers.clone();
    let mut record = StringRecord::new();
    let mut rows = Vec::new();
    while reader.read_record(&mut record)? {
        let mut row = BTreeMap::new();
        for (idx, value) in record.iter().enumerate() {
            if let Some(key) = headers.get(idx) {
                row.insert(key.clone(), value.to_string());
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Get an optional field value from a row (None if empty or missing).
pub fn get_optional<'a>(row: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    row.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Field of `record` at an optional column index, `None` when empty.
pub fn field<'r>(record: &'r StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i)).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        write!(file, "{content}").unwrap();
        path
    }

    #[test]
    fn test_delimiter_by_extension() {
        assert_eq!(delimiter_for(Path::new("obs_001.txt")), b'\t');
        assert_eq!(delimiter_for(Path::new("map.TSV")), b'\t');
        assert_eq!(delimiter_for(Path::new("codelists.csv")), b',');
    }

    #[test]
    fn test_headers_trimmed_with_bom_and_cr() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "rules.csv", "\u{feff} Identifier ,UnitID\r\nCRP,5\r\n");
        let rows = read_csv_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(get_optional(&rows[0], "Identifier"), Some("CRP"));
        assert_eq!(get_optional(&rows[0], "UnitID"), Some("5"));
    }

    #[test]
    fn test_tab_files_ignore_quotes() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "dict.txt", "MedCodeId\tTerm\n1\t\"quoted term\n2\tplain\n");
        let mut reader = DelimitedReader::open(&path).unwrap();
        let term = reader.require("Term").unwrap();
        let mut record = StringRecord::new();
        assert!(reader.read_record(&mut record).unwrap());
        assert_eq!(record.get(term), Some("\"quoted term"));
        assert!(reader.read_record(&mut record).unwrap());
        assert_eq!(reader.row(), 2);
        assert!(!reader.read_record(&mut record).unwrap());
    }

    #[test]
    fn test_missing_column_and_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.csv", "A,B\n1,2\n");
        let reader = DelimitedReader::open(&path).unwrap();
        assert!(matches!(
            reader.require("C"),
            Err(IngestError::MissingColumn { .. })
        ));

        let missing = DelimitedReader::open(&dir.path().join("nope.csv"));
        assert!(matches!(missing, Err(IngestError::FileNotFound { .. })));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.csv", "");
        assert!(matches!(
            DelimitedReader::open(&path),
            Err(IngestError::EmptyFile { .. })
        ));
    }
}
