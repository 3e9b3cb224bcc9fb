//! Raw source file discovery.

use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// File-name marker of drug-issue extracts.
pub const DRUG_ISSUE_MARKER: &str = "drugissue";

fn has_txt_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

/// Lists the files in `dir` accepted by `accept`.
///
/// Returns files sorted by filename.
pub fn list_files(dir: &Path, accept: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| IngestError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|e| IngestError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && accept(&path) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Observation extracts: every `*.txt`. Files without observation columns
/// are skipped later by the schema probe.
pub fn observation_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files(dir, has_txt_extension)
}

/// Drug-issue extracts: `*drugissue*.txt`.
pub fn drug_issue_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files(dir, |path| {
        has_txt_extension(path) && file_name(path).contains(DRUG_ISSUE_MARKER)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in &[
            "Obs_002.txt",
            "Obs_001.txt",
            "DrugIssue_001.txt",
            "notes.csv",
        ] {
            std::fs::write(dir.path().join(name), "e_patid\n1\n").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();
        dir
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_observation_files_take_every_txt_sorted() {
        let dir = create_test_dir();
        let files = observation_files(dir.path()).unwrap();
        assert_eq!(
            names(&files),
            vec!["DrugIssue_001.txt", "Obs_001.txt", "Obs_002.txt"]
        );
    }

    #[test]
    fn test_drug_issue_files() {
        let dir = create_test_dir();
        let files = drug_issue_files(dir.path()).unwrap();
        assert_eq!(names(&files), vec!["DrugIssue_001.txt"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = observation_files(&dir.path().join("absent"));
        assert!(matches!(result, Err(IngestError::DirectoryNotFound { .. })));
    }
}
