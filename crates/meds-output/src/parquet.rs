//! Parquet file IO.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::{DataFrame, ParquetReader, ParquetWriter, SerReader};

use crate::error::{OutputError, Result};

/// Writes `df` to `path`, creating parent directories.
pub fn write_parquet(path: &Path, df: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| OutputError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| OutputError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|source| OutputError::Parquet {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).map_err(|e| OutputError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|source| OutputError::Parquet {
            path: path.to_path_buf(),
            source,
        })
}

/// `*.parquet` files directly under `dir`, sorted by name. A missing
/// directory yields no files.
pub fn list_parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| OutputError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| OutputError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
