//! Line-delimited JSON record batches.
//!
//! One record per line. Writes always truncate: a batch file is rewritten
//! whole, never patched in place.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::record::Record;

/// Read every record of a JSONL file. Blank lines are skipped.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>, StoreError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Read the records of `path` whose relation is `relation`.
pub fn read_relation(path: impl AsRef<Path>, relation: &str) -> Result<Vec<Record>, StoreError> {
    let mut records = read_records(path)?;
    records.retain(|r| r.relation == relation);
    Ok(records)
}

/// Truncate `path` and write one line per record. Parent directories are
/// created as needed.
pub fn write_records(path: impl AsRef<Path>, records: &[Record]) -> Result<(), StoreError> {
    let path = path.as_ref();
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let file = fs::File::create(path).map_err(write_err)?;
    let mut out = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(out, "{line}").map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;

    tracing::debug!(
        name: "store.written",
        path = %path.display(),
        records = records.len(),
        "Record batch written"
    );
    Ok(())
}

/// Concatenate every `*.jsonl` batch of `dir` (in file-name order), write the
/// result to `output`, and return it.
pub fn concat_records(
    dir: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<Vec<Record>, StoreError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();

    let mut all = Vec::new();
    for file in &files {
        all.extend(read_records(file)?);
    }
    write_records(output, &all)?;

    tracing::info!(
        name: "store.concatenated",
        dir = %dir.display(),
        files = files.len(),
        records = all.len(),
        "Batches concatenated"
    );
    Ok(all)
}
