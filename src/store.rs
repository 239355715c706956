use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::StateRecord;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the record file at `path`.
///
/// The record is written to a sibling temporary file first and renamed into
/// place, so a failed or interrupted save leaves the previous file as it was.
pub fn save(record: &StateRecord, path: &Path) -> Result<()> {
    let json = serde_json::to_string(record).context("failed to serialize state record")?;
    let tmp = temp_path(path);
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("failed to replace {}", path.display()));
    }
    Ok(())
}

/// Reads a record back. Missing files, bad JSON, missing fields and records
/// of another kind are all errors; callers treat them as "no baseline".
pub fn load(path: &Path) -> Result<StateRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str::<StateRecord>(&contents)
        .with_context(|| format!("{} is not a connectivity status record", path.display()))
}
