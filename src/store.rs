use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::records::{ListingRecord, SnapshotRow};

const SNAPSHOT_PREFIX: &str = "imoveis_";

/// Reads the historical table. A missing, unreadable, or undecodable file is
/// an empty history, never an error; the table is rebuilt from the day's
/// snapshots and the next atomic save replaces whatever was there.
pub fn load_history(path: &Path) -> Vec<ListingRecord> {
    if !path.exists() {
        info!(path = %path.display(), "no history file yet; starting empty");
        return Vec::new();
    }
    match read_history_file(path) {
        Ok(records) => records,
        Err(err) => {
            warn!(path = %path.display(), %err, "history file unreadable; starting empty");
            Vec::new()
        }
    }
}

fn read_history_file(path: &Path) -> AppResult<Vec<ListingRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<ListingRecord>() {
        records.push(row?);
    }
    Ok(records)
}

/// Writes the historical table atomically: the full file is written to a
/// sibling temp path and renamed over the target, so a crash mid-write never
/// leaves a truncated history behind.
pub fn save_history(path: &Path, records: &[ListingRecord]) -> AppResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Path(format!("history path has no parent: {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let tmp_path = temp_sibling(path);
    {
        let mut writer = csv::Writer::from_path(&tmp_path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    info!(path = %path.display(), rows = records.len(), "history written");
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Collects every per-state snapshot in `dir`, in file-name order so a merge
/// over the same set of files is reproducible. Snapshots are the `imoveis_*.csv`
/// files except the history file itself. Unreadable files and undecodable rows
/// are logged and skipped; one bad scrape must not sink the run.
pub fn load_snapshots(dir: &Path, history_file_name: &str) -> AppResult<Vec<ListingRecord>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if !dir.exists() {
        info!(dir = %dir.display(), "snapshot directory missing; nothing to merge");
        return Ok(Vec::new());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_snapshot_file(&path, history_file_name) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        match read_snapshot_file(&path) {
            Ok(mut rows) => {
                info!(path = %path.display(), rows = rows.len(), "snapshot loaded");
                records.append(&mut rows);
            }
            Err(err) => warn!(path = %path.display(), %err, "skipping unreadable snapshot"),
        }
    }
    Ok(records)
}

fn is_snapshot_file(path: &Path, history_file_name: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(".csv") && name != history_file_name
}

fn read_snapshot_file(path: &Path) -> AppResult<Vec<ListingRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for (line, row) in reader.deserialize::<SnapshotRow>().enumerate() {
        match row {
            Ok(row) => rows.push(row.into_record()),
            Err(err) => warn!(path = %path.display(), line = line + 2, %err, "skipping bad row"),
        }
    }
    Ok(rows)
}
