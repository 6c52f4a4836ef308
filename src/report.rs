//! Result persistence: JSON and CSV reports, unit-list files.
//!
//! Every writer is atomic: data goes to a temp file in the destination
//! directory which is then renamed over the target, so a crash never leaves
//! a half-written report behind.

use crate::error::ActaError;
use crate::model::{Category, UnitDescriptor};
use crate::output::ResultRecord;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Fixed leading CSV columns; one column per category follows.
pub const CSV_BASE_COLUMNS: [&str; 10] = [
    "department",
    "municipality",
    "zone",
    "center",
    "table",
    "unit_id",
    "document",
    "status",
    "tags",
    "unread",
];

/// UTF-8 byte-order mark so spreadsheet tools detect the encoding of
/// accented place names.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Write `records` as a pretty-printed JSON array, in the given order.
pub fn write_json(path: &Path, records: &[ResultRecord]) -> Result<(), ActaError> {
    write_pretty_json(path, records)?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Write `records` as CSV, one row per unit.
///
/// Null votes are empty cells; `tags` and `unread` are joined with `|`.
pub fn write_csv(path: &Path, records: &[ResultRecord]) -> Result<(), ActaError> {
    atomic_write(path, |file| {
        file.write_all(UTF8_BOM)?;
        let mut wtr = csv::Writer::from_writer(file);

        let header = CSV_BASE_COLUMNS
            .iter()
            .copied()
            .chain(Category::ALL.iter().map(|c| c.code()));
        wtr.write_record(header).map_err(csv_to_io)?;

        for record in records {
            wtr.write_record(csv_row(record)).map_err(csv_to_io)?;
        }
        wtr.flush()
    })?;
    info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

fn csv_row(record: &ResultRecord) -> Vec<String> {
    let unread: Vec<&str> = record.unread.iter().map(|c| c.code()).collect();
    let mut row = vec![
        record.department.clone(),
        record.municipality.clone(),
        record.zone.clone(),
        record.center.clone(),
        record.table_number.to_string(),
        record.unit_id.clone(),
        record.document.clone().unwrap_or_default(),
        record.outcome.to_string(),
        record.tags.join("|"),
        unread.join("|"),
    ];
    row.extend(
        Category::ALL
            .iter()
            .map(|c| record.vote(*c).map(|v| v.to_string()).unwrap_or_default()),
    );
    row
}

/// Write a unit list (as produced by a directory crawl).
pub fn write_units(path: &Path, units: &[UnitDescriptor]) -> Result<(), ActaError> {
    write_pretty_json(path, units)?;
    info!("Wrote {} units to {}", units.len(), path.display());
    Ok(())
}

/// Read a unit list written by [`write_units`] or by hand.
pub fn read_units(path: &Path) -> Result<Vec<UnitDescriptor>, ActaError> {
    let load_err = |reason: String| ActaError::UnitsLoad {
        path: path.to_path_buf(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))
}

fn write_pretty_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ActaError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| ActaError::Serialize(e.to_string()))?;
    atomic_write(path, |file| file.write_all(&json))
}

fn atomic_write<F>(path: &Path, write: F) -> Result<(), ActaError>
where
    F: FnOnce(&mut NamedTempFile) -> std::io::Result<()>,
{
    let write_err = |source: std::io::Error| ActaError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    write(&mut tmp).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn csv_to_io(e: csv::Error) -> std::io::Error {
    std::io::Error::other(e)
}
