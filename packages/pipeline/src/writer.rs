//! CSV serialization of the merged risk table, and the reader consumers
//! use to index it by ZIP.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hazard_risk_models::{ZipCode, ZipRiskRecord};

use crate::{PipelineError, SchemaError};

/// Output columns, in order.
pub const COLUMNS: [&str; 10] = [
    "ZIP",
    "Earthquake_Risk_Score",
    "Earthquake_Risk_Explanation",
    "Flood_Control_District",
    "Wildfire_Hazard_Level",
    "Flood_Risk_Score",
    "Flood_Risk_Explanation",
    "Flood_Chatbot_Prompt",
    "Wildfire_Risk_Score",
    "Wildfire_Chatbot_Prompt",
];

fn io_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Writes `records` to `path` as CSV.
///
/// The header is always written, even for an empty table. Output goes to
/// a sibling `.tmp` file first and is renamed into place, so readers never
/// observe a partial file. Missing parent directories are created. On
/// failure the `.tmp` file is removed and any previous output is left as
/// it was.
///
/// # Errors
///
/// Returns [`PipelineError`] if the directory or file cannot be written.
pub fn write_table(records: &[ZipRiskRecord], path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let tmp_path = tmp_path_for(path);

    if let Err(e) = write_and_rename(records, &tmp_path, path) {
        match std::fs::remove_file(&tmp_path) {
            Err(cleanup) if cleanup.kind() != std::io::ErrorKind::NotFound => {
                log::warn!("Failed to remove {}: {cleanup}", tmp_path.display());
            }
            _ => {}
        }
        return Err(e);
    }

    log::info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

fn write_and_rename(
    records: &[ZipRiskRecord],
    tmp_path: &Path,
    path: &Path,
) -> Result<(), PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(tmp_path)?;
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|e| io_error(tmp_path, e))?;
    drop(writer);

    std::fs::rename(tmp_path, path).map_err(|e| io_error(path, e))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A written risk table indexed by ZIP.
#[derive(Debug, Clone, Default)]
pub struct RiskTable {
    records: BTreeMap<ZipCode, ZipRiskRecord>,
}

impl RiskTable {
    /// Reads a table previously produced by [`write_table`].
    ///
    /// ZIPs are read as strings, so leading zeros survive.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read, a column is
    /// missing, or a row does not parse.
    pub fn read(path: &Path) -> Result<Self, PipelineError> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        if let Some(missing) = COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
            return Err(SchemaError::MissingField {
                layer: path.display().to_string(),
                field: (*missing).to_string(),
            }
            .into());
        }

        let mut records = BTreeMap::new();
        for row in reader.deserialize() {
            let record: ZipRiskRecord = row?;
            records.insert(record.zip.clone(), record);
        }

        log::debug!("Read {} rows from {}", records.len(), path.display());
        Ok(Self { records })
    }

    /// Looks up a ZIP.
    #[must_use]
    pub fn get(&self, zip: &ZipCode) -> Option<&ZipRiskRecord> {
        self.records.get(zip)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(zip: &str, district: &str) -> ZipRiskRecord {
        ZipRiskRecord {
            zip: ZipCode::normalize(zip).unwrap(),
            earthquake_risk_score: 5,
            earthquake_risk_explanation: "Moderate, 1–5 km".to_string(),
            flood_control_district: district.to_string(),
            flood_control_district_id: None,
            wildfire_hazard_level: "High".to_string(),
            flood_risk_score: 4,
            flood_risk_explanation: "Runoff, \"flash\" floods".to_string(),
            flood_chatbot_prompt: "Prepare.".to_string(),
            wildfire_risk_score: 8,
            wildfire_chatbot_prompt: "Clear brush.".to_string(),
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hazard_risk_writer_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn header_has_exact_columns_in_order() {
        let dir = temp_dir("header");
        let path = dir.join("out.csv");
        write_table(&[record("94601", "Zone 12")], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(header, COLUMNS.join(","));
        assert!(!header.contains("Flood_Control_District_ID"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_table_still_has_header() {
        let dir = temp_dir("empty");
        let path = dir.join("out.csv");
        write_table(&[], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), COLUMNS.join(","));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn leading_zeros_survive_round_trip() {
        let dir = temp_dir("zeros");
        let path = dir.join("nested").join("out.csv");
        write_table(&[record("02134", "Zone 1")], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().nth(1).unwrap().starts_with("02134,"));

        let table = RiskTable::read(&path).unwrap();
        let zip = ZipCode::normalize("02134").unwrap();
        let row = table.get(&zip).unwrap();
        assert_eq!(row.zip.as_str(), "02134");
        assert_eq!(row.flood_risk_explanation, "Runoff, \"flash\" floods");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rewriting_same_rows_is_byte_identical() {
        let dir = temp_dir("identical");
        let path = dir.join("out.csv");
        let rows = vec![record("94601", "Zone 12"), record("94602", "Zone 4")];

        write_table(&rows, &path).unwrap();
        let first = std::fs::read(&path).unwrap();
        write_table(&rows, &path).unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn overwrite_replaces_previous_table_and_leaves_no_tmp() {
        let dir = temp_dir("overwrite");
        let path = dir.join("out.csv");

        write_table(&[record("94601", "Zone 12"), record("94602", "Zone 4")], &path).unwrap();
        write_table(&[record("94603", "Zone 5")], &path).unwrap();

        let table = RiskTable::read(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get(&ZipCode::normalize("94603").unwrap()).is_some());
        assert!(!tmp_path_for(&path).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn failed_rename_removes_tmp_file() {
        let dir = temp_dir("failed_rename");
        // A non-empty directory where the table should go blocks the rename.
        let path = dir.join("out.csv");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let err = write_table(&[record("94601", "Zone 12")], &path).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert!(!tmp_path_for(&path).exists());
        assert!(path.join("keep").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reading_table_without_expected_column_fails() {
        let dir = temp_dir("bad_header");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.csv");
        std::fs::write(&path, "ZIP,Score\n94601,3\n").unwrap();

        let err = RiskTable::read(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(SchemaError::MissingField { .. })));

        std::fs::remove_dir_all(&dir).ok();
    }
}
