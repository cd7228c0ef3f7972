//! Fan-in of the three resolver outputs into the final risk table.

use std::collections::BTreeMap;

use hazard_risk_models::{
    DominantDistrict, EarthquakeAssignment, FloodAssignment, HazardClass, UNKNOWN_DISTRICT,
    UNKNOWN_HAZARD_LEVEL, WildfireAssignment, ZipCode, ZipRiskRecord,
};

use crate::config::RegionConfig;

/// The merged table plus how many rows fell back to default entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTable {
    /// One row per ZIP, in earthquake (ZIP source) order.
    pub records: Vec<ZipRiskRecord>,
    /// Rows whose flood fields come from the `UNKNOWN` entry.
    pub flood_defaulted: usize,
    /// Rows whose wildfire fields come from the `Unknown` entry.
    pub wildfire_defaulted: usize,
}

/// Left-joins flood and wildfire results onto the earthquake results and
/// applies the configured score tables.
///
/// The earthquake output spans every filtered ZIP, so it drives row order
/// and membership. ZIPs absent from the flood or wildfire output, or
/// present without a match, get the tables' default entries.
#[must_use]
pub fn merge(
    earthquake: Vec<EarthquakeAssignment>,
    flood: Vec<FloodAssignment>,
    wildfire: Vec<WildfireAssignment>,
    config: &RegionConfig,
) -> MergedTable {
    log::info!("Merging flood, wildfire, and earthquake data...");

    let mut flood_by_zip: BTreeMap<ZipCode, DominantDistrict> = flood
        .into_iter()
        .filter_map(|row| Some((row.zip, row.district?)))
        .collect();
    let mut wildfire_by_zip: BTreeMap<ZipCode, HazardClass> = wildfire
        .into_iter()
        .filter_map(|row| Some((row.zip, row.level?)))
        .collect();

    let mut flood_defaulted = 0;
    let mut wildfire_defaulted = 0;

    let records = earthquake
        .into_iter()
        .map(|eq| {
            let district = flood_by_zip.remove(&eq.zip);
            let district_id = district.as_ref().and_then(|d| d.id.clone());
            let flood_entry = config.flood.lookup(district_id.as_ref());
            if flood_entry.defaulted {
                flood_defaulted += 1;
                log::debug!(
                    "ZIP {}: no flood entry for district {}, using {UNKNOWN_DISTRICT}",
                    eq.zip,
                    district_id.as_ref().map_or(UNKNOWN_DISTRICT, |id| id.as_str())
                );
            }

            let level = wildfire_by_zip.remove(&eq.zip);
            let wildfire_entry = config.wildfire.lookup(level);
            if wildfire_entry.defaulted {
                wildfire_defaulted += 1;
                log::debug!("ZIP {}: no wildfire entry, using {UNKNOWN_HAZARD_LEVEL}", eq.zip);
            }

            ZipRiskRecord {
                zip: eq.zip,
                earthquake_risk_score: eq.score,
                earthquake_risk_explanation: eq.explanation,
                flood_control_district: district
                    .and_then(|d| d.name)
                    .unwrap_or_else(|| UNKNOWN_DISTRICT.to_string()),
                flood_control_district_id: district_id,
                wildfire_hazard_level: level
                    .map_or_else(|| UNKNOWN_HAZARD_LEVEL.to_string(), |l| l.to_string()),
                flood_risk_score: flood_entry.value.score,
                flood_risk_explanation: flood_entry.value.explanation.clone(),
                flood_chatbot_prompt: flood_entry.value.chatbot_prompt.clone(),
                wildfire_risk_score: wildfire_entry.value.score,
                wildfire_chatbot_prompt: wildfire_entry.value.chatbot_prompt.clone(),
            }
        })
        .collect::<Vec<_>>();

    if !flood_by_zip.is_empty() || !wildfire_by_zip.is_empty() {
        log::warn!(
            "Dropped {} flood and {} wildfire rows for ZIPs without earthquake rows",
            flood_by_zip.len(),
            wildfire_by_zip.len()
        );
    }

    log::info!(
        "Merged {} rows ({flood_defaulted} flood defaults, {wildfire_defaulted} wildfire defaults)",
        records.len()
    );

    MergedTable {
        records,
        flood_defaulted,
        wildfire_defaulted,
    }
}
