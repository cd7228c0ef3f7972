//! Region reference data: ZIP allow-list, attribute field names, default
//! source paths, and the flood/wildfire score lookup tables.
//!
//! The Alameda County reference file is embedded at compile time via
//! `include_str!` and can be replaced at runtime with `--reference`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use hazard_risk_geometry::Crs;
use hazard_risk_models::{DistrictId, HazardClass, Lookup, ZipCode};
use serde::Deserialize;
use thiserror::Error;

/// Embedded reference data for the default region.
const REFERENCE_TOML: &str = include_str!("../reference/alameda.toml");

/// Errors that can occur while loading region reference data.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The reference file could not be read.
    #[error("Failed to read reference file {path}: {source}")]
    Io {
        /// Path of the reference file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The reference file is not valid TOML for this schema.
    #[error("Invalid reference TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// The reference file parsed but violates a constraint.
    #[error("Invalid reference data: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Attribute field names expected in the source layers.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldNames {
    /// ZIP identifier fields, tried in order.
    #[serde(default = "default_zip_candidates")]
    pub zip_candidates: Vec<String>,
    /// Flood district display name field.
    #[serde(default = "default_district_name")]
    pub district_name: String,
    /// Flood district ID field.
    #[serde(default = "default_district_id")]
    pub district_id: String,
    /// Wildfire hazard class field.
    #[serde(default = "default_hazard_class")]
    pub hazard_class: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            zip_candidates: default_zip_candidates(),
            district_name: default_district_name(),
            district_id: default_district_id(),
            hazard_class: default_hazard_class(),
        }
    }
}

fn default_zip_candidates() -> Vec<String> {
    vec!["ZCTA5CE10".to_string(), "ZIP".to_string()]
}

fn default_district_name() -> String {
    "DIST_NAME".to_string()
}

fn default_district_id() -> String {
    "DISTRICT_ID".to_string()
}

fn default_hazard_class() -> String {
    "HAZ_CLASS".to_string()
}

/// Input and output paths for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourcePaths {
    /// ZIP boundary geometry.
    pub zips: PathBuf,
    /// Flood-control district geometry.
    pub flood: PathBuf,
    /// Wildfire hazard-zone geometry.
    pub wildfire: PathBuf,
    /// Fault-line geometry.
    pub faults: PathBuf,
    /// Output table.
    pub output: PathBuf,
}

/// Score, explanation, and chatbot guidance for one flood district.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FloodEntry {
    /// Flood risk score.
    pub score: u8,
    /// Human-readable explanation.
    pub explanation: String,
    /// Guidance text for the chatbot.
    pub chatbot_prompt: String,
}

/// Score and chatbot guidance for one wildfire hazard level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WildfireEntry {
    /// Wildfire risk score.
    pub score: u8,
    /// Guidance text for the chatbot.
    pub chatbot_prompt: String,
}

/// Flood lookup table keyed by integer district ID.
#[derive(Debug, Clone)]
pub struct FloodTable {
    unknown: FloodEntry,
    districts: BTreeMap<i64, FloodEntry>,
}

impl FloodTable {
    /// Looks up a district.
    ///
    /// The ID is coerced to an integer first; absent IDs, IDs that do not
    /// coerce, and IDs missing from the table all return the `UNKNOWN`
    /// entry with `defaulted` set.
    #[must_use]
    pub fn lookup(&self, id: Option<&DistrictId>) -> Lookup<&FloodEntry> {
        id.and_then(DistrictId::as_integer)
            .and_then(|key| self.districts.get(&key))
            .map_or_else(|| Lookup::fallback(&self.unknown), Lookup::found)
    }

    /// Number of configured districts, excluding the `UNKNOWN` entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.districts.len()
    }

    /// Whether no districts are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }
}

/// Wildfire lookup table keyed by hazard class.
#[derive(Debug, Clone)]
pub struct WildfireTable {
    unknown: WildfireEntry,
    levels: BTreeMap<HazardClass, WildfireEntry>,
}

impl WildfireTable {
    /// Looks up a hazard level, falling back to the `Unknown` entry.
    #[must_use]
    pub fn lookup(&self, level: Option<HazardClass>) -> Lookup<&WildfireEntry> {
        level
            .and_then(|l| self.levels.get(&l))
            .map_or_else(|| Lookup::fallback(&self.unknown), Lookup::found)
    }

    /// Number of configured levels, excluding the `Unknown` entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether no levels are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Fully validated region reference data.
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Region display name.
    pub name: String,
    /// Metric CRS all distance and area computations run in.
    pub metric_crs: Crs,
    /// ZIP allow-list in declaration order.
    pub zip_codes: Vec<ZipCode>,
    /// Attribute field names.
    pub fields: FieldNames,
    /// Default input/output paths.
    pub sources: SourcePaths,
    /// Flood score table.
    pub flood: FloodTable,
    /// Wildfire score table.
    pub wildfire: WildfireTable,
}

#[derive(Deserialize)]
struct RegionFile {
    name: String,
    metric_crs: String,
    zip_codes: Vec<String>,
    #[serde(default)]
    fields: FieldNames,
    sources: SourcePaths,
    flood: FloodSection,
    wildfire: WildfireSection,
}

#[derive(Deserialize)]
struct FloodSection {
    unknown: FloodEntry,
    #[serde(default)]
    districts: Vec<FloodDistrictRow>,
}

#[derive(Deserialize)]
struct FloodDistrictRow {
    id: i64,
    #[serde(flatten)]
    entry: FloodEntry,
}

#[derive(Deserialize)]
struct WildfireSection {
    unknown: WildfireEntry,
    #[serde(default)]
    levels: Vec<WildfireLevelRow>,
}

#[derive(Deserialize)]
struct WildfireLevelRow {
    level: HazardClass,
    #[serde(flatten)]
    entry: WildfireEntry,
}

impl RegionConfig {
    /// Returns the embedded Alameda County reference data.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded file is invalid.
    pub fn reference() -> Result<Self, ConfigError> {
        Self::from_toml_str(REFERENCE_TOML)
    }

    /// Loads reference data from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        log::info!("Loaded reference data from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parses and validates reference data.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or violates a
    /// constraint (empty or malformed allow-list, duplicate keys,
    /// non-metric CRS).
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: RegionFile = toml::de::from_str(content)?;

        let metric_crs: Crs = file.metric_crs.parse().map_err(|e| ConfigError::Invalid {
            message: format!("metric_crs: {e}"),
        })?;
        if !metric_crs.is_metric() {
            return Err(invalid(format!(
                "metric_crs {metric_crs} is not a supported metric projection"
            )));
        }

        if file.zip_codes.is_empty() {
            return Err(invalid("zip_codes must not be empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        let mut zip_codes = Vec::with_capacity(file.zip_codes.len());
        for raw in &file.zip_codes {
            let zip = ZipCode::normalize(raw)
                .filter(|_| raw.len() == 5)
                .ok_or_else(|| invalid(format!("zip code {raw:?} is not five digits")))?;
            if !seen.insert(zip.clone()) {
                return Err(invalid(format!("duplicate zip code {zip}")));
            }
            zip_codes.push(zip);
        }

        if file.fields.zip_candidates.is_empty() {
            return Err(invalid("fields.zip_candidates must not be empty".to_string()));
        }

        let mut districts = BTreeMap::new();
        for row in file.flood.districts {
            if districts.insert(row.id, row.entry).is_some() {
                return Err(invalid(format!("duplicate flood district id {}", row.id)));
            }
        }

        let mut levels = BTreeMap::new();
        for row in file.wildfire.levels {
            if levels.insert(row.level, row.entry).is_some() {
                return Err(invalid(format!("duplicate wildfire level {}", row.level)));
            }
        }

        Ok(Self {
            name: file.name,
            metric_crs,
            zip_codes,
            fields: file.fields,
            sources: file.sources,
            flood: FloodTable {
                unknown: file.flood.unknown,
                districts,
            },
            wildfire: WildfireTable {
                unknown: file.wildfire.unknown,
                levels,
            },
        })
    }
}

const fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}
