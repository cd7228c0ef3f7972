#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model for per-ZIP hazard risk scoring.
//!
//! Defines the identifiers, hazard classes, and per-resolver result rows
//! passed between the flood, wildfire, and earthquake resolvers, plus the
//! merged [`ZipRiskRecord`] that forms the pipeline's output table.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Label used for the flood district name and ID when no district overlaps
/// a ZIP.
pub const UNKNOWN_DISTRICT: &str = "UNKNOWN";

/// Label used for the wildfire hazard level when no zone intersects a ZIP.
pub const UNKNOWN_HAZARD_LEVEL: &str = "Unknown";

/// A five-character ZIP code.
///
/// Always stored as a string so leading zeros survive serialization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZipCode(String);

impl ZipCode {
    /// Normalizes a raw ZIP identifier.
    ///
    /// Trims whitespace and left-pads purely numeric values shorter than
    /// five digits with zeros (`"2134"` becomes `"02134"`). Returns `None`
    /// for empty values, values containing non-digits, or values longer
    /// than five digits.
    #[must_use]
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > 5 || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(Self(format!("{trimmed:0>5}")))
    }

    /// Returns the ZIP code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZipCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wildfire hazard severity class, ordered from lowest to highest hazard.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum HazardClass {
    /// Rank 0. Also the rank assigned to unrecognized labels.
    #[serde(rename = "Non-Wildland/Non-Urban")]
    #[strum(serialize = "Non-Wildland/Non-Urban")]
    NonWildlandNonUrban = 0,
    /// Rank 1
    #[serde(rename = "Urban Unzoned")]
    #[strum(serialize = "Urban Unzoned")]
    UrbanUnzoned = 1,
    /// Rank 2
    Low = 2,
    /// Rank 3
    Moderate = 3,
    /// Rank 4
    High = 4,
    /// Rank 5
    #[serde(rename = "Very High")]
    #[strum(serialize = "Very High")]
    VeryHigh = 5,
}

impl HazardClass {
    /// Returns all variants in ascending rank order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::NonWildlandNonUrban,
            Self::UrbanUnzoned,
            Self::Low,
            Self::Moderate,
            Self::High,
            Self::VeryHigh,
        ]
    }

    /// Returns the ordinal rank of this class.
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Maps a rank back to its class.
    #[must_use]
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::NonWildlandNonUrban),
            1 => Some(Self::UrbanUnzoned),
            2 => Some(Self::Low),
            3 => Some(Self::Moderate),
            4 => Some(Self::High),
            5 => Some(Self::VeryHigh),
            _ => None,
        }
    }

    /// Parses a source `HAZ_CLASS` label.
    ///
    /// Unrecognized or absent labels map to
    /// [`HazardClass::NonWildlandNonUrban`] (rank 0), never to a missing
    /// value.
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        label
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(Self::NonWildlandNonUrban)
    }
}

/// A flood-control district identifier as it appears in the source data.
///
/// Sources disagree on whether the ID is an integer, a float, or a string,
/// so the raw text is kept and coerced on demand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistrictId(String);

impl DistrictId {
    /// Wraps raw district ID text.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw ID text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Coerces the ID to an integer.
    ///
    /// Accepts integer text (`"142"`) and integral float text (`"142.0"`).
    /// Anything else yields `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_integer(&self) -> Option<i64> {
        let raw = self.0.trim();
        if let Ok(value) = raw.parse::<i64>() {
            return Some(value);
        }
        let value = raw.parse::<f64>().ok()?;
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
            Some(value as i64)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DistrictId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The result of a reference-table lookup.
///
/// `defaulted` is `true` when the key was absent or unrecognized and the
/// table's declared default entry was returned instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup<T> {
    /// The resolved entry.
    pub value: T,
    /// Whether `value` is the table's fallback entry.
    pub defaulted: bool,
}

impl<T> Lookup<T> {
    /// A lookup that matched a real entry.
    pub const fn found(value: T) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    /// A lookup that fell back to the default entry.
    pub const fn fallback(value: T) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

/// The dominant flood-control district for a ZIP.
#[derive(Debug, Clone, PartialEq)]
pub struct DominantDistrict {
    /// District ID, if the source feature carried one.
    pub id: Option<DistrictId>,
    /// District display name, if the source feature carried one.
    pub name: Option<String>,
    /// Total intersected area in square meters of the metric CRS.
    pub overlap_m2: f64,
}

/// Flood resolver output row.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodAssignment {
    /// ZIP this row belongs to.
    pub zip: ZipCode,
    /// `None` when no district intersects the ZIP.
    pub district: Option<DominantDistrict>,
}

/// Wildfire resolver output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildfireAssignment {
    /// ZIP this row belongs to.
    pub zip: ZipCode,
    /// Highest class among intersecting zones, `None` when no zone
    /// intersects the ZIP.
    pub level: Option<HazardClass>,
}

/// Earthquake resolver output row.
#[derive(Debug, Clone, PartialEq)]
pub struct EarthquakeAssignment {
    /// ZIP this row belongs to.
    pub zip: ZipCode,
    /// Planar distance in meters from the ZIP centroid to the nearest fault.
    pub distance_m: f64,
    /// Bucketed risk score (1, 3, 5, 8 or 10).
    pub score: u8,
    /// Human-readable explanation of the bucket.
    pub explanation: String,
}

/// One row of the merged risk table.
///
/// Field order matches the output column order. The district ID is carried
/// for consumers of the in-memory table but is not a serialized column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipRiskRecord {
    /// ZIP code, always a zero-padded string.
    #[serde(rename = "ZIP")]
    pub zip: ZipCode,
    /// Earthquake score (1, 3, 5, 8 or 10).
    #[serde(rename = "Earthquake_Risk_Score")]
    pub earthquake_risk_score: u8,
    /// Earthquake explanation.
    #[serde(rename = "Earthquake_Risk_Explanation")]
    pub earthquake_risk_explanation: String,
    /// Dominant flood district name, or [`UNKNOWN_DISTRICT`].
    #[serde(rename = "Flood_Control_District")]
    pub flood_control_district: String,
    /// Dominant flood district ID. Not serialized.
    #[serde(skip)]
    pub flood_control_district_id: Option<DistrictId>,
    /// Wildfire hazard level label, or [`UNKNOWN_HAZARD_LEVEL`].
    #[serde(rename = "Wildfire_Hazard_Level")]
    pub wildfire_hazard_level: String,
    /// Flood score from the flood reference table.
    #[serde(rename = "Flood_Risk_Score")]
    pub flood_risk_score: u8,
    /// Flood explanation from the flood reference table.
    #[serde(rename = "Flood_Risk_Explanation")]
    pub flood_risk_explanation: String,
    /// Flood chatbot guidance from the flood reference table.
    #[serde(rename = "Flood_Chatbot_Prompt")]
    pub flood_chatbot_prompt: String,
    /// Wildfire score from the wildfire reference table.
    #[serde(rename = "Wildfire_Risk_Score")]
    pub wildfire_risk_score: u8,
    /// Wildfire chatbot guidance from the wildfire reference table.
    #[serde(rename = "Wildfire_Chatbot_Prompt")]
    pub wildfire_chatbot_prompt: String,
}

impl ZipRiskRecord {
    /// Whether this row carries no flood data.
    #[must_use]
    pub fn flood_unknown(&self) -> bool {
        self.flood_risk_score == 0 || self.flood_control_district == UNKNOWN_DISTRICT
    }

    /// Whether this row carries no wildfire data.
    #[must_use]
    pub fn wildfire_unknown(&self) -> bool {
        self.wildfire_risk_score == 0 || self.wildfire_hazard_level == UNKNOWN_HAZARD_LEVEL
    }
}
