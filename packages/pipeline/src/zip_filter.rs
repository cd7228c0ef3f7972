//! Restricts the raw ZIP layer to the region's allow-list.
//!
//! Source schemas name the identifier differently (`ZCTA5CE10` in Census
//! ZCTA files, `ZIP` elsewhere); the first configured candidate present in
//! the layer wins. ZIPs split across several features are unioned into one
//! multipolygon at the position of their first feature, so overlapping
//! parts are neither double-counted in centroids nor left as invalid
//! input for the overlay.

use std::collections::{BTreeMap, BTreeSet};

use geo::{BooleanOps, MultiPolygon};
use hazard_risk_geometry::{Crs, GeometryLayer};
use hazard_risk_models::ZipCode;

use crate::SchemaError;

/// One in-scope ZIP and its boundary.
#[derive(Debug, Clone)]
pub struct ZipArea {
    /// Normalized five-character ZIP.
    pub zip: ZipCode,
    /// Boundary in the owning [`ZipSet`]'s CRS.
    pub geometry: MultiPolygon<f64>,
}

/// The filtered ZIP layer.
#[derive(Debug, Clone)]
pub struct ZipSet {
    /// CRS of every geometry in `areas`.
    pub crs: Crs,
    /// Unique ZIPs in source order.
    pub areas: Vec<ZipArea>,
}

impl ZipSet {
    /// Number of ZIPs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Whether no ZIPs survived filtering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

/// Filters `layer` down to the ZIPs in `allow_list`.
///
/// Features whose identifier is malformed or whose geometry is not
/// polygonal are skipped with a warning. Allow-listed ZIPs that never
/// appear in the layer are logged.
///
/// # Errors
///
/// Returns [`SchemaError::MissingZipField`] if none of `candidates` is
/// present in the layer.
pub fn filter_zips(
    layer: &GeometryLayer,
    allow_list: &[ZipCode],
    candidates: &[String],
) -> Result<ZipSet, SchemaError> {
    let field = candidates
        .iter()
        .find(|c| layer.has_field(c))
        .ok_or_else(|| SchemaError::MissingZipField {
            layer: layer.name.clone(),
            candidates: candidates.to_vec(),
        })?;
    log::debug!("{}: using ZIP field {field}", layer.name);

    let allowed: BTreeSet<&ZipCode> = allow_list.iter().collect();
    let mut positions: BTreeMap<ZipCode, usize> = BTreeMap::new();
    let mut areas: Vec<ZipArea> = Vec::new();

    for (i, feature) in layer.features.iter().enumerate() {
        let Some(raw) = feature.property_text(field) else {
            continue;
        };
        let Some(zip) = ZipCode::normalize(&raw) else {
            log::warn!("{}: feature {i} has malformed ZIP {raw:?}", layer.name);
            continue;
        };
        if !allowed.contains(&zip) {
            continue;
        }
        let Some(polygons) = feature.polygons() else {
            log::warn!("{}: ZIP {zip} has non-polygonal geometry, skipping", layer.name);
            continue;
        };

        if let Some(&pos) = positions.get(&zip) {
            log::debug!("{}: merging additional part of ZIP {zip}", layer.name);
            let merged = areas[pos].geometry.union(&polygons);
            areas[pos].geometry = merged;
        } else {
            positions.insert(zip.clone(), areas.len());
            areas.push(ZipArea {
                zip,
                geometry: polygons,
            });
        }
    }

    let missing: Vec<&str> = allow_list
        .iter()
        .filter(|z| !positions.contains_key(*z))
        .map(ZipCode::as_str)
        .collect();
    if !missing.is_empty() {
        log::warn!(
            "{}: {} allow-listed ZIPs not found in source: {}",
            layer.name,
            missing.len(),
            missing.join(", ")
        );
    }

    log::info!(
        "Filtered {} features to {} ZIPs",
        layer.len(),
        areas.len()
    );

    Ok(ZipSet {
        crs: layer.crs,
        areas,
    })
}
