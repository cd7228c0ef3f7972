//! Dominant flood-control district per ZIP.
//!
//! Overlays every ZIP with every flood district whose polygon intersects
//! it, in the metric CRS, and keeps the district with the largest total
//! overlap area. Touching boundaries produce zero-area pieces and never
//! make a district dominant.
//!
//! Exact-area ties are broken deterministically: lowest integer district
//! ID first, then districts with non-integer IDs by raw ID text, then by
//! name, then by source position.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use geo::{Area, BooleanOps, MultiPolygon};
use hazard_risk_geometry::{GeometryLayer, Projector};
use hazard_risk_models::{DistrictId, DominantDistrict, FloodAssignment};
use hazard_risk_spatial::PolygonIndex;

use crate::context::PipelineContext;
use crate::{PipelineError, SchemaError};

/// A flood-control district polygon with its attributes.
#[derive(Debug, Clone)]
pub struct FloodDistrict {
    /// District ID, when the feature carries one.
    pub id: Option<DistrictId>,
    /// Display name, when the feature carries one.
    pub name: Option<String>,
    /// District boundary.
    pub geometry: MultiPolygon<f64>,
}

/// Extracts polygonal districts from the flood layer.
///
/// # Errors
///
/// Returns [`SchemaError::MissingField`] if the layer lacks the name or
/// ID field entirely.
pub fn extract_districts(
    layer: &GeometryLayer,
    name_field: &str,
    id_field: &str,
) -> Result<Vec<FloodDistrict>, SchemaError> {
    for field in [name_field, id_field] {
        if !layer.has_field(field) {
            return Err(SchemaError::MissingField {
                layer: layer.name.clone(),
                field: field.to_string(),
            });
        }
    }

    let mut skipped = 0usize;
    let districts = layer
        .features
        .iter()
        .filter_map(|feature| {
            let Some(geometry) = feature.polygons() else {
                skipped += 1;
                return None;
            };
            Some(FloodDistrict {
                id: feature.property_text(id_field).map(DistrictId::new),
                name: feature.property_text(name_field),
                geometry,
            })
        })
        .collect();

    if skipped > 0 {
        log::warn!("{}: skipped {skipped} non-polygonal features", layer.name);
    }

    Ok(districts)
}

/// Resolves the dominant flood district for every ZIP in the context.
///
/// Returns one row per ZIP, in ZIP order.
///
/// # Errors
///
/// Returns [`PipelineError`] if the flood layer is missing required
/// fields or either layer cannot be reprojected to the metric CRS.
pub fn resolve(ctx: &PipelineContext) -> Result<Vec<FloodAssignment>, PipelineError> {
    log::info!("Calculating flood district intersections...");

    let fields = &ctx.config.fields;
    let mut districts = extract_districts(&ctx.flood, &fields.district_name, &fields.district_id)?;

    let projector = Projector::new(ctx.flood.crs, ctx.metric_crs())?;
    for district in &mut districts {
        district.geometry = projector.project(&district.geometry)?;
    }
    let zips = ctx.metric_zips()?;

    let index = PolygonIndex::build(districts.iter().map(|d| d.geometry.clone()));
    log::debug!("Indexed {} flood districts", index.size());

    let mut assignments = Vec::with_capacity(zips.len());
    for (zip, geometry) in &zips {
        let hits = index.intersecting(geometry);
        let overlaps = hits.iter().map(|hit| {
            let piece = geometry.intersection(hit.polygon);
            (hit.index, piece.unsigned_area())
        });
        let district = dominant(&districts, overlaps);

        match &district {
            Some(d) => log::debug!(
                "ZIP {zip}: dominant district {} ({:.0} m2 from {} candidates)",
                d.id.as_ref().map_or("?", DistrictId::as_str),
                d.overlap_m2,
                hits.len()
            ),
            None => log::debug!("ZIP {zip}: no intersecting flood district"),
        }

        assignments.push(FloodAssignment {
            zip: zip.clone(),
            district,
        });
    }

    let matched = assignments.iter().filter(|a| a.district.is_some()).count();
    log::info!(
        "Assigned flood districts to {matched} of {} ZIPs",
        assignments.len()
    );

    Ok(assignments)
}

/// Sums overlap area per district and picks the largest.
///
/// `overlaps` yields `(district index, overlap area)` pairs. Features that
/// share the same ID and name are treated as one district.
fn dominant(
    districts: &[FloodDistrict],
    overlaps: impl Iterator<Item = (usize, f64)>,
) -> Option<DominantDistrict> {
    let mut totals: BTreeMap<(Option<&DistrictId>, Option<&str>), (f64, usize)> = BTreeMap::new();

    for (index, area) in overlaps {
        if area <= 0.0 {
            continue;
        }
        let district = &districts[index];
        let key = (district.id.as_ref(), district.name.as_deref());
        let entry = totals.entry(key).or_insert((0.0, index));
        entry.0 += area;
        entry.1 = entry.1.min(index);
    }

    totals
        .into_iter()
        .max_by(|(a_key, (a_area, a_idx)), (b_key, (b_area, b_idx))| {
            a_area
                .total_cmp(b_area)
                .then_with(|| tie_break(*b_key, *a_key))
                .then_with(|| b_idx.cmp(a_idx))
        })
        .map(|((id, name), (overlap_m2, _))| DominantDistrict {
            id: id.cloned(),
            name: name.map(str::to_string),
            overlap_m2,
        })
}

/// Orders districts for tie-breaking; `Less` means preferred.
fn tie_break(
    (a_id, a_name): (Option<&DistrictId>, Option<&str>),
    (b_id, b_name): (Option<&DistrictId>, Option<&str>),
) -> Ordering {
    let int = |id: Option<&DistrictId>| id.and_then(DistrictId::as_integer);
    match (int(a_id), int(b_id)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| match (a_id, b_id) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
    .then_with(|| a_name.cmp(&b_name))
}
