//! Worst wildfire hazard class per ZIP.
//!
//! Spatially joins ZIPs to wildfire hazard zones on the `intersects`
//! predicate and keeps the highest-ranked class among all intersecting
//! zones. The result is not area-weighted: a sliver of Very High hazard
//! anywhere in the ZIP makes the whole ZIP Very High.

use geo::MultiPolygon;
use hazard_risk_geometry::{GeometryLayer, Projector};
use hazard_risk_models::{HazardClass, WildfireAssignment};
use hazard_risk_spatial::PolygonIndex;

use crate::context::PipelineContext;
use crate::{PipelineError, SchemaError};

/// A wildfire hazard zone polygon.
#[derive(Debug, Clone)]
pub struct WildfireZone {
    /// Hazard class; unrecognized source labels are rank 0.
    pub class: HazardClass,
    /// Zone boundary.
    pub geometry: MultiPolygon<f64>,
}

/// Extracts polygonal zones from the wildfire layer.
///
/// # Errors
///
/// Returns [`SchemaError::MissingField`] if the layer lacks the hazard
/// class field entirely.
pub fn extract_zones(
    layer: &GeometryLayer,
    class_field: &str,
) -> Result<Vec<WildfireZone>, SchemaError> {
    if !layer.has_field(class_field) {
        return Err(SchemaError::MissingField {
            layer: layer.name.clone(),
            field: class_field.to_string(),
        });
    }

    let mut unrecognized = 0usize;
    let zones: Vec<WildfireZone> = layer
        .features
        .iter()
        .filter_map(|feature| {
            let geometry = feature.polygons()?;
            let label = feature.property_text(class_field);
            let class = HazardClass::from_label(label.as_deref());
            if class == HazardClass::NonWildlandNonUrban
                && label.as_deref().map(str::trim) != Some(class.as_ref())
            {
                unrecognized += 1;
            }
            Some(WildfireZone { class, geometry })
        })
        .collect();

    if unrecognized > 0 {
        log::warn!(
            "{}: {unrecognized} zones have unrecognized hazard classes, treated as {}",
            layer.name,
            HazardClass::NonWildlandNonUrban
        );
    }

    Ok(zones)
}

/// Resolves the highest intersecting hazard class for every ZIP.
///
/// Returns one row per ZIP, in ZIP order. `level` is `None` for ZIPs no
/// zone intersects.
///
/// # Errors
///
/// Returns [`PipelineError`] if the wildfire layer lacks the hazard class
/// field or either layer cannot be reprojected to the metric CRS.
pub fn resolve(ctx: &PipelineContext) -> Result<Vec<WildfireAssignment>, PipelineError> {
    log::info!("Calculating wildfire hazard levels...");

    let mut zones = extract_zones(&ctx.wildfire, &ctx.config.fields.hazard_class)?;

    let projector = Projector::new(ctx.wildfire.crs, ctx.metric_crs())?;
    for zone in &mut zones {
        zone.geometry = projector.project(&zone.geometry)?;
    }
    let zips = ctx.metric_zips()?;

    let index = PolygonIndex::build(zones.iter().map(|z| z.geometry.clone()));
    log::debug!("Indexed {} wildfire zones", index.size());

    let assignments: Vec<WildfireAssignment> = zips
        .into_iter()
        .map(|(zip, geometry)| {
            let level = max_class(
                index
                    .intersecting(&geometry)
                    .iter()
                    .map(|hit| zones[hit.index].class),
            );
            log::debug!(
                "ZIP {zip}: wildfire level {}",
                level.map_or_else(|| "none".to_string(), |l| l.to_string())
            );
            WildfireAssignment { zip, level }
        })
        .collect();

    let matched = assignments.iter().filter(|a| a.level.is_some()).count();
    log::info!(
        "Assigned wildfire levels to {matched} of {} ZIPs",
        assignments.len()
    );

    Ok(assignments)
}

/// Highest class by rank, `None` when there are no classes.
fn max_class(classes: impl Iterator<Item = HazardClass>) -> Option<HazardClass> {
    classes.map(HazardClass::rank).max().and_then(HazardClass::from_rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, feature, rect, square, zip, zone};
    use hazard_risk_geometry::Crs;

    #[test]
    fn max_rank_wins_over_area() {
        // 90% High, 10% Very High.
        let ctx = context(
            vec![zip("94601", square(0.0, 0.0, 100.0))],
            vec![],
            vec![
                zone("High", rect(0.0, 0.0, 90.0, 100.0)),
                zone("Very High", rect(90.0, 0.0, 100.0, 100.0)),
            ],
            vec![],
        );
        let rows = resolve(&ctx).unwrap();
        assert_eq!(rows[0].level, Some(HazardClass::VeryHigh));
    }

    #[test]
    fn zip_without_zone_is_none() {
        let ctx = context(
            vec![zip("94601", square(0.0, 0.0, 10.0))],
            vec![],
            vec![zone("High", square(500.0, 500.0, 10.0))],
            vec![],
        );
        let rows = resolve(&ctx).unwrap();
        assert_eq!(rows[0].level, None);
    }

    #[test]
    fn unrecognized_class_is_rank_zero_not_missing() {
        let ctx = context(
            vec![zip("94601", square(0.0, 0.0, 10.0))],
            vec![],
            vec![zone("Extreme", square(0.0, 0.0, 10.0))],
            vec![],
        );
        let rows = resolve(&ctx).unwrap();
        assert_eq!(rows[0].level, Some(HazardClass::NonWildlandNonUrban));
    }

    #[test]
    fn adding_higher_zone_never_lowers_level() {
        let base = vec![
            zone("Low", rect(0.0, 0.0, 50.0, 100.0)),
            zone("Moderate", rect(50.0, 0.0, 100.0, 100.0)),
        ];
        let before = resolve(&context(
            vec![zip("94601", square(0.0, 0.0, 100.0))],
            vec![],
            base.clone(),
            vec![],
        ))
        .unwrap()[0]
            .level;

        for label in ["Urban Unzoned", "Moderate", "High", "Very High"] {
            let mut zones = base.clone();
            zones.push(zone(label, square(10.0, 10.0, 5.0)));
            let after = resolve(&context(
                vec![zip("94601", square(0.0, 0.0, 100.0))],
                vec![],
                zones,
                vec![],
            ))
            .unwrap()[0]
                .level;
            assert!(after >= before, "{label} lowered the level");
            if HazardClass::from_label(Some(label)) > HazardClass::Moderate {
                assert_eq!(after, Some(HazardClass::from_label(Some(label))));
            }
        }
    }

    #[test]
    fn missing_class_field_is_a_schema_error() {
        let layer = GeometryLayer::new(
            "wildfire",
            Crs::CaliforniaAlbers,
            vec![feature(&[("SRA", "LRA".into())], square(0.0, 0.0, 1.0))],
        );
        let err = extract_zones(&layer, "HAZ_CLASS").unwrap_err();
        assert!(matches!(err, SchemaError::MissingField { .. }));
    }

    #[test]
    fn max_class_of_nothing_is_none() {
        assert_eq!(max_class(std::iter::empty()), None);
        assert_eq!(
            max_class([HazardClass::Low, HazardClass::High, HazardClass::Moderate].into_iter()),
            Some(HazardClass::High)
        );
    }
}
