//! Earthquake risk from ZIP centroid distance to the nearest fault.
//!
//! All faults are treated as one unioned line feature. Distances are
//! planar, in meters, in the region's metric CRS; degree-based distances
//! would bias every threshold.

use geo::{Centroid, Distance, Euclidean, Geometry, LineString, MultiLineString, Point};
use hazard_risk_geometry::{GeometryLayer, Projector};
use hazard_risk_models::EarthquakeAssignment;

use crate::context::PipelineContext;
use crate::{PipelineError, SchemaError};

/// Distance bucket of a ZIP centroid relative to the nearest fault.
///
/// Buckets are half-open on the upper bound: a centroid exactly 500 m
/// away is [`Self::High`], exactly 1000 m away is [`Self::Moderate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EarthquakeTier {
    /// Under 500 m.
    VeryHigh,
    /// 500 m up to 1 km.
    High,
    /// 1 km up to 5 km.
    Moderate,
    /// 5 km up to 10 km.
    Low,
    /// 10 km or more.
    Minimal,
}

impl EarthquakeTier {
    /// Upper bounds (exclusive) in meters, ascending. Anything beyond the
    /// last bound is [`Self::Minimal`].
    const THRESHOLDS: [(f64, Self); 4] = [
        (500.0, Self::VeryHigh),
        (1_000.0, Self::High),
        (5_000.0, Self::Moderate),
        (10_000.0, Self::Low),
    ];

    /// Buckets a distance in meters.
    #[must_use]
    pub fn classify(distance_m: f64) -> Self {
        Self::THRESHOLDS
            .iter()
            .find(|(bound, _)| distance_m < *bound)
            .map_or(Self::Minimal, |(_, tier)| *tier)
    }

    /// Risk score for this tier.
    #[must_use]
    pub const fn score(self) -> u8 {
        match self {
            Self::VeryHigh => 10,
            Self::High => 8,
            Self::Moderate => 5,
            Self::Low => 3,
            Self::Minimal => 1,
        }
    }

    /// Human-readable explanation written to the output table.
    #[must_use]
    pub const fn explanation(self) -> &'static str {
        match self {
            Self::VeryHigh => {
                "Very high earthquake risk due to proximity (<0.5 km) to active fault lines."
            }
            Self::High => "High earthquake risk due to proximity (<1 km) to active fault lines.",
            Self::Moderate => {
                "Moderate earthquake risk due to proximity (1–5 km) to active fault lines."
            }
            Self::Low => {
                "Low earthquake risk due to moderate distance (5–10 km) from active fault lines."
            }
            Self::Minimal => {
                "Minimal earthquake risk due to distance >10 km from active fault lines."
            }
        }
    }
}

/// Every fault line in the layer, merged into a single feature.
#[derive(Debug, Clone)]
pub struct FaultUnion {
    lines: MultiLineString<f64>,
}

impl FaultUnion {
    /// Collects the line geometry of every feature in `layer`.
    ///
    /// Non-linear features are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NoLineGeometry`] if the layer contains no
    /// line geometry at all.
    pub fn from_layer(layer: &GeometryLayer) -> Result<Self, SchemaError> {
        let mut lines = Vec::new();
        for feature in &layer.features {
            collect_lines(&feature.geometry, &mut lines);
        }
        lines.retain(|line| !line.0.is_empty());

        if lines.is_empty() {
            return Err(SchemaError::NoLineGeometry {
                layer: layer.name.clone(),
            });
        }

        log::debug!("{}: unioned {} fault lines", layer.name, lines.len());
        Ok(Self {
            lines: MultiLineString::new(lines),
        })
    }

    /// Reprojects the union.
    ///
    /// # Errors
    ///
    /// Returns [`hazard_risk_geometry::ProjectionError`] if any vertex
    /// cannot be projected.
    pub fn project(
        &self,
        projector: &Projector,
    ) -> Result<Self, hazard_risk_geometry::ProjectionError> {
        Ok(Self {
            lines: projector.project(&self.lines)?,
        })
    }

    /// Planar distance from `point` to the nearest fault line.
    #[must_use]
    pub fn distance_to(&self, point: &Point<f64>) -> f64 {
        self.lines
            .iter()
            .map(|line| Euclidean.distance(point, line))
            .fold(f64::INFINITY, f64::min)
    }
}

fn collect_lines(geometry: &Geometry<f64>, out: &mut Vec<LineString<f64>>) {
    match geometry {
        Geometry::Line(line) => out.push(LineString::from(vec![line.start, line.end])),
        Geometry::LineString(line) => out.push(line.clone()),
        Geometry::MultiLineString(lines) => out.extend(lines.iter().cloned()),
        Geometry::GeometryCollection(collection) => {
            for inner in collection {
                collect_lines(inner, out);
            }
        }
        _ => {}
    }
}

/// Computes the earthquake bucket for every ZIP.
///
/// Returns one row per ZIP, in ZIP order.
///
/// # Errors
///
/// Returns [`PipelineError`] if the fault layer has no line geometry, a
/// layer cannot be reprojected, or a ZIP has no centroid.
pub fn resolve(ctx: &PipelineContext) -> Result<Vec<EarthquakeAssignment>, PipelineError> {
    log::info!("Calculating earthquake risk based on fault proximity...");

    let projector = Projector::new(ctx.faults.crs, ctx.metric_crs())?;
    let faults = FaultUnion::from_layer(&ctx.faults)?.project(&projector)?;
    let zips = ctx.metric_zips()?;

    let assignments = zips
        .into_iter()
        .map(|(zip, geometry)| {
            let centroid = geometry
                .centroid()
                .ok_or_else(|| PipelineError::EmptyGeometry { zip: zip.clone() })?;
            let distance_m = faults.distance_to(&centroid);
            let tier = EarthquakeTier::classify(distance_m);
            log::debug!("ZIP {zip}: {distance_m:.0} m to nearest fault, {tier:?}");

            Ok(EarthquakeAssignment {
                zip,
                distance_m,
                score: tier.score(),
                explanation: tier.explanation().to_string(),
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    log::info!("Scored earthquake risk for {} ZIPs", assignments.len());

    Ok(assignments)
}
