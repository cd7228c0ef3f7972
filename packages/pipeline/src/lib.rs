#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-ZIP hazard risk scoring.
//!
//! Loads ZIP boundaries and three hazard layers, restricts the ZIPs to the
//! region's allow-list, and runs three independent resolvers in parallel:
//!
//! - [`flood`]: dominant flood-control district by overlap area.
//! - [`wildfire`]: highest-ranked intersecting wildfire hazard class.
//! - [`earthquake`]: centroid-to-fault distance bucket.
//!
//! [`merge`] joins their outputs and applies the region's score tables;
//! [`writer`] persists the result as a CSV that downstream consumers index
//! by ZIP. Any fatal error aborts the run before the output is touched.

pub mod config;
pub mod context;
pub mod earthquake;
pub mod flood;
pub mod merge;
pub mod wildfire;
pub mod writer;
pub mod zip_filter;

use std::path::PathBuf;
use std::sync::Arc;

use hazard_risk_geometry::{LoadError, ProjectionError};
use hazard_risk_models::ZipCode;
use thiserror::Error;

use crate::config::{ConfigError, RegionConfig, SourcePaths};
use crate::context::{PipelineContext, SourceLayers};
use crate::merge::MergedTable;

/// An input layer lacks an attribute or geometry the pipeline requires.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A required attribute is absent from every feature.
    #[error("Layer {layer} has no {field} field")]
    MissingField {
        /// Layer name.
        layer: String,
        /// Missing attribute.
        field: String,
    },

    /// None of the candidate ZIP identifier fields is present.
    #[error("Layer {layer} has none of the ZIP fields {candidates:?}")]
    MissingZipField {
        /// Layer name.
        layer: String,
        /// Field names that were tried.
        candidates: Vec<String>,
    },

    /// The fault layer contains no line geometry.
    #[error("Layer {layer} contains no line geometry")]
    NoLineGeometry {
        /// Layer name.
        layer: String,
    },
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An input layer could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A layer could not be reprojected to the metric CRS.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// An input layer is missing a required field.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Region reference data is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem error while writing or reading the output.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV serialization error.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A resolver task panicked or was cancelled.
    #[error("Resolver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A ZIP's geometry has no area to take a centroid of.
    #[error("ZIP {zip} has empty geometry")]
    EmptyGeometry {
        /// Offending ZIP.
        zip: ZipCode,
    },
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows written.
    pub rows: usize,
    /// Rows using the `UNKNOWN` flood entry.
    pub flood_defaulted: usize,
    /// Rows using the `Unknown` wildfire entry.
    pub wildfire_defaulted: usize,
    /// Where the table was written.
    pub output: PathBuf,
}

/// Runs the full pipeline: load, filter, resolve, merge, write.
///
/// # Errors
///
/// Returns [`PipelineError`] on any load, schema, projection, or write
/// failure. No output is written unless every stage succeeds.
pub async fn run(
    config: Arc<RegionConfig>,
    sources: &SourcePaths,
) -> Result<RunSummary, PipelineError> {
    log::info!("Scoring hazard risk for region {}", config.name);

    let load_paths = sources.clone();
    let layers = tokio::task::spawn_blocking(move || SourceLayers::load(&load_paths)).await??;
    let ctx = Arc::new(PipelineContext::new(config, layers)?);

    let table = build_table(ctx).await?;

    let output = sources.output.clone();
    let records = table.records;
    let rows = records.len();
    let write_path = output.clone();
    tokio::task::spawn_blocking(move || writer::write_table(&records, &write_path)).await??;

    let summary = RunSummary {
        rows,
        flood_defaulted: table.flood_defaulted,
        wildfire_defaulted: table.wildfire_defaulted,
        output,
    };
    log::info!(
        "Done: {} rows, {} without flood data, {} without wildfire data, written to {}",
        summary.rows,
        summary.flood_defaulted,
        summary.wildfire_defaulted,
        summary.output.display()
    );

    Ok(summary)
}

/// Runs the three resolvers in parallel and merges their results.
///
/// Each resolver runs on the blocking pool against the same immutable
/// context. The first failure aborts the whole table.
///
/// # Errors
///
/// Returns [`PipelineError`] if any resolver fails or panics.
pub async fn build_table(ctx: Arc<PipelineContext>) -> Result<MergedTable, PipelineError> {
    let (earthquake, flood, wildfire) = tokio::try_join!(
        spawn_resolver(&ctx, earthquake::resolve),
        spawn_resolver(&ctx, flood::resolve),
        spawn_resolver(&ctx, wildfire::resolve),
    )?;

    Ok(merge::merge(earthquake, flood, wildfire, &ctx.config))
}

async fn spawn_resolver<T, F>(ctx: &Arc<PipelineContext>, resolve: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce(&PipelineContext) -> Result<T, PipelineError> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    tokio::task::spawn_blocking(move || resolve(&ctx)).await?
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use geo::{Geometry, LineString, Rect, coord};
    use hazard_risk_geometry::{Crs, Feature, GeometryLayer};
    use serde_json::Value;

    use crate::config::RegionConfig;
    use crate::context::{PipelineContext, SourceLayers};

    pub fn feature(properties: &[(&str, Value)], geometry: Geometry<f64>) -> Feature {
        let properties = properties
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        Feature::new(properties, geometry)
    }

    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 }).to_polygon())
    }

    /// Axis-aligned square with its lower-left corner at `(x, y)`.
    pub fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
        rect(x, y, x + size, y + size)
    }

    pub fn zip(code: &str, geometry: Geometry<f64>) -> Feature {
        feature(&[("ZCTA5CE10", code.into())], geometry)
    }

    pub fn district(id: i64, name: &str, geometry: Geometry<f64>) -> Feature {
        feature(
            &[("DISTRICT_ID", id.into()), ("DIST_NAME", name.into())],
            geometry,
        )
    }

    pub fn zone(class: &str, geometry: Geometry<f64>) -> Feature {
        feature(&[("HAZ_CLASS", class.into())], geometry)
    }

    pub fn fault(line: LineString<f64>) -> Feature {
        feature(&[], Geometry::LineString(line))
    }

    fn layer(name: &str, features: Vec<Feature>) -> GeometryLayer {
        GeometryLayer::new(name, Crs::CaliforniaAlbers, features)
    }

    /// A context over the reference region with every layer already in
    /// California Albers. Empty hazard layers get a placeholder feature far
    /// from any test ZIP so their schema checks still pass.
    pub fn context(
        zips: Vec<Feature>,
        districts: Vec<Feature>,
        zones: Vec<Feature>,
        faults: Vec<Feature>,
    ) -> PipelineContext {
        let far = || square(1.0e6, 1.0e6, 1.0);
        let districts = if districts.is_empty() {
            vec![district(0, "Placeholder", far())]
        } else {
            districts
        };
        let zones = if zones.is_empty() {
            vec![zone("Low", far())]
        } else {
            zones
        };
        let faults = if faults.is_empty() {
            vec![fault(LineString::from(vec![(1.0e6, 1.0e6), (1.0e6 + 1.0, 1.0e6)]))]
        } else {
            faults
        };

        let config = Arc::new(RegionConfig::reference().unwrap());
        PipelineContext::new(
            config,
            SourceLayers {
                zips: layer("zips", zips),
                flood: layer("flood", districts),
                wildfire: layer("wildfire", zones),
                faults: layer("faults", faults),
            },
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, district, fault, rect, square, zip, zone};
    use geo::line_string;
    use hazard_risk_models::{UNKNOWN_DISTRICT, UNKNOWN_HAZARD_LEVEL};

    #[tokio::test]
    async fn scenario_fully_covered_zip() {
        // ZIP square centred on (0, 0); fault 300 m north of the centroid.
        let ctx = context(
            vec![zip("94601", square(-50.0, -50.0, 100.0))],
            vec![district(142, "Zone 12", square(-100.0, -100.0, 200.0))],
            vec![
                zone("High", rect(-50.0, -50.0, 40.0, 50.0)),
                zone("Very High", rect(40.0, -50.0, 50.0, 50.0)),
            ],
            vec![fault(line_string![(x: -5_000.0, y: 300.0), (x: 5_000.0, y: 300.0)])],
        );

        let table = build_table(Arc::new(ctx)).await.unwrap();
        assert_eq!(table.records.len(), 1);

        let row = &table.records[0];
        assert_eq!(row.zip.as_str(), "94601");
        assert_eq!(row.earthquake_risk_score, 10);
        assert_eq!(row.flood_control_district, "Zone 12");
        assert_eq!(row.flood_control_district_id.as_ref().unwrap().as_str(), "142");
        assert_eq!(row.flood_risk_score, 4);
        assert_eq!(row.wildfire_hazard_level, "Very High");
        assert_eq!(row.wildfire_risk_score, 10);
    }

    #[tokio::test]
    async fn scenario_zip_without_flood_or_wildfire_data() {
        let ctx = context(
            vec![zip("94601", square(-50.0, -50.0, 100.0))],
            vec![],
            vec![],
            vec![fault(line_string![(x: 12_000.0, y: -5_000.0), (x: 12_000.0, y: 5_000.0)])],
        );

        let table = build_table(Arc::new(ctx)).await.unwrap();
        let row = &table.records[0];
        assert_eq!(row.flood_control_district, UNKNOWN_DISTRICT);
        assert_eq!(row.flood_risk_score, 0);
        assert_eq!(row.wildfire_hazard_level, UNKNOWN_HAZARD_LEVEL);
        assert_eq!(row.wildfire_risk_score, 0);
        assert_eq!(row.earthquake_risk_score, 1);
        assert_eq!(table.flood_defaulted, 1);
        assert_eq!(table.wildfire_defaulted, 1);
    }

    #[tokio::test]
    async fn one_row_per_allow_listed_zip() {
        let ctx = context(
            vec![
                zip("94601", square(0.0, 0.0, 100.0)),
                zip("90210", square(200.0, 0.0, 100.0)),
                zip("94602", square(400.0, 0.0, 100.0)),
                zip("94601", square(0.0, 200.0, 100.0)),
            ],
            vec![],
            vec![],
            vec![],
        );

        let table = build_table(Arc::new(ctx)).await.unwrap();
        let zips: Vec<&str> = table.records.iter().map(|r| r.zip.as_str()).collect();
        assert_eq!(zips, vec!["94601", "94602"]);
    }

    mod end_to_end {
        use std::path::Path;
        use std::sync::Arc;

        use hazard_risk_models::ZipCode;
        use serde_json::{Value, json};

        use crate::config::{RegionConfig, SourcePaths};
        use crate::writer::RiskTable;
        use crate::{PipelineError, RunSummary, run};

        fn polygon(properties: Value, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> Value {
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]],
                },
            })
        }

        fn write_collection(path: &Path, features: Vec<Value>, crs: Option<&str>) {
            let mut collection = json!({ "type": "FeatureCollection", "features": features });
            if let Some(name) = crs {
                collection["crs"] = json!({ "type": "name", "properties": { "name": name } });
            }
            std::fs::write(path, serde_json::to_string(&collection).unwrap()).unwrap();
        }

        /// Spherical Web Mercator forward, for building projected fixtures.
        fn mercator(lon: f64, lat: f64) -> [f64; 2] {
            let r = 6_378_137.0;
            [
                r * lon.to_radians(),
                r * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln(),
            ]
        }

        /// Writes WGS84 ZIP, flood and wildfire layers and a Web Mercator
        /// fault layer under `dir`.
        fn write_sources(dir: &Path) -> SourcePaths {
            std::fs::create_dir_all(dir).unwrap();
            let sources = SourcePaths {
                zips: dir.join("zips.geojson"),
                flood: dir.join("flood.geojson"),
                wildfire: dir.join("wildfire.geojson"),
                faults: dir.join("faults.geojson"),
                output: dir.join("output").join("zip_risk_scores.csv"),
            };

            write_collection(
                &sources.zips,
                vec![
                    polygon(
                        json!({ "ZCTA5CE10": "94601" }),
                        (-122.215, 37.775),
                        (-122.205, 37.785),
                    ),
                    polygon(
                        json!({ "ZCTA5CE10": "90210" }),
                        (-118.41, 34.08),
                        (-118.40, 34.09),
                    ),
                ],
                None,
            );
            write_collection(
                &sources.flood,
                vec![polygon(
                    json!({ "DISTRICT_ID": 142, "DIST_NAME": "Zone 12" }),
                    (-122.25, 37.75),
                    (-122.17, 37.81),
                )],
                None,
            );
            write_collection(
                &sources.wildfire,
                vec![
                    polygon(
                        json!({ "HAZ_CLASS": "High" }),
                        (-122.215, 37.775),
                        (-122.206, 37.785),
                    ),
                    polygon(
                        json!({ "HAZ_CLASS": "Very High" }),
                        (-122.206, 37.775),
                        (-122.205, 37.785),
                    ),
                ],
                None,
            );
            // About 220 m north of the ZIP centroid.
            write_collection(
                &sources.faults,
                vec![json!({
                    "type": "Feature",
                    "properties": { "NAME": "Hayward" },
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [mercator(-122.3, 37.782), mercator(-122.1, 37.782)],
                    },
                })],
                Some("urn:ogc:def:crs:EPSG::3857"),
            );

            sources
        }

        #[tokio::test]
        async fn run_scores_files_on_disk_and_is_byte_identical() {
            let dir = std::env::temp_dir().join("hazard_risk_pipeline_end_to_end");
            let _ = std::fs::remove_dir_all(&dir);
            let sources = write_sources(&dir);
            let config = Arc::new(RegionConfig::reference().unwrap());

            let summary = run(Arc::clone(&config), &sources).await.unwrap();
            assert_eq!(
                summary,
                RunSummary {
                    rows: 1,
                    flood_defaulted: 0,
                    wildfire_defaulted: 0,
                    output: sources.output.clone(),
                }
            );
            let first = std::fs::read(&sources.output).unwrap();

            run(config, &sources).await.unwrap();
            let second = std::fs::read(&sources.output).unwrap();
            assert_eq!(first, second);

            let table = RiskTable::read(&sources.output).unwrap();
            assert_eq!(table.len(), 1);
            let row = table.get(&ZipCode::normalize("94601").unwrap()).unwrap();
            assert_eq!(row.earthquake_risk_score, 10);
            assert_eq!(row.flood_control_district, "Zone 12");
            assert_eq!(row.flood_risk_score, 4);
            assert_eq!(row.wildfire_hazard_level, "Very High");
            assert_eq!(row.wildfire_risk_score, 10);

            std::fs::remove_dir_all(&dir).ok();
        }

        #[tokio::test]
        async fn failed_load_leaves_previous_output_untouched() {
            let dir = std::env::temp_dir().join("hazard_risk_pipeline_failed_load");
            let _ = std::fs::remove_dir_all(&dir);
            let sources = write_sources(&dir);
            let config = Arc::new(RegionConfig::reference().unwrap());

            run(Arc::clone(&config), &sources).await.unwrap();
            let before = std::fs::read(&sources.output).unwrap();

            std::fs::remove_file(&sources.faults).unwrap();
            let err = run(config, &sources).await.unwrap_err();
            assert!(matches!(err, PipelineError::Load(_)));
            assert_eq!(std::fs::read(&sources.output).unwrap(), before);

            std::fs::remove_dir_all(&dir).ok();
        }
    }

    #[tokio::test]
    async fn resolver_failure_aborts_the_table() {
        let mut ctx = context(
            vec![zip("94601", square(0.0, 0.0, 100.0))],
            vec![],
            vec![],
            vec![],
        );
        ctx.faults.features.clear();

        let err = build_table(Arc::new(ctx)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Schema(SchemaError::NoLineGeometry { .. })));
    }
}
