//! Shared read-only inputs for the three resolvers.

use std::path::Path;
use std::sync::Arc;

use geo::MultiPolygon;
use hazard_risk_geometry::{Crs, GeometryLayer, Projector, load_layer};
use hazard_risk_models::ZipCode;

use crate::PipelineError;
use crate::config::{RegionConfig, SourcePaths};
use crate::zip_filter::{ZipSet, filter_zips};

/// The four raw input layers.
#[derive(Debug, Clone)]
pub struct SourceLayers {
    /// ZIP boundaries, unfiltered.
    pub zips: GeometryLayer,
    /// Flood-control district polygons.
    pub flood: GeometryLayer,
    /// Wildfire hazard zone polygons.
    pub wildfire: GeometryLayer,
    /// Quaternary fault lines.
    pub faults: GeometryLayer,
}

impl SourceLayers {
    /// Loads all four layers from disk.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Load`] if any layer is missing, unreadable,
    /// empty, or in an unknown CRS.
    pub fn load(paths: &SourcePaths) -> Result<Self, PipelineError> {
        let load = |name: &str, path: &Path| {
            load_layer(name, path).map_err(|e| {
                log::error!("Failed to load {name} layer: {e}");
                PipelineError::from(e)
            })
        };

        Ok(Self {
            zips: load("zips", &paths.zips)?,
            flood: load("flood", &paths.flood)?,
            wildfire: load("wildfire", &paths.wildfire)?,
            faults: load("faults", &paths.faults)?,
        })
    }
}

/// Everything a resolver needs, shared across worker tasks.
///
/// Immutable once built; resolvers receive it behind an [`Arc`].
#[derive(Debug)]
pub struct PipelineContext {
    /// Region reference data.
    pub config: Arc<RegionConfig>,
    /// In-scope ZIPs, in their source CRS.
    pub zips: ZipSet,
    /// Flood-control district layer.
    pub flood: GeometryLayer,
    /// Wildfire hazard zone layer.
    pub wildfire: GeometryLayer,
    /// Fault line layer.
    pub faults: GeometryLayer,
}

impl PipelineContext {
    /// Filters the ZIP layer to the allow-list and assembles the context.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Schema`] if the ZIP layer has none of the
    /// configured identifier fields.
    pub fn new(config: Arc<RegionConfig>, layers: SourceLayers) -> Result<Self, PipelineError> {
        let zips = filter_zips(
            &layers.zips,
            &config.zip_codes,
            &config.fields.zip_candidates,
        )?;

        Ok(Self {
            config,
            zips,
            flood: layers.flood,
            wildfire: layers.wildfire,
            faults: layers.faults,
        })
    }

    /// The CRS all area and distance computations run in.
    #[must_use]
    pub fn metric_crs(&self) -> Crs {
        self.config.metric_crs
    }

    /// In-scope ZIP boundaries reprojected to [`Self::metric_crs`], in ZIP
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Projection`] if the ZIP layer cannot be
    /// reprojected.
    pub fn metric_zips(&self) -> Result<Vec<(ZipCode, MultiPolygon<f64>)>, PipelineError> {
        let projector = Projector::new(self.zips.crs, self.metric_crs())?;
        self.zips
            .areas
            .iter()
            .map(|area| Ok((area.zip.clone(), projector.project(&area.geometry)?)))
            .collect()
    }
}
