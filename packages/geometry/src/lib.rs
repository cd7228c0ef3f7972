#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Vector geometry loading and reprojection.
//!
//! Reads `GeoJSON` and Shapefile sources into [`GeometryLayer`]s, each
//! tagged with the [`Crs`] declared by the source itself. Nothing here
//! assumes a CRS: a source that does not declare one it can be trusted on
//! fails to load. [`project`] moves geometries into a metric CRS so that
//! distances and areas are expressed in meters.

pub mod crs;
pub mod geojson_source;
pub mod project;
pub mod shapefile_source;

use std::path::Path;

use geo::{Geometry, MultiPolygon};
use thiserror::Error;

pub use crs::Crs;
pub use project::{ProjectionError, Projector};

/// Errors that can occur while loading a geometry source.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The source file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path of the source.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The `GeoJSON` document could not be parsed.
    #[error("Invalid GeoJSON in {path}: {message}")]
    GeoJson {
        /// Path of the source.
        path: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The Shapefile could not be parsed.
    #[error("Invalid Shapefile {path}: {message}")]
    Shapefile {
        /// Path of the source.
        path: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The source parsed but contained no usable features.
    #[error("Geometry source {path} has no features")]
    Empty {
        /// Path of the source.
        path: String,
    },

    /// The file extension is not a supported vector format.
    #[error("Unsupported geometry format for {path}")]
    UnsupportedFormat {
        /// Path of the source.
        path: String,
    },

    /// The source does not declare a recognizable CRS.
    #[error("Cannot determine CRS of {path}: {detail}")]
    UnknownCrs {
        /// Path of the source.
        path: String,
        /// What was found instead.
        detail: String,
    },
}

/// A single vector feature: attribute properties plus geometry.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Attribute values keyed by field name.
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Feature geometry in the owning layer's CRS.
    pub geometry: Geometry<f64>,
}

impl Feature {
    /// Creates a feature from its parts.
    #[must_use]
    pub const fn new(
        properties: serde_json::Map<String, serde_json::Value>,
        geometry: Geometry<f64>,
    ) -> Self {
        Self {
            properties,
            geometry,
        }
    }

    /// Returns a property as text.
    ///
    /// Integral numbers are rendered without a fractional part so that a
    /// Shapefile `Numeric` field holding `94601.0` reads as `"94601"`.
    /// `null` and missing properties yield `None`.
    #[must_use]
    pub fn property_text(&self, field: &str) -> Option<String> {
        match self.properties.get(field)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(i.to_string())
                } else if let Some(u) = n.as_u64() {
                    Some(u.to_string())
                } else {
                    let f = n.as_f64()?;
                    if f.fract() == 0.0 {
                        Some(format!("{f:.0}"))
                    } else {
                        Some(f.to_string())
                    }
                }
            }
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                None
            }
        }
    }

    /// Returns the geometry as a [`MultiPolygon`] if it is polygonal.
    #[must_use]
    pub fn polygons(&self) -> Option<MultiPolygon<f64>> {
        match &self.geometry {
            Geometry::MultiPolygon(mp) => Some(mp.clone()),
            Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
            _ => None,
        }
    }
}

/// A named, CRS-tagged collection of features loaded from one source.
#[derive(Debug, Clone)]
pub struct GeometryLayer {
    /// Source name (e.g., `"zips"`), used in logs and errors.
    pub name: String,
    /// CRS the feature coordinates are expressed in.
    pub crs: Crs,
    /// Features in source order.
    pub features: Vec<Feature>,
}

impl GeometryLayer {
    /// Creates a layer from already-loaded features.
    #[must_use]
    pub fn new(name: impl Into<String>, crs: Crs, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            crs,
            features,
        }
    }

    /// Whether any feature in the layer carries `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.features
            .iter()
            .any(|f| f.properties.contains_key(field))
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Loads a geometry source, dispatching on file extension.
///
/// `.geojson` and `.json` are read as `GeoJSON` feature collections;
/// `.shp` is read as a Shapefile with its `.dbf` attributes and `.prj`
/// CRS sidecar.
///
/// # Errors
///
/// Returns [`LoadError`] if the file is unreadable, malformed, declares
/// no recognizable CRS, or contains zero features.
pub fn load_layer(name: &str, path: &Path) -> Result<GeometryLayer, LoadError> {
    log::info!("Loading {name} from {}...", path.display());

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let layer = match extension.as_str() {
        "geojson" | "json" => geojson_source::load(name, path)?,
        "shp" => shapefile_source::load(name, path)?,
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.display().to_string(),
            });
        }
    };

    if layer.is_empty() {
        return Err(LoadError::Empty {
            path: path.display().to_string(),
        });
    }

    log::info!(
        "Loaded {} features from {} ({})",
        layer.len(),
        path.display(),
        layer.crs
    );

    Ok(layer)
}
