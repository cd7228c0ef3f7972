//! `GeoJSON` feature collection loader.
//!
//! The CRS comes from the legacy top-level `crs` member when present
//! (`{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3310"}}`),
//! and otherwise from RFC 7946, which fixes `GeoJSON` coordinates to WGS 84
//! longitude/latitude.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geojson::GeoJson;

use crate::{Crs, Feature, GeometryLayer, LoadError};

/// Loads a `GeoJSON` `FeatureCollection` from disk.
///
/// Features with a `null` geometry are skipped.
///
/// # Errors
///
/// Returns [`LoadError`] if the file cannot be read, is not a feature
/// collection, or declares a CRS that cannot be parsed.
pub fn load(name: &str, path: &Path) -> Result<GeometryLayer, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let geojson = GeoJson::from_reader(BufReader::new(file)).map_err(|e| LoadError::GeoJson {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    from_geojson(name, path, geojson)
}

/// Converts a parsed [`GeoJson`] document into a layer.
///
/// # Errors
///
/// Returns [`LoadError`] if the document is not a feature collection, a
/// geometry cannot be converted, or the declared CRS is unrecognized.
pub fn from_geojson(name: &str, path: &Path, geojson: GeoJson) -> Result<GeometryLayer, LoadError> {
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(LoadError::GeoJson {
            path: path.display().to_string(),
            message: "expected a FeatureCollection".to_string(),
        });
    };

    let crs = declared_crs(path, collection.foreign_members.as_ref())?;

    let mut features = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;

    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };

        let geometry: geo::Geometry<f64> =
            geometry.try_into().map_err(|e: geojson::Error| LoadError::GeoJson {
                path: path.display().to_string(),
                message: format!("failed to convert geometry: {e}"),
            })?;

        features.push(Feature::new(feature.properties.unwrap_or_default(), geometry));
    }

    if skipped > 0 {
        log::warn!("{name}: skipped {skipped} features with null geometry");
    }

    Ok(GeometryLayer::new(name, crs, features))
}

/// Reads the legacy `crs` member, defaulting to WGS 84 per RFC 7946.
fn declared_crs(
    path: &Path,
    foreign_members: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<Crs, LoadError> {
    let Some(crs) = foreign_members.and_then(|m| m.get("crs")) else {
        return Ok(Crs::Wgs84);
    };

    let name = crs
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| LoadError::UnknownCrs {
            path: path.display().to_string(),
            detail: format!("unsupported crs member {crs}"),
        })?;

    name.parse().map_err(|e: crate::crs::ParseCrsError| LoadError::UnknownCrs {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}
