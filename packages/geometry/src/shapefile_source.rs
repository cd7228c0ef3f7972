//! ESRI Shapefile loader.
//!
//! Reads shapes and their `.dbf` attribute records together. The CRS is
//! taken from the `.prj` sidecar; a Shapefile without one (or with a WKT
//! that is not recognized) fails to load instead of being assumed.

use std::path::Path;

use geo::{Geometry, MultiLineString, MultiPolygon};
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};

use crate::{Crs, Feature, GeometryLayer, LoadError};

/// Loads a Shapefile and its sidecars.
///
/// Null shapes and point shapes are skipped.
///
/// # Errors
///
/// Returns [`LoadError`] if the files cannot be read or parsed, or the
/// `.prj` sidecar is missing or unrecognized.
pub fn load(name: &str, path: &Path) -> Result<GeometryLayer, LoadError> {
    let crs = read_prj(path)?;

    let mut reader = Reader::from_path(path).map_err(|e| LoadError::Shapefile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut features = Vec::new();
    let mut skipped = 0usize;

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| LoadError::Shapefile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let Some(geometry) = shape_to_geometry(shape).map_err(|message| LoadError::Shapefile {
            path: path.display().to_string(),
            message,
        })?
        else {
            skipped += 1;
            continue;
        };

        let properties = record
            .into_iter()
            .map(|(field, value)| (field, field_value_to_json(value)))
            .collect();

        features.push(Feature::new(properties, geometry));
    }

    if skipped > 0 {
        log::warn!("{name}: skipped {skipped} null or point shapes");
    }

    Ok(GeometryLayer::new(name, crs, features))
}

/// Reads and identifies the `.prj` sidecar next to `path`.
fn read_prj(path: &Path) -> Result<Crs, LoadError> {
    let prj_path = path.with_extension("prj");
    let wkt = std::fs::read_to_string(&prj_path).map_err(|e| LoadError::UnknownCrs {
        path: path.display().to_string(),
        detail: format!("cannot read {}: {e}", prj_path.display()),
    })?;

    Crs::from_wkt(&wkt).ok_or_else(|| LoadError::UnknownCrs {
        path: path.display().to_string(),
        detail: format!("unrecognized WKT in {}", prj_path.display()),
    })
}

/// Converts a shape into a `geo` geometry. Returns `Ok(None)` for shapes
/// the pipeline has no use for.
fn shape_to_geometry(shape: Shape) -> Result<Option<Geometry<f64>>, String> {
    let geometry = match shape {
        Shape::Polyline(line) => Geometry::MultiLineString(MultiLineString::from(line)),
        Shape::PolylineM(line) => Geometry::MultiLineString(MultiLineString::from(line)),
        Shape::PolylineZ(line) => Geometry::MultiLineString(MultiLineString::from(line)),
        Shape::Polygon(polygon) => {
            let mp: MultiPolygon<f64> = polygon
                .try_into()
                .map_err(|e| format!("Failed to convert polygon: {e:?}"))?;
            Geometry::MultiPolygon(mp)
        }
        Shape::PolygonM(polygon) => {
            let mp: MultiPolygon<f64> = polygon
                .try_into()
                .map_err(|e| format!("Failed to convert polygonM: {e:?}"))?;
            Geometry::MultiPolygon(mp)
        }
        Shape::PolygonZ(polygon) => {
            let mp: MultiPolygon<f64> = polygon
                .try_into()
                .map_err(|e| format!("Failed to convert polygonZ: {e:?}"))?;
            Geometry::MultiPolygon(mp)
        }
        _ => return Ok(None),
    };
    Ok(Some(geometry))
}

/// Converts a dBase field value into JSON so Shapefile and `GeoJSON`
/// attributes share one representation.
fn field_value_to_json(value: FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => {
            serde_json::Value::String(s.trim_end().to_string())
        }
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        FieldValue::Float(Some(n)) => serde_json::Number::from_f64(f64::from(n))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        FieldValue::Integer(i) => serde_json::Value::from(i),
        FieldValue::Logical(Some(b)) => serde_json::Value::Bool(b),
        _ => serde_json::Value::Null,
    }
}
