//! Coordinate reference system identification.
//!
//! Only the systems California hazard datasets are realistically
//! published in are modeled: geographic WGS 84 and NAD83, California
//! Albers, Web Mercator, and the six NAD83 California State Plane zones
//! in meters or US survey feet. Anything else parses to [`Crs::Epsg`] and
//! is carried through loading, but cannot be reprojected.

use std::fmt;
use std::str::FromStr;

/// A coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Geographic WGS 84, longitude/latitude degrees (EPSG:4326, CRS84).
    Wgs84,
    /// Geographic NAD83, longitude/latitude degrees (EPSG:4269).
    Nad83,
    /// NAD83 / California Albers, meters (EPSG:3310).
    CaliforniaAlbers,
    /// WGS 84 / Pseudo-Mercator, meters (EPSG:3857).
    WebMercator,
    /// NAD83 / California State Plane zone 1 to 6 (EPSG:26941-26946 in
    /// meters, EPSG:2225-2230 in US survey feet).
    StatePlaneCalifornia {
        /// Zone number, 1 to 6.
        zone: u8,
        /// Whether coordinates are US survey feet rather than meters.
        us_feet: bool,
    },
    /// Any other EPSG code.
    Epsg(u32),
}

impl Crs {
    /// Returns the EPSG code.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::Nad83 => 4269,
            Self::CaliforniaAlbers => 3310,
            Self::WebMercator => 3857,
            Self::StatePlaneCalifornia {
                zone,
                us_feet: false,
            } => 26_940 + zone as u32,
            Self::StatePlaneCalifornia {
                zone,
                us_feet: true,
            } => 2_224 + zone as u32,
            Self::Epsg(code) => code,
        }
    }

    /// Maps an EPSG code to a CRS.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Self::Wgs84,
            4269 => Self::Nad83,
            3310 => Self::CaliforniaAlbers,
            3857 | 900_913 | 102_100 | 102_113 => Self::WebMercator,
            26_941..=26_946 => Self::StatePlaneCalifornia {
                zone: (code - 26_940) as u8,
                us_feet: false,
            },
            2_225..=2_230 => Self::StatePlaneCalifornia {
                zone: (code - 2_224) as u8,
                us_feet: true,
            },
            other => Self::Epsg(other),
        }
    }

    /// Whether coordinates are longitude/latitude degrees.
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84 | Self::Nad83)
    }

    /// Whether this system can serve as the working CRS for area and
    /// distance computations (planar meters, equal-area).
    #[must_use]
    pub const fn is_metric(self) -> bool {
        matches!(self, Self::CaliforniaAlbers)
    }

    /// Identifies a CRS from an ESRI/OGC WKT string, as found in a
    /// Shapefile `.prj` sidecar.
    ///
    /// Projected systems are checked first since their WKT embeds the
    /// geographic base system's name.
    #[must_use]
    pub fn from_wkt(wkt: &str) -> Option<Self> {
        let normalized: String = wkt
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();

        if let Some(code) = authority_code(wkt) {
            return Some(Self::from_epsg(code));
        }

        if normalized.starts_with("PROJCS") {
            if normalized.contains("CALIFORNIAALBERS") || normalized.contains("TEALEALBERS") {
                return Some(Self::CaliforniaAlbers);
            }
            if ["WEBMERCATOR", "PSEUDOMERCATOR", "MERCATORAUXILIARYSPHERE"]
                .iter()
                .any(|name| normalized.contains(name))
            {
                return Some(Self::WebMercator);
            }
            return state_plane_zone(&normalized).map(|zone| Self::StatePlaneCalifornia {
                zone,
                us_feet: normalized.contains("FOOT")
                    || normalized.contains("FEET")
                    || normalized.contains("FTUS"),
            });
        }

        if normalized.starts_with("GEOGCS") {
            if normalized.contains("NORTHAMERICAN1983") || normalized.contains("GCSNAD1983") {
                return Some(Self::Nad83);
            }
            if normalized.contains("WGS1984") || normalized.contains("WGS84") {
                return Some(Self::Wgs84);
            }
        }

        None
    }
}

/// Finds the California State Plane zone in a normalized projected WKT,
/// from either the ESRI `FIPS_040n` suffix or the EPSG `California zone n`
/// name. Only NAD83 zones are recognized.
fn state_plane_zone(normalized: &str) -> Option<u8> {
    if !normalized.contains("CALIFORNIA") || !normalized.contains("83") {
        return None;
    }
    ["FIPS040", "CALIFORNIAZONE"].iter().find_map(|marker| {
        let idx = normalized.find(marker)? + marker.len();
        let digit = normalized[idx..].chars().next()?.to_digit(10)?;
        u8::try_from(digit).ok().filter(|zone| (1..=6).contains(zone))
    })
}

/// Extracts a top-level `AUTHORITY["EPSG","nnnn"]` code from WKT.
///
/// The outermost authority closes the WKT, so the last occurrence is the
/// one describing the whole system.
fn authority_code(wkt: &str) -> Option<u32> {
    let idx = wkt.rfind("AUTHORITY[")?;
    let rest = &wkt[idx..];
    let mut parts = rest.split('"').skip(1).step_by(2);
    let authority = parts.next()?;
    let code = parts.next()?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    // Only an authority sitting directly inside the outermost bracket
    // identifies the system; deeper ones belong to datums and units.
    let depth = wkt[..idx].chars().fold(0i32, |depth, c| match c {
        '[' => depth + 1,
        ']' => depth - 1,
        _ => depth,
    });
    if depth != 1 {
        return None;
    }
    code.parse().ok()
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Error returned when a CRS identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized CRS identifier: {0}")]
pub struct ParseCrsError(pub String);

impl FromStr for Crs {
    type Err = ParseCrsError;

    /// Parses `EPSG:nnnn`, `urn:ogc:def:crs:EPSG::nnnn`, and the OGC
    /// `CRS84` URN used by `GeoJSON`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.ends_with("CRS84") {
            return Ok(Self::Wgs84);
        }

        let code = upper
            .strip_prefix("EPSG:")
            .or_else(|| {
                upper
                    .strip_prefix("URN:OGC:DEF:CRS:EPSG:")
                    .map(|rest| rest.rsplit(':').next().unwrap_or(rest))
            })
            .ok_or_else(|| ParseCrsError(trimmed.to_string()))?;

        code.parse::<u32>()
            .map(Self::from_epsg)
            .map_err(|_| ParseCrsError(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epsg_forms() {
        assert_eq!("EPSG:3310".parse::<Crs>().unwrap(), Crs::CaliforniaAlbers);
        assert_eq!(
            "urn:ogc:def:crs:EPSG::4269".parse::<Crs>().unwrap(),
            Crs::Nad83
        );
        assert_eq!(
            "urn:ogc:def:crs:OGC:1.3:CRS84".parse::<Crs>().unwrap(),
            Crs::Wgs84
        );
        assert_eq!("EPSG:2227".parse::<Crs>().unwrap(), Crs::Epsg(2227));
    }

    #[test]
    fn rejects_garbage() {
        assert!("meters".parse::<Crs>().is_err());
        assert!("EPSG:abc".parse::<Crs>().is_err());
    }

    #[test]
    fn identifies_esri_geographic_wkt() {
        let wkt = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::Wgs84));

        let wkt = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::Nad83));
    }

    #[test]
    fn identifies_california_albers_wkt() {
        let wkt = r#"PROJCS["NAD_1983_California_Teale_Albers",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Albers"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",-4000000.0],PARAMETER["Central_Meridian",-120.0],PARAMETER["Standard_Parallel_1",34.0],PARAMETER["Standard_Parallel_2",40.5],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::CaliforniaAlbers));
    }

    #[test]
    fn prefers_outermost_authority() {
        let wkt = r#"PROJCS["NAD83 / California Albers",GEOGCS["NAD83",AUTHORITY["EPSG","4269"]],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","3310"]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::CaliforniaAlbers));
    }

    #[test]
    fn identifies_esri_web_mercator_wkt() {
        let wkt = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Mercator_Auxiliary_Sphere"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",0.0],PARAMETER["Standard_Parallel_1",0.0],PARAMETER["Auxiliary_Sphere_Type",0.0],UNIT["Meter",1.0]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::WebMercator));
    }

    #[test]
    fn identifies_state_plane_wkt() {
        let wkt = r#"PROJCS["NAD_1983_StatePlane_California_III_FIPS_0403_Feet",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Lambert_Conformal_Conic"],PARAMETER["False_Easting",6561666.666666666],PARAMETER["False_Northing",1640416.666666667],PARAMETER["Central_Meridian",-120.5],PARAMETER["Standard_Parallel_1",37.06666666666667],PARAMETER["Standard_Parallel_2",38.43333333333333],PARAMETER["Latitude_Of_Origin",36.5],UNIT["Foot_US",0.3048006096012192]]"#;
        assert_eq!(
            Crs::from_wkt(wkt),
            Some(Crs::StatePlaneCalifornia {
                zone: 3,
                us_feet: true
            })
        );

        let wkt = r#"PROJCS["NAD_1983_StatePlane_California_IV_FIPS_0404",GEOGCS["GCS_North_American_1983"],PROJECTION["Lambert_Conformal_Conic"],UNIT["Meter",1.0]]"#;
        assert_eq!(
            Crs::from_wkt(wkt),
            Some(Crs::StatePlaneCalifornia {
                zone: 4,
                us_feet: false
            })
        );
    }

    #[test]
    fn projected_codes_round_trip() {
        for code in [3857, 26_941, 26_946, 2_225, 2_227, 2_230] {
            assert_eq!(Crs::from_epsg(code).epsg(), code);
        }
        assert_eq!(Crs::from_epsg(102_100), Crs::WebMercator);
    }

    #[test]
    fn unknown_projected_wkt_is_unrecognized() {
        let wkt = r#"PROJCS["NAD_1983_StatePlane_Nevada_West_FIPS_2703_Feet",GEOGCS["GCS_North_American_1983"]]"#;
        assert_eq!(Crs::from_wkt(wkt), None);
    }
}
