//! Reprojection into a metric CRS.
//!
//! Implements the ellipsoidal Albers equal-area conic projection (Snyder,
//! *Map Projections: A Working Manual*, eq. 14-1 to 14-6) with the
//! EPSG:3310 parameters on the GRS 1980 ellipsoid. Projected sources are
//! first brought back to longitude/latitude: spherical Web Mercator
//! directly, California State Plane through the ellipsoidal Lambert
//! conformal conic inverse (Snyder eq. 15-1 to 15-11).
//!
//! WGS 84 and NAD83 are treated as the same datum; the shift between them
//! is around a meter in California and well below the distance buckets
//! the pipeline classifies into.

use geo::{Coord, Geometry, MapCoords};
use thiserror::Error;

use crate::Crs;

/// GRS 1980 semi-major axis in meters.
const GRS80_A: f64 = 6_378_137.0;

/// GRS 1980 inverse flattening.
const GRS80_INV_F: f64 = 298.257_222_101;

/// US survey foot in meters.
const US_SURVEY_FOOT: f64 = 1_200.0 / 3_937.0;

/// Maximum iterations of the conformal latitude inversion.
const MAX_LATITUDE_ITERATIONS: usize = 15;

/// Errors that can occur while reprojecting geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// No transformation is implemented between the two systems.
    #[error("No projection from {from} to {to}")]
    Unsupported {
        /// Source CRS.
        from: Crs,
        /// Target CRS.
        to: Crs,
    },

    /// A coordinate lies outside the valid domain of the projection.
    #[error("Coordinate ({x}, {y}) is outside the projection domain")]
    OutOfDomain {
        /// Longitude or easting.
        x: f64,
        /// Latitude or northing.
        y: f64,
    },
}

/// Parameters of an ellipsoidal Albers equal-area conic projection,
/// precomputed for repeated forward transforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl AlbersEqualArea {
    /// Builds a projection from its defining parameters (degrees, meters).
    #[must_use]
    pub fn new(
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let a = GRS80_A;
        let f = 1.0 / GRS80_INV_F;
        let e2 = f * (2.0 - f);
        let e = e2.sqrt();

        let m = |phi: f64| phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt();

        let (phi1, phi2, phi0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());
        let (m1, m2) = (m(phi1), m(phi2));
        let (q1, q2, q0) = (q(phi1, e, e2), q(phi2, e, e2), q(phi0, e, e2));

        let n = (m1.powi(2) - m2.powi(2)) / (q2 - q1);
        let c = n.mul_add(q1, m1.powi(2));
        let rho0 = a * n.mul_add(-q0, c).sqrt() / n;

        Self {
            a,
            e,
            e2,
            n,
            c,
            rho0,
            lon0: lon0.to_radians(),
            false_easting,
            false_northing,
        }
    }

    /// NAD83 / California Albers (EPSG:3310).
    #[must_use]
    pub fn california() -> Self {
        Self::new(34.0, 40.5, 0.0, -120.0, 0.0, -4_000_000.0)
    }

    /// Projects a longitude/latitude coordinate (degrees) to meters.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::OutOfDomain`] for non-finite or
    /// out-of-range coordinates.
    pub fn forward(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        let out_of_domain = || ProjectionError::OutOfDomain {
            x: coord.x,
            y: coord.y,
        };

        if !coord.x.is_finite()
            || !coord.y.is_finite()
            || coord.x.abs() > 180.0
            || coord.y.abs() > 90.0
        {
            return Err(out_of_domain());
        }

        let phi = coord.y.to_radians();
        let radicand = self.n.mul_add(-q(phi, self.e, self.e2), self.c);
        if radicand < 0.0 {
            return Err(out_of_domain());
        }

        let rho = self.a * radicand.sqrt() / self.n;
        let theta = self.n * (coord.x.to_radians() - self.lon0);

        Ok(Coord {
            x: rho.mul_add(theta.sin(), self.false_easting),
            y: rho.mul_add(-theta.cos(), self.rho0) + self.false_northing,
        })
    }
}

/// Parameters of an ellipsoidal Lambert conformal conic projection with
/// two standard parallels, on GRS 1980.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertConformalConic {
    a: f64,
    e: f64,
    n: f64,
    f: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl LambertConformalConic {
    /// Builds a projection from its defining parameters (degrees, meters).
    #[must_use]
    pub fn new(
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let a = GRS80_A;
        let f = 1.0 / GRS80_INV_F;
        let e2 = f * (2.0 - f);
        let e = e2.sqrt();

        let m = |phi: f64| phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt();

        let (phi1, phi2, phi0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());
        let (m1, m2) = (m(phi1), m(phi2));
        let (t1, t2, t0) = (t(phi1, e), t(phi2, e), t(phi0, e));

        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let big_f = m1 / (n * t1.powf(n));
        let rho0 = a * big_f * t0.powf(n);

        Self {
            a,
            e,
            n,
            f: big_f,
            rho0,
            lon0: lon0.to_radians(),
            false_easting,
            false_northing,
        }
    }

    /// NAD83 / California State Plane zone 1 to 6, in meters.
    #[must_use]
    pub fn california_zone(zone: u8) -> Option<Self> {
        let dms = |deg: f64, min: f64| deg + min / 60.0;
        let (lat1, lat2, lat0, lon0) = match zone {
            1 => (dms(41.0, 40.0), 40.0, dms(39.0, 20.0), -122.0),
            2 => (dms(39.0, 50.0), dms(38.0, 20.0), dms(37.0, 40.0), -122.0),
            3 => (dms(38.0, 26.0), dms(37.0, 4.0), 36.5, -120.5),
            4 => (37.25, 36.0, dms(35.0, 20.0), -119.0),
            5 => (dms(35.0, 28.0), dms(34.0, 2.0), 33.5, -118.0),
            6 => (dms(33.0, 53.0), dms(32.0, 47.0), dms(32.0, 10.0), -116.25),
            _ => return None,
        };
        Some(Self::new(lat1, lat2, lat0, lon0, 2_000_000.0, 500_000.0))
    }

    /// Projects a longitude/latitude coordinate (degrees) to meters.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::OutOfDomain`] for non-finite or
    /// out-of-range coordinates, including the poles.
    pub fn forward(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        if !coord.x.is_finite()
            || !coord.y.is_finite()
            || coord.x.abs() > 180.0
            || coord.y.abs() >= 90.0
        {
            return Err(ProjectionError::OutOfDomain {
                x: coord.x,
                y: coord.y,
            });
        }

        let rho = self.a * self.f * t(coord.y.to_radians(), self.e).powf(self.n);
        let theta = self.n * (coord.x.to_radians() - self.lon0);

        Ok(Coord {
            x: rho.mul_add(theta.sin(), self.false_easting),
            y: rho.mul_add(-theta.cos(), self.rho0) + self.false_northing,
        })
    }

    /// Recovers longitude/latitude (degrees) from projected meters.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::OutOfDomain`] for non-finite input or if
    /// the latitude iteration does not converge.
    pub fn inverse(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        let out_of_domain = || ProjectionError::OutOfDomain {
            x: coord.x,
            y: coord.y,
        };
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(out_of_domain());
        }

        let sign = self.n.signum();
        let dx = coord.x - self.false_easting;
        let dy = self.rho0 - (coord.y - self.false_northing);
        let rho = sign * dx.hypot(dy);
        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / (self.a * self.f)).powf(1.0 / self.n);

        let half_e = self.e / 2.0;
        let mut phi = std::f64::consts::FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..MAX_LATITUDE_ITERATIONS {
            let es = self.e * phi.sin();
            let next =
                std::f64::consts::FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(half_e)).atan();
            if (next - phi).abs() < 1e-12 {
                return Ok(Coord {
                    x: (theta / self.n + self.lon0).to_degrees(),
                    y: next.to_degrees(),
                });
            }
            phi = next;
        }

        Err(out_of_domain())
    }
}

/// Snyder's `t` function (conformal latitude helper).
fn t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (std::f64::consts::FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

/// Recovers geographic coordinates from a source CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Unprojection {
    /// The source is already longitude/latitude degrees.
    Geographic,
    /// Spherical Web Mercator meters.
    WebMercator,
    /// Lambert conformal conic, with the source's linear unit in meters.
    Lambert {
        /// Projection parameters, in meters.
        lcc: LambertConformalConic,
        /// Meters per source unit.
        unit_m: f64,
    },
}

impl Unprojection {
    /// The inverse for `crs`, if one is implemented.
    #[must_use]
    pub fn for_source(crs: Crs) -> Option<Self> {
        match crs {
            Crs::Wgs84 | Crs::Nad83 => Some(Self::Geographic),
            Crs::WebMercator => Some(Self::WebMercator),
            Crs::StatePlaneCalifornia { zone, us_feet } => {
                LambertConformalConic::california_zone(zone).map(|lcc| Self::Lambert {
                    lcc,
                    unit_m: if us_feet { US_SURVEY_FOOT } else { 1.0 },
                })
            }
            Crs::CaliforniaAlbers | Crs::Epsg(_) => None,
        }
    }

    /// Converts a source coordinate to longitude/latitude degrees.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::OutOfDomain`] if the coordinate cannot
    /// be inverted.
    pub fn inverse(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        match self {
            Self::Geographic => Ok(coord),
            Self::WebMercator => {
                if !coord.x.is_finite() || !coord.y.is_finite() {
                    return Err(ProjectionError::OutOfDomain {
                        x: coord.x,
                        y: coord.y,
                    });
                }
                Ok(Coord {
                    x: (coord.x / GRS80_A).to_degrees(),
                    y: (2.0 * (coord.y / GRS80_A).exp().atan() - std::f64::consts::FRAC_PI_2)
                        .to_degrees(),
                })
            }
            Self::Lambert { lcc, unit_m } => lcc.inverse(Coord {
                x: coord.x * unit_m,
                y: coord.y * unit_m,
            }),
        }
    }
}

/// Snyder's `q` function (authalic latitude helper).
fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let sin = phi.sin();
    let es = e * sin;
    (1.0 - e2) * (sin / es.mul_add(-es, 1.0) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}

/// A transformation between two CRSs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projector {
    /// Source and target are the same system.
    Identity,
    /// Any supported source to California Albers meters.
    ToCaliforniaAlbers {
        /// Brings source coordinates back to longitude/latitude.
        source: Unprojection,
        /// Forward projection into the target.
        albers: AlbersEqualArea,
    },
}

impl Projector {
    /// Resolves the transformation from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Unsupported`] when no transformation is
    /// implemented between the two systems.
    pub fn new(from: Crs, to: Crs) -> Result<Self, ProjectionError> {
        if from == to {
            return Ok(Self::Identity);
        }
        let unsupported = ProjectionError::Unsupported { from, to };
        if to != Crs::CaliforniaAlbers {
            return Err(unsupported);
        }
        let source = Unprojection::for_source(from).ok_or(unsupported)?;
        Ok(Self::ToCaliforniaAlbers {
            source,
            albers: AlbersEqualArea::california(),
        })
    }

    /// Reprojects a geometry, preserving its type.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::OutOfDomain`] if any coordinate cannot
    /// be projected.
    pub fn project<G>(&self, geometry: &G) -> Result<G, ProjectionError>
    where
        G: MapCoords<f64, f64, Output = G> + Clone,
    {
        match self {
            Self::Identity => Ok(geometry.clone()),
            Self::ToCaliforniaAlbers { source, albers } => {
                geometry.try_map_coords(|c| albers.forward(source.inverse(c)?))
            }
        }
    }
}

/// Reprojects a geometry from `from` to `to`.
///
/// # Errors
///
/// Returns [`ProjectionError`] if the transformation is unsupported or a
/// coordinate falls outside its domain.
pub fn project(
    geometry: &Geometry<f64>,
    from: Crs,
    to: Crs,
) -> Result<Geometry<f64>, ProjectionError> {
    Projector::new(from, to)?.project(geometry)
}
