//! Coordinate reference systems and point reprojection.
//!
//! Only the references that model grids and DEMs commonly use are built in:
//! geographic WGS84, Web Mercator and UTM zones (WGS84 and NAD83 codes).
//! Anything else needs a caller-supplied [`CoordinateTransform`].

use crate::errors::ResamplingError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// WGS84 semi-major axis in meters.
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM central scale factor.
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CrsRepr", into = "String")]
pub struct Crs {
    epsg: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CrsRepr {
    Code(u32),
    Text(String),
}

impl TryFrom<CrsRepr> for Crs {
    type Error = String;

    fn try_from(repr: CrsRepr) -> Result<Self, Self::Error> {
        match repr {
            CrsRepr::Code(code) => Ok(Self::from_epsg(code)),
            CrsRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

impl FromStr for Crs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        code.parse::<u32>()
            .map(Self::from_epsg)
            .map_err(|_| format!("unrecognized CRS '{s}', expected 'EPSG:<code>'"))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl Crs {
    /// Creates a CRS from an EPSG code.
    #[must_use]
    pub const fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    /// Geographic WGS84 (EPSG:4326).
    #[must_use]
    pub const fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Web Mercator (EPSG:3857).
    #[must_use]
    pub const fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// WGS84 UTM zone.
    #[must_use]
    pub const fn utm(zone: u8, north: bool) -> Self {
        let base = if north { 32600 } else { 32700 };
        Self::from_epsg(base + zone as u32)
    }

    /// The EPSG code.
    #[must_use]
    pub const fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Returns the built-in projection for this CRS, if one exists.
    #[must_use]
    pub fn projection(&self) -> Option<Projection> {
        match self.epsg {
            4326 | 4269 => Some(Projection::Geographic),
            3857 => Some(Projection::WebMercator),
            code @ 32601..=32660 => Some(Projection::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            code @ 32701..=32760 => Some(Projection::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            // NAD83 UTM zones; the datum shift to WGS84 is below a meter.
            code @ 26901..=26923 => Some(Projection::Utm {
                zone: (code - 26900) as u8,
                north: true,
            }),
            _ => None,
        }
    }
}

/// Built-in map projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Longitude/latitude in degrees.
    Geographic,
    /// Spherical Web Mercator in meters.
    WebMercator,
    /// Universal Transverse Mercator in meters.
    Utm {
        /// Zone number, 1-60.
        zone: u8,
        /// Northern hemisphere.
        north: bool,
    },
}

impl Projection {
    /// Projects geographic degrees into this projection.
    #[must_use]
    pub fn forward(self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::Geographic => (lon, lat),
            Self::WebMercator => {
                let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
                let x = WGS84_A * lon.to_radians();
                let y = WGS84_A * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Self::Utm { zone, north } => utm_forward(lon, lat, zone, north),
        }
    }

    /// Converts projected coordinates back to geographic degrees.
    #[must_use]
    pub fn inverse(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Geographic => (x, y),
            Self::WebMercator => {
                let lon = (x / WGS84_A).to_degrees();
                let lat = (2.0 * (y / WGS84_A).exp().atan() - PI / 2.0).to_degrees();
                (lon, lat)
            }
            Self::Utm { zone, north } => utm_inverse(x, y, zone, north),
        }
    }
}

fn utm_central_meridian(zone: u8) -> f64 {
    f64::from(zone) * 6.0 - 183.0
}

fn eccentricity_squared() -> f64 {
    WGS84_F * (2.0 - WGS84_F)
}

fn meridian_arc(phi: f64) -> f64 {
    let e2 = eccentricity_squared();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

fn utm_forward(lon: f64, lat: f64, zone: u8, north: bool) -> (f64, f64) {
    let e2 = eccentricity_squared();
    let ep2 = e2 / (1.0 - e2);
    let phi = lat.to_radians();
    let dlam = (lon - utm_central_meridian(zone)).to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = phi.tan().powi(2);
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * dlam;

    let x = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + UTM_FALSE_EASTING;
    let mut y = UTM_K0
        * (meridian_arc(phi)
            + n * phi.tan()
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if !north {
        y += UTM_FALSE_NORTHING_SOUTH;
    }
    (x, y)
}

fn utm_inverse(x: f64, y: f64, zone: u8, north: bool) -> (f64, f64) {
    let e2 = eccentricity_squared();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);
    let sqrt_1me2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);

    let northing = if north { y } else { y - UTM_FALSE_NORTHING_SOUTH };
    let m = northing / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let cos1 = phi1.cos();
    let n1 = WGS84_A / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = phi1.tan().powi(2);
    let c1 = ep2 * cos1 * cos1;
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = (x - UTM_FALSE_EASTING) / (n1 * UTM_K0);

    let phi = phi1
        - (n1 * phi1.tan() / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lam = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / cos1;

    (utm_central_meridian(zone) + lam.to_degrees(), phi.to_degrees())
}

/// Maps points from one coordinate reference into another.
pub trait CoordinateTransform: Send + Sync + fmt::Debug {
    /// Transforms a single point.
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ResamplingError>;
}

/// The identity transform, used when both sides share a CRS.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ResamplingError> {
        Ok((x, y))
    }
}

/// Reprojects through geographic coordinates between two built-in projections.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionTransform {
    from: Projection,
    to: Projection,
}

impl ProjectionTransform {
    /// Creates a transform between two built-in projections.
    #[must_use]
    pub fn new(from: Projection, to: Projection) -> Self {
        Self { from, to }
    }
}

impl CoordinateTransform for ProjectionTransform {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ResamplingError> {
        let (lon, lat) = self.from.inverse(x, y);
        let (tx, ty) = self.to.forward(lon, lat);
        if tx.is_finite() && ty.is_finite() {
            Ok((tx, ty))
        } else {
            Err(ResamplingError::new(format!(
                "point ({x}, {y}) has no finite image under {:?} -> {:?}",
                self.from, self.to
            )))
        }
    }
}

/// Selects the built-in transform from `from` into `to`.
///
/// A missing CRS on either side is treated as "same reference".
///
/// # Errors
///
/// Returns an error if either CRS has no built-in projection.
pub fn builtin_transform(
    from: Option<Crs>,
    to: Option<Crs>,
) -> Result<Box<dyn CoordinateTransform>, ResamplingError> {
    match (from, to) {
        (Some(from), Some(to)) if from != to => {
            let source = from.projection().ok_or_else(|| {
                ResamplingError::new(format!("no built-in projection for {from}"))
            })?;
            let target = to.projection().ok_or_else(|| {
                ResamplingError::new(format!("no built-in projection for {to}"))
            })?;
            if source == target {
                Ok(Box::new(IdentityTransform))
            } else {
                Ok(Box::new(ProjectionTransform::new(source, target)))
            }
        }
        _ => Ok(Box::new(IdentityTransform)),
    }
}
