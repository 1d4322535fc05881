//! WGS84 ellipsoid and the conversions between geodetic and Cartesian
//! coordinates that tile extents and mesh vertices are built from.

use super::Vec3;

/// Equatorial radius in metres.
pub const WGS84_A: f64 = 6_378_137.0;
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// First eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Latitude and longitude in radians, altitude in metres above the ellipsoid.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self { lat_rad, lon_rad, alt_m }
    }
}

/// Earth-centred, Earth-fixed position in metres.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ecef {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Ecef {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for Ecef {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Prime-vertical radius of curvature at a latitude with sine `sin_lat`.
#[inline]
fn prime_vertical_radius(sin_lat: f64) -> f64 {
    WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt()
}

pub fn geodetic_to_ecef(geo: Geodetic) -> Ecef {
    let (sin_lat, cos_lat) = geo.lat_rad.sin_cos();
    let (sin_lon, cos_lon) = geo.lon_rad.sin_cos();
    ecef_from_trig(sin_lat, cos_lat, sin_lon, cos_lon, geo.alt_m)
}

/// [`geodetic_to_ecef`] for callers that already hold the angle sines and
/// cosines, such as mesh builders sharing them across a row or column.
#[inline]
pub fn ecef_from_trig(sin_lat: f64, cos_lat: f64, sin_lon: f64, cos_lon: f64, alt_m: f64) -> Ecef {
    let n = prime_vertical_radius(sin_lat);
    let equatorial = (n + alt_m) * cos_lat;
    Ecef::new(
        equatorial * cos_lon,
        equatorial * sin_lon,
        (n * (1.0 - WGS84_E2) + alt_m) * sin_lat,
    )
}

/// Fixed-point iteration on latitude; converges well below a millimetre for
/// any point outside the Earth's core.
pub fn ecef_to_geodetic(ecef: Ecef) -> Geodetic {
    const ITERATIONS: usize = 6;

    let p = ecef.x.hypot(ecef.y);
    let lon = ecef.y.atan2(ecef.x);
    let mut lat = ecef.z.atan2(p * (1.0 - WGS84_E2));
    for _ in 0..ITERATIONS {
        let sin_lat = lat.sin();
        lat = (ecef.z + WGS84_E2 * prime_vertical_radius(sin_lat) * sin_lat).atan2(p);
    }

    // Stable at the poles, unlike `p / cos(lat) - n`.
    let (sin_lat, cos_lat) = lat.sin_cos();
    let alt = p * cos_lat + ecef.z * sin_lat - WGS84_A * (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    Geodetic::new(lat, lon, alt)
}
