use std::f64::consts::{FRAC_PI_2, PI};

/// A geographic location in radians.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self::new(lat.to_radians(), lon.to_radians())
    }
}

/// Axis-aligned latitude/longitude rectangle in radians.
///
/// Bounds are inclusive on every side: two sectors that share an edge
/// intersect, and a location on the edge is contained.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sector {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Sector {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    pub fn from_degrees(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self::new(
            min_lat.to_radians(),
            max_lat.to_radians(),
            min_lon.to_radians(),
            max_lon.to_radians(),
        )
    }

    pub fn full_sphere() -> Self {
        Self::new(-FRAC_PI_2, FRAC_PI_2, -PI, PI)
    }

    /// Finite bounds with `min <= max` on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }

    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn centroid(&self) -> LatLon {
        LatLon::new(
            0.5 * (self.min_lat + self.max_lat),
            0.5 * (self.min_lon + self.max_lon),
        )
    }

    /// Corners in (sw, se, ne, nw) order.
    pub fn corners(&self) -> [LatLon; 4] {
        [
            LatLon::new(self.min_lat, self.min_lon),
            LatLon::new(self.min_lat, self.max_lon),
            LatLon::new(self.max_lat, self.max_lon),
            LatLon::new(self.max_lat, self.min_lon),
        ]
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    pub fn contains_location(&self, loc: LatLon) -> bool {
        self.contains(loc.lat, loc.lon)
    }

    pub fn contains_sector(&self, other: &Sector) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }

    pub fn intersects(&self, other: &Sector) -> bool {
        other.max_lat >= self.min_lat
            && other.min_lat <= self.max_lat
            && other.max_lon >= self.min_lon
            && other.min_lon <= self.max_lon
    }

    /// Like [`Sector::intersects`] but sectors that only share an edge do not count.
    pub fn intersects_interior(&self, other: &Sector) -> bool {
        other.max_lat > self.min_lat
            && other.min_lat < self.max_lat
            && other.max_lon > self.min_lon
            && other.min_lon < self.max_lon
    }

    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if !self.intersects(other) {
            return None;
        }
        Some(Sector::new(
            self.min_lat.max(other.min_lat),
            self.max_lat.min(other.max_lat),
            self.min_lon.max(other.min_lon),
            self.max_lon.min(other.max_lon),
        ))
    }

    pub fn union(&self, other: &Sector) -> Sector {
        Sector::new(
            self.min_lat.min(other.min_lat),
            self.max_lat.max(other.max_lat),
            self.min_lon.min(other.min_lon),
            self.max_lon.max(other.max_lon),
        )
    }
}
