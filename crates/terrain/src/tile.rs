use std::mem;

use elevation::ElevationModel;
use foundation::bounds::Aabb3;
use foundation::math::{Geodetic, Vec3, WGS84_A, geodetic_to_ecef};
use foundation::sector::Sector;
use streaming::cache::Cacheable;
use tiling::level::Level;
use tiling::tile_key::TileKey;

/// One node of the mesh quadtree. Immutable once created; everything derived
/// from elevation data lives in side tables keyed by [`TileKey`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TerrainTile {
    pub key: TileKey,
    pub sector: Sector,
    pub level: Level,
}

impl TerrainTile {
    pub fn new(key: TileKey, sector: Sector, level: Level) -> Self {
        Self { key, sector, level }
    }

    /// Angular size of one cell, the resolution geometry is requested at.
    pub fn resolution(&self) -> f64 {
        self.level.texel_size()
    }

    /// `(width, height)` in cells.
    pub fn cells(&self) -> (u32, u32) {
        (self.level.tile_width(), self.level.tile_height())
    }
}

impl Cacheable for TerrainTile {
    fn size_in_bytes(&self) -> usize {
        mem::size_of::<Self>()
    }
}

/// Lattice subdivisions per side when sampling a sector for its bounds.
const EXTENT_SAMPLES: usize = 4;

/// World-space bounds of a tile at the current elevation data.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileExtent {
    pub sector: Sector,
    pub aabb: Aabb3,
    /// Sector centroid at the middle of the elevation range.
    pub reference_center: Vec3,
    /// SW, SE, NE, NW at the middle of the elevation range.
    pub corners: [Vec3; 4],
    pub exaggeration: f64,
}

impl TileExtent {
    /// Bounds from the extreme elevations of `sector`, scaled by
    /// `exaggeration`.
    pub fn compute(model: &ElevationModel, sector: &Sector, exaggeration: f64) -> Self {
        let (lo, hi) = model.extreme_elevations(sector);
        let (lo, hi) = (lo * exaggeration, hi * exaggeration);
        let mid = 0.5 * (lo + hi);

        // Straight edges between lattice points cut under the curved surface;
        // raise the upper shell by the chord sagitta.
        let step = (sector.delta_lat().max(sector.delta_lon()) / EXTENT_SAMPLES as f64).min(std::f64::consts::PI);
        let sagitta = WGS84_A * (1.0 - (0.5 * step).cos());

        let mut points = Vec::with_capacity(2 * (EXTENT_SAMPLES + 1) * (EXTENT_SAMPLES + 1));
        for i in 0..=EXTENT_SAMPLES {
            let lat = lerp(sector.min_lat, sector.max_lat, i, EXTENT_SAMPLES);
            for j in 0..=EXTENT_SAMPLES {
                let lon = lerp(sector.min_lon, sector.max_lon, j, EXTENT_SAMPLES);
                points.push(world(lat, lon, lo));
                points.push(world(lat, lon, hi + sagitta));
            }
        }
        let aabb = Aabb3::from_points(&points).unwrap_or(Aabb3::new([0.0; 3], [0.0; 3]));

        let centroid = sector.centroid();
        let corners = sector.corners().map(|c| world(c.lat, c.lon, mid));
        Self {
            sector: *sector,
            aabb,
            reference_center: world(centroid.lat, centroid.lon, mid),
            corners,
            exaggeration,
        }
    }

    /// Distance from `eye` to the nearest reference point.
    pub fn nearest_distance(&self, eye: Vec3) -> f64 {
        self.corners
            .iter()
            .map(|c| eye.distance(*c))
            .fold(eye.distance(self.reference_center), f64::min)
    }
}

fn lerp(min: f64, max: f64, i: usize, n: usize) -> f64 {
    if i == n {
        max
    } else {
        min + (max - min) * (i as f64 / n as f64)
    }
}

fn world(lat: f64, lon: f64, elevation: f64) -> Vec3 {
    geodetic_to_ecef(Geodetic::new(lat, lon, elevation)).to_vec3()
}

#[cfg(test)]
mod tests {
    use super::{TerrainTile, TileExtent};
    use elevation::{ElevationModel, ElevationSettings, FnLoader};
    use foundation::math::{Geodetic, geodetic_to_ecef};
    use foundation::sector::{LatLon, Sector};
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::sync::Arc;
    use tiling::level::Level;
    use tiling::level_set::LevelSet;
    use tiling::tile_key::TileKey;

    fn model() -> ElevationModel {
        let levels = LevelSet::uniform(
            Sector::full_sphere(),
            LatLon::new(-FRAC_PI_2, -PI),
            LatLon::new(FRAC_PI_2, FRAC_PI_2),
            8,
            8,
            2,
        )
        .expect("levels");
        ElevationModel::new(
            levels,
            Arc::new(FnLoader::new(|_, _| 0.0)),
            ElevationSettings::new(-500.0, 4000.0).with_load_threads(0),
        )
    }

    #[test]
    fn extent_encloses_surface_points_at_both_extremes() {
        let model = model();
        let sector = Sector::new(0.0, FRAC_PI_2, 0.0, FRAC_PI_2);
        let extent = TileExtent::compute(&model, &sector, 2.0);
        for (lat, lon) in [(0.3, 0.7), (0.785, 0.785), (1.2, 0.1), (0.0, 0.0)] {
            for h in [-1000.0, 8000.0] {
                let p = geodetic_to_ecef(Geodetic::new(lat, lon, h)).to_vec3();
                assert!(extent.aabb.contains(p), "{lat},{lon},{h}");
            }
        }
        assert_eq!(extent.exaggeration, 2.0);
    }

    #[test]
    fn nearest_distance_uses_the_closest_reference_point() {
        let model = model();
        let sector = Sector::new(0.0, 0.1, 0.0, 0.1);
        let extent = TileExtent::compute(&model, &sector, 1.0);
        let eye = extent.corners[2];
        assert_eq!(extent.nearest_distance(eye), 0.0);
    }

    #[test]
    fn tile_reports_cells_and_resolution() {
        let tile = TerrainTile::new(
            TileKey::new(0, 0, 0),
            Sector::new(0.0, 1.0, 0.0, 2.0),
            Level::new(0, 1.0, 2.0, 10, 5),
        );
        assert_eq!(tile.cells(), (10, 5));
        assert_eq!(tile.resolution(), 0.2);
    }
}
