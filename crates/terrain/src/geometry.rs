use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use elevation::{ElevationModel, grid_coordinate};
use foundation::math::{Geodetic, LocalOrigin, Vec3, ecef_from_trig, geodetic_to_ecef};
use foundation::sector::Sector;
use streaming::cache::Cacheable;
use tiling::tile_key::TileKey;

use crate::error::TerrainError;
use crate::tile::TerrainTile;
use crate::topology::{SharedTopology, grid_index};

/// Vertex data of one tile, relative to its reference centre.
///
/// Rebuilt rather than edited: a new elevation answer produces a new value
/// that replaces the cached one.
#[derive(Debug)]
pub struct TerrainGeometry {
    key: TileKey,
    sector: Sector,
    /// xyz triples, one per vertex of the skirted grid.
    vertices: Vec<f32>,
    reference_center: Vec3,
    skirt_floor: f64,
    resolution: f64,
    exaggeration: f64,
    topology: Arc<SharedTopology>,
    must_upload: AtomicBool,
}

impl TerrainGeometry {
    /// Samples the tile at its own resolution and emits the skirted grid.
    ///
    /// Grid points with no elevation data sit at the coverage minimum.
    pub fn build(
        model: &ElevationModel,
        tile: &TerrainTile,
        exaggeration: f64,
        topology: Arc<SharedTopology>,
    ) -> Result<Self, TerrainError> {
        let (width, height) = tile.cells();
        let num_lon = width as usize + 1;
        let num_lat = height as usize + 1;
        let sector = tile.sector;

        let mut grid = vec![model.min_elevation(); num_lat * num_lon];
        let resolution =
            model.elevations_for_grid(&sector, num_lat, num_lon, tile.resolution(), &mut grid)?;

        let (lo, hi) = grid
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let skirt_floor = lo.min(model.min_elevation()) * exaggeration;

        let centroid = sector.centroid();
        let reference_center = geodetic_to_ecef(Geodetic::new(
            centroid.lat,
            centroid.lon,
            0.5 * (lo + hi) * exaggeration,
        ))
        .to_vec3();
        let origin = LocalOrigin::new(reference_center);

        let lon_trig: Vec<(f64, f64)> = (0..num_lon)
            .map(|i| grid_coordinate(sector.min_lon, sector.max_lon, i, num_lon).sin_cos())
            .collect();

        let mut vertices = Vec::with_capacity(3 * topology.vertex_count());
        for r in 0..height + 3 {
            let j = grid_index(r, height) as usize;
            let (sin_lat, cos_lat) = grid_coordinate(sector.min_lat, sector.max_lat, j, num_lat).sin_cos();
            let row = &grid[j * num_lon..(j + 1) * num_lon];
            let skirt_row = r == 0 || r == height + 2;

            for c in 0..width + 3 {
                let i = grid_index(c, width) as usize;
                let elevation = if skirt_row || c == 0 || c == width + 2 {
                    skirt_floor
                } else {
                    row[i] * exaggeration
                };
                let (sin_lon, cos_lon) = lon_trig[i];
                let world = ecef_from_trig(sin_lat, cos_lat, sin_lon, cos_lon, elevation).to_vec3();
                origin.push_f32(world, &mut vertices);
            }
        }

        Ok(Self {
            key: tile.key,
            sector,
            vertices,
            reference_center,
            skirt_floor,
            resolution,
            exaggeration,
            topology,
            must_upload: AtomicBool::new(true),
        })
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn reference_center(&self) -> Vec3 {
        self.reference_center
    }

    /// Exaggerated elevation of every skirt vertex.
    pub fn skirt_floor(&self) -> f64 {
        self.skirt_floor
    }

    /// Resolution the elevation model achieved for this tile.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn exaggeration(&self) -> f64 {
        self.exaggeration
    }

    pub fn topology(&self) -> &Arc<SharedTopology> {
        &self.topology
    }

    /// World-space position of vertex `index`.
    pub fn world_vertex(&self, index: usize) -> Option<Vec3> {
        let v = self.vertices.get(3 * index..3 * index + 3)?;
        Some(LocalOrigin::new(self.reference_center).to_world([v[0], v[1], v[2]]))
    }

    pub fn needs_upload(&self) -> bool {
        self.must_upload.load(Ordering::Acquire)
    }

    /// Clears the upload flag, returning whether it was set.
    pub fn take_upload(&self) -> bool {
        self.must_upload.swap(false, Ordering::AcqRel)
    }
}

impl Cacheable for TerrainGeometry {
    fn size_in_bytes(&self) -> usize {
        mem::size_of::<Self>() + self.vertices.len() * mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::TerrainGeometry;
    use crate::tile::TerrainTile;
    use crate::topology::TopologyCache;
    use elevation::{ElevationModel, ElevationSettings, FnLoader};
    use foundation::math::{Ecef, ecef_to_geodetic};
    use foundation::sector::{LatLon, Sector};
    use runtime::budget::FrameBudget;
    use std::sync::Arc;
    use tiling::level_set::LevelSet;
    use tiling::tile_key::TileKey;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} vs {b} (tol {tol})");
    }

    fn model(value: f64) -> ElevationModel {
        let levels = LevelSet::uniform(
            Sector::new(0.0, 0.1, 0.0, 0.1),
            LatLon::new(0.0, 0.0),
            LatLon::new(0.1, 0.1),
            4,
            4,
            1,
        )
        .expect("levels");
        ElevationModel::new(
            levels,
            Arc::new(FnLoader::new(move |_, _| value)),
            ElevationSettings::new(-50.0, 2000.0).with_load_threads(0),
        )
    }

    fn tile(model: &ElevationModel) -> TerrainTile {
        let key = TileKey::new(0, 0, 0);
        let levels = model.level_set();
        TerrainTile::new(key, levels.tile_sector(&key).expect("sector"), *levels.first_level())
    }

    #[test]
    fn interior_follows_data_and_skirt_drops_to_floor() {
        let model = model(1000.0);
        let tile = tile(&model);
        model.elevations_for_grid(&tile.sector, 2, 2, 1.0, &mut [0.0; 4]).expect("grid");
        model.process_pending_loads(&mut FrameBudget::unlimited());

        let topo = TopologyCache::new().get_or_build(4, 4);
        let geom = TerrainGeometry::build(&model, &tile, 2.0, topo).expect("build");
        assert_eq!(geom.vertex_count(), 49);
        assert_eq!(geom.skirt_floor(), -100.0);
        assert_eq!(geom.resolution(), 0.025);
        assert!(geom.needs_upload());

        let height = |i: usize| {
            let p = geom.world_vertex(i).expect("vertex");
            ecef_to_geodetic(Ecef::new(p.x, p.y, p.z)).alt_m
        };
        // Row 1, column 1 is the south-west interior corner.
        assert_close(height(8), 2000.0, 0.1);
        assert_close(height(0), -100.0, 0.1);
        assert_close(height(48), -100.0, 0.1);

        let sw = geom.world_vertex(8).expect("vertex");
        let geo = ecef_to_geodetic(Ecef::new(sw.x, sw.y, sw.z));
        assert_close(geo.lat_rad, 0.0, 1e-7);
        assert_close(geo.lon_rad, 0.0, 1e-7);

        assert!(geom.take_upload());
        assert!(!geom.take_upload());
    }

    #[test]
    fn missing_data_builds_at_coverage_minimum() {
        let model = model(1000.0);
        let tile = tile(&model);
        let topo = TopologyCache::new().get_or_build(4, 4);
        let geom = TerrainGeometry::build(&model, &tile, 1.0, topo).expect("build");
        assert_eq!(geom.skirt_floor(), -50.0);
        assert_eq!(geom.resolution(), f64::MAX);
        assert_eq!(geom.vertices().len(), 3 * 49);
    }
}
