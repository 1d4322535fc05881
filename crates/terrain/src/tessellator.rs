use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use elevation::{ChangeFeed, ElevationModel};
use foundation::sector::Sector;
use gpu::context::{DrawIndexed, GraphicsContext, PrimitiveMode};
use runtime::metrics::Metrics;
use scene::view::ViewState;
use streaming::cache::MemoryCache;
use tiling::level_set::LevelSet;
use tiling::tile_key::TileKey;
use tracing::debug;

use crate::config::TerrainConfig;
use crate::error::TerrainError;
use crate::geometry::TerrainGeometry;
use crate::tile::{TerrainTile, TileExtent};
use crate::topology::{SharedTopology, TopologyCache};

/// Baseline of the detail test, in log10 units.
pub const DETAIL_HINT_ORIGIN: f64 = 1.3;

/// A tile accepted for the current frame.
#[derive(Debug, Clone)]
pub struct VisibleTile {
    pub tile: TerrainTile,
    pub geometry: Arc<TerrainGeometry>,
}

impl VisibleTile {
    pub fn topology(&self) -> &Arc<SharedTopology> {
        self.geometry.topology()
    }
}

/// Output of one [`Tessellator::tessellate`] pass.
#[derive(Debug, Clone, Default)]
pub struct SurfaceTileSet {
    pub tiles: Vec<VisibleTile>,
    /// Union of the visible tiles' sectors.
    pub sector: Option<Sector>,
}

impl SurfaceTileSet {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn keys(&self) -> Vec<TileKey> {
        self.tiles.iter().map(|t| t.tile.key).collect()
    }
}

/// Per-frame working state.
#[derive(Default)]
struct Frame {
    expired: Vec<Sector>,
    visited: HashSet<TileKey>,
    rebuilt: HashSet<TileKey>,
    tiles: Vec<VisibleTile>,
}

impl Frame {
    fn is_expired(&self, sector: &Sector) -> bool {
        self.expired.iter().any(|e| e.intersects(sector))
    }
}

/// Chooses and meshes the tiles that cover the view.
///
/// Runs on the render thread. Elevation loads complete on other threads and
/// reach the tessellator only through its [`ChangeFeed`], drained once at the
/// start of every pass.
pub struct Tessellator {
    model: Arc<ElevationModel>,
    levels: LevelSet,
    config: TerrainConfig,
    top_tiles: Vec<TerrainTile>,
    mesh_tiles: MemoryCache<TileKey, Arc<TerrainTile>>,
    geometry: MemoryCache<TileKey, Arc<TerrainGeometry>>,
    /// Lives only as long as the tile's entry in `mesh_tiles`; level-0 tiles
    /// are never evicted.
    extents: HashMap<TileKey, TileExtent>,
    topology: Arc<TopologyCache>,
    feed: Arc<ChangeFeed>,
    metrics: Metrics,
}

impl fmt::Debug for Tessellator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tessellator")
            .field("levels", &self.levels.num_levels())
            .field("top_tiles", &self.top_tiles.len())
            .field("mesh_tiles", &self.mesh_tiles.len())
            .field("geometry", &self.geometry.len())
            .field("extents", &self.extents.len())
            .finish()
    }
}

impl Tessellator {
    /// `levels` is the mesh quadtree, independent of the elevation model's
    /// data tiling.
    pub fn new(
        model: Arc<ElevationModel>,
        levels: LevelSet,
        config: TerrainConfig,
        topology: Arc<TopologyCache>,
    ) -> Self {
        let first = *levels.first_level();
        let top_tiles = levels
            .top_level_keys()
            .into_iter()
            .filter_map(|key| {
                let sector = levels.tile_sector(&key)?;
                Some(TerrainTile::new(key, sector, first))
            })
            .collect();
        let feed = model.subscribe();
        Self {
            mesh_tiles: MemoryCache::new("terrain-mesh-tiles", config.mesh_budget()),
            geometry: MemoryCache::new("terrain-geometry", config.geometry_budget()),
            model,
            levels,
            config,
            top_tiles,
            extents: HashMap::new(),
            topology,
            feed,
            metrics: Metrics::new(),
        }
    }

    pub fn model(&self) -> &Arc<ElevationModel> {
        &self.model
    }

    pub fn level_set(&self) -> &LevelSet {
        &self.levels
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Counters of the most recent pass.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn vertical_exaggeration(&self) -> f64 {
        self.config.vertical_exaggeration
    }

    /// Takes effect on the next pass; every visible tile rebuilds.
    pub fn set_vertical_exaggeration(&mut self, exaggeration: f64) {
        self.config.vertical_exaggeration = exaggeration;
    }

    pub fn set_detail_hint(&mut self, hint: f64) {
        self.config.detail_hint = hint;
    }

    pub fn cached_geometry(&self, key: &TileKey) -> Option<Arc<TerrainGeometry>> {
        self.geometry.get(key)
    }

    pub fn has_extent(&self, key: &TileKey) -> bool {
        self.extents.contains_key(key)
    }

    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    pub fn mesh_tile_count(&self) -> usize {
        self.mesh_tiles.len()
    }

    /// The resident mesh tile for `key`, if subdivision has created it.
    pub fn cached_mesh_tile(&self, key: &TileKey) -> Option<Arc<TerrainTile>> {
        self.mesh_tiles.get(key)
    }

    /// Selects the tiles covering `view` and brings their geometry up to date.
    pub fn tessellate(&mut self, view: &ViewState) -> Result<SurfaceTileSet, TerrainError> {
        self.metrics.begin_frame();
        let mut frame = Frame {
            expired: self.feed.drain(),
            ..Frame::default()
        };

        let top_tiles = self.top_tiles.clone();
        for tile in &top_tiles {
            self.visit(tile, view, &mut frame)?;
        }

        if !frame.expired.is_empty() {
            self.drop_stale(&frame);
        }
        self.drop_orphaned_extents();

        for visible in &frame.tiles {
            self.metrics.record_level(visible.tile.key.level);
        }
        self.metrics
            .set_gauge("geometry.bytes", gauge(self.geometry.used_bytes()));
        self.metrics
            .set_gauge("mesh.tiles", gauge(self.mesh_tiles.len()));

        let sector = frame
            .tiles
            .iter()
            .map(|t| t.tile.sector)
            .reduce(|a, b| a.union(&b));
        debug!(
            visible = frame.tiles.len(),
            visited = frame.visited.len(),
            rebuilt = frame.rebuilt.len(),
            expired = frame.expired.len(),
            "tessellated terrain"
        );
        Ok(SurfaceTileSet {
            tiles: frame.tiles,
            sector,
        })
    }

    /// Uploads pending vertex buffers and draws every tile of `surface`.
    /// Returns the number of draws issued.
    pub fn render(&self, surface: &SurfaceTileSet, ctx: &mut dyn GraphicsContext) -> usize {
        let mut bound: Option<(u32, u32)> = None;
        for visible in &surface.tiles {
            let geometry = &visible.geometry;
            if geometry.take_upload() {
                ctx.upload_vertex_buffer(visible.tile.key, geometry.vertices());
            }

            let topology = geometry.topology();
            let cells = (topology.width, topology.height);
            if bound != Some(cells) {
                ctx.bind_shared_topology(topology.binding());
                bound = Some(cells);
            }

            ctx.draw_indexed(DrawIndexed {
                tile: visible.tile.key,
                mode: PrimitiveMode::TriangleStrip,
                index_count: u32::try_from(topology.strip_indices.len()).unwrap_or(u32::MAX),
                reference_center: geometry.reference_center(),
            });
        }
        surface.tiles.len()
    }

    fn visit(
        &mut self,
        tile: &TerrainTile,
        view: &ViewState,
        frame: &mut Frame,
    ) -> Result<(), TerrainError> {
        frame.visited.insert(tile.key);
        self.metrics.inc_counter("tiles.visited", 1);

        let extent = self.refresh_extent(tile, frame);
        if !view.frustum.intersects_aabb(&extent.aabb) {
            self.metrics.inc_counter("tiles.culled", 1);
            return Ok(());
        }

        if self.meets_render_criteria(tile, &extent, view) {
            return self.add_tile(tile, frame);
        }

        for key in tile.key.children() {
            let child = self.mesh_tile(key)?;
            if !self.levels.sector().intersects_interior(&child.sector) {
                continue;
            }
            self.visit(&child, view, frame)?;
        }
        Ok(())
    }

    fn refresh_extent(&mut self, tile: &TerrainTile, frame: &Frame) -> TileExtent {
        let exaggeration = self.config.vertical_exaggeration;
        if let Some(extent) = self.extents.get(&tile.key)
            && extent.exaggeration == exaggeration
            && !frame.is_expired(&tile.sector)
        {
            return *extent;
        }
        self.metrics.inc_counter("extent.refreshed", 1);
        let extent = TileExtent::compute(&self.model, &tile.sector, exaggeration);
        self.extents.insert(tile.key, extent);
        extent
    }

    fn meets_render_criteria(&self, tile: &TerrainTile, extent: &TileExtent, view: &ViewState) -> bool {
        if self.levels.is_final_level(tile.key.level) {
            return true;
        }
        if tile.resolution() <= self.model.best_resolution(&tile.sector) {
            return true;
        }
        let distance = extent.nearest_distance(view.eye).max(1.0);
        let diagonal = extent.aabb.diagonal().max(f64::MIN_POSITIVE);
        diagonal.log10() <= distance.log10() - (DETAIL_HINT_ORIGIN + self.config.detail_hint)
    }

    fn mesh_tile(&self, key: TileKey) -> Result<Arc<TerrainTile>, TerrainError> {
        if let Some(tile) = self.mesh_tiles.get(&key) {
            return Ok(tile);
        }
        let (Some(level), Some(sector)) = (self.levels.level(key.level), self.levels.tile_sector(&key))
        else {
            return Err(TerrainError::UnknownTile(key));
        };
        let tile = Arc::new(TerrainTile::new(key, sector, *level));
        self.mesh_tiles.put(key, tile.clone());
        Ok(tile)
    }

    fn add_tile(&mut self, tile: &TerrainTile, frame: &mut Frame) -> Result<(), TerrainError> {
        let exaggeration = self.config.vertical_exaggeration;
        let cached = self.geometry.get(&tile.key).filter(|g| {
            g.exaggeration() == exaggeration
                && (frame.rebuilt.contains(&tile.key) || !frame.is_expired(&tile.sector))
        });

        let geometry = match cached {
            Some(geometry) => geometry,
            None => {
                let (width, height) = tile.cells();
                let topology = self.topology.get_or_build(width, height);
                let geometry = Arc::new(TerrainGeometry::build(&self.model, tile, exaggeration, topology)?);
                self.geometry.remove(&tile.key);
                self.geometry.put(tile.key, geometry.clone());
                frame.rebuilt.insert(tile.key);
                self.metrics.inc_counter("geometry.rebuilt", 1);
                geometry
            }
        };

        frame.tiles.push(VisibleTile {
            tile: *tile,
            geometry,
        });
        Ok(())
    }

    /// Forgets derived data of expired tiles this pass did not refresh, so
    /// they rebuild when next visible.
    fn drop_stale(&mut self, frame: &Frame) {
        let dropped_geometry = self
            .geometry
            .retain(|key, g| frame.rebuilt.contains(key) || !frame.is_expired(g.sector()));
        let before = self.extents.len();
        self.extents
            .retain(|key, e| frame.visited.contains(key) || !frame.is_expired(&e.sector));
        debug!(
            geometry = dropped_geometry,
            extents = before - self.extents.len(),
            "dropped stale terrain data"
        );
    }

    /// Drops extents of tiles evicted from the mesh-tile cache, so the side
    /// table stays within that cache's budget plus the level-0 tiles.
    fn drop_orphaned_extents(&mut self) {
        let mesh_tiles = &self.mesh_tiles;
        let before = self.extents.len();
        self.extents
            .retain(|key, _| key.level == 0 || mesh_tiles.contains(key));
        let dropped = before - self.extents.len();
        if dropped > 0 {
            debug!(dropped, "dropped extents of evicted mesh tiles");
        }
    }
}

fn gauge(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::Tessellator;
    use crate::config::TerrainConfig;
    use crate::topology::TopologyCache;
    use elevation::{ElevationModel, ElevationSettings, FnLoader};
    use foundation::math::{Geodetic, Vec3, geodetic_to_ecef};
    use foundation::sector::{LatLon, Sector};
    use scene::view::ViewState;
    use scene::visibility::Frustum;
    use std::collections::HashSet;
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::sync::Arc;
    use tiling::level_set::LevelSet;
    use tiling::tile_key::TileKey;

    fn sphere_levels(num_levels: u32) -> LevelSet {
        LevelSet::uniform(
            Sector::full_sphere(),
            LatLon::new(-FRAC_PI_2, -PI),
            LatLon::new(FRAC_PI_2, FRAC_PI_2),
            4,
            4,
            num_levels,
        )
        .expect("levels")
    }

    fn tessellator_with(data_levels: u32, mesh_levels: u32, config: TerrainConfig) -> Tessellator {
        let model = ElevationModel::new(
            sphere_levels(data_levels),
            Arc::new(FnLoader::new(|_, _| 0.0)),
            ElevationSettings::new(0.0, 1000.0).with_load_threads(0),
        );
        Tessellator::new(
            Arc::new(model),
            sphere_levels(mesh_levels),
            config,
            Arc::new(TopologyCache::new()),
        )
    }

    fn tessellator(mesh_levels: u32) -> Tessellator {
        tessellator_with(3, mesh_levels, TerrainConfig::default())
    }

    fn ground_view(lat: f64, lon: f64) -> ViewState {
        let eye = geodetic_to_ecef(Geodetic::new(lat, lon, 10.0)).to_vec3();
        ViewState::new(eye, Frustum::unbounded())
    }

    #[test]
    fn distant_unbounded_view_keeps_top_level_tiles() {
        let mut tess = tessellator(4);
        let far = geodetic_to_ecef(Geodetic::new(0.0, 0.0, 1.0e12)).to_vec3();
        let surface = tess
            .tessellate(&ViewState::new(far, Frustum::unbounded()))
            .expect("tessellate");
        // 2 x 4 level-0 tiles of 90 degrees.
        assert_eq!(surface.len(), 8);
        assert!(surface.tiles.iter().all(|t| t.tile.key.level == 0));
        assert_eq!(surface.sector, Some(Sector::full_sphere()));
        assert_eq!(tess.metrics().counter("tiles.visited"), 8);
        assert_eq!(tess.metrics().counter("geometry.rebuilt"), 8);
        assert_eq!(tess.metrics().level_counts(), &[8]);
        assert!(tess.metrics().gauge("geometry.bytes").is_some_and(|b| b > 0));
    }

    #[test]
    fn close_view_subdivides_to_the_final_level() {
        let mut tess = tessellator(3);
        let surface = tess.tessellate(&ground_view(0.1, 0.1)).expect("tessellate");
        assert!(surface.tiles.iter().any(|t| t.tile.key.level == 2));
        assert!(tess.mesh_tile_count() > 0);
    }

    #[test]
    fn resident_child_tiles_are_reused_across_passes() {
        let mut tess = tessellator(3);
        let surface = tess.tessellate(&ground_view(0.1, 0.1)).expect("tessellate");
        let key = surface
            .keys()
            .into_iter()
            .find(|k| k.level == 2)
            .expect("level-2 tile");
        let parent = key.parent().expect("parent");
        let first = (
            tess.cached_mesh_tile(&key).expect("child"),
            tess.cached_mesh_tile(&parent).expect("parent"),
        );

        tess.tessellate(&ground_view(0.1, 0.1)).expect("tessellate");
        let second = (
            tess.cached_mesh_tile(&key).expect("child"),
            tess.cached_mesh_tile(&parent).expect("parent"),
        );
        assert!(Arc::ptr_eq(&first.0, &second.0));
        assert!(Arc::ptr_eq(&first.1, &second.1));
    }

    #[test]
    fn extent_table_follows_mesh_tile_evictions() {
        let config = TerrainConfig {
            mesh_cache_size: 200,
            ..TerrainConfig::default()
        };
        let mut tess = tessellator_with(8, 8, config);
        let mut seen: HashSet<TileKey> = HashSet::new();
        for step in 0..40 {
            let lon = -3.0 + 0.15 * f64::from(step);
            let surface = tess.tessellate(&ground_view(0.05, lon)).expect("tessellate");
            seen.extend(surface.keys().into_iter().filter(|k| k.level > 0));
            assert!(
                tess.extent_count() <= 8 + tess.mesh_tile_count(),
                "{tess:?} after step {step}"
            );
        }
        assert!(seen.len() > 40);
        assert!(tess.extent_count() < seen.len());
    }

    #[test]
    fn frustum_behind_the_globe_culls_everything() {
        let mut tess = tessellator(3);
        let eye = Vec3::new(3.0e7, 0.0, 0.0);
        let view = ViewState::look_at(
            eye,
            Vec3::new(6.0e7, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            0.8,
            1.0,
            1.0,
            1.0e8,
        );
        let surface = tess.tessellate(&view).expect("tessellate");
        assert!(surface.is_empty());
        assert_eq!(surface.sector, None);
        assert_eq!(tess.metrics().counter("tiles.culled"), 8);
    }
}
