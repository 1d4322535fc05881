use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use foundation::sector::{LatLon, Sector};
use runtime::budget::FrameBudget;
use streaming::cache::{CacheStats, MemoryCache};
use streaming::pipeline::{LoadPipeline, Submission};
use tiling::level_set::LevelSet;
use tiling::tile_key::TileKey;
use tracing::debug;

use crate::config::ElevationSettings;
use crate::error::ElevationError;
use crate::feed::{ChangeFeed, FeedRegistry};
use crate::loader::{ElevationLoader, LoadError, grid_coordinate};
use crate::task::TileLoadTask;
use crate::tile::{ElevationTile, MissingData};

/// Elevation returned for locations outside the coverage.
pub const MISSING_ELEVATION: f64 = 0.0;

/// Achieved resolution meaning "no usable data": the query missed the
/// coverage, or some cell had not even a level-0 tile resident.
pub const MAX_RESOLUTION: f64 = f64::MAX;

/// Upper bound on tiles inspected per level by
/// [`ElevationModel::extreme_elevations`].
const MAX_EXTREME_TILES: usize = 64;

/// How a sector relates to the model's coverage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Intersection {
    Disjoint,
    /// The coverage contains the whole sector.
    Contained,
    Partial,
}

impl Intersection {
    /// `-1` disjoint, `0` contained, `1` partial.
    pub fn as_i32(self) -> i32 {
        match self {
            Intersection::Disjoint => -1,
            Intersection::Contained => 0,
            Intersection::Partial => 1,
        }
    }
}

/// State shared between the query side and the load workers.
pub(crate) struct ModelShared {
    pub(crate) levels: LevelSet,
    pub(crate) cache: MemoryCache<TileKey, Arc<ElevationTile>>,
    pub(crate) loader: Arc<dyn ElevationLoader>,
    pub(crate) missing: MissingData,
    feeds: FeedRegistry,
}

impl ModelShared {
    pub(crate) fn install(&self, tile: ElevationTile) {
        let key = tile.key();
        let sector = *tile.sector();
        self.cache.put(key, Arc::new(tile));
        self.levels.unmark_absent(&key);
        self.feeds.publish(sector);
    }
}

/// Tiles selected for one query.
struct TileSet {
    target_level: u32,
    tiles: BTreeMap<TileKey, Arc<ElevationTile>>,
    missing_level_zero: bool,
}

impl TileSet {
    fn new(target_level: u32) -> Self {
        Self {
            target_level,
            tiles: BTreeMap::new(),
            missing_level_zero: false,
        }
    }

    /// Texel size of the coarsest tile used.
    fn achieved_resolution(&self) -> f64 {
        if self.missing_level_zero {
            return MAX_RESOLUTION;
        }
        self.tiles
            .values()
            .map(|t| t.texel_size())
            .reduce(f64::max)
            .unwrap_or(MAX_RESOLUTION)
    }

    /// The finest selected tile containing the location.
    fn tile_for(&self, levels: &LevelSet, lat: f64, lon: f64) -> Option<&ElevationTile> {
        if self.tiles.is_empty() {
            return None;
        }
        for index in (0..=self.target_level).rev() {
            let Some(level) = levels.level(index) else {
                continue;
            };
            if level.is_empty() {
                continue;
            }
            let key = levels.key_for_location(level, lat, lon);
            // A location on a tile's max edge may have been keyed to the next tile.
            let candidates = [
                key,
                TileKey::new(index, key.row - 1, key.column),
                TileKey::new(index, key.row, key.column - 1),
                TileKey::new(index, key.row - 1, key.column - 1),
            ];
            for candidate in candidates {
                if let Some(tile) = self.tiles.get(&candidate)
                    && tile.sector().contains(lat, lon)
                {
                    return Some(tile);
                }
            }
        }
        None
    }
}

/// Multi-resolution elevation resolver over one `LevelSet`.
///
/// Queries answer immediately from resident tiles. Missing tiles are queued
/// on a [`LoadPipeline`] and installed by load workers; every install is
/// published to the feeds returned by [`ElevationModel::subscribe`].
pub struct ElevationModel {
    shared: Arc<ModelShared>,
    pipeline: LoadPipeline<TileKey>,
    min_elevation: f64,
    max_elevation: f64,
}

impl fmt::Debug for ElevationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationModel")
            .field("sector", self.shared.levels.sector())
            .field("levels", &self.shared.levels.num_levels())
            .field("min_elevation", &self.min_elevation)
            .field("max_elevation", &self.max_elevation)
            .finish_non_exhaustive()
    }
}

impl ElevationModel {
    pub fn new(
        levels: LevelSet,
        loader: Arc<dyn ElevationLoader>,
        settings: ElevationSettings,
    ) -> Self {
        let shared = Arc::new(ModelShared {
            levels,
            cache: MemoryCache::new("elevation-tiles", settings.cache_budget()),
            loader,
            missing: settings.missing_data(),
            feeds: FeedRegistry::default(),
        });

        let worker_shared = Arc::clone(&shared);
        let pipeline = LoadPipeline::new(
            settings.max_pending_loads,
            settings.load_threads,
            Arc::new(move |key| {
                TileLoadTask::new(key).run(&worker_shared);
            }),
        );

        Self {
            shared,
            pipeline,
            min_elevation: settings.min_elevation,
            max_elevation: settings.max_elevation,
        }
    }

    pub fn level_set(&self) -> &LevelSet {
        &self.shared.levels
    }

    pub fn sector(&self) -> &Sector {
        self.shared.levels.sector()
    }

    pub fn min_elevation(&self) -> f64 {
        self.min_elevation
    }

    pub fn max_elevation(&self) -> f64 {
        self.max_elevation
    }

    pub fn intersects(&self, sector: &Sector) -> Intersection {
        let coverage = self.sector();
        if !coverage.intersects(sector) {
            Intersection::Disjoint
        } else if coverage.contains_sector(sector) {
            Intersection::Contained
        } else {
            Intersection::Partial
        }
    }

    /// Texel size of the finest level plausibly holding data for `sector`.
    pub fn best_resolution(&self, sector: &Sector) -> f64 {
        if !self.sector().intersects(sector) {
            return MAX_RESOLUTION;
        }
        self.shared
            .levels
            .last_level_for(sector)
            .map_or(MAX_RESOLUTION, |l| l.texel_size())
    }

    /// A feed that receives the sector of every tile installed from now on.
    pub fn subscribe(&self) -> Arc<ChangeFeed> {
        self.shared.feeds.subscribe()
    }

    /// Elevation at one location.
    ///
    /// Starts at the finest level plausibly holding data for the location and
    /// walks coarser until a resident tile or a level flagged empty. With
    /// nothing resident, answers the coverage minimum and queues the level-0
    /// tile.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        let levels = &self.shared.levels;
        if !levels.sector().contains(lat, lon) {
            return MISSING_ELEVATION;
        }

        let mut key = levels
            .last_level_for(&Sector::new(lat, lat, lon, lon))
            .map(|level| levels.key_for_location(level, lat, lon));
        while let Some(k) = key {
            if levels.is_level_empty(k.level) {
                break;
            }
            if let Some(tile) = self.shared.cache.get(&k) {
                return tile.elevation_at(lat, lon);
            }
            key = k.parent();
        }

        if !levels.is_level_empty(0) {
            self.request(levels.key_for_location(levels.first_level(), lat, lon));
        }
        self.min_elevation
    }

    /// Fills `buffer` row-major with elevations on a `num_lat x num_lon`
    /// grid over `sector` and returns the achieved resolution.
    ///
    /// Grid edges are exactly the sector bounds. Grid points outside the
    /// coverage are left untouched; points with no resident data get the
    /// coverage minimum.
    pub fn elevations_for_grid(
        &self,
        sector: &Sector,
        num_lat: usize,
        num_lon: usize,
        target_resolution: f64,
        buffer: &mut [f64],
    ) -> Result<f64, ElevationError> {
        check_resolution(target_resolution)?;
        check_sector(sector)?;
        let required = num_lat
            .checked_mul(num_lon)
            .filter(|n| *n > 0)
            .ok_or(ElevationError::InvalidGrid { num_lat, num_lon })?;
        if buffer.len() < required {
            return Err(ElevationError::BufferTooSmall {
                required,
                actual: buffer.len(),
            });
        }

        let Some(set) = self.assemble(sector, target_resolution) else {
            return Ok(MAX_RESOLUTION);
        };

        let levels = &self.shared.levels;
        let coverage = levels.sector();
        for j in 0..num_lat {
            let lat = grid_coordinate(sector.min_lat, sector.max_lat, j, num_lat);
            let row = &mut buffer[j * num_lon..(j + 1) * num_lon];
            for (i, out) in row.iter_mut().enumerate() {
                let lon = grid_coordinate(sector.min_lon, sector.max_lon, i, num_lon);
                if !coverage.contains(lat, lon) {
                    continue;
                }
                *out = set
                    .tile_for(levels, lat, lon)
                    .map_or(self.min_elevation, |t| t.elevation_at(lat, lon));
            }
        }

        Ok(set.achieved_resolution())
    }

    /// Like [`ElevationModel::elevations_for_grid`] at arbitrary locations.
    /// `None` slots and locations outside the coverage are left untouched.
    pub fn elevations_for_locations(
        &self,
        sector: &Sector,
        locations: &[Option<LatLon>],
        target_resolution: f64,
        buffer: &mut [f64],
    ) -> Result<f64, ElevationError> {
        check_resolution(target_resolution)?;
        check_sector(sector)?;
        if buffer.len() < locations.len() {
            return Err(ElevationError::BufferTooSmall {
                required: locations.len(),
                actual: buffer.len(),
            });
        }

        let Some(set) = self.assemble(sector, target_resolution) else {
            return Ok(MAX_RESOLUTION);
        };

        let levels = &self.shared.levels;
        for (loc, out) in locations.iter().zip(buffer.iter_mut()) {
            let Some(loc) = loc else {
                continue;
            };
            if !levels.sector().contains_location(*loc) {
                continue;
            }
            *out = set
                .tile_for(levels, loc.lat, loc.lon)
                .map_or(self.min_elevation, |t| t.elevation_at(loc.lat, loc.lon));
        }

        Ok(set.achieved_resolution())
    }

    /// Lowest and highest elevation over `sector`.
    ///
    /// Taken from the finest level whose tiles over the sector are all
    /// resident, else the coverage extremes.
    pub fn extreme_elevations(&self, sector: &Sector) -> (f64, f64) {
        let fallback = (self.min_elevation, self.max_elevation);
        let levels = &self.shared.levels;

        for level in levels.levels().iter().rev().filter(|l| !l.is_empty()) {
            let Some((rows, cols)) = levels.span(level, sector) else {
                return fallback;
            };
            let count = span_len(&rows) * span_len(&cols);
            if count > MAX_EXTREME_TILES {
                continue;
            }

            let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
            let mut complete = true;
            'tiles: for row in rows {
                for column in cols.clone() {
                    let key = TileKey::new(level.index(), row, column);
                    let Some(tile) = self.shared.cache.get(&key) else {
                        complete = false;
                        break 'tiles;
                    };
                    lo = lo.min(tile.min_elevation());
                    hi = hi.max(tile.max_elevation());
                }
            }
            if complete {
                return (lo, hi);
            }
        }
        fallback
    }

    /// Builds and installs a tile from raw samples, exactly as a completed
    /// load would.
    pub fn install_tile(&self, key: TileKey, samples: Vec<f32>) -> Result<(), LoadError> {
        let levels = &self.shared.levels;
        let (Some(level), Some(sector)) = (levels.level(key.level).copied(), levels.tile_sector(&key))
        else {
            return Err(LoadError::Other(format!("tile {key} is outside the level set")));
        };
        let tile = ElevationTile::new(key, sector, &level, samples, self.shared.missing)?;
        self.shared.install(tile);
        Ok(())
    }

    pub fn cached_tile(&self, key: &TileKey) -> Option<Arc<ElevationTile>> {
        self.shared.cache.get(key)
    }

    pub fn is_tile_resident(&self, key: &TileKey) -> bool {
        self.shared.cache.contains(key)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Keys waiting in the load queue, in key order.
    pub fn pending_requests(&self) -> Vec<TileKey> {
        self.pipeline.queued_keys()
    }

    /// `true` while a load for `key` is queued or running.
    pub fn is_request_pending(&self, key: &TileKey) -> bool {
        self.pipeline.is_pending(key)
    }

    /// Drops a queued load. No effect on the cache.
    pub fn cancel_request(&self, key: &TileKey) -> bool {
        self.pipeline.cancel(key)
    }

    /// Runs queued loads on the calling thread within `budget`, one unit per
    /// tile. Needed when the model has no load threads.
    pub fn process_pending_loads(&self, budget: &mut FrameBudget) -> usize {
        self.pipeline.run_pending(budget)
    }

    fn request(&self, key: TileKey) {
        let levels = &self.shared.levels;
        if levels.is_level_empty(key.level) || levels.is_absent(&key) || self.shared.cache.contains(&key)
        {
            return;
        }
        let task = TileLoadTask::new(key);
        match self.pipeline.submit(key, task.priority()) {
            Submission::Queued => debug!(%key, "queued elevation tile load"),
            Submission::Coalesced => {}
            Submission::Full => debug!(%key, "load queue full, request dropped"),
        }
    }

    /// Selects resident tiles for a query and queues loads for what is
    /// missing. `None` when the sector misses the coverage.
    fn assemble(&self, sector: &Sector, target_resolution: f64) -> Option<TileSet> {
        let levels = &self.shared.levels;
        if !levels.sector().intersects(sector) {
            return None;
        }
        let Some(target) = levels.target_level_for_resolution(target_resolution) else {
            let mut set = TileSet::new(0);
            set.missing_level_zero = true;
            return Some(set);
        };
        let (rows, cols) = levels.span(target, sector)?;
        let mut set = TileSet::new(target.index());

        for row in rows {
            for column in cols.clone() {
                let key = TileKey::new(target.index(), row, column);
                if let Some(tile) = self.shared.cache.get(&key) {
                    set.tiles.insert(key, tile);
                    continue;
                }
                self.request(key);

                let mut fallback = None;
                let mut coarsest_missing = None;
                let mut ancestor = key.parent();
                while let Some(k) = ancestor {
                    if !levels.is_level_empty(k.level) {
                        let hit = set
                            .tiles
                            .get(&k)
                            .cloned()
                            .or_else(|| self.shared.cache.get(&k));
                        if let Some(tile) = hit {
                            fallback = Some((k, tile));
                            break;
                        }
                        coarsest_missing = Some(k);
                    }
                    ancestor = k.parent();
                }

                if let Some(k) = coarsest_missing {
                    self.request(k);
                }
                match fallback {
                    Some((k, tile)) => {
                        set.tiles.insert(k, tile);
                    }
                    None => set.missing_level_zero = true,
                }
            }
        }
        Some(set)
    }
}

fn check_resolution(resolution: f64) -> Result<(), ElevationError> {
    if resolution.is_finite() && resolution > 0.0 {
        Ok(())
    } else {
        Err(ElevationError::InvalidResolution(resolution))
    }
}

fn check_sector(sector: &Sector) -> Result<(), ElevationError> {
    if sector.is_valid() {
        Ok(())
    } else {
        Err(ElevationError::InvalidSector)
    }
}

fn span_len(range: &std::ops::RangeInclusive<i32>) -> usize {
    usize::try_from(i64::from(*range.end()) - i64::from(*range.start()) + 1).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{ElevationModel, Intersection, MAX_RESOLUTION, MISSING_ELEVATION};
    use crate::config::ElevationSettings;
    use crate::loader::FnLoader;
    use foundation::sector::{LatLon, Sector};
    use runtime::budget::FrameBudget;
    use std::sync::Arc;
    use tiling::level::Level;
    use tiling::level_set::LevelSet;
    use tiling::tile_key::TileKey;

    fn quadrant_model() -> ElevationModel {
        // Coverage [0,1]x[0,1] rad, two levels of 2x2-cell tiles.
        let levels = LevelSet::uniform(
            Sector::new(0.0, 1.0, 0.0, 1.0),
            LatLon::new(0.0, 0.0),
            LatLon::new(1.0, 1.0),
            2,
            2,
            2,
        )
        .expect("levels");
        ElevationModel::new(
            levels,
            Arc::new(FnLoader::new(|lat, lon| 100.0 * lat + 10.0 * lon)),
            ElevationSettings::new(-5.0, 500.0).with_load_threads(0),
        )
    }

    #[test]
    fn outside_coverage_is_missing_without_requests() {
        let m = quadrant_model();
        assert_eq!(m.elevation_at(2.0, 2.0), MISSING_ELEVATION);
        let far = Sector::new(2.0, 3.0, 2.0, 3.0);
        let mut buf = [7.0; 4];
        assert_eq!(m.elevations_for_grid(&far, 2, 2, 0.1, &mut buf), Ok(MAX_RESOLUTION));
        assert_eq!(buf, [7.0; 4]);
        assert_eq!(m.intersects(&far), Intersection::Disjoint);
        assert_eq!(m.intersects(&far).as_i32(), -1);
        assert!(m.pending_requests().is_empty());
    }

    #[test]
    fn miss_answers_coverage_minimum_and_queues_level_zero() {
        let m = quadrant_model();
        assert_eq!(m.elevation_at(0.5, 0.5), -5.0);
        assert_eq!(m.pending_requests(), vec![TileKey::new(0, 0, 0)]);

        assert_eq!(m.process_pending_loads(&mut FrameBudget::unlimited()), 1);
        assert!((m.elevation_at(0.5, 0.5) - 55.0).abs() < 1e-3);
    }

    #[test]
    fn contract_violations_are_errors() {
        let m = quadrant_model();
        let s = Sector::new(0.0, 0.5, 0.0, 0.5);
        let mut buf = [0.0; 4];
        assert!(m.elevations_for_grid(&s, 2, 2, 0.0, &mut buf).is_err());
        assert!(m.elevations_for_grid(&s, 2, 2, f64::NAN, &mut buf).is_err());
        assert!(m.elevations_for_grid(&s, 3, 3, 0.1, &mut buf).is_err());
        assert!(m.elevations_for_grid(&s, 0, 3, 0.1, &mut buf).is_err());
        let inverted = Sector::new(0.5, 0.0, 0.0, 0.5);
        assert!(m.elevations_for_grid(&inverted, 2, 2, 0.1, &mut buf).is_err());
        assert!(
            m.elevations_for_locations(&s, &[None; 5], 0.1, &mut buf)
                .is_err()
        );
    }

    #[test]
    fn intersection_classification() {
        let m = quadrant_model();
        assert_eq!(m.intersects(&Sector::new(0.2, 0.4, 0.2, 0.4)), Intersection::Contained);
        assert_eq!(m.intersects(&Sector::new(0.5, 1.5, 0.5, 1.5)).as_i32(), 1);
    }

    #[test]
    fn extreme_elevations_use_resident_tiles() {
        let m = quadrant_model();
        let s = Sector::new(0.1, 0.2, 0.1, 0.2);
        assert_eq!(m.extreme_elevations(&s), (-5.0, 500.0));

        m.elevation_at(0.5, 0.5);
        m.process_pending_loads(&mut FrameBudget::unlimited());
        let (lo, hi) = m.extreme_elevations(&s);
        assert_eq!(lo, 0.0);
        assert!((hi - 110.0).abs() < 1e-3);
    }

    #[test]
    fn best_resolution_follows_absent_tiles() {
        let m = quadrant_model();
        let s = Sector::new(0.1, 0.2, 0.1, 0.2);
        assert_eq!(m.best_resolution(&s), 0.25);
        m.level_set().mark_absent(TileKey::new(1, 0, 0));
        assert_eq!(m.best_resolution(&s), 0.5);
        assert_eq!(m.best_resolution(&Sector::new(3.0, 3.1, 0.0, 0.1)), MAX_RESOLUTION);
    }

    #[test]
    fn point_query_skips_an_empty_finest_level() {
        let levels = vec![
            Level::new(0, 1.0, 1.0, 2, 2),
            Level::new(1, 0.5, 0.5, 2, 2),
            Level::new(2, 0.25, 0.25, 2, 2).with_empty(true),
        ];
        let levels = LevelSet::new(Sector::new(0.0, 1.0, 0.0, 1.0), LatLon::new(0.0, 0.0), levels)
            .expect("levels");
        let m = ElevationModel::new(
            levels,
            Arc::new(FnLoader::new(|_, _| 0.0)),
            ElevationSettings::new(-100.0, 500.0).with_load_threads(0),
        );

        m.install_tile(TileKey::new(0, 0, 0), vec![3.0; 9]).expect("install");
        assert!((m.elevation_at(0.2, 0.2) - 3.0).abs() < 1e-9);

        m.install_tile(TileKey::new(1, 0, 0), vec![7.0; 9]).expect("install");
        let mut grid = [0.0; 1];
        let s = Sector::new(0.2, 0.2, 0.2, 0.2);
        m.elevations_for_grid(&s, 1, 1, 0.1, &mut grid).expect("grid");
        assert!((m.elevation_at(0.2, 0.2) - grid[0]).abs() < 1e-9);
        assert!((grid[0] - 7.0).abs() < 1e-9);
        assert!(m.pending_requests().is_empty());
    }
}
