use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;

use foundation::sector::{LatLon, Sector};
use parking_lot::RwLock;

use crate::level::{
    Level, column_for_longitude, latitude_for_row, longitude_for_column, row_for_latitude,
};
use crate::tile_key::TileKey;

/// Relative tolerance for delta ratios and tile-boundary comparisons.
const SUBDIVISION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum LevelSetError {
    NoLevels,
    InvalidSector,
    IndexMismatch { expected: u32, found: u32 },
    InvalidDelta { level: u32 },
    InvalidTileSize { level: u32 },
    NotSubdivided { level: u32 },
}

impl fmt::Display for LevelSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSetError::NoLevels => write!(f, "level set needs at least one level"),
            LevelSetError::InvalidSector => write!(f, "coverage sector is invalid"),
            LevelSetError::IndexMismatch { expected, found } => {
                write!(f, "level index mismatch: expected={expected} found={found}")
            }
            LevelSetError::InvalidDelta { level } => {
                write!(f, "level {level} has a non-positive tile delta")
            }
            LevelSetError::InvalidTileSize { level } => {
                write!(f, "level {level} has a zero tile dimension")
            }
            LevelSetError::NotSubdivided { level } => {
                write!(f, "level {level} does not halve its parent's tile delta")
            }
        }
    }
}

impl std::error::Error for LevelSetError {}

/// Tiles known not to exist. Marked keys are never requested again.
#[derive(Debug, Default)]
pub struct AbsentTiles {
    keys: RwLock<HashSet<TileKey>>,
}

impl AbsentTiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_absent(&self, key: &TileKey) -> bool {
        self.keys.read().contains(key)
    }

    pub fn mark(&self, key: TileKey) {
        self.keys.write().insert(key);
    }

    pub fn unmark(&self, key: &TileKey) {
        self.keys.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

/// The complete tier hierarchy over one coverage sector.
///
/// Level 0 is the coarsest; every level's tile delta is exactly half its
/// parent's, so child `(2r + i, 2c + j)` always lies inside parent `(r, c)`.
#[derive(Debug)]
pub struct LevelSet {
    sector: Sector,
    origin: LatLon,
    levels: Vec<Level>,
    absent: AbsentTiles,
}

impl LevelSet {
    pub fn new(sector: Sector, origin: LatLon, levels: Vec<Level>) -> Result<Self, LevelSetError> {
        if levels.is_empty() {
            return Err(LevelSetError::NoLevels);
        }
        if !sector.is_valid() {
            return Err(LevelSetError::InvalidSector);
        }

        for (i, level) in levels.iter().enumerate() {
            let expected = i as u32;
            if level.index() != expected {
                return Err(LevelSetError::IndexMismatch {
                    expected,
                    found: level.index(),
                });
            }
            let positive = |d: f64| d.is_finite() && d > 0.0;
            if !positive(level.tile_delta_lat()) || !positive(level.tile_delta_lon()) {
                return Err(LevelSetError::InvalidDelta { level: expected });
            }
            if level.tile_width() == 0 || level.tile_height() == 0 {
                return Err(LevelSetError::InvalidTileSize { level: expected });
            }
            if i > 0 {
                let parent = &levels[i - 1];
                let halves = |p: f64, c: f64| ((p / c) - 2.0).abs() <= 2.0 * SUBDIVISION_TOLERANCE;
                if !halves(parent.tile_delta_lat(), level.tile_delta_lat())
                    || !halves(parent.tile_delta_lon(), level.tile_delta_lon())
                {
                    return Err(LevelSetError::NotSubdivided { level: expected });
                }
            }
        }

        Ok(Self {
            sector,
            origin,
            levels,
            absent: AbsentTiles::new(),
        })
    }

    /// `num_levels` tiers starting at `level_zero_delta`, each halving the
    /// previous one, all with the same tile dimensions.
    pub fn uniform(
        sector: Sector,
        origin: LatLon,
        level_zero_delta: LatLon,
        tile_width: u32,
        tile_height: u32,
        num_levels: u32,
    ) -> Result<Self, LevelSetError> {
        let levels = (0..num_levels)
            .map(|i| {
                let scale = 1.0 / f64::from(1u32 << i.min(31));
                Level::new(
                    i,
                    level_zero_delta.lat * scale,
                    level_zero_delta.lon * scale,
                    tile_width,
                    tile_height,
                )
            })
            .collect();
        Self::new(sector, origin, levels)
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn origin(&self) -> LatLon {
        self.origin
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: u32) -> Option<&Level> {
        self.levels.get(index as usize)
    }

    pub fn first_level(&self) -> &Level {
        &self.levels[0]
    }

    pub fn last_level(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    pub fn is_final_level(&self, index: u32) -> bool {
        index as usize + 1 == self.levels.len()
    }

    /// `true` for levels flagged empty and for indices beyond the hierarchy.
    pub fn is_level_empty(&self, index: u32) -> bool {
        self.level(index).is_none_or(Level::is_empty)
    }

    pub fn absent_tiles(&self) -> &AbsentTiles {
        &self.absent
    }

    pub fn is_absent(&self, key: &TileKey) -> bool {
        self.absent.is_absent(key)
    }

    pub fn mark_absent(&self, key: TileKey) {
        self.absent.mark(key);
    }

    pub fn unmark_absent(&self, key: &TileKey) {
        self.absent.unmark(key);
    }

    /// Bounds of the tile addressed by `key`.
    pub fn tile_sector(&self, key: &TileKey) -> Option<Sector> {
        let level = self.level(key.level)?;
        let (dlat, dlon) = (level.tile_delta_lat(), level.tile_delta_lon());
        Some(Sector::new(
            latitude_for_row(dlat, key.row, self.origin.lat),
            latitude_for_row(dlat, key.row + 1, self.origin.lat),
            longitude_for_column(dlon, key.column, self.origin.lon),
            longitude_for_column(dlon, key.column + 1, self.origin.lon),
        ))
    }

    /// Rows of `level` that touch the coverage sector.
    fn coverage_rows(&self, level: &Level) -> RangeInclusive<i32> {
        let delta = level.tile_delta_lat();
        let first = row_for_latitude(delta, self.sector.min_lat, self.origin.lat);
        let mut last = row_for_latitude(delta, self.sector.max_lat, self.origin.lat);
        // A coverage edge on a tile boundary belongs to the tile below it.
        let slack = delta * SUBDIVISION_TOLERANCE;
        if last > first
            && latitude_for_row(delta, last, self.origin.lat) >= self.sector.max_lat - slack
        {
            last -= 1;
        }
        first..=last
    }

    fn coverage_columns(&self, level: &Level) -> RangeInclusive<i32> {
        let delta = level.tile_delta_lon();
        let first = column_for_longitude(delta, self.sector.min_lon, self.origin.lon);
        let mut last = column_for_longitude(delta, self.sector.max_lon, self.origin.lon);
        let slack = delta * SUBDIVISION_TOLERANCE;
        if last > first
            && longitude_for_column(delta, last, self.origin.lon) >= self.sector.max_lon - slack
        {
            last -= 1;
        }
        first..=last
    }

    /// The tile at `level` containing the location, clamped to the coverage
    /// span so the coverage's maximum edge maps onto the last tile.
    pub fn key_for_location(&self, level: &Level, lat: f64, lon: f64) -> TileKey {
        let rows = self.coverage_rows(level);
        let cols = self.coverage_columns(level);
        let row = row_for_latitude(level.tile_delta_lat(), lat, self.origin.lat)
            .clamp(*rows.start(), *rows.end());
        let column = column_for_longitude(level.tile_delta_lon(), lon, self.origin.lon)
            .clamp(*cols.start(), *cols.end());
        TileKey::new(level.index(), row, column)
    }

    /// Row and column spans at `level` covering `sector` clipped to coverage.
    ///
    /// `None` when the sector misses the coverage entirely.
    pub fn span(
        &self,
        level: &Level,
        sector: &Sector,
    ) -> Option<(RangeInclusive<i32>, RangeInclusive<i32>)> {
        let clipped = self.sector.intersection(sector)?;
        let mut lo = self.key_for_location(level, clipped.min_lat, clipped.min_lon);
        let mut hi = self.key_for_location(level, clipped.max_lat, clipped.max_lon);
        // A query edge on a tile boundary does not pull in the neighbouring tile.
        let (dlat, dlon) = (level.tile_delta_lat(), level.tile_delta_lon());
        if hi.row > lo.row
            && latitude_for_row(dlat, lo.row + 1, self.origin.lat)
                <= clipped.min_lat + dlat * SUBDIVISION_TOLERANCE
        {
            lo.row += 1;
        }
        if hi.column > lo.column
            && longitude_for_column(dlon, lo.column + 1, self.origin.lon)
                <= clipped.min_lon + dlon * SUBDIVISION_TOLERANCE
        {
            lo.column += 1;
        }
        if hi.row > lo.row
            && latitude_for_row(dlat, hi.row, self.origin.lat)
                >= clipped.max_lat - dlat * SUBDIVISION_TOLERANCE
        {
            hi.row -= 1;
        }
        if hi.column > lo.column
            && longitude_for_column(dlon, hi.column, self.origin.lon)
                >= clipped.max_lon - dlon * SUBDIVISION_TOLERANCE
        {
            hi.column -= 1;
        }
        Some((lo.row..=hi.row, lo.column..=hi.column))
    }

    /// Every level-0 tile that touches the coverage sector.
    pub fn top_level_keys(&self) -> Vec<TileKey> {
        let level = self.first_level();
        let rows = self.coverage_rows(level);
        let cols = self.coverage_columns(level);
        rows.flat_map(|row| cols.clone().map(move |col| TileKey::new(0, row, col)))
            .collect()
    }

    /// The coarsest non-empty level whose texel size is at or below
    /// `resolution`, else the finest non-empty level.
    pub fn target_level_for_resolution(&self, resolution: f64) -> Option<&Level> {
        let mut finest = None;
        for level in self.levels.iter().filter(|l| !l.is_empty()) {
            if level.texel_size() <= resolution {
                return Some(level);
            }
            finest = Some(level);
        }
        finest
    }

    /// The finest level plausibly holding data for `sector`: not flagged empty
    /// and with the tile at the sector's centroid not known absent. Falls back
    /// towards coarser levels.
    pub fn last_level_for(&self, sector: &Sector) -> Option<&Level> {
        let centre = sector.centroid();
        self.levels.iter().rev().find(|level| {
            !level.is_empty()
                && !self
                    .absent
                    .is_absent(&self.key_for_location(level, centre.lat, centre.lon))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LevelSet, LevelSetError};
    use crate::level::Level;
    use crate::tile_key::TileKey;
    use foundation::sector::{LatLon, Sector};
    use pretty_assertions::assert_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn sphere_levels(num_levels: u32) -> LevelSet {
        LevelSet::uniform(
            Sector::full_sphere(),
            LatLon::new(-FRAC_PI_2, -PI),
            LatLon::new(FRAC_PI_2, FRAC_PI_2),
            4,
            4,
            num_levels,
        )
        .expect("level set")
    }

    #[test]
    fn rejects_levels_that_do_not_halve() {
        let levels = vec![Level::new(0, 1.0, 1.0, 4, 4), Level::new(1, 0.3, 0.5, 4, 4)];
        let err = LevelSet::new(Sector::full_sphere(), LatLon::new(0.0, 0.0), levels).unwrap_err();
        assert_eq!(err, LevelSetError::NotSubdivided { level: 1 });

        let err = LevelSet::new(Sector::full_sphere(), LatLon::new(0.0, 0.0), vec![]).unwrap_err();
        assert_eq!(err, LevelSetError::NoLevels);
    }

    #[test]
    fn neighbouring_tiles_share_bit_identical_edges() {
        let ls = sphere_levels(4);
        let a = ls.tile_sector(&TileKey::new(3, 5, 7)).unwrap();
        let north = ls.tile_sector(&TileKey::new(3, 6, 7)).unwrap();
        let east = ls.tile_sector(&TileKey::new(3, 5, 8)).unwrap();
        assert_eq!(a.max_lat.to_bits(), north.min_lat.to_bits());
        assert_eq!(a.max_lon.to_bits(), east.min_lon.to_bits());
    }

    #[test]
    fn children_tile_their_parent() {
        let ls = sphere_levels(3);
        let parent = TileKey::new(1, 2, 3);
        let ps = ls.tile_sector(&parent).unwrap();
        let union = parent
            .children()
            .iter()
            .map(|c| ls.tile_sector(c).unwrap())
            .reduce(|a, b| a.union(&b))
            .unwrap();
        assert!((union.min_lat - ps.min_lat).abs() < 1e-12);
        assert!((union.max_lat - ps.max_lat).abs() < 1e-12);
        assert!((union.min_lon - ps.min_lon).abs() < 1e-12);
        assert!((union.max_lon - ps.max_lon).abs() < 1e-12);
    }

    #[test]
    fn coverage_max_edge_maps_to_last_tile() {
        let ls = sphere_levels(1);
        assert_eq!(ls.key_for_location(ls.first_level(), FRAC_PI_2, PI), TileKey::new(0, 1, 3));
        assert_eq!(ls.top_level_keys().len(), 8);
        let (rows, cols) = ls.span(ls.first_level(), &Sector::full_sphere()).unwrap();
        assert_eq!((rows, cols), (0..=1, 0..=3));
    }

    #[test]
    fn span_of_a_tile_sector_is_that_tile() {
        let ls = sphere_levels(3);
        let key = TileKey::new(2, 3, 5);
        let sector = ls.tile_sector(&key).unwrap();
        let (rows, cols) = ls.span(ls.level(2).unwrap(), &sector).unwrap();
        assert_eq!((rows, cols), (3..=3, 5..=5));
    }

    #[test]
    fn span_is_none_outside_coverage() {
        let ls = LevelSet::uniform(
            Sector::new(0.0, 0.5, 0.0, 0.5),
            LatLon::new(0.0, 0.0),
            LatLon::new(0.5, 0.5),
            4,
            4,
            2,
        )
        .unwrap();
        assert!(ls.span(ls.first_level(), &Sector::new(1.0, 1.2, 1.0, 1.2)).is_none());
    }

    #[test]
    fn target_level_picks_first_fine_enough_level() {
        let ls = sphere_levels(3);
        let texels: Vec<f64> = ls.levels().iter().map(|l| l.texel_size()).collect();
        assert_eq!(ls.target_level_for_resolution(texels[1]).unwrap().index(), 1);
        assert_eq!(ls.target_level_for_resolution(1e-9).unwrap().index(), 2);
        assert_eq!(ls.target_level_for_resolution(10.0).unwrap().index(), 0);
        assert!(ls.is_final_level(2));
        assert!(!ls.is_final_level(1));
        assert!(ls.is_level_empty(7));
    }

    #[test]
    fn last_level_skips_empty_and_absent_tiles() {
        let levels = vec![
            Level::new(0, 1.0, 1.0, 4, 4),
            Level::new(1, 0.5, 0.5, 4, 4),
            Level::new(2, 0.25, 0.25, 4, 4).with_empty(true),
        ];
        let ls = LevelSet::new(Sector::new(0.0, 1.0, 0.0, 1.0), LatLon::new(0.0, 0.0), levels)
            .unwrap();
        let s = Sector::new(0.1, 0.2, 0.1, 0.2);
        assert_eq!(ls.last_level_for(&s).unwrap().index(), 1);

        ls.mark_absent(TileKey::new(1, 0, 0));
        assert_eq!(ls.last_level_for(&s).unwrap().index(), 0);
        ls.unmark_absent(&TileKey::new(1, 0, 0));
        assert_eq!(ls.last_level_for(&s).unwrap().index(), 1);
    }
}
