use foundation::sector::{LatLon, Sector};
use serde::{Deserialize, Serialize};

use crate::level::Level;
use crate::level_set::{LevelSet, LevelSetError};

fn default_coverage() -> [f64; 4] {
    [-90.0, 90.0, -180.0, 180.0]
}

fn default_origin() -> [f64; 2] {
    [-90.0, -180.0]
}

/// Serializable description of a [`LevelSet`]. Angles are in degrees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelSetConfig {
    /// `[min_lat, max_lat, min_lon, max_lon]`.
    #[serde(default = "default_coverage")]
    pub coverage: [f64; 4],
    /// `[lat, lon]` of the tile grid origin.
    #[serde(default = "default_origin")]
    pub tile_origin: [f64; 2],
    /// `[lat, lon]` tile delta at level 0.
    pub level_zero_tile_delta: [f64; 2],
    /// Cells per tile along longitude.
    pub tile_width: u32,
    /// Cells per tile along latitude.
    pub tile_height: u32,
    pub num_levels: u32,
    /// Levels with no data at all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub empty_levels: Vec<u32>,
}

impl LevelSetConfig {
    pub fn build(&self) -> Result<LevelSet, LevelSetError> {
        let [min_lat, max_lat, min_lon, max_lon] = self.coverage;
        let sector = Sector::from_degrees(min_lat, max_lat, min_lon, max_lon);
        let origin = LatLon::from_degrees(self.tile_origin[0], self.tile_origin[1]);
        let delta = LatLon::from_degrees(
            self.level_zero_tile_delta[0],
            self.level_zero_tile_delta[1],
        );

        let levels = (0..self.num_levels)
            .map(|i| {
                let scale = 1.0 / f64::from(1u32 << i.min(31));
                Level::new(
                    i,
                    delta.lat * scale,
                    delta.lon * scale,
                    self.tile_width,
                    self.tile_height,
                )
                .with_empty(self.empty_levels.contains(&i))
            })
            .collect();

        LevelSet::new(sector, origin, levels)
    }
}
