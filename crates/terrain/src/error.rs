use std::fmt;

use elevation::ElevationError;
use tiling::tile_key::TileKey;

#[derive(Debug, Clone, PartialEq)]
pub enum TerrainError {
    /// The elevation model rejected a grid query.
    Elevation(ElevationError),
    /// A tile key whose level the mesh level set does not define.
    UnknownTile(TileKey),
}

impl fmt::Display for TerrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerrainError::Elevation(e) => write!(f, "elevation query failed: {e}"),
            TerrainError::UnknownTile(key) => write!(f, "tile {key} is outside the mesh level set"),
        }
    }
}

impl std::error::Error for TerrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TerrainError::Elevation(e) => Some(e),
            TerrainError::UnknownTile(_) => None,
        }
    }
}

impl From<ElevationError> for TerrainError {
    fn from(e: ElevationError) -> Self {
        TerrainError::Elevation(e)
    }
}
