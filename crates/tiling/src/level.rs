/// Tile row containing `lat` for tiles `delta` radians tall, counted from `origin`.
#[inline]
pub fn row_for_latitude(delta: f64, lat: f64, origin: f64) -> i32 {
    ((lat - origin) / delta).floor() as i32
}

/// Tile column containing `lon` for tiles `delta` radians wide, counted from `origin`.
#[inline]
pub fn column_for_longitude(delta: f64, lon: f64, origin: f64) -> i32 {
    ((lon - origin) / delta).floor() as i32
}

/// Minimum latitude of `row`.
///
/// Always `origin + row * delta`: a tile's maximum is its northern
/// neighbour's minimum evaluated with the same expression, so shared edges
/// are bit-identical.
#[inline]
pub fn latitude_for_row(delta: f64, row: i32, origin: f64) -> f64 {
    origin + row as f64 * delta
}

/// Minimum longitude of `column`. See [`latitude_for_row`].
#[inline]
pub fn longitude_for_column(delta: f64, column: i32, origin: f64) -> f64 {
    origin + column as f64 * delta
}

/// One resolution tier of the tile quadtree.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Level {
    index: u32,
    tile_delta_lat: f64,
    tile_delta_lon: f64,
    tile_width: u32,
    tile_height: u32,
    empty: bool,
}

impl Level {
    /// `tile_width`/`tile_height` count cells; a tile carries one more sample
    /// than cells along each axis.
    pub fn new(
        index: u32,
        tile_delta_lat: f64,
        tile_delta_lon: f64,
        tile_width: u32,
        tile_height: u32,
    ) -> Self {
        Self {
            index,
            tile_delta_lat,
            tile_delta_lon,
            tile_width,
            tile_height,
            empty: false,
        }
    }

    /// Marks the level as carrying no data at all.
    pub fn with_empty(mut self, empty: bool) -> Self {
        self.empty = empty;
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn tile_delta_lat(&self) -> f64 {
        self.tile_delta_lat
    }

    pub fn tile_delta_lon(&self) -> f64 {
        self.tile_delta_lon
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    /// Samples per tile, `(height + 1) * (width + 1)`.
    pub fn samples_per_tile(&self) -> usize {
        (self.tile_height as usize + 1) * (self.tile_width as usize + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Angular size of one cell in radians.
    pub fn texel_size(&self) -> f64 {
        self.tile_delta_lat / self.tile_height as f64
    }
}
