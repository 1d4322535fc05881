use foundation::sector::Sector;
use streaming::cache::Cacheable;
use tiling::level::Level;
use tiling::tile_key::TileKey;

use crate::loader::LoadError;

/// Samples equal to `signal` are replaced by `replacement` when a tile is built.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MissingData {
    pub signal: Option<f64>,
    pub replacement: f64,
}

impl Default for MissingData {
    fn default() -> Self {
        Self {
            signal: None,
            replacement: 0.0,
        }
    }
}

/// One resident tile of elevation samples. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationTile {
    key: TileKey,
    sector: Sector,
    width: u32,
    height: u32,
    texel_size: f64,
    samples: Vec<f32>,
    min: f64,
    max: f64,
}

impl ElevationTile {
    pub fn new(
        key: TileKey,
        sector: Sector,
        level: &Level,
        mut samples: Vec<f32>,
        missing: MissingData,
    ) -> Result<Self, LoadError> {
        let expected = level.samples_per_tile();
        if samples.len() != expected {
            return Err(LoadError::SampleCount {
                expected,
                found: samples.len(),
            });
        }

        if let Some(signal) = missing.signal {
            for s in samples.iter_mut().filter(|s| f64::from(**s) == signal) {
                *s = missing.replacement as f32;
            }
        }

        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                let s = f64::from(s);
                (lo.min(s), hi.max(s))
            });

        Ok(Self {
            key,
            sector,
            width: level.tile_width(),
            height: level.tile_height(),
            texel_size: level.texel_size(),
            samples,
            min,
            max,
        })
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn texel_size(&self) -> f64 {
        self.texel_size
    }

    pub fn min_elevation(&self) -> f64 {
        self.min
    }

    pub fn max_elevation(&self) -> f64 {
        self.max
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    fn sample(&self, row: usize, column: usize) -> f64 {
        f64::from(self.samples[row * (self.width as usize + 1) + column])
    }

    /// Bilinear elevation at a location; coordinates outside the tile clamp
    /// to its edge.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        let (r0, r1, t) = cell(
            lat,
            self.sector.min_lat,
            self.sector.delta_lat(),
            self.height,
        );
        let (c0, c1, u) = cell(
            lon,
            self.sector.min_lon,
            self.sector.delta_lon(),
            self.width,
        );

        let bottom = lerp(self.sample(r0, c0), self.sample(r0, c1), u);
        let top = lerp(self.sample(r1, c0), self.sample(r1, c1), u);
        lerp(bottom, top, t)
    }
}

impl Cacheable for ElevationTile {
    fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// Enclosing sample pair along one axis and the fraction between them. The
/// last cell reuses its final sample.
fn cell(value: f64, min: f64, delta: f64, cells: u32) -> (usize, usize, f64) {
    let s = if delta > 0.0 {
        ((value - min) / delta).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let pos = s * f64::from(cells);
    let i0 = (pos.floor() as usize).min(cells as usize);
    let i1 = (i0 + 1).min(cells as usize);
    (i0, i1, pos - i0 as f64)
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
