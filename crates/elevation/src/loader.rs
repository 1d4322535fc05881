use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use foundation::sector::Sector;
use tiling::level::Level;
use tiling::tile_key::TileKey;

#[derive(Debug)]
pub enum LoadError {
    Io { path: PathBuf, source: io::Error },
    /// Byte length is not a whole number of `f32` samples.
    Malformed { path: PathBuf, len: usize },
    SampleCount { expected: usize, found: usize },
    Other(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io { path, source } => write!(f, "read {}: {source}", path.display()),
            LoadError::Malformed { path, len } => {
                write!(f, "{}: {len} bytes is not a whole number of f32 samples", path.display())
            }
            LoadError::SampleCount { expected, found } => {
                write!(f, "expected {expected} samples, found {found}")
            }
            LoadError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Source of raw elevation samples for one tile.
///
/// Implementations return `(height + 1) * (width + 1)` samples in row-major
/// order, row 0 at the sector's minimum latitude. Called from loader
/// threads, so implementations must be thread-safe.
pub trait ElevationLoader: Send + Sync {
    fn load_samples(&self, key: &TileKey, sector: &Sector, level: &Level)
    -> Result<Vec<f32>, LoadError>;
}

/// Little-endian `f32` tiles on disk at
/// `<root>/<level>/<row>/<row>_<column>.bin`.
#[derive(Debug, Clone)]
pub struct RawTileLoader {
    root: PathBuf,
}

impl RawTileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.root
            .join(key.level.to_string())
            .join(key.row.to_string())
            .join(format!("{}_{}.bin", key.row, key.column))
    }

    /// Writes `samples` where [`RawTileLoader::load_samples`] will look for them.
    pub fn write_tile(&self, key: &TileKey, samples: &[f32]) -> Result<PathBuf, LoadError> {
        let path = self.tile_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LoadError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut bytes: Vec<u8> = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        fs::write(&path, bytes).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl ElevationLoader for RawTileLoader {
    fn load_samples(
        &self,
        key: &TileKey,
        _sector: &Sector,
        level: &Level,
    ) -> Result<Vec<f32>, LoadError> {
        let path = self.tile_path(key);
        let bytes = fs::read(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        if bytes.len() % 4 != 0 {
            return Err(LoadError::Malformed {
                path,
                len: bytes.len(),
            });
        }
        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let expected = level.samples_per_tile();
        if samples.len() != expected {
            return Err(LoadError::SampleCount {
                expected,
                found: samples.len(),
            });
        }
        Ok(samples)
    }
}

/// Samples an analytic surface `f(lat, lon)` at the tile's grid points.
///
/// Grid points use the same pinned-edge spacing as elevation grid queries, so
/// neighbouring tiles produce identical shared-edge samples.
pub struct FnLoader<F> {
    f: F,
}

impl<F> FnLoader<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnLoader<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLoader").finish_non_exhaustive()
    }
}

impl<F> ElevationLoader for FnLoader<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn load_samples(
        &self,
        _key: &TileKey,
        sector: &Sector,
        level: &Level,
    ) -> Result<Vec<f32>, LoadError> {
        let rows = level.tile_height() as usize + 1;
        let cols = level.tile_width() as usize + 1;
        let mut samples = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            let lat = grid_coordinate(sector.min_lat, sector.max_lat, r, rows);
            for c in 0..cols {
                let lon = grid_coordinate(sector.min_lon, sector.max_lon, c, cols);
                samples.push((self.f)(lat, lon) as f32);
            }
        }
        Ok(samples)
    }
}

/// Coordinate of grid line `i` of `n` spanning `[min, max]`.
///
/// The first and last lines are exactly `min` and `max`.
#[inline]
pub fn grid_coordinate(min: f64, max: f64, i: usize, n: usize) -> f64 {
    if i == 0 {
        min
    } else if i + 1 >= n {
        max
    } else {
        min + (max - min) * (i as f64 / (n - 1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::{ElevationLoader, FnLoader, LoadError, RawTileLoader, grid_coordinate};
    use foundation::sector::Sector;
    use tiling::level::Level;
    use tiling::tile_key::TileKey;

    fn level() -> Level {
        Level::new(1, 0.5, 0.5, 2, 2)
    }

    #[test]
    fn raw_tiles_round_trip_through_the_file_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = RawTileLoader::new(dir.path());
        let key = TileKey::new(1, 3, 7);
        let samples: Vec<f32> = (0..9).map(|i| i as f32 * 1.5).collect();

        let path = loader.write_tile(&key, &samples).expect("write");
        assert!(path.ends_with("1/3/3_7.bin"));

        let sector = Sector::new(0.0, 0.5, 0.0, 0.5);
        let loaded = loader.load_samples(&key, &sector, &level()).expect("load");
        assert_eq!(loaded, samples);
    }

    #[test]
    fn wrong_sample_count_and_missing_files_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = RawTileLoader::new(dir.path());
        let sector = Sector::new(0.0, 0.5, 0.0, 0.5);

        let missing = loader.load_samples(&TileKey::new(1, 0, 0), &sector, &level());
        assert!(matches!(missing, Err(LoadError::Io { .. })));

        let key = TileKey::new(1, 0, 1);
        loader.write_tile(&key, &[1.0, 2.0]).expect("write");
        let short = loader.load_samples(&key, &sector, &level());
        assert!(matches!(
            short,
            Err(LoadError::SampleCount {
                expected: 9,
                found: 2
            })
        ));

        let path = loader.tile_path(&key);
        std::fs::write(&path, [0u8; 5]).expect("write");
        let odd = loader.load_samples(&key, &sector, &level());
        assert!(matches!(odd, Err(LoadError::Malformed { len: 5, .. })));
    }

    #[test]
    fn fn_loader_samples_pinned_grid() {
        let loader = FnLoader::new(|lat, lon| 1000.0 * lat + lon);
        let sector = Sector::new(0.0, 0.5, 1.0, 1.5);
        let s = loader
            .load_samples(&TileKey::new(1, 0, 0), &sector, &level())
            .expect("load");
        assert_eq!(s.len(), 9);
        assert_eq!(s[0], 1.0);
        assert_eq!(s[8], (1000.0 * 0.5 + 1.5) as f32);
        assert_eq!(grid_coordinate(0.1, 0.7, 4, 5), 0.7);
        assert_eq!(grid_coordinate(0.1, 0.7, 0, 5), 0.1);
    }
}
