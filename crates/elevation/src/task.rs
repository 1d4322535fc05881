use std::fmt;

use tiling::tile_key::TileKey;
use tracing::{debug, warn};

use crate::model::ModelShared;
use crate::tile::ElevationTile;

/// What one run of a [`TileLoadTask`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Installed,
    /// Resident or known absent before the task ran.
    Skipped,
    /// The loader failed; the tile is now marked absent.
    Failed,
}

/// Background load of one elevation tile.
///
/// Tasks compare by key, so two requests for the same tile are the same task.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileLoadTask {
    key: TileKey,
}

impl TileLoadTask {
    pub fn new(key: TileKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Queue priority: coarse levels load first.
    pub fn priority(&self) -> i32 {
        i32::try_from(self.key.level).unwrap_or(i32::MAX)
    }

    /// Loads, builds and installs the tile. Failures mark the key absent and
    /// are never retried.
    pub(crate) fn run(&self, shared: &ModelShared) -> TaskOutcome {
        let key = self.key;
        if shared.cache.contains(&key) || shared.levels.is_absent(&key) {
            return TaskOutcome::Skipped;
        }

        let (Some(level), Some(sector)) = (
            shared.levels.level(key.level).copied(),
            shared.levels.tile_sector(&key),
        ) else {
            warn!(%key, "load requested for a level outside the level set");
            shared.levels.mark_absent(key);
            return TaskOutcome::Failed;
        };

        let built = shared
            .loader
            .load_samples(&key, &sector, &level)
            .and_then(|samples| {
                ElevationTile::new(key, sector, &level, samples, shared.missing)
            });

        match built {
            Ok(tile) => {
                shared.install(tile);
                debug!(%key, "installed elevation tile");
                TaskOutcome::Installed
            }
            Err(err) => {
                warn!(%key, "elevation tile load failed, marking absent: {err}");
                shared.levels.mark_absent(key);
                TaskOutcome::Failed
            }
        }
    }
}

impl fmt::Display for TileLoadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load {}", self.key)
    }
}
