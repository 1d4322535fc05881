use std::env;
use std::fs;
use std::path::Path;

use elevation::{ConfigError, ElevationSettings};
use serde::{Deserialize, Serialize};
use streaming::cache::MemoryBudget;

fn default_tile_cache_size() -> usize {
    32 * 1024 * 1024
}

fn default_mesh_cache_size() -> usize {
    4 * 1024 * 1024
}

fn default_geometry_cache_size() -> usize {
    64 * 1024 * 1024
}

fn default_vertical_exaggeration() -> f64 {
    1.0
}

fn default_low_water_ratio() -> f64 {
    0.8
}

/// Tessellator tuning, as stored in JSON (camelCase keys).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerrainConfig {
    /// Byte budget of the elevation tile cache.
    #[serde(default = "default_tile_cache_size")]
    pub tile_cache_size: usize,
    #[serde(default = "default_mesh_cache_size")]
    pub mesh_cache_size: usize,
    #[serde(default = "default_geometry_cache_size")]
    pub geometry_cache_size: usize,
    /// Added to the detail origin; positive values subdivide further.
    #[serde(default)]
    pub detail_hint: f64,
    #[serde(default = "default_vertical_exaggeration")]
    pub vertical_exaggeration: f64,
    /// Eviction target of every cache, as a fraction of its capacity.
    #[serde(default = "default_low_water_ratio")]
    pub low_water_ratio: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            tile_cache_size: default_tile_cache_size(),
            mesh_cache_size: default_mesh_cache_size(),
            geometry_cache_size: default_geometry_cache_size(),
            detail_hint: 0.0,
            vertical_exaggeration: default_vertical_exaggeration(),
            low_water_ratio: default_low_water_ratio(),
        }
    }
}

impl TerrainConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Applies `TERRAIN_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`; unset or unparsable values keep the
    /// current setting.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        self.tile_cache_size = var_usize(&lookup, "TERRAIN_TILE_CACHE_SIZE", self.tile_cache_size);
        self.mesh_cache_size = var_usize(&lookup, "TERRAIN_MESH_CACHE_SIZE", self.mesh_cache_size);
        self.geometry_cache_size =
            var_usize(&lookup, "TERRAIN_GEOMETRY_CACHE_SIZE", self.geometry_cache_size);
        self.detail_hint = var_f64(&lookup, "TERRAIN_DETAIL_HINT", self.detail_hint);
        self.vertical_exaggeration = var_f64(
            &lookup,
            "TERRAIN_VERTICAL_EXAGGERATION",
            self.vertical_exaggeration,
        );
        self.low_water_ratio = var_f64(&lookup, "TERRAIN_LOW_WATER_RATIO", self.low_water_ratio);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.vertical_exaggeration.is_finite() && self.vertical_exaggeration >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "verticalExaggeration must be finite and non-negative, got {}",
                self.vertical_exaggeration
            )));
        }
        if !(0.0..=1.0).contains(&self.low_water_ratio) {
            return Err(ConfigError::Invalid(format!(
                "lowWaterRatio must lie in [0, 1], got {}",
                self.low_water_ratio
            )));
        }
        if !self.detail_hint.is_finite() {
            return Err(ConfigError::Invalid("detailHint must be finite".into()));
        }
        Ok(())
    }

    pub fn mesh_budget(&self) -> MemoryBudget {
        self.budget(self.mesh_cache_size)
    }

    pub fn geometry_budget(&self) -> MemoryBudget {
        self.budget(self.geometry_cache_size)
    }

    /// `settings` with the elevation tile cache sized from this config.
    pub fn apply_to(&self, settings: ElevationSettings) -> ElevationSettings {
        settings.with_tile_cache_size(self.tile_cache_size)
    }

    fn budget(&self, capacity: usize) -> MemoryBudget {
        MemoryBudget::with_low_water(capacity, (capacity as f64 * self.low_water_ratio) as usize)
    }
}

fn var_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn var_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
