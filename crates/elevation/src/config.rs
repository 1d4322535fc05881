use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use streaming::cache::MemoryBudget;
use tiling::config::LevelSetConfig;
use tiling::level_set::LevelSetError;

use crate::loader::ElevationLoader;
use crate::model::ElevationModel;
use crate::tile::MissingData;

fn default_tile_cache_size() -> usize {
    32 * 1024 * 1024
}

fn default_load_threads() -> usize {
    2
}

fn default_max_pending_loads() -> usize {
    512
}

/// Resolver settings that do not describe the tiling itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElevationSettings {
    /// Lowest elevation anywhere in the coverage, metres.
    pub min_elevation: f64,
    pub max_elevation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_data_signal: Option<f64>,
    #[serde(default)]
    pub missing_data_replacement: f64,
    /// Byte budget of the elevation tile cache.
    #[serde(default = "default_tile_cache_size")]
    pub tile_cache_size: usize,
    /// Background loader threads; 0 loads only on `process_pending_loads`.
    #[serde(default = "default_load_threads")]
    pub load_threads: usize,
    #[serde(default = "default_max_pending_loads")]
    pub max_pending_loads: usize,
}

impl ElevationSettings {
    pub fn new(min_elevation: f64, max_elevation: f64) -> Self {
        Self {
            min_elevation,
            max_elevation,
            missing_data_signal: None,
            missing_data_replacement: 0.0,
            tile_cache_size: default_tile_cache_size(),
            load_threads: default_load_threads(),
            max_pending_loads: default_max_pending_loads(),
        }
    }

    pub fn with_load_threads(mut self, threads: usize) -> Self {
        self.load_threads = threads;
        self
    }

    pub fn with_tile_cache_size(mut self, bytes: usize) -> Self {
        self.tile_cache_size = bytes;
        self
    }

    pub fn missing_data(&self) -> MissingData {
        MissingData {
            signal: self.missing_data_signal,
            replacement: self.missing_data_replacement,
        }
    }

    pub fn cache_budget(&self) -> MemoryBudget {
        MemoryBudget::new(self.tile_cache_size)
    }
}

/// Complete description of an elevation model, as stored in JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElevationModelConfig {
    pub levels: LevelSetConfig,
    #[serde(flatten)]
    pub settings: ElevationSettings,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Levels(LevelSetError),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "read {}: {source}", path.display()),
            ConfigError::Parse(e) => write!(f, "invalid config json: {e}"),
            ConfigError::Levels(e) => write!(f, "invalid level set: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Levels(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<LevelSetError> for ConfigError {
    fn from(e: LevelSetError) -> Self {
        ConfigError::Levels(e)
    }
}

impl ElevationModelConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn build(&self, loader: Arc<dyn ElevationLoader>) -> Result<ElevationModel, ConfigError> {
        if self.settings.min_elevation > self.settings.max_elevation {
            return Err(ConfigError::Invalid(format!(
                "minElevation {} exceeds maxElevation {}",
                self.settings.min_elevation, self.settings.max_elevation
            )));
        }
        let levels = self.levels.build()?;
        Ok(ElevationModel::new(levels, loader, self.settings.clone()))
    }
}
