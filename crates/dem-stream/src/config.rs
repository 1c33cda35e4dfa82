//! Configuration for the terrain loader.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::types::{RasterGeometry, TileLayout};

/// Configuration owned by each loader instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Directory the tile filenames are resolved against.
    pub data_root: PathBuf,

    /// Raster and chunk dimensions shared by all tiles.
    pub geometry: RasterGeometry,

    /// On-disk arrangement of the tile files.
    pub layout: TileLayout,

    /// Memory budget for decoded chunks in megabytes.
    pub chunk_cache_size_mb: usize,

    /// Drop decoded chunks after every window load.
    pub clear_cache_after_load: bool,

    /// Fraction of missing samples in one load above which a warning is logged.
    pub no_data_warn_ratio: f64,

    /// Number of sampled regions kept by the region sampler.
    pub region_cache_entries: usize,

    /// Pending requests accepted by the background terrain service.
    pub service_queue_depth: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(".data/proc"),
            geometry: RasterGeometry::default(),
            layout: TileLayout::Chunked,
            chunk_cache_size_mb: 512,
            clear_cache_after_load: true,
            no_data_warn_ratio: 0.5,
            region_cache_entries: 128,
            service_queue_depth: 4,
        }
    }
}

impl TerrainConfig {
    /// Create a configuration rooted at `data_root` with default settings.
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DEM_DATA_ROOT") {
            config.data_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DEM_TILE_WIDTH") {
            if let Ok(size) = val.parse() {
                config.geometry.tile_width = size;
            }
        }

        if let Ok(val) = std::env::var("DEM_TILE_HEIGHT") {
            if let Ok(size) = val.parse() {
                config.geometry.tile_height = size;
            }
        }

        if let Ok(val) = std::env::var("DEM_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                config.geometry.chunk_size = size;
            }
        }

        if let Ok(val) = std::env::var("DEM_TILE_LAYOUT") {
            config.layout = TileLayout::from_str(&val);
        }

        if let Ok(val) = std::env::var("CHUNK_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.chunk_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("DEM_CLEAR_CACHE_AFTER_LOAD") {
            config.clear_cache_after_load = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("DEM_NO_DATA_WARN_RATIO") {
            if let Ok(ratio) = val.parse() {
                config.no_data_warn_ratio = ratio;
            }
        }

        if let Ok(val) = std::env::var("DEM_REGION_CACHE_ENTRIES") {
            if let Ok(entries) = val.parse() {
                config.region_cache_entries = entries;
            }
        }

        config
    }

    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&text)?;
        config.validate().map_err(TerrainError::config)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.geometry.validate()?;

        if self.chunk_cache_size_bytes() < self.geometry.chunk_bytes() {
            return Err(format!(
                "chunk_cache_size_mb ({}) cannot hold a single {} byte chunk",
                self.chunk_cache_size_mb,
                self.geometry.chunk_bytes()
            ));
        }

        if !(0.0..=1.0).contains(&self.no_data_warn_ratio) {
            return Err("no_data_warn_ratio must be within 0.0-1.0".to_string());
        }

        if self.region_cache_entries == 0 {
            return Err("region_cache_entries must be > 0".to_string());
        }

        if self.service_queue_depth == 0 {
            return Err("service_queue_depth must be > 0".to_string());
        }

        Ok(())
    }

    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb * 1024 * 1024
    }
}
