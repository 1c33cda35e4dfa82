//! Fixed-resolution sampling of 1°×1° regions.
//!
//! Independent of the sliding window: each region is sampled once through
//! geodetic lookups and kept in a small LRU keyed by its integer origin.

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::config::TerrainConfig;
use crate::error::{Result, TerrainError};
use crate::registry::TileRegistry;
use crate::store::ChunkStore;
use crate::types::KM_TO_METERS;

/// Degrees covered by a region along each axis.
const REGION_SPAN_DEGREES: f64 = 1.0;

/// Cache key: (rounded latitude, wrapped rounded longitude, resolution).
type RegionKey = (i64, i64, usize);

/// A region to sample: south-west corner and samples per edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionRequest {
    pub lat_start: f64,
    pub lon_start: f64,
    pub resolution: usize,
}

impl RegionRequest {
    /// Create a new request.
    pub fn new(lat_start: f64, lon_start: f64, resolution: usize) -> Self {
        Self {
            lat_start,
            lon_start,
            resolution,
        }
    }

    fn key(&self) -> RegionKey {
        let lat = self.lat_start.round() as i64;
        let lon = (self.lon_start.round() as i64).rem_euclid(360);
        (lat, lon, self.resolution)
    }
}

/// A sampled region in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSample {
    /// `resolution × resolution` samples, row 0 at `lat_start`, column 0 at
    /// `lon_start`.
    pub heights: Vec<f32>,
    pub min_elevation: f32,
    pub max_elevation: f32,
    pub resolution: usize,
}

impl RegionSample {
    /// Get the sample at (column, row).
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.resolution || row >= self.resolution {
            return None;
        }
        self.heights.get(row * self.resolution + col).copied()
    }
}

/// LRU cache of sampled regions with its own chunk store.
pub struct RegionSampler {
    registry: TileRegistry,
    store: ChunkStore,
    regions: LruCache<RegionKey, RegionSample>,
}

impl RegionSampler {
    /// Create a sampler over the given tile table.
    pub fn new(config: &TerrainConfig, registry: TileRegistry) -> Result<Self> {
        config.validate().map_err(TerrainError::config)?;
        let capacity = NonZeroUsize::new(config.region_cache_entries)
            .ok_or_else(|| TerrainError::config("region_cache_entries must be > 0"))?;

        Ok(Self {
            registry,
            store: ChunkStore::new(config),
            regions: LruCache::new(capacity),
        })
    }

    /// Sample a region, or return it from the cache.
    ///
    /// Returns `Ok(None)` when no tile covers the region's centre.
    pub fn fetch(&mut self, request: &RegionRequest) -> Result<Option<&RegionSample>> {
        if request.resolution <= 1 {
            return Err(TerrainError::invalid_input(format!(
                "region resolution must be > 1, got {}",
                request.resolution
            )));
        }

        let key = request.key();
        if self.regions.contains(&key) {
            return Ok(self.regions.get(&key));
        }

        let center_lat = request.lat_start + REGION_SPAN_DEGREES / 2.0;
        let center_lon = request.lon_start + REGION_SPAN_DEGREES / 2.0;
        if self.registry.find_tile(center_lat, center_lon).is_none() {
            return Ok(None);
        }

        let sample = self.sample_region(request);
        self.store.clear_cache();

        debug!(
            lat = key.0,
            lon = key.1,
            resolution = key.2,
            min = sample.min_elevation,
            max = sample.max_elevation,
            "Sampled terrain region"
        );

        self.regions.put(key, sample);
        Ok(self.regions.get(&key))
    }

    /// Drop every cached region.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// Number of cached regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if no region is cached.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn sample_region(&mut self, request: &RegionRequest) -> RegionSample {
        let n = request.resolution;
        let step = REGION_SPAN_DEGREES / (n - 1) as f64;
        let mut heights = Vec::with_capacity(n * n);
        let mut min_elevation = f32::MAX;
        let mut max_elevation = f32::MIN;

        for row in 0..n {
            let lat = request.lat_start + row as f64 * step;
            for col in 0..n {
                let lon = request.lon_start + col as f64 * step;
                let height = self.store.lookup_height(&self.registry, lat, lon) * KM_TO_METERS;
                min_elevation = min_elevation.min(height);
                max_elevation = max_elevation.max(height);
                heights.push(height);
            }
        }

        if heights.is_empty() {
            min_elevation = 0.0;
            max_elevation = 0.0;
        }

        RegionSample {
            heights,
            min_elevation,
            max_elevation,
            resolution: n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TileMetadata;
    use crate::types::RasterGeometry;
    use std::path::Path;
    use test_utils::{create_constant_grid, create_test_grid, write_chunked_tile};

    fn config(root: &Path, entries: usize) -> TerrainConfig {
        TerrainConfig {
            data_root: root.to_path_buf(),
            geometry: RasterGeometry::new(40, 30, 10),
            region_cache_entries: entries,
            ..TerrainConfig::default()
        }
    }

    fn registry() -> TileRegistry {
        TileRegistry::new(vec![TileMetadata::new("t.dat", 0.0, 30.0, 0.0, 40.0)]).unwrap()
    }

    #[test]
    fn test_key_rounds_and_wraps() {
        assert_eq!(RegionRequest::new(10.4, -1.2, 8).key(), (10, 359, 8));
        assert_eq!(RegionRequest::new(-0.6, 360.3, 8).key(), (-1, 0, 8));
    }

    #[test]
    fn test_low_resolution_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = RegionSampler::new(&config(dir.path(), 4), registry()).unwrap();
        assert!(matches!(
            sampler.fetch(&RegionRequest::new(10.0, 10.0, 1)),
            Err(TerrainError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_region_outside_coverage_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = RegionSampler::new(&config(dir.path(), 4), registry()).unwrap();
        assert!(sampler.fetch(&RegionRequest::new(50.0, 10.0, 4)).unwrap().is_none());
        assert!(sampler.is_empty());
    }

    #[test]
    fn test_region_samples_in_meters() {
        let dir = tempfile::tempdir().unwrap();
        let grid = create_test_grid(40, 30);
        write_chunked_tile(&dir.path().join("t.dat"), &grid, 40, 30, 10).unwrap();
        let mut sampler = RegionSampler::new(&config(dir.path(), 4), registry()).unwrap();

        // 1 pixel per degree: a 1° region spans two pixels on each axis.
        let sample = sampler
            .fetch(&RegionRequest::new(10.0, 5.0, 2))
            .unwrap()
            .unwrap()
            .clone();

        assert_eq!(sample.resolution, 2);
        // row 0 is lat 10 -> pixel row 20
        assert_eq!(sample.get(0, 0), Some(grid[20 * 40 + 5] * 1000.0));
        assert_eq!(sample.get(1, 1), Some(grid[19 * 40 + 6] * 1000.0));
        assert_eq!(sample.min_elevation, grid[19 * 40 + 5] * 1000.0);
        assert_eq!(sample.max_elevation, grid[20 * 40 + 6] * 1000.0);
    }

    #[test]
    fn test_regions_are_cached_and_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let grid = create_constant_grid(40, 30, 1.5);
        write_chunked_tile(&dir.path().join("t.dat"), &grid, 40, 30, 10).unwrap();
        let mut sampler = RegionSampler::new(&config(dir.path(), 2), registry()).unwrap();

        for lon in [1.0, 2.0, 3.0] {
            let sample = sampler.fetch(&RegionRequest::new(5.0, lon, 3)).unwrap().unwrap();
            assert_eq!(sample.min_elevation, 1500.0);
            assert_eq!(sample.max_elevation, 1500.0);
        }
        assert_eq!(sampler.len(), 2);

        // Rounds onto an already cached key.
        assert!(sampler.fetch(&RegionRequest::new(5.2, 2.9, 3)).unwrap().is_some());
        assert_eq!(sampler.len(), 2);

        sampler.clear();
        assert!(sampler.is_empty());
    }
}
