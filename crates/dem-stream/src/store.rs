//! Per-tile file handles and lazily decoded chunks.
//!
//! The store only speaks absolute pixel coordinates within a tile raster.
//! Degree-to-pixel conversion for cross-tile lookups goes through
//! [`ChunkStore::lookup_height`].

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cache::{tile_id, ChunkCache};
use crate::config::TerrainConfig;
use crate::error::{Result, TerrainError};
use crate::registry::{longitude_offset_within_tile, TileMetadata, TileRegistry};
use crate::types::{RasterGeometry, StoreStats, TileLayout, SAMPLE_BYTES};

/// An open tile file and its degree-to-pixel scale.
struct TileStream {
    file: File,
    tile_id: u64,
    pixels_per_degree_x: f64,
    pixels_per_degree_y: f64,
}

/// Owns every open tile file and the decoded chunks read from them.
pub struct ChunkStore {
    data_root: PathBuf,
    geometry: RasterGeometry,
    layout: TileLayout,
    streams: HashMap<String, TileStream>,
    /// Files that failed to open; not retried until [`ChunkStore::forget_unavailable`].
    unavailable: HashSet<String>,
    cache: ChunkCache,
    chunk_reads: u64,
    read_failures: u64,
    warned_missing_tile: bool,
}

impl ChunkStore {
    /// Create an empty store. No files are opened until first use.
    pub fn new(config: &TerrainConfig) -> Self {
        Self {
            data_root: config.data_root.clone(),
            geometry: config.geometry,
            layout: config.layout,
            streams: HashMap::new(),
            unavailable: HashSet::new(),
            cache: ChunkCache::new(
                config.chunk_cache_size_bytes(),
                config.geometry.chunk_bytes(),
            ),
            chunk_reads: 0,
            read_failures: 0,
            warned_missing_tile: false,
        }
    }

    /// Open the tile's backing file if it is not open yet.
    ///
    /// Returns `Ok(false)` when the file cannot be opened; that tile then
    /// reads as missing data. Zero-span metadata is an error.
    pub fn ensure_stream(&mut self, tile: &TileMetadata) -> Result<bool> {
        if self.streams.contains_key(&tile.filename) {
            return Ok(true);
        }

        let lon_span = tile.longitude_span();
        let lat_span = tile.latitude_span();
        if !(lon_span > 0.0 && lat_span > 0.0) {
            return Err(TerrainError::invalid_tile(&tile.filename, "zero span"));
        }

        if self.unavailable.contains(&tile.filename) {
            return Ok(false);
        }

        let path = self.data_root.join(&tile.filename);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not open tile file");
                self.unavailable.insert(tile.filename.clone());
                return Ok(false);
            }
        };

        info!(tile = %tile.filename, layout = %self.layout, "Opened tile stream");

        self.streams.insert(
            tile.filename.clone(),
            TileStream {
                file,
                tile_id: tile_id(&tile.filename),
                pixels_per_degree_x: self.geometry.tile_width as f64 / lon_span,
                pixels_per_degree_y: self.geometry.tile_height as f64 / lat_span,
            },
        );
        Ok(true)
    }

    /// Get a decoded chunk of an opened tile, reading it from disk on a miss.
    ///
    /// Returns `None` for chunk coordinates outside the grid, for a tile that
    /// was never opened, and for short or failed reads.
    pub fn fetch_chunk(&mut self, filename: &str, chunk_x: i64, chunk_y: i64) -> Option<&[f32]> {
        let (num_x, num_y) = self.geometry.num_chunks();
        if chunk_x < 0 || chunk_y < 0 || chunk_x as usize >= num_x || chunk_y as usize >= num_y {
            return None;
        }
        let (chunk_x, chunk_y) = (chunk_x as usize, chunk_y as usize);

        let stream = self.streams.get_mut(filename)?;
        let key = (stream.tile_id, chunk_x, chunk_y);
        let geometry = self.geometry;
        let layout = self.layout;
        let chunk_reads = &mut self.chunk_reads;
        let read_failures = &mut self.read_failures;

        self.cache.get_or_load(key, || {
            match read_chunk(&mut stream.file, &geometry, layout, chunk_x, chunk_y) {
                Ok(chunk) => {
                    *chunk_reads += 1;
                    Some(chunk)
                }
                Err(err) => {
                    *read_failures += 1;
                    warn!(
                        tile = %filename,
                        chunk_x,
                        chunk_y,
                        error = %err,
                        "Chunk read failed"
                    );
                    None
                }
            }
        })
    }

    /// Height in kilometres at an absolute pixel of an opened tile, or `None`
    /// when there is no data for it.
    pub fn sample(&mut self, filename: &str, pixel_x: i64, pixel_y: i64) -> Option<f32> {
        if !self.geometry.contains_pixel(pixel_x, pixel_y) {
            return None;
        }

        let size = self.geometry.chunk_size as i64;
        let chunk = self.fetch_chunk(filename, pixel_x / size, pixel_y / size)?;
        let index = ((pixel_y % size) * size + (pixel_x % size)) as usize;
        chunk.get(index).copied()
    }

    /// Height in kilometres at an absolute pixel, `0.0` when missing.
    pub fn height_at(&mut self, filename: &str, pixel_x: i64, pixel_y: i64) -> f32 {
        self.sample(filename, pixel_x, pixel_y).unwrap_or(0.0)
    }

    /// Height in kilometres at a geodetic coordinate resolved through the
    /// registry, or `None` outside coverage.
    pub fn sample_geodetic(&mut self, registry: &TileRegistry, lat: f64, lon: f64) -> Option<f32> {
        if !registry.in_band(lat) {
            return None;
        }

        let Some(tile) = registry.find_tile(lat, lon) else {
            if !self.warned_missing_tile {
                warn!(lat, lon, "No DEM tile covers coordinate");
                self.warned_missing_tile = true;
            }
            return None;
        };

        match self.ensure_stream(tile) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                warn!(tile = %tile.filename, error = %err, "Skipping tile");
                return None;
            }
        }

        let (ppd_x, ppd_y) = self.pixels_per_degree(&tile.filename)?;
        let lon_offset = longitude_offset_within_tile(tile, lon);
        let clamped_lat = lat.clamp(tile.min_latitude, tile.max_latitude);

        let max_x = self.geometry.tile_width as i64 - 1;
        let max_y = self.geometry.tile_height as i64 - 1;
        let pixel_x = ((lon_offset * ppd_x).round() as i64).clamp(0, max_x);
        let pixel_y = (((tile.max_latitude - clamped_lat) * ppd_y).round() as i64).clamp(0, max_y);

        self.sample(&tile.filename, pixel_x, pixel_y)
    }

    /// Height in kilometres at a geodetic coordinate, `0.0` outside coverage.
    pub fn lookup_height(&mut self, registry: &TileRegistry, lat: f64, lon: f64) -> f32 {
        self.sample_geodetic(registry, lat, lon).unwrap_or(0.0)
    }

    /// Pixels per degree (x, y) of an opened tile.
    pub fn pixels_per_degree(&self, filename: &str) -> Option<(f64, f64)> {
        self.streams
            .get(filename)
            .map(|s| (s.pixels_per_degree_x, s.pixels_per_degree_y))
    }

    /// Drop every decoded chunk. File handles stay open.
    pub fn clear_cache(&mut self) {
        if !self.cache.is_empty() {
            debug!(
                entries = self.cache.len(),
                bytes = self.cache.memory_usage(),
                "Clearing chunk cache"
            );
        }
        self.cache.clear();
    }

    /// Allow files that previously failed to open to be retried.
    pub fn forget_unavailable(&mut self) {
        self.unavailable.clear();
        self.warned_missing_tile = false;
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            cache: self.cache.stats(),
            chunk_reads: self.chunk_reads,
            read_failures: self.read_failures,
            open_streams: self.streams.len(),
        }
    }

    /// Whether a tile's file is open.
    pub fn is_open(&self, filename: &str) -> bool {
        self.streams.contains_key(filename)
    }

    /// Raster geometry shared by all tiles.
    pub fn geometry(&self) -> RasterGeometry {
        self.geometry
    }

    /// On-disk layout of the tile files.
    pub fn layout(&self) -> TileLayout {
        self.layout
    }

    /// Directory tile filenames are resolved against.
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}

/// Read one chunk from a tile file.
///
/// Samples are little-endian `f32`; a chunk always decodes to
/// `chunk_size * chunk_size` values or fails.
fn read_chunk(
    file: &mut File,
    geometry: &RasterGeometry,
    layout: TileLayout,
    chunk_x: usize,
    chunk_y: usize,
) -> std::io::Result<Vec<f32>> {
    let size = geometry.chunk_size;
    let mut chunk = vec![0.0f32; geometry.chunk_len()];

    match layout {
        TileLayout::Chunked => {
            let (num_x, _) = geometry.num_chunks();
            let linear_index = (chunk_y * num_x + chunk_x) as u64;
            file.seek(SeekFrom::Start(linear_index * geometry.chunk_bytes() as u64))?;
            file.read_exact(bytemuck::cast_slice_mut(&mut chunk))?;
        }
        TileLayout::Raw => {
            let pixel_x = (chunk_x * size) as u64;
            for (row, dest) in chunk.chunks_exact_mut(size).enumerate() {
                let pixel_y = (chunk_y * size + row) as u64;
                let offset = (pixel_y * geometry.tile_width as u64 + pixel_x) * SAMPLE_BYTES as u64;
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(bytemuck::cast_slice_mut(dest))?;
            }
        }
    }

    if cfg!(target_endian = "big") {
        for value in &mut chunk {
            *value = f32::from_bits(u32::from_le(value.to_bits()));
        }
    }

    Ok(chunk)
}
