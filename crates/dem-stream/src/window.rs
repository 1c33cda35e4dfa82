//! Sliding height window over the tile set.
//!
//! [`TerrainLoader`] remembers the last window it served. A request that only
//! moves the centre within the same tile, with the same size and stride, is
//! served by shifting the previous buffer by whole output cells and fetching
//! the newly exposed border. Anything else reloads every sample.
//!
//! ```text
//! load_or_update_terrain(lat, lon, w, h, stride)
//!      │
//!      ├─► TileRegistry::find_tile ── none ──► previous window / empty
//!      │
//!      ├─► first call, size/stride/tile changed ──► full load
//!      │
//!      └─► scroll load
//!               ├─► grid shift 0       ──► previous window
//!               ├─► shift >= window    ──► full load
//!               └─► copy overlap, fetch border
//! ```

use tracing::{debug, info, warn};

use crate::config::TerrainConfig;
use crate::error::{Result, TerrainError};
use crate::registry::{longitude_offset_within_tile, TileMetadata, TileRegistry};
use crate::store::ChunkStore;
use crate::types::{
    LoadKind, LoadStats, StoreStats, TerrainWindow, WindowRequest, KM_TO_METERS,
};

/// The window most recently served, in source-tile pixel space.
#[derive(Debug, Clone)]
struct WindowState {
    center_lat: f64,
    center_lon: f64,
    width: usize,
    height: usize,
    stride: usize,
    tile: TileMetadata,
    /// Centre pixel the buffer is aligned to. After a scroll this is the
    /// stride-aligned centre, not the one rounded from `center_lat/lon`.
    center_x: i64,
    center_y: i64,
    /// Row-major samples in kilometres.
    heights_km: Vec<f32>,
}

/// Pixel placement of a window within a tile.
#[derive(Debug, Clone, Copy)]
struct ViewParams {
    center_x: i64,
    center_y: i64,
    start_x: i64,
    start_y: i64,
    degrees_per_pixel_x: f64,
    degrees_per_pixel_y: f64,
}

/// Stateful loader serving a sliding window of DEM heights.
///
/// Owns its tile registry, chunk store and window state. Calls are
/// synchronous; see [`crate::service::TerrainHandle`] for a background
/// variant.
pub struct TerrainLoader {
    config: TerrainConfig,
    registry: TileRegistry,
    store: ChunkStore,
    state: Option<WindowState>,
    last_stats: LoadStats,
    warned_missing_tile: bool,
}

impl TerrainLoader {
    /// Create a loader over the SLDEM2015 tile table.
    pub fn new(config: TerrainConfig) -> Result<Self> {
        let registry = TileRegistry::sldem2015(config.layout, config.geometry.chunk_size);
        Self::with_registry(config, registry)
    }

    /// Create a loader over an explicit tile table.
    pub fn with_registry(config: TerrainConfig, registry: TileRegistry) -> Result<Self> {
        config.validate().map_err(TerrainError::config)?;
        let store = ChunkStore::new(&config);

        Ok(Self {
            config,
            registry,
            store,
            state: None,
            last_stats: LoadStats::default(),
            warned_missing_tile: false,
        })
    }

    /// Serve the window centred on `(lat, lon)`, in metres.
    ///
    /// Returns an empty window when no tile covers the centre and nothing was
    /// served before; if something was, the previous window is returned
    /// unchanged instead.
    pub fn load_or_update_terrain(
        &mut self,
        lat: f64,
        lon: f64,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<TerrainWindow> {
        if width == 0 || height == 0 {
            return Err(TerrainError::invalid_input(format!(
                "window must be at least 1x1, got {width}x{height}"
            )));
        }
        if stride == 0 {
            return Err(TerrainError::invalid_input("stride must be > 0"));
        }
        let footprint_fits = |cells: usize| {
            cells
                .checked_mul(stride)
                .is_some_and(|pixels| i64::try_from(pixels).is_ok())
        };
        if !footprint_fits(width) || !footprint_fits(height) || width.checked_mul(height).is_none() {
            return Err(TerrainError::invalid_input(format!(
                "window {width}x{height} at stride {stride} exceeds the addressable pixel range"
            )));
        }

        let Some(tile) = self.registry.find_tile(lat, lon).cloned() else {
            if !self.warned_missing_tile {
                warn!(lat, lon, "No terrain tile available for location");
                self.warned_missing_tile = true;
            }
            self.last_stats = LoadStats::new(LoadKind::Stale);
            return Ok(self.current_window());
        };

        let needs_full_load = match &self.state {
            None => true,
            Some(state) => {
                state.width != width
                    || state.height != height
                    || state.stride != stride
                    || state.tile.filename != tile.filename
            }
        };

        let request = WindowRequest::new(lat, lon, width, height, stride);
        if needs_full_load {
            self.full_load(&request, tile)?;
        } else {
            self.scroll_load(&request, tile)?;
        }

        if self.config.clear_cache_after_load {
            self.store.clear_cache();
        }

        Ok(self.current_window())
    }

    /// [`Self::load_or_update_terrain`] taking a [`WindowRequest`].
    pub fn load(&mut self, request: &WindowRequest) -> Result<TerrainWindow> {
        self.load_or_update_terrain(
            request.latitude,
            request.longitude,
            request.width,
            request.height,
            request.stride,
        )
    }

    /// Height in metres at a single coordinate, `0.0` outside coverage.
    pub fn lookup_height(&mut self, lat: f64, lon: f64) -> f32 {
        self.store.lookup_height(&self.registry, lat, lon) * KM_TO_METERS
    }

    /// Whether a window has been served.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Tile backing the current window.
    pub fn current_tile(&self) -> Option<&TileMetadata> {
        self.state.as_ref().map(|s| &s.tile)
    }

    /// Centre pixel (x, y) of the current window in its tile.
    pub fn current_center_pixel(&self) -> Option<(i64, i64)> {
        self.state.as_ref().map(|s| (s.center_x, s.center_y))
    }

    /// Centre coordinate (lat, lon) of the request the current buffer was
    /// built for. Requests that left the buffer unchanged do not move it.
    pub fn current_center(&self) -> Option<(f64, f64)> {
        self.state.as_ref().map(|s| (s.center_lat, s.center_lon))
    }

    /// Accounting for the most recent call.
    pub fn last_load_stats(&self) -> &LoadStats {
        &self.last_stats
    }

    /// Chunk store statistics.
    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// The tile table.
    pub fn registry(&self) -> &TileRegistry {
        &self.registry
    }

    /// The loader's configuration.
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Forget the current window so the next call performs a full load.
    ///
    /// Open file handles are kept; files that failed to open are retried.
    pub fn reset(&mut self) {
        self.state = None;
        self.last_stats = LoadStats::default();
        self.warned_missing_tile = false;
        self.store.clear_cache();
        self.store.forget_unavailable();
    }

    fn current_window(&self) -> TerrainWindow {
        match &self.state {
            Some(state) => TerrainWindow {
                heights: state.heights_km.iter().map(|h| h * KM_TO_METERS).collect(),
                width: state.width,
                height: state.height,
                stride: state.stride,
            },
            None => TerrainWindow::empty(),
        }
    }

    /// Place a window centred on `(lat, lon)` within `tile`.
    fn view_params(
        &self,
        tile: &TileMetadata,
        lat: f64,
        lon: f64,
        request: &WindowRequest,
    ) -> ViewParams {
        let geometry = self.config.geometry;
        let pixels_per_degree_x = geometry.tile_width as f64 / tile.longitude_span();
        let pixels_per_degree_y = geometry.tile_height as f64 / tile.latitude_span();

        let lon_offset = longitude_offset_within_tile(tile, lon);
        let clamped_lat = lat.clamp(tile.min_latitude, tile.max_latitude);

        let center_x = ((lon_offset * pixels_per_degree_x).round() as i64)
            .clamp(0, geometry.tile_width as i64 - 1);
        let center_y = (((tile.max_latitude - clamped_lat) * pixels_per_degree_y).round() as i64)
            .clamp(0, geometry.tile_height as i64 - 1);

        let (start_x, start_y) = window_start(center_x, center_y, request);

        ViewParams {
            center_x,
            center_y,
            start_x,
            start_y,
            degrees_per_pixel_x: 1.0 / pixels_per_degree_x,
            degrees_per_pixel_y: 1.0 / pixels_per_degree_y,
        }
    }

    /// Recompute every sample of the window.
    fn full_load(&mut self, request: &WindowRequest, tile: TileMetadata) -> Result<()> {
        let view = self.view_params(&tile, request.latitude, request.longitude, request);

        if !self.store.ensure_stream(&tile)? {
            warn!(tile = %tile.filename, "Primary tile unavailable, keeping previous window");
            self.last_stats = LoadStats::new(LoadKind::Stale);
            return Ok(());
        }

        info!(
            tile = %tile.filename,
            lat = request.latitude,
            lon = request.longitude,
            width = request.width,
            height = request.height,
            stride = request.stride,
            center_x = view.center_x,
            center_y = view.center_y,
            "Performing full terrain load"
        );

        let before = self.store.stats();
        let mut stats = LoadStats::new(LoadKind::Full);
        let mut heights = vec![0.0f32; request.width * request.height];
        let stride = request.stride as i64;

        for row in 0..request.height {
            let src_y = view.start_y + row as i64 * stride;
            for x in 0..request.width {
                let src_x = view.start_x + x as i64 * stride;
                heights[row * request.width + x] =
                    self.fetch_sample(&tile, &view, src_x, src_y, &mut stats);
            }
        }

        self.finish_stats(stats, &before);
        self.state = Some(WindowState {
            center_lat: request.latitude,
            center_lon: request.longitude,
            width: request.width,
            height: request.height,
            stride: request.stride,
            tile,
            center_x: view.center_x,
            center_y: view.center_y,
            heights_km: heights,
        });
        Ok(())
    }

    /// Shift the current window by whole output cells and fetch the border.
    fn scroll_load(&mut self, request: &WindowRequest, tile: TileMetadata) -> Result<()> {
        let Some(state) = self.state.as_ref() else {
            return self.full_load(request, tile);
        };

        let view = self.view_params(&state.tile, request.latitude, request.longitude, request);
        let stride = request.stride as i64;
        let (width, height) = (request.width as i64, request.height as i64);

        let shift_x = grid_shift(view.center_x - state.center_x, stride);
        let shift_y = grid_shift(view.center_y - state.center_y, stride);

        if shift_x == 0 && shift_y == 0 {
            self.last_stats = LoadStats::new(LoadKind::Unchanged);
            return Ok(());
        }

        if shift_x.abs() >= width || shift_y.abs() >= height {
            debug!(shift_x, shift_y, "Shift exceeds window, reloading");
            return self.full_load(request, tile);
        }

        debug!(shift_x, shift_y, tile = %tile.filename, "Scrolling terrain window");

        let before = self.store.stats();
        let mut stats = LoadStats::new(LoadKind::Scroll);
        let cells = request.width * request.height;
        let mut heights = vec![0.0f32; cells];
        let mut needs_fetch = vec![false; cells];

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                let old_x = x + shift_x;
                let old_y = y + shift_y;
                if (0..width).contains(&old_x) && (0..height).contains(&old_y) {
                    heights[index] = state.heights_km[(old_y * width + old_x) as usize];
                    stats.reused_samples += 1;
                } else {
                    needs_fetch[index] = true;
                }
            }
        }

        // Stay on the stride grid of the previous window.
        let center_x = state.center_x + shift_x * stride;
        let center_y = state.center_y + shift_y * stride;
        let (start_x, start_y) = window_start(center_x, center_y, request);
        let view = ViewParams {
            center_x,
            center_y,
            start_x,
            start_y,
            ..view
        };

        let tile = state.tile.clone();
        for y in 0..request.height {
            let src_y = start_y + y as i64 * stride;
            for x in 0..request.width {
                let index = y * request.width + x;
                if !needs_fetch[index] {
                    continue;
                }
                let src_x = start_x + x as i64 * stride;
                heights[index] = self.fetch_sample(&tile, &view, src_x, src_y, &mut stats);
            }
        }

        self.finish_stats(stats, &before);
        if let Some(state) = self.state.as_mut() {
            state.center_lat = request.latitude;
            state.center_lon = request.longitude;
            state.center_x = center_x;
            state.center_y = center_y;
            state.heights_km = heights;
        }
        Ok(())
    }

    /// Sample one source pixel in kilometres: primary tile when inside its
    /// raster, otherwise whichever tile covers the pixel's coordinate.
    fn fetch_sample(
        &mut self,
        tile: &TileMetadata,
        view: &ViewParams,
        src_x: i64,
        src_y: i64,
        stats: &mut LoadStats,
    ) -> f32 {
        let value = if self.config.geometry.contains_pixel(src_x, src_y) {
            stats.primary_samples += 1;
            self.store.sample(&tile.filename, src_x, src_y)
        } else {
            stats.fallback_samples += 1;
            let lat = tile.max_latitude - src_y as f64 * view.degrees_per_pixel_y;
            let lon = tile.min_longitude + src_x as f64 * view.degrees_per_pixel_x;
            self.store.sample_geodetic(&self.registry, lat, lon)
        };

        value.unwrap_or_else(|| {
            stats.missing_samples += 1;
            0.0
        })
    }

    fn finish_stats(&mut self, mut stats: LoadStats, before: &StoreStats) {
        let after = self.store.stats();
        stats.chunk_reads = after.chunk_reads - before.chunk_reads;
        stats.read_failures = after.read_failures - before.read_failures;

        let ratio = stats.missing_ratio();
        if stats.missing_samples > 0 && ratio > self.config.no_data_warn_ratio {
            warn!(
                missing = stats.missing_samples,
                fetched = stats.fetched_samples(),
                read_failures = stats.read_failures,
                ratio,
                "High no-data ratio in terrain load"
            );
        }

        debug!(
            kind = ?stats.kind,
            reused = stats.reused_samples,
            fetched = stats.fetched_samples(),
            fallback = stats.fallback_samples,
            chunk_reads = stats.chunk_reads,
            cache_hit_rate = after.cache.hit_rate(),
            "Terrain load finished"
        );
        self.last_stats = stats;
    }
}

/// Top-left source pixel of a window centred on `(center_x, center_y)`.
fn window_start(center_x: i64, center_y: i64, request: &WindowRequest) -> (i64, i64) {
    let sample_width = (request.width * request.stride) as i64;
    let sample_height = (request.height * request.stride) as i64;
    (center_x - sample_width / 2, center_y - sample_height / 2)
}

/// Pixel delta expressed in whole output cells, rounded half away from zero.
fn grid_shift(pixel_delta: i64, stride: i64) -> i64 {
    (pixel_delta as f64 / stride as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RasterGeometry;
    use std::path::Path;
    use test_utils::{create_test_grid, test_grid_value, write_chunked_tile};

    fn small_loader(root: &Path) -> TerrainLoader {
        let grid = create_test_grid(100, 100);
        write_chunked_tile(&root.join("tile.dat"), &grid, 100, 100, 10).unwrap();

        let config = TerrainConfig {
            data_root: root.to_path_buf(),
            geometry: RasterGeometry::new(100, 100, 10),
            ..TerrainConfig::default()
        };
        let registry =
            TileRegistry::new(vec![TileMetadata::new("tile.dat", 0.0, 30.0, 0.0, 45.0)]).unwrap();
        TerrainLoader::with_registry(config, registry).unwrap()
    }

    fn meters(col: usize, row: usize) -> f32 {
        test_grid_value(col, row) * KM_TO_METERS
    }

    #[test]
    fn test_grid_shift_rounds_half_away_from_zero() {
        assert_eq!(grid_shift(0, 4), 0);
        assert_eq!(grid_shift(2, 4), 1);
        assert_eq!(grid_shift(-2, 4), -1);
        assert_eq!(grid_shift(1, 4), 0);
        assert_eq!(grid_shift(-6, 4), -2);
        assert_eq!(grid_shift(7, 1), 7);
    }

    #[test]
    fn test_window_start() {
        let request = WindowRequest::new(0.0, 0.0, 4, 3, 2);
        assert_eq!(window_start(50, 50, &request), (46, 47));
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        assert!(matches!(
            loader.load_or_update_terrain(15.0, 22.5, 4, 4, 0),
            Err(TerrainError::InvalidInput(_))
        ));
        assert!(loader.load_or_update_terrain(15.0, 22.5, 0, 4, 1).is_err());
        assert!(loader.load_or_update_terrain(15.0, 22.5, 4, 0, 1).is_err());
        assert!(!loader.is_initialized());
    }

    #[test]
    fn test_oversized_footprint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        for (width, height, stride) in [
            (4, 4, usize::MAX / 2),
            (4, 4, i64::MAX as usize),
            (1, 2, i64::MAX as usize),
            (usize::MAX, 1, 1),
        ] {
            assert!(matches!(
                loader.load_or_update_terrain(15.0, 22.5, width, height, stride),
                Err(TerrainError::InvalidInput(_))
            ));
        }
        assert!(!loader.is_initialized());

        // Huge but addressable strides are still served.
        let window = loader
            .load_or_update_terrain(15.0, 22.5, 2, 1, i64::MAX as usize / 4)
            .unwrap();
        assert_eq!(window.heights.len(), 2);
    }

    #[test]
    fn test_full_load_is_centred() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        let window = loader.load_or_update_terrain(15.0, 22.5, 4, 4, 1).unwrap();
        assert_eq!((window.width, window.height, window.stride), (4, 4, 1));
        assert_eq!(loader.current_center_pixel(), Some((50, 50)));

        for row in 0..4 {
            for x in 0..4 {
                assert_eq!(window.get(x, row), Some(meters(48 + x, 48 + row)));
            }
        }
        assert_eq!(loader.last_load_stats().kind, LoadKind::Full);
        assert_eq!(loader.last_load_stats().primary_samples, 16);
    }

    #[test]
    fn test_repeat_request_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        let first = loader.load_or_update_terrain(15.0, 22.5, 4, 4, 1).unwrap();
        let second = loader.load_or_update_terrain(15.0, 22.5, 4, 4, 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.last_load_stats().kind, LoadKind::Unchanged);

        // 0.1 degrees is under half a pixel here
        let third = loader.load_or_update_terrain(15.0, 22.6, 4, 4, 1).unwrap();
        assert_eq!(first, third);
        assert_eq!(loader.last_load_stats().kind, LoadKind::Unchanged);
    }

    #[test]
    fn test_one_cell_scroll_reuses_three_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        let first = loader.load_or_update_terrain(15.0, 22.5, 4, 4, 1).unwrap();
        // 0.45 degrees east is exactly one pixel
        let second = loader.load_or_update_terrain(15.0, 22.95, 4, 4, 1).unwrap();

        let stats = loader.last_load_stats();
        assert_eq!(stats.kind, LoadKind::Scroll);
        assert_eq!(stats.reused_samples, 12);
        assert_eq!(stats.fetched_samples(), 4);
        assert_eq!(loader.current_center_pixel(), Some((51, 50)));

        for row in 0..4 {
            for x in 0..3 {
                assert_eq!(second.get(x, row), first.get(x + 1, row));
            }
            assert_eq!(second.get(3, row), Some(meters(52, 48 + row)));
        }
    }

    #[test]
    fn test_missing_tile_returns_previous_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        let empty = loader.load_or_update_terrain(75.0, 10.0, 4, 4, 1).unwrap();
        assert!(empty.is_empty());
        assert_eq!(loader.last_load_stats().kind, LoadKind::Stale);

        let first = loader.load_or_update_terrain(15.0, 22.5, 4, 4, 1).unwrap();
        let stale = loader.load_or_update_terrain(75.0, 10.0, 4, 4, 1).unwrap();
        assert_eq!(first, stale);
        assert!(loader.is_initialized());
    }

    #[test]
    fn test_reset_forces_full_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        loader.load_or_update_terrain(15.0, 22.5, 4, 4, 1).unwrap();
        loader.reset();
        assert!(!loader.is_initialized());

        loader.load_or_update_terrain(15.0, 22.5, 4, 4, 1).unwrap();
        assert_eq!(loader.last_load_stats().kind, LoadKind::Full);
    }

    #[test]
    fn test_caches_are_cleared_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        loader.load_or_update_terrain(15.0, 22.5, 8, 8, 3).unwrap();
        let stats = loader.store_stats();
        assert_eq!(stats.cache.entries, 0);
        assert!(stats.chunk_reads > 0);
        assert_eq!(stats.open_streams, 1);
    }

    #[test]
    fn test_lookup_height_in_meters() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = small_loader(dir.path());

        // row = (30 - 15) * 100/30 = 50, col = 9 * 100/45 = 20
        assert_eq!(loader.lookup_height(15.0, 9.0), meters(20, 50));
        assert_eq!(loader.lookup_height(-45.0, 9.0), 0.0);
    }
}
