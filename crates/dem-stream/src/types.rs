//! Core types for terrain streaming.

use serde::{Deserialize, Serialize};

/// Size in bytes of one on-disk sample (little-endian `f32`).
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Factor from on-disk kilometres to the metres handed to callers.
pub const KM_TO_METERS: f32 = 1000.0;

/// Pixel dimensions shared by every tile raster and its chunk grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterGeometry {
    /// Tile width in pixels.
    pub tile_width: usize,
    /// Tile height in pixels.
    pub tile_height: usize,
    /// Edge length of a square chunk in pixels.
    pub chunk_size: usize,
}

impl Default for RasterGeometry {
    fn default() -> Self {
        Self {
            tile_width: 23040,
            tile_height: 15360,
            chunk_size: 512,
        }
    }
}

impl RasterGeometry {
    /// Create a new geometry.
    pub fn new(tile_width: usize, tile_height: usize, chunk_size: usize) -> Self {
        Self {
            tile_width,
            tile_height,
            chunk_size,
        }
    }

    /// Check that the chunk grid tiles the raster exactly.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err("tile dimensions must be > 0".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }
        if self.tile_width % self.chunk_size != 0 || self.tile_height % self.chunk_size != 0 {
            return Err(format!(
                "tile {}x{} is not a multiple of chunk_size {}",
                self.tile_width, self.tile_height, self.chunk_size
            ));
        }
        Ok(())
    }

    /// Number of chunks along each axis (x, y).
    pub fn num_chunks(&self) -> (usize, usize) {
        (
            self.tile_width / self.chunk_size,
            self.tile_height / self.chunk_size,
        )
    }

    /// Samples per chunk.
    pub fn chunk_len(&self) -> usize {
        self.chunk_size * self.chunk_size
    }

    /// Bytes per chunk on disk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_len() * SAMPLE_BYTES
    }

    /// Bytes per tile file.
    pub fn tile_bytes(&self) -> u64 {
        (self.tile_width as u64) * (self.tile_height as u64) * SAMPLE_BYTES as u64
    }

    /// Whether an absolute pixel lies inside the tile raster.
    #[inline]
    pub fn contains_pixel(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u64) < self.tile_width as u64 && (y as u64) < self.tile_height as u64
    }
}

/// On-disk arrangement of a tile's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileLayout {
    /// Chunks concatenated in row-major chunk order, each chunk row-major.
    #[default]
    Chunked,
    /// Plain row-major raster with no header.
    Raw,
}

impl TileLayout {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "raw" | "float" | "img" => Self::Raw,
            _ => Self::Chunked,
        }
    }

    /// Get the layout name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunked => "chunked",
            Self::Raw => "raw",
        }
    }
}

impl std::fmt::Display for TileLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statistics about the chunk cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Statistics about a chunk store's disk traffic.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub cache: CacheStats,
    /// Chunks read from disk successfully.
    pub chunk_reads: u64,
    /// Chunk reads that came back short or failed.
    pub read_failures: u64,
    /// Open tile file handles.
    pub open_streams: usize,
}

/// How the engine produced the last window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadKind {
    /// Nothing has been served yet.
    #[default]
    None,
    /// Every sample was fetched.
    Full,
    /// The overlap with the previous window was reused.
    Scroll,
    /// The request mapped onto the previous window exactly.
    Unchanged,
    /// No tile resolved; the previous window (or nothing) was returned.
    Stale,
}

/// Per-call accounting for a window load.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    pub kind: LoadKind,
    /// Samples copied from the previous window.
    pub reused_samples: usize,
    /// Samples served from the primary tile.
    pub primary_samples: usize,
    /// Samples resolved through another tile.
    pub fallback_samples: usize,
    /// Fetched samples that had no data and defaulted to 0.0.
    pub missing_samples: usize,
    /// Chunks read from disk during the call.
    pub chunk_reads: u64,
    /// Chunk reads that failed during the call.
    pub read_failures: u64,
}

impl LoadStats {
    pub(crate) fn new(kind: LoadKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Samples fetched (not reused) during the call.
    pub fn fetched_samples(&self) -> usize {
        self.primary_samples + self.fallback_samples
    }

    /// Fraction of fetched samples that had no data (0.0 - 1.0).
    pub fn missing_ratio(&self) -> f64 {
        let fetched = self.fetched_samples();
        if fetched == 0 {
            0.0
        } else {
            self.missing_samples as f64 / fetched as f64
        }
    }
}

/// A window request: centre coordinate, size in samples and stride in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
}

impl WindowRequest {
    /// Create a new request.
    pub fn new(latitude: f64, longitude: f64, width: usize, height: usize, stride: usize) -> Self {
        Self {
            latitude,
            longitude,
            width,
            height,
            stride,
        }
    }
}

/// Height samples served to a caller, in metres.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainWindow {
    /// Row-major samples, `heights[row * width + x]`.
    pub heights: Vec<f32>,
    /// Samples per row.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Source pixels between adjacent samples.
    pub stride: usize,
}

impl TerrainWindow {
    /// The "no tile, no prior state" result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if the window carries no samples.
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Get the sample at a window coordinate.
    pub fn get(&self, x: usize, row: usize) -> Option<f32> {
        if x >= self.width || row >= self.height {
            return None;
        }
        self.heights.get(row * self.width + x).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let geometry = RasterGeometry::default();
        assert!(geometry.validate().is_ok());
        assert_eq!(geometry.num_chunks(), (45, 30));
        assert_eq!(geometry.chunk_bytes(), 512 * 512 * 4);
    }

    #[test]
    fn test_geometry_validation() {
        assert!(RasterGeometry::new(100, 100, 10).validate().is_ok());
        assert!(RasterGeometry::new(100, 105, 10).validate().is_err());
        assert!(RasterGeometry::new(100, 100, 0).validate().is_err());
        assert!(RasterGeometry::new(0, 100, 10).validate().is_err());
    }

    #[test]
    fn test_contains_pixel() {
        let geometry = RasterGeometry::new(100, 50, 10);
        assert!(geometry.contains_pixel(0, 0));
        assert!(geometry.contains_pixel(99, 49));
        assert!(!geometry.contains_pixel(100, 0));
        assert!(!geometry.contains_pixel(0, 50));
        assert!(!geometry.contains_pixel(-1, 10));
    }

    #[test]
    fn test_tile_layout_from_str() {
        assert_eq!(TileLayout::from_str("RAW"), TileLayout::Raw);
        assert_eq!(TileLayout::from_str("chunked"), TileLayout::Chunked);
        assert_eq!(TileLayout::from_str("other"), TileLayout::Chunked);
    }

    #[test]
    fn test_missing_ratio() {
        let mut stats = LoadStats::new(LoadKind::Full);
        assert_eq!(stats.missing_ratio(), 0.0);

        stats.primary_samples = 6;
        stats.fallback_samples = 2;
        stats.missing_samples = 2;
        assert!((stats.missing_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_window_get() {
        let window = TerrainWindow {
            heights: (0..6).map(|v| v as f32).collect(),
            width: 3,
            height: 2,
            stride: 1,
        };
        assert_eq!(window.get(2, 1), Some(5.0));
        assert_eq!(window.get(3, 0), None);
        assert!(TerrainWindow::empty().is_empty());
    }
}
