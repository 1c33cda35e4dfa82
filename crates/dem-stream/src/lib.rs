//! Streaming Access to Tiled Lunar DEM Data
//!
//! This crate serves a moving window of height samples out of a fixed set of
//! large digital elevation model tiles. It enables:
//!
//! - **Partial reads**: Only the chunks under the window are read from disk
//! - **Incremental scrolling**: Small moves reuse the overlapping samples
//! - **Seamless coverage**: Samples past a tile edge resolve their own tile
//!
//! # Architecture
//!
//! ```text
//! Camera moves
//!      │
//!      ▼
//! TerrainLoader::load_or_update_terrain(lat, lon, w, h, stride)
//!      │
//!      ├─► TileRegistry::find_tile (lat/lon → tile)
//!      │
//!      ├─► Full load or scroll load
//!      │         │
//!      │         └─► ChunkStore::sample
//!      │                   │
//!      │                   ├─► ChunkCache hit: decoded chunk
//!      │                   │
//!      │                   └─► Cache miss: seek + read one chunk
//!      │
//!      └─► Clear chunk cache, return heights in metres
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dem_stream::{TerrainConfig, TerrainLoader};
//!
//! let config = TerrainConfig::with_data_root("/data/sldem2015");
//! let mut loader = TerrainLoader::new(config)?;
//!
//! let window = loader.load_or_update_terrain(-12.5, 187.0, 256, 256, 4)?;
//! for row in 0..window.height {
//!     // window.heights[row * window.width + x]
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod sampler;
pub mod service;
pub mod store;
pub mod types;
pub mod window;
pub mod writer;

// Re-export commonly used types at crate root
pub use cache::{ChunkCache, ChunkKey};
pub use config::TerrainConfig;
pub use error::{Result, TerrainError};
pub use registry::{wrap_longitude, TileMetadata, TileRegistry};
pub use sampler::{RegionRequest, RegionSample, RegionSampler};
pub use service::{PendingWindow, ServiceStats, TerrainHandle};
pub use store::ChunkStore;
pub use types::{
    CacheStats, LoadKind, LoadStats, RasterGeometry, StoreStats, TerrainWindow, TileLayout,
    WindowRequest,
};
pub use window::TerrainLoader;
pub use writer::{convert_directory, convert_tile, ConvertReport};
