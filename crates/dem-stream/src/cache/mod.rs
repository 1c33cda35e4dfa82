//! Cache implementations for decoded terrain chunks.

mod chunk_cache;

pub use chunk_cache::{tile_id, ChunkCache, ChunkKey};
