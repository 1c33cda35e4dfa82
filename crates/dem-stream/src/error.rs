//! Error types for terrain streaming.

use thiserror::Error;

/// Errors that can occur while resolving tiles or loading height windows.
///
/// Missing data (coordinates outside the covered band, unreadable chunks) is
/// never reported through this type; it surfaces as a `0.0` sample or a stale
/// window instead.
#[derive(Error, Debug)]
pub enum TerrainError {
    /// A caller passed a window size, stride or resolution that cannot be served.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Tile metadata with a zero or non-finite extent.
    #[error("invalid tile metadata for {tile}: {reason}")]
    InvalidTile {
        tile: String,
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The background terrain worker has stopped.
    #[error("terrain service is closed")]
    ServiceClosed,

    /// The background terrain worker's request queue is full.
    #[error("terrain service queue is full")]
    ServiceBusy,
}

impl TerrainError {
    /// Create an InvalidInput error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an InvalidTile error.
    pub fn invalid_tile(tile: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTile {
            tile: tile.into(),
            reason: reason.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<std::io::Error> for TerrainError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_yaml::Error> for TerrainError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for terrain operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
