//! Error types shared by the tile pipeline

use crate::tile::TileKey;

/// Boxed error reported by a tile generator
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for tile operations
pub type TileResult<T> = Result<T, TileError>;

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("invalid viewport: {0}")]
    InvalidViewport(String),
    #[error("tile index ({col}, {row}) out of range for index order {order}")]
    IndexOutOfRange { col: i64, row: i64, order: u32 },
    #[error("index order {0} is not supported (expected 1..=31)")]
    InvalidOrder(u32),
    #[error("curve key {key} out of range for index order {order}")]
    KeyOutOfRange { key: u64, order: u32 },
    #[error("viewport covers {count} tiles, more than the {limit} allowed per pass")]
    TooManyTiles { count: u64, limit: u64 },
    #[error("generation failed for tile {key}: {source}")]
    GenerationFailed {
        key: TileKey,
        #[source]
        source: BoxError,
    },
}

impl TileError {
    /// Wrap a generator failure for `key`
    pub fn generation_failed(key: TileKey, source: impl Into<BoxError>) -> Self {
        TileError::GenerationFailed { key, source: source.into() }
    }

    /// True for errors raised before the cache is touched
    pub fn is_layout_error(&self) -> bool {
        !matches!(self, TileError::GenerationFailed { .. })
    }
}
