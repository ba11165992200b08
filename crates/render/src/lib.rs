//! Tile Cache Render Library
//!
//! Tile geometry, viewport coordinate mapping and the Hilbert traversal order
//! used by the tile cache.

pub mod error;
pub mod hilbert;
pub mod tile;
pub mod viewport;

pub use error::{BoxError, TileError, TileResult};
pub use hilbert::{SpaceFillingIndex, DEFAULT_ORDER, MAX_ORDER, MAX_TRAVERSAL_TILES};
pub use tile::{DataRect, Tile, TileKey, TilePlacement, TileRange, TileRequest, TILE_SIZE};
pub use viewport::{pixel_to_tile_index, tile_index_range, CoordinateMapper, Viewport};
