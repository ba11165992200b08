//! Tile identities and geometry
//!
//! Divides a viewport into fixed-size tiles addressed by integer column/row
//! indices. Tile (0, 0) is the top-left tile of the viewport's pixel grid.

use serde::Serialize;
use std::fmt;

/// Default tile size in pixels (256x256)
pub const TILE_SIZE: i32 = 256;

/// Tile coordinates within the viewport's tile grid
///
/// Used as the storage key of the tile cache. Keys are plain values and are
/// never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileKey {
    pub col: i32,
    pub row: i32,
}

impl TileKey {
    /// Create a new tile key
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Convert the key to the pixel offset of its top-left corner
    pub fn to_pixel_offset(&self, tile_width: i32, tile_height: i32) -> (f64, f64) {
        (self.col as f64 * tile_width as f64, self.row as f64 * tile_height as f64)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

impl From<(i32, i32)> for TileKey {
    fn from((col, row): (i32, i32)) -> Self {
        Self::new(col, row)
    }
}

/// Axis-aligned rectangle in data space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl DataRect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Build a rectangle from two corners in any order
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self::new(a.0.min(b.0), a.1.min(b.1), a.0.max(b.0), a.1.max(b.1))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Translate the rectangle by a data-space offset
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.min_x + dx, self.min_y + dy, self.max_x + dx, self.max_y + dy)
    }

    /// Check whether two rectangles share interior area
    pub fn intersects(&self, other: &DataRect) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// Inclusive rectangle of tile indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileRange {
    pub min_col: i32,
    pub min_row: i32,
    pub max_col: i32,
    pub max_row: i32,
}

impl TileRange {
    pub fn new(min_col: i32, min_row: i32, max_col: i32, max_row: i32) -> Self {
        Self { min_col, min_row, max_col, max_row }
    }

    /// Number of columns in the range
    pub fn width(&self) -> usize {
        (self.max_col as i64 - self.min_col as i64 + 1).max(0) as usize
    }

    /// Number of rows in the range
    pub fn height(&self) -> usize {
        (self.max_row as i64 - self.min_row as i64 + 1).max(0) as usize
    }

    /// Total number of tiles in the range
    pub fn len(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        (self.min_col..=self.max_col).contains(&key.col)
            && (self.min_row..=self.max_row).contains(&key.row)
    }

    /// Iterate over every key in row-major order
    pub fn iter(&self) -> impl Iterator<Item = TileKey> + '_ {
        (self.min_row..=self.max_row)
            .flat_map(move |row| {
                (self.min_col..=self.max_col).map(move |col| TileKey::new(col, row))
            })
    }
}

/// Pixel-space position of a tile's top-left corner for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlacement {
    pub x: f64,
    pub y: f64,
}

/// Everything a generator needs to rasterize one tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRequest {
    /// Tile being generated
    pub key: TileKey,

    /// Data-space rectangle covered by the tile
    pub bounds: DataRect,

    /// Width of the tile raster in pixels
    pub pixel_width: i32,

    /// Height of the tile raster in pixels
    pub pixel_height: i32,
}

/// Cached tile
///
/// Owns the generated content together with the data bounds it was generated
/// for. Placement is recomputed every frame and is not stored here.
#[derive(Debug, Clone)]
pub struct Tile<C> {
    pub key: TileKey,
    pub bounds: DataRect,
    pub content: C,
}

impl<C> Tile<C> {
    pub fn new(key: TileKey, bounds: DataRect, content: C) -> Self {
        Self { key, bounds, content }
    }

    /// Check whether this tile was generated for `bounds`
    pub fn matches(&self, bounds: &DataRect) -> bool {
        self.bounds == *bounds
    }
}
