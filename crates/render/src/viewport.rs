//! Viewport state and coordinate mapping
//!
//! Converts between three coordinate spaces:
//! 1. Data space - the chart or map coordinates the viewport looks at
//! 2. Pixel space - the viewport's raster, origin at (0, 0)
//! 3. Tile-index space - pixel space quantized by the tile size
//!
//! The tile grid is anchored at the viewport's pixel origin and is recomputed
//! for every draw pass.

use crate::error::{TileError, TileResult};
use crate::tile::{DataRect, TileKey, TilePlacement, TileRange};

/// Visible window into data space
///
/// The reversal flags only choose which data extreme maps to which pixel
/// extreme. An inverted or empty data range is invalid, not a reversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width of the viewport raster in pixels
    pub pixel_width: i32,

    /// Height of the viewport raster in pixels
    pub pixel_height: i32,

    /// Data-space window
    pub data: DataRect,

    /// Pixel X decreases as data X increases
    pub x_reversed: bool,

    /// Pixel Y decreases as data Y increases
    pub y_reversed: bool,
}

impl Viewport {
    /// Create a new viewport with no axis reversal
    pub fn new(pixel_width: i32, pixel_height: i32, data: DataRect) -> Self {
        Self { pixel_width, pixel_height, data, x_reversed: false, y_reversed: false }
    }

    /// Set horizontal axis reversal
    pub fn with_x_reversed(mut self, reversed: bool) -> Self {
        self.x_reversed = reversed;
        self
    }

    /// Set vertical axis reversal
    pub fn with_y_reversed(mut self, reversed: bool) -> Self {
        self.y_reversed = reversed;
        self
    }

    /// Data units covered by one pixel along each axis
    pub fn data_per_pixel(&self) -> (f64, f64) {
        (
            self.data.width() / self.pixel_width as f64,
            self.data.height() / self.pixel_height as f64,
        )
    }

    /// Shift the viewport by a pixel offset, keeping its size
    ///
    /// Positive `dx` moves the view towards increasing pixel X, which is
    /// decreasing data X when the axis is reversed.
    pub fn pan_pixels(&self, dx: f64, dy: f64) -> Self {
        let (sx, sy) = self.data_per_pixel();
        let data_dx = if self.x_reversed { -dx * sx } else { dx * sx };
        let data_dy = if self.y_reversed { -dy * sy } else { dy * sy };
        Self { data: self.data.translate(data_dx, data_dy), ..*self }
    }

    /// Check the viewport invariants
    pub fn validate(&self) -> TileResult<()> {
        if self.pixel_width <= 0 || self.pixel_height <= 0 {
            return Err(TileError::InvalidViewport(format!(
                "pixel size must be positive, got {}x{}",
                self.pixel_width, self.pixel_height
            )));
        }

        let d = &self.data;
        if ![d.min_x, d.min_y, d.max_x, d.max_y].iter().all(|v| v.is_finite()) {
            return Err(TileError::InvalidViewport("data bounds must be finite".to_string()));
        }

        if d.max_x <= d.min_x || d.max_y <= d.min_y {
            return Err(TileError::InvalidViewport(format!(
                "data bounds must satisfy min < max, got x {}..{} y {}..{}",
                d.min_x, d.max_x, d.min_y, d.max_y
            )));
        }

        Ok(())
    }
}

fn validate_tile_size(tile_width: i32, tile_height: i32) -> TileResult<()> {
    if tile_width <= 0 || tile_height <= 0 {
        return Err(TileError::InvalidViewport(format!(
            "tile size must be positive, got {}x{}",
            tile_width, tile_height
        )));
    }
    Ok(())
}

/// Quantize a pixel position to the tile containing it
pub fn pixel_to_tile_index(
    pixel_x: f64,
    pixel_y: f64,
    tile_width: i32,
    tile_height: i32,
) -> TileResult<TileKey> {
    validate_tile_size(tile_width, tile_height)?;
    let col = (pixel_x / tile_width as f64).floor() as i32;
    let row = (pixel_y / tile_height as f64).floor() as i32;
    Ok(TileKey::new(col, row))
}

/// Minimal inclusive range of tiles whose footprints intersect the viewport
///
/// Partially covered edge tiles are included.
pub fn tile_index_range(
    viewport: &Viewport,
    tile_width: i32,
    tile_height: i32,
) -> TileResult<TileRange> {
    viewport.validate()?;
    validate_tile_size(tile_width, tile_height)?;

    Ok(covering_range(viewport, tile_width, tile_height))
}

// Callers have validated that every size is positive.
fn covering_range(viewport: &Viewport, tile_width: i32, tile_height: i32) -> TileRange {
    let cols = (viewport.pixel_width as u32).div_ceil(tile_width as u32);
    let rows = (viewport.pixel_height as u32).div_ceil(tile_height as u32);
    TileRange::new(0, 0, cols as i32 - 1, rows as i32 - 1)
}

/// Coordinate mapper bound to one viewport and tile size
///
/// # Example
///
/// ```
/// use tilecache_render::{CoordinateMapper, DataRect, TileKey, Viewport};
///
/// let viewport = Viewport::new(400, 400, DataRect::new(0.0, 0.0, 10.0, 10.0));
/// let mapper = CoordinateMapper::new(viewport, 64, 64)?;
///
/// assert_eq!(mapper.data_to_pixel(5.0, 5.0), (200.0, 200.0));
/// assert_eq!(mapper.pixel_to_tile_index(130.0, 10.0), TileKey::new(2, 0));
/// assert_eq!(mapper.tile_index_range().len(), 49);
/// # Ok::<(), tilecache_render::TileError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    viewport: Viewport,
    tile_width: i32,
    tile_height: i32,
}

impl CoordinateMapper {
    /// Create a mapper, validating the viewport and tile size
    pub fn new(viewport: Viewport, tile_width: i32, tile_height: i32) -> TileResult<Self> {
        viewport.validate()?;
        validate_tile_size(tile_width, tile_height)?;
        Ok(Self { viewport, tile_width, tile_height })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn tile_size(&self) -> (i32, i32) {
        (self.tile_width, self.tile_height)
    }

    /// Map a data-space point to pixel space
    pub fn data_to_pixel(&self, data_x: f64, data_y: f64) -> (f64, f64) {
        let vp = &self.viewport;
        let d = &vp.data;

        let tx = if vp.x_reversed {
            (d.max_x - data_x) / d.width()
        } else {
            (data_x - d.min_x) / d.width()
        };
        let ty = if vp.y_reversed {
            (d.max_y - data_y) / d.height()
        } else {
            (data_y - d.min_y) / d.height()
        };

        (tx * vp.pixel_width as f64, ty * vp.pixel_height as f64)
    }

    /// Map a pixel-space point back to data space
    pub fn pixel_to_data(&self, pixel_x: f64, pixel_y: f64) -> (f64, f64) {
        let vp = &self.viewport;
        let d = &vp.data;

        let tx = pixel_x / vp.pixel_width as f64;
        let ty = pixel_y / vp.pixel_height as f64;

        let x = if vp.x_reversed { d.max_x - tx * d.width() } else { d.min_x + tx * d.width() };
        let y = if vp.y_reversed { d.max_y - ty * d.height() } else { d.min_y + ty * d.height() };

        (x, y)
    }

    /// Tile containing a pixel position
    pub fn pixel_to_tile_index(&self, pixel_x: f64, pixel_y: f64) -> TileKey {
        let col = (pixel_x / self.tile_width as f64).floor() as i32;
        let row = (pixel_y / self.tile_height as f64).floor() as i32;
        TileKey::new(col, row)
    }

    /// Tiles covering the viewport
    pub fn tile_index_range(&self) -> TileRange {
        covering_range(&self.viewport, self.tile_width, self.tile_height)
    }

    /// Pixel position of a tile's top-left corner
    pub fn tile_placement(&self, key: TileKey) -> TilePlacement {
        let (x, y) = key.to_pixel_offset(self.tile_width, self.tile_height);
        TilePlacement { x, y }
    }

    /// Data rectangle under a tile's pixel footprint
    ///
    /// Normalized so that min < max on both axes, whatever the reversal.
    pub fn tile_data_bounds(&self, key: TileKey) -> DataRect {
        let TilePlacement { x, y } = self.tile_placement(key);
        let a = self.pixel_to_data(x, y);
        let b = self.pixel_to_data(x + self.tile_width as f64, y + self.tile_height as f64);
        DataRect::from_corners(a, b)
    }
}
