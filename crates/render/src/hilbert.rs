//! Hilbert curve ordering for tile traversal
//!
//! Maps a (col, row) tile index to a single scalar such that tiles close to
//! each other on the grid get close keys. The compositor sorts the visible
//! tiles by this key so misses are generated in a spatially coherent order.
//! The cache itself is keyed by the raw `TileKey`, not by the curve key.

use crate::error::{TileError, TileResult};
use crate::tile::{TileKey, TileRange};

/// Default curve order (65536 tiles per axis)
pub const DEFAULT_ORDER: u32 = 16;

/// Largest supported order; keys then use 62 bits
pub const MAX_ORDER: u32 = 31;

/// Most tiles a single traversal may enumerate
pub const MAX_TRAVERSAL_TILES: u64 = 1 << 20;

/// Hilbert curve over a `2^order` x `2^order` grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceFillingIndex {
    order: u32,
}

impl SpaceFillingIndex {
    /// Create an index for the given order (1..=31)
    pub fn new(order: u32) -> TileResult<Self> {
        if order == 0 || order > MAX_ORDER {
            return Err(TileError::InvalidOrder(order));
        }
        Ok(Self { order })
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Number of cells along each axis
    pub fn side(&self) -> u64 {
        1u64 << self.order
    }

    fn check_coordinate(&self, col: i64, row: i64) -> TileResult<()> {
        let side = self.side() as i64;
        if !(0..side).contains(&col) || !(0..side).contains(&row) {
            return Err(TileError::IndexOutOfRange { col, row, order: self.order });
        }
        Ok(())
    }

    /// Encode a tile index to its position along the curve
    pub fn encode(&self, col: i32, row: i32) -> TileResult<u64> {
        self.check_coordinate(col as i64, row as i64)?;

        let n = self.side();
        let (mut x, mut y) = (col as u64, row as u64);
        let mut d = 0u64;
        let mut s = n / 2;

        while s > 0 {
            let rx = u64::from(x & s != 0);
            let ry = u64::from(y & s != 0);
            d += s * s * ((3 * rx) ^ ry);
            rotate(n, &mut x, &mut y, rx, ry);
            s /= 2;
        }

        Ok(d)
    }

    /// Decode a curve position back to its tile index
    pub fn decode(&self, key: u64) -> TileResult<(i32, i32)> {
        let n = self.side();
        if key >= n * n {
            return Err(TileError::KeyOutOfRange { key, order: self.order });
        }

        let (mut x, mut y) = (0u64, 0u64);
        let mut t = key;
        let mut s = 1u64;

        while s < n {
            let rx = 1 & (t / 2);
            let ry = 1 & (t ^ rx);
            rotate(s, &mut x, &mut y, rx, ry);
            x += s * rx;
            y += s * ry;
            t /= 4;
            s *= 2;
        }

        Ok((x as i32, y as i32))
    }

    /// Encode a `TileKey`
    pub fn encode_key(&self, key: TileKey) -> TileResult<u64> {
        self.encode(key.col, key.row)
    }

    /// All keys of `range` sorted by ascending curve position
    ///
    /// The whole range is checked before anything is enumerated, so an
    /// out-of-range or oversized grid fails without partial output.
    pub fn order_range(&self, range: &TileRange) -> TileResult<Vec<TileKey>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.check_coordinate(range.min_col as i64, range.min_row as i64)?;
        self.check_coordinate(range.max_col as i64, range.max_row as i64)?;

        let count = range.width() as u64 * range.height() as u64;
        if count > MAX_TRAVERSAL_TILES {
            return Err(TileError::TooManyTiles { count, limit: MAX_TRAVERSAL_TILES });
        }

        let mut keyed = range
            .iter()
            .map(|key| self.encode_key(key).map(|code| (code, key)))
            .collect::<TileResult<Vec<_>>>()?;
        keyed.sort_unstable_by_key(|(code, _)| *code);

        Ok(keyed.into_iter().map(|(_, key)| key).collect())
    }
}

impl Default for SpaceFillingIndex {
    fn default() -> Self {
        Self { order: DEFAULT_ORDER }
    }
}

/// Rotate/flip a quadrant so the sub-curve has the right orientation
#[inline]
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}
