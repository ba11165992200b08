//! Viewport compositor
//!
//! Drives one complete redraw for a viewport: computes the covering tile
//! range, orders it along the Hilbert curve, fills cache misses through the
//! caller's generator and hands every visible tile to the caller's draw
//! callback at its pixel placement.
//!
//! Each `draw` is an independent pass. Nothing is tracked between passes
//! except the cached tiles themselves.

use serde::Serialize;
use std::sync::Arc;
use tilecache_cache::{CacheConfig, CacheStats, Capacity, ConfigError, EvictionHook, TileStore};
use tilecache_render::{
    BoxError, CoordinateMapper, DataRect, SpaceFillingIndex, Tile, TileError, TileKey, TileRange,
    TileRequest, TileResult, Viewport,
};

/// Per-pass counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrawStats {
    /// Tiles passed to the draw callback
    pub tiles_drawn: usize,

    /// Generator invocations that succeeded
    pub generated: usize,

    /// Tiles served from the cache
    pub hits: usize,

    /// Entries evicted while filling misses
    pub evictions: u64,
}

/// Orchestrates tile generation and drawing for a viewport
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
/// use tilecache_cache::CacheConfig;
/// use tilecache_compositor::ViewportCompositor;
/// use tilecache_render::{DataRect, TileRequest, Viewport};
///
/// let compositor: ViewportCompositor<DataRect> =
///     ViewportCompositor::from_config(&CacheConfig::new(64, 64, 64))?;
/// let viewport = Viewport::new(400, 300, DataRect::new(0.0, 0.0, 10.0, 10.0));
///
/// let mut placed = Vec::new();
/// let stats = compositor
///     .draw(
///         &viewport,
///         |req: &TileRequest| Ok::<_, Infallible>(req.bounds),
///         |x, y, _bounds| placed.push((x, y)),
///     )
///     .unwrap();
///
/// assert_eq!(stats.tiles_drawn, 35);
/// assert_eq!(placed.len(), 35);
/// # Ok::<(), tilecache_cache::ConfigError>(())
/// ```
pub struct ViewportCompositor<C> {
    store: TileStore<TileKey, Tile<C>>,
    index: SpaceFillingIndex,
    tile_width: i32,
    tile_height: i32,
}

impl<C> ViewportCompositor<C> {
    /// Create a compositor with an empty cache
    pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let index = SpaceFillingIndex::new(config.index_order)
            .map_err(|_| ConfigError::InvalidValue("index_order".to_string()))?;

        Ok(Self {
            store: TileStore::new(config.capacity()),
            index,
            tile_width: config.tile_width,
            tile_height: config.tile_height,
        })
    }

    /// Forward evicted tiles to `hook`, e.g. to recycle pixel buffers
    pub fn with_eviction_hook(mut self, hook: EvictionHook<TileKey, Tile<C>>) -> Self {
        self.store = self.store.with_eviction_hook(hook);
        self
    }

    /// Redraw `viewport`
    ///
    /// Tiles are generated and drawn in ascending Hilbert order. Invalid
    /// viewports, grids beyond the index order and grids of more than
    /// [`MAX_TRAVERSAL_TILES`](tilecache_render::MAX_TRAVERSAL_TILES) tiles
    /// fail before the cache is touched. If the generator fails, tiles
    /// earlier in the traversal have already been drawn, the failing tile is
    /// not cached and the error is returned as `GenerationFailed`.
    pub fn draw<G, E, D>(
        &self,
        viewport: &Viewport,
        mut generator: G,
        mut draw: D,
    ) -> TileResult<DrawStats>
    where
        G: FnMut(&TileRequest) -> Result<C, E>,
        E: Into<BoxError>,
        D: FnMut(f64, f64, &C),
    {
        let mapper = CoordinateMapper::new(*viewport, self.tile_width, self.tile_height)?;
        let range = mapper.tile_index_range();
        let traversal = self.index.order_range(&range)?;

        let span = tracing::debug_span!("draw", cols = range.width(), rows = range.height());
        let _enter = span.enter();

        let evictions_before = self.store.stats().evictions;

        // Hits are resolved before any generation so that this pass's own
        // misses cannot evict a tile that was cached when the pass started.
        let resolved: Vec<(TileKey, DataRect, Option<Arc<Tile<C>>>)> = traversal
            .into_iter()
            .map(|key| {
                let bounds = mapper.tile_data_bounds(key);
                let hit = self
                    .store
                    .peek(&key)
                    .filter(|tile| tile.matches(&bounds))
                    .and_then(|_| self.store.get_if(&key, |tile| tile.matches(&bounds)));
                (key, bounds, hit)
            })
            .collect();

        let mut stats = DrawStats::default();

        for (key, bounds, hit) in resolved {
            let tile = match hit {
                Some(tile) => {
                    stats.hits += 1;
                    tile
                }
                None => {
                    let request = TileRequest {
                        key,
                        bounds,
                        pixel_width: self.tile_width,
                        pixel_height: self.tile_height,
                    };
                    let mut generated = false;
                    let result = self.store.get_or_create_if(
                        key,
                        |tile| tile.matches(&bounds),
                        |_| {
                            generated = true;
                            generator(&request).map(|content| Tile::new(key, bounds, content))
                        },
                    );

                    match result {
                        Ok(tile) => {
                            if generated {
                                stats.generated += 1;
                            } else {
                                stats.hits += 1;
                            }
                            tile
                        }
                        Err(error) => {
                            let error = TileError::generation_failed(key, error);
                            tracing::warn!(
                                %key,
                                %error,
                                drawn = stats.tiles_drawn,
                                "aborting draw pass"
                            );
                            return Err(error);
                        }
                    }
                }
            };

            let placement = mapper.tile_placement(key);
            draw(placement.x, placement.y, &tile.content);
            stats.tiles_drawn += 1;
        }

        stats.evictions = self.store.stats().evictions - evictions_before;
        tracing::debug!(
            drawn = stats.tiles_drawn,
            generated = stats.generated,
            hits = stats.hits,
            evictions = stats.evictions,
            "draw pass complete"
        );

        Ok(stats)
    }

    /// Drop the cached tile at `key`
    pub fn invalidate(&self, key: TileKey) -> bool {
        self.store.invalidate(&key).is_some()
    }

    /// Drop every cached tile inside `range`
    pub fn invalidate_region(&self, range: &TileRange) -> usize {
        self.store.invalidate_where(|key, _| range.contains(key))
    }

    /// Drop every cached tile whose data bounds overlap `rect`
    ///
    /// Used when the underlying data changes in a known area.
    pub fn invalidate_data(&self, rect: &DataRect) -> usize {
        self.store.invalidate_where(|_, tile| tile.bounds.intersects(rect))
    }

    /// Drop all cached tiles
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Check whether `key` is cached, without touching recency
    pub fn is_cached(&self, key: TileKey) -> bool {
        self.store.contains(&key)
    }

    /// Cached keys from least to most recently used
    pub fn cached_keys(&self) -> Vec<TileKey> {
        self.store.keys_lru_order()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn capacity(&self) -> Capacity {
        self.store.capacity()
    }

    pub fn tile_size(&self) -> (i32, i32) {
        (self.tile_width, self.tile_height)
    }

    pub fn index(&self) -> &SpaceFillingIndex {
        &self.index
    }
}
