//! Tile Cache Library
//!
//! Bounded tile store with LRU eviction and the cache configuration.

pub mod config;
pub mod store;

pub use config::{CacheConfig, ConfigError};
pub use store::{CacheStats, Capacity, EvictionHook, TileStore};
