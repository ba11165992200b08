//! Cache configuration
//!
//! Construction-time settings for the tile cache: entry capacity, tile size
//! and the order of the traversal index. Configuration can be loaded from a
//! file, environment variables, or created programmatically.

use crate::store::Capacity;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use tilecache_render::{DEFAULT_ORDER, MAX_ORDER, TILE_SIZE};

/// Environment variable overriding the entry capacity
pub const ENV_CAPACITY: &str = "TILECACHE_CAPACITY";
/// Environment variable overriding the tile width
pub const ENV_TILE_WIDTH: &str = "TILECACHE_TILE_WIDTH";
/// Environment variable overriding the tile height
pub const ENV_TILE_HEIGHT: &str = "TILECACHE_TILE_HEIGHT";
/// Environment variable overriding the index order
pub const ENV_INDEX_ORDER: &str = "TILECACHE_INDEX_ORDER";

/// Configuration for a tile cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// Maximum number of cached tiles; zero or negative means unbounded
    pub capacity: i64,
    /// Tile width in pixels
    pub tile_width: i32,
    /// Tile height in pixels
    pub tile_height: i32,
    /// Hilbert curve order used for traversal (grid side is 2^order)
    pub index_order: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            tile_width: TILE_SIZE,
            tile_height: TILE_SIZE,
            index_order: DEFAULT_ORDER,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given capacity and tile size.
    pub fn new(capacity: i64, tile_width: i32, tile_height: i32) -> Self {
        Self { capacity, tile_width, tile_height, ..Self::default() }
    }

    /// Sets the entry capacity.
    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the tile size in pixels.
    pub fn with_tile_size(mut self, width: i32, height: i32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    /// Sets the traversal index order.
    pub fn with_index_order(mut self, order: u32) -> Self {
        self.index_order = order;
        self
    }

    /// The capacity as an eviction bound
    pub fn capacity(&self) -> Capacity {
        Capacity::from_config(self.capacity)
    }

    /// Checks tile size and index order.
    ///
    /// Capacity is always valid: any non-positive value means unbounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_width <= 0 {
            return Err(ConfigError::InvalidValue("tile_width".to_string()));
        }
        if self.tile_height <= 0 {
            return Err(ConfigError::InvalidValue("tile_height".to_string()));
        }
        if self.index_order == 0 || self.index_order > MAX_ORDER {
            return Err(ConfigError::InvalidValue("index_order".to_string()));
        }
        Ok(())
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TILECACHE_CAPACITY`: entry capacity (default: 256, <= 0 for unbounded)
    /// - `TILECACHE_TILE_WIDTH`: tile width in pixels (default: 256)
    /// - `TILECACHE_TILE_HEIGHT`: tile height in pixels (default: 256)
    /// - `TILECACHE_INDEX_ORDER`: traversal index order (default: 16)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Applies environment overrides on top of this configuration.
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var(ENV_CAPACITY) {
            self.capacity = parse_value(ENV_CAPACITY, &val)?;
        }
        if let Ok(val) = std::env::var(ENV_TILE_WIDTH) {
            self.tile_width = parse_value(ENV_TILE_WIDTH, &val)?;
        }
        if let Ok(val) = std::env::var(ENV_TILE_HEIGHT) {
            self.tile_height = parse_value(ENV_TILE_HEIGHT, &val)?;
        }
        if let Ok(val) = std::env::var(ENV_INDEX_ORDER) {
            self.index_order = parse_value(ENV_INDEX_ORDER, &val)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a file of `key = value` lines.
    ///
    /// Expected file format:
    /// ```text
    /// # Tile cache configuration
    /// capacity = 256
    /// tile_width = 256
    /// tile_height = 256
    /// index_order = 16
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    /// Parses configuration text. Unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Malformed(line.to_string()));
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"');

            match key {
                "capacity" => config.capacity = parse_value(key, value)?,
                "tile_width" => config.tile_width = parse_value(key, value)?,
                "tile_height" => config.tile_height = parse_value(key, value)?,
                "index_order" => config.index_order = parse_value(key, value)?,
                _ => tracing::debug!(key, "ignoring unknown configuration key"),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_text())?;
        Ok(())
    }

    fn to_text(&self) -> String {
        format!(
            "# Tile cache configuration\n\
             capacity = {}\n\
             tile_width = {}\n\
             tile_height = {}\n\
             index_order = {}\n",
            self.capacity, self.tile_width, self.tile_height, self.index_order
        )
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("malformed configuration line: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env() {
        for key in [ENV_CAPACITY, ENV_TILE_WIDTH, ENV_TILE_HEIGHT, ENV_INDEX_ORDER] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 256);
        assert_eq!(config.tile_width, 256);
        assert_eq!(config.tile_height, 256);
        assert_eq!(config.index_order, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_capacity(-1)
            .with_tile_size(64, 32)
            .with_index_order(10);

        assert_eq!(
            config,
            CacheConfig { capacity: -1, tile_width: 64, tile_height: 32, index_order: 10 }
        );
        assert_eq!(config.capacity(), Capacity::Unbounded);
        assert_eq!(CacheConfig::new(4, 64, 64).capacity().limit(), Some(4));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(CacheConfig::default().with_tile_size(0, 64).validate().is_err());
        assert!(CacheConfig::default().with_tile_size(64, -3).validate().is_err());
        assert!(CacheConfig::default().with_index_order(0).validate().is_err());
        assert!(CacheConfig::default().with_index_order(32).validate().is_err());
        assert!(CacheConfig::default().with_capacity(-100).validate().is_ok());
    }

    #[test]
    fn test_parse() {
        let text = r#"
            # comment
            capacity = -1
            tile_width = "64"
            tile_height = 128
            unknown_key = whatever
        "#;

        let config = CacheConfig::parse(text).unwrap();
        assert_eq!(config.capacity, -1);
        assert_eq!(config.tile_width, 64);
        assert_eq!(config.tile_height, 128);
        assert_eq!(config.index_order, DEFAULT_ORDER);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            CacheConfig::parse("capacity = lots"),
            Err(ConfigError::InvalidValue(key)) if key == "capacity"
        ));
        assert!(matches!(CacheConfig::parse("tile_width 64"), Err(ConfigError::Malformed(_))));
        assert!(matches!(
            CacheConfig::parse("tile_width = 0"),
            Err(ConfigError::InvalidValue(key)) if key == "tile_width"
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tilecache.conf");

        let config = CacheConfig::new(4, 64, 64).with_index_order(8);
        config.save_to_file(&path).unwrap();

        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let result = CacheConfig::from_file("/nonexistent/tilecache.conf");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var(ENV_CAPACITY, "4");
        env::set_var(ENV_TILE_WIDTH, "64");
        env::set_var(ENV_TILE_HEIGHT, "48");
        env::set_var(ENV_INDEX_ORDER, "12");

        let config = CacheConfig::from_env().unwrap();
        clear_env();

        assert_eq!(
            config,
            CacheConfig { capacity: 4, tile_width: 64, tile_height: 48, index_order: 12 }
        );
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value() {
        clear_env();
        env::set_var(ENV_TILE_WIDTH, "wide");

        let result = CacheConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == ENV_TILE_WIDTH));
    }

    #[test]
    #[serial]
    fn test_merge_env_keeps_file_values() {
        clear_env();
        env::set_var(ENV_CAPACITY, "0");

        let config = CacheConfig::new(8, 32, 32).merge_env().unwrap();
        clear_env();

        assert_eq!(config.capacity(), Capacity::Unbounded);
        assert_eq!(config.tile_width, 32);
    }
}
