//! Configuration for rastore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Default block cap: 2^20 blocks, about 261 MiB of container
pub const DEFAULT_MAX_BLOCKS: u32 = 1 << 20;

/// Main configuration for a rastore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for both storage files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── storage.blst     (data container: header + fixed blocks)
    ///     └── storage.segd     (segment descriptor: free block ids)
    pub data_dir: PathBuf,

    /// Length of a trailing run of free blocks that triggers truncation
    pub truncate_boundary: usize,

    /// fsync both files after every metadata flush
    pub sync_on_flush: bool,

    /// Highest addressable block id; ids above it are range errors
    ///
    /// Bounds the container size and the free list kept in memory.
    pub max_blocks: u32,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Whether GET results are cached at all
    pub cache_enabled: bool,

    /// Largest record (in bytes) that will be cached
    pub cache_item_cap: usize,

    /// Upper bound on the sum of cached record sizes (in bytes)
    pub cache_total_cap: usize,

    // -------------------------------------------------------------------------
    // Scheduler Configuration
    // -------------------------------------------------------------------------
    /// Max queued operations examined per tick
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./rastore_data"),
            truncate_boundary: 10,
            sync_on_flush: false,
            max_blocks: DEFAULT_MAX_BLOCKS,
            cache_enabled: true,
            cache_item_cap: 2048,
            cache_total_cap: 10240,
            batch_size: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(StoreError::Config("batch_size must be at least 1".to_string()));
        }
        if self.truncate_boundary == 0 {
            return Err(StoreError::Config(
                "truncate_boundary must be at least 1".to_string(),
            ));
        }
        if self.max_blocks == 0 {
            return Err(StoreError::Config("max_blocks must be at least 1".to_string()));
        }
        if self.cache_enabled && self.cache_item_cap > self.cache_total_cap {
            return Err(StoreError::Config(format!(
                "cache_item_cap ({}) exceeds cache_total_cap ({})",
                self.cache_item_cap, self.cache_total_cap
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for both storage files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Enable or disable the record cache
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    /// Set the per-record cache cap (in bytes)
    pub fn cache_item_cap(mut self, bytes: usize) -> Self {
        self.config.cache_item_cap = bytes;
        self
    }

    /// Set the total cache cap (in bytes)
    pub fn cache_total_cap(mut self, bytes: usize) -> Self {
        self.config.cache_total_cap = bytes;
        self
    }

    /// Set the number of operations examined per tick
    pub fn batch_size(mut self, count: usize) -> Self {
        self.config.batch_size = count;
        self
    }

    /// Set the trailing free-run length that triggers truncation
    pub fn truncate_boundary(mut self, blocks: usize) -> Self {
        self.config.truncate_boundary = blocks;
        self
    }

    /// Set the highest addressable block id
    pub fn max_blocks(mut self, blocks: u32) -> Self {
        self.config.max_blocks = blocks;
        self
    }

    /// fsync after each metadata flush
    pub fn sync_on_flush(mut self, sync: bool) -> Self {
        self.config.sync_on_flush = sync;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
