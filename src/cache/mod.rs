//! Cache Module
//!
//! Bounded read-through cache of fully reassembled records.
//!
//! ## Policy
//! - Keyed by leading block id
//! - Records larger than the per-item cap are never cached
//! - When the summed size exceeds the total cap, entries are evicted in
//!   insertion order (oldest first); lookups do not refresh an entry
//! - A disabled cache keeps no state: lookups miss, inserts are dropped

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use crate::config::Config;

/// Bounded FIFO cache of record bytes
#[derive(Debug)]
pub struct RecordCache {
    /// `None` when caching is disabled
    state: Option<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    item_cap: usize,
    total_cap: usize,
    entries: HashMap<u32, Bytes>,
    /// Insertion order, oldest at the front
    order: VecDeque<u32>,
    total_bytes: usize,
}

impl RecordCache {
    /// Create an enabled cache with the given caps
    pub fn new(item_cap: usize, total_cap: usize) -> Self {
        Self {
            state: Some(CacheState {
                item_cap,
                total_cap,
                entries: HashMap::new(),
                order: VecDeque::new(),
                total_bytes: 0,
            }),
        }
    }

    /// Create a cache that never holds anything
    pub fn disabled() -> Self {
        Self { state: None }
    }

    /// Build from the cache section of a config
    pub fn from_config(config: &Config) -> Self {
        if config.cache_enabled {
            Self::new(config.cache_item_cap, config.cache_total_cap)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// Look up a record
    ///
    /// The returned `Bytes` is immutable, so callers cannot alter the cached copy.
    pub fn lookup(&self, id: u32) -> Option<Bytes> {
        self.state.as_ref()?.entries.get(&id).cloned()
    }

    /// Cache a record, evicting the oldest entries while over the total cap
    pub fn insert(&mut self, id: u32, data: Bytes) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        state.remove(id);
        if data.len() > state.item_cap {
            return;
        }

        state.total_bytes += data.len();
        state.entries.insert(id, data);
        state.order.push_back(id);

        while state.total_bytes > state.total_cap {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            if let Some(evicted) = state.entries.remove(&oldest) {
                state.total_bytes -= evicted.len();
                tracing::trace!(record = oldest, bytes = evicted.len(), "evicted cache entry");
            }
        }
    }

    /// Drop any entry for `id`
    pub fn invalidate(&mut self, id: u32) {
        if let Some(state) = self.state.as_mut() {
            state.remove(id);
        }
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of cached record sizes in bytes
    pub fn total_bytes(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.total_bytes)
    }
}

impl CacheState {
    fn remove(&mut self, id: u32) {
        if let Some(old) = self.entries.remove(&id) {
            self.total_bytes -= old.len();
            self.order.retain(|&queued| queued != id);
        }
    }
}
