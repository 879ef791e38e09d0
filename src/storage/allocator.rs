//! Free-list allocator
//!
//! In-memory bookkeeping of which block ids are free and how many block slots
//! the data container holds. Disk effects (zeroing, truncation, persistence)
//! are applied by [`BlockManager`](super::BlockManager).
//!
//! ## Invariants
//! - Every listed id is in `1..=total_blocks`
//! - A listed id is never part of a live chain
//! - Ids above `total_blocks` are implicitly free and never listed

use std::collections::BTreeSet;

use crate::error::{Result, StoreError};

/// Tracks free block ids and the block high-water mark
#[derive(Debug, Clone)]
pub struct FreeList {
    /// Reclaimed ids, kept sorted so allocation is deterministic
    free: BTreeSet<u32>,

    /// Allocated block slots in the data container
    total_blocks: u32,

    /// Highest id that may ever be minted or occupied
    limit: u32,

    /// Set whenever `free` or `total_blocks` changed since the last flush
    dirty: bool,
}

impl Default for FreeList {
    fn default() -> Self {
        Self {
            free: BTreeSet::new(),
            total_blocks: 0,
            limit: u32::MAX,
            dirty: false,
        }
    }
}

impl FreeList {
    /// Create an empty allocator over an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted state, rejecting ids that break the invariants
    pub fn load(total_blocks: u32, ids: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut free = BTreeSet::new();
        for id in ids {
            if id == 0 || id > total_blocks {
                return Err(StoreError::Corrupted(format!(
                    "free block #{} outside 1..={}",
                    id, total_blocks
                )));
            }
            if !free.insert(id) {
                return Err(StoreError::Corrupted(format!(
                    "free block #{} listed twice",
                    id
                )));
            }
        }

        Ok(Self {
            free,
            total_blocks,
            limit: u32::MAX,
            dirty: false,
        })
    }

    /// Cap the container at `limit` blocks
    ///
    /// Callers keep `total_blocks <= limit`; a lower limit only stops growth.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Hand out exactly `count` ids
    ///
    /// Free ids are reused lowest first; any shortfall is minted past
    /// `total_blocks`.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<u32>> {
        let reused = count.min(self.free.len());
        let minted = count - reused;

        if minted as u64 > self.limit.saturating_sub(self.total_blocks) as u64 {
            return Err(StoreError::Range(format!(
                "cannot allocate {} more blocks past #{}",
                minted, self.total_blocks
            )));
        }

        let mut ids = Vec::with_capacity(count);
        for _ in 0..reused {
            if let Some(id) = self.free.pop_first() {
                ids.push(id);
            }
        }
        for _ in 0..minted {
            self.total_blocks += 1;
            ids.push(self.total_blocks);
        }

        if count > 0 {
            self.dirty = true;
        }
        Ok(ids)
    }

    /// Return `id` to the free list
    pub fn release(&mut self, id: u32) -> Result<()> {
        if id == 0 || id > self.total_blocks {
            return Err(StoreError::block_out_of_range(id as u64));
        }
        self.free.insert(id);
        self.dirty = true;
        Ok(())
    }

    /// Take a specific id out of free space so it can head a new chain
    ///
    /// A listed id is removed from the list. An id past `total_blocks` raises
    /// the high-water mark to it and lists every skipped id as free.
    /// Returns false if `id` is neither listed nor past the high-water mark.
    pub fn claim(&mut self, id: u32) -> Result<bool> {
        if id == 0 || id > self.limit {
            return Err(StoreError::block_out_of_range(id as u64));
        }

        if id > self.total_blocks {
            self.occupy(id);
            return Ok(true);
        }

        let claimed = self.free.remove(&id);
        if claimed {
            self.dirty = true;
        }
        Ok(claimed)
    }

    /// Raise `total_blocks` to `id`, listing the skipped ids as free
    fn occupy(&mut self, id: u32) {
        for skipped in self.total_blocks + 1..id {
            self.free.insert(skipped);
        }
        self.total_blocks = id;
        self.dirty = true;
    }

    /// Length of the run of free ids ending exactly at `total_blocks`
    pub fn trailing_free_run(&self) -> usize {
        let mut run = 0;
        for &id in self.free.iter().rev() {
            if id != self.total_blocks - run as u32 {
                break;
            }
            run += 1;
        }
        run
    }

    /// Drop the trailing free run if it is at least `boundary` long
    ///
    /// Returns the new `total_blocks` when the container must be truncated.
    pub fn compact(&mut self, boundary: usize) -> Option<u32> {
        let run = self.trailing_free_run();
        if run == 0 || run < boundary {
            return None;
        }

        let new_total = self.total_blocks - run as u32;
        self.free.split_off(&(new_total + 1));
        self.total_blocks = new_total;
        self.dirty = true;
        Some(new_total)
    }

    pub fn is_free(&self, id: u32) -> bool {
        id > self.total_blocks || self.free.contains(&id)
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// Number of listed free ids
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Listed free ids in ascending order
    pub fn free_ids(&self) -> impl ExactSizeIterator<Item = &u32> + '_ {
        self.free.iter()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
