//! Engine Module
//!
//! Executes record operations against the block layer and the cache.
//!
//! ## Responsibilities
//! - GET: cache lookup, else walk and reassemble a chain
//! - PUT: chunk, allocate and write a new chain
//! - SET: rewrite a chain in place, shrinking or growing it
//! - DEL: free every block of a chain
//! - CLOSE: flush metadata and sync both files
//!
//! The engine is owned by the scheduler thread and is never shared, so
//! nothing here locks. Conflicting operations never reach it in the same
//! tick (see [`LockArbiter`](crate::scheduler::LockArbiter)).

use bytes::{Bytes, BytesMut};

use crate::cache::RecordCache;
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::storage::block::blocks_for;
use crate::storage::BlockManager;

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Block slots in the data container
    pub total_blocks: u32,

    /// Listed free block ids
    pub free_blocks: usize,

    /// Records held by the cache
    pub cached_entries: usize,

    /// Bytes held by the cache
    pub cached_bytes: usize,

    /// Data container length in bytes
    pub data_file_len: u64,
}

/// The tick-side storage engine
pub struct Engine {
    /// Block files and free list
    blocks: BlockManager,

    /// Read-through record cache
    cache: RecordCache,
}

impl Engine {
    /// Open the block layer described by `config`
    pub fn open(config: &Config) -> Result<Self> {
        let blocks = BlockManager::open(config)?;
        Ok(Self::with_blocks(blocks, config))
    }

    /// Run over an already opened block layer
    pub fn with_blocks(blocks: BlockManager, config: &Config) -> Self {
        Self {
            blocks,
            cache: RecordCache::from_config(config),
        }
    }

    /// Read the record headed by `id`
    ///
    /// Returns `None` when `id` is free, out of range, or not a leading block.
    /// An allocated leading block with no content is an empty record.
    pub fn get(&mut self, id: u32) -> Result<Option<Bytes>> {
        if let Some(hit) = self.cache.lookup(id) {
            tracing::trace!(record = id, "cache hit");
            return Ok(Some(hit));
        }

        let head = match self.blocks.read_block(id)? {
            Some(block) if block.is_leading() => block,
            _ => return Ok(None),
        };

        let chain = self.blocks.read_chain(id, head)?;
        let size = chain.iter().map(|(_, b)| b.content_len()).sum();
        let mut buf = BytesMut::with_capacity(size);
        for (_, block) in &chain {
            buf.extend_from_slice(block.content());
        }

        let data = buf.freeze();
        self.cache.insert(id, data.clone());
        Ok(Some(data))
    }

    /// Store `data` as a new record and return its leading id
    pub fn put(&mut self, data: &[u8]) -> Result<u64> {
        let ids = self.blocks.allocate(blocks_for(data.len()))?;

        let failures = self.blocks.write_chain(&ids, data);
        if !failures.is_empty() {
            // Hand the blocks back; the record never became visible.
            self.blocks.free_blocks(&ids);
            return Err(StoreError::AggregateIo {
                context: "Cannot put contents into blocks".to_string(),
                failures,
            });
        }

        tracing::trace!(record = ids[0], blocks = ids.len(), "put record");
        Ok(ids[0] as u64)
    }

    /// Overwrite the record headed by `id`
    ///
    /// Existing blocks are reused in chain order. Surplus blocks are freed;
    /// missing ones are allocated and appended. With `force_create`, a free
    /// or never-allocated `id` becomes the head of a new chain.
    ///
    /// If any block of the new chain cannot be written, the whole chain is
    /// freed and `id` no longer heads a record.
    pub fn set(&mut self, id: u32, data: &[u8], force_create: bool) -> Result<()> {
        self.cache.invalidate(id);

        let mut claimed = false;
        let mut ids: Vec<u32> = match self.blocks.read_block(id)? {
            Some(head) if head.is_leading() => self
                .blocks
                .read_chain(id, head)?
                .into_iter()
                .map(|(block_id, _)| block_id)
                .collect(),
            Some(_) => return Err(StoreError::not_leading(id)),
            None if force_create => {
                self.blocks.claim(id)?;
                claimed = true;
                vec![id]
            }
            None => {
                return Err(StoreError::Range(format!(
                    "Target block #{} is not allocated",
                    id
                )))
            }
        };

        let needed = blocks_for(data.len());
        let surplus = if ids.len() > needed {
            ids.split_off(needed)
        } else {
            match self.blocks.allocate(needed - ids.len()) {
                Ok(extra) => ids.extend(extra),
                Err(e) => {
                    if claimed {
                        self.blocks.free_blocks(&ids);
                    }
                    return Err(e);
                }
            }
            Vec::new()
        };

        let mut failures = self.blocks.write_chain(&ids, data);
        if !failures.is_empty() {
            // The chain now mixes old and new content: drop all of it.
            self.blocks.free_blocks(&ids);
        }
        failures.extend(self.blocks.free_blocks(&surplus));

        if !failures.is_empty() {
            return Err(StoreError::AggregateIo {
                context: format!("Cannot set contents of record #{}", id),
                failures,
            });
        }

        tracing::trace!(
            record = id,
            blocks = ids.len(),
            freed = surplus.len(),
            "set record"
        );
        Ok(())
    }

    /// Delete the record headed by `id`
    ///
    /// Deleting a free or out-of-range id succeeds without doing anything.
    pub fn del(&mut self, id: u32) -> Result<()> {
        self.cache.invalidate(id);

        let head = match self.blocks.read_block(id)? {
            Some(block) if block.is_leading() => block,
            Some(_) => return Err(StoreError::not_leading(id)),
            None => return Ok(()),
        };

        let ids: Vec<u32> = self
            .blocks
            .read_chain(id, head)?
            .into_iter()
            .map(|(block_id, _)| block_id)
            .collect();

        let failures = self.blocks.free_blocks(&ids);
        if !failures.is_empty() {
            return Err(StoreError::AggregateIo {
                context: format!("Cannot free blocks of record #{}", id),
                failures,
            });
        }

        tracing::trace!(record = id, blocks = ids.len(), "deleted record");
        Ok(())
    }

    /// Snapshot counters
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_blocks: self.blocks.total_blocks(),
            free_blocks: self.blocks.free_count(),
            cached_entries: self.cache.len(),
            cached_bytes: self.cache.total_bytes(),
            data_file_len: self.blocks.data_file_len()?,
        })
    }

    /// Persist dirty metadata; see [`BlockManager::flush_metadata`]
    pub fn flush_metadata(&mut self) -> std::io::Result<bool> {
        self.blocks.flush_metadata()
    }

    /// Flush metadata and sync both files
    pub fn close(&mut self) -> Result<()> {
        let errors = self.blocks.close();
        if errors.is_empty() {
            return Ok(());
        }

        Err(StoreError::AggregateIo {
            context: "Cannot close storage".to_string(),
            failures: errors
                .into_iter()
                .map(|error| crate::error::BlockFailure { block: 0, error })
                .collect(),
        })
    }
}
